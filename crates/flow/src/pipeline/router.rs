//! Declarative wiring between registered addresses.

use sluice_core::{Address, StreamConfig};
use tracing::debug;

use super::Pipeline;
use crate::{
  error::{FlowError, Role},
  stream::{ElasticStream, Stream},
};

/// Topology a [`Router`] builds between its sources and sinks.
///
/// For `m` sources and `n` sinks:
///
/// | Stitch | Streams | Shape |
/// |---|---|---|
/// | `Unary` | 1 | every source writes into, every sink reads from, one stream |
/// | `Weave` | m * n | a private stream per (source, sink) pair |
/// | `Divergent` | m | one stream per source, read by every sink |
/// | `Convergent` | n | one stream per sink, written by every source |
///
/// Sinks reading a shared stream compete for its values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stitch {
  Unary,
  Weave,
  Divergent,
  Convergent,
}

impl std::fmt::Display for Stitch {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Stitch::Unary => f.write_str("unary"),
      Stitch::Weave => f.write_str("weave"),
      Stitch::Divergent => f.write_str("divergent"),
      Stitch::Convergent => f.write_str("convergent"),
    }
  }
}

/// Builder describing one wiring step.
///
/// A stream written by more than one source is created elastic, so it closes
/// only after all of its sources closed.
///
/// ```ignore
/// Router::new(Stitch::Weave)
///   .from(["parity"])
///   .to(["even", "odd"])
///   .route(&mut pipeline)?;
/// ```
#[derive(Debug, Clone)]
pub struct Router {
  stitch: Stitch,
  from: Vec<Address>,
  to: Vec<Address>,
  capacity: usize,
  elastic: bool,
}

impl Router {
  pub fn new(stitch: Stitch) -> Self {
    Self::with_config(stitch, &StreamConfig::default())
  }

  pub fn with_config(stitch: Stitch, config: &StreamConfig) -> Self {
    Self {
      stitch,
      from: Vec::new(),
      to: Vec::new(),
      capacity: config.capacity,
      elastic: false,
    }
  }

  /// Source addresses; repeated calls append
  pub fn from<A>(mut self, addresses: impl IntoIterator<Item = A>) -> Self
  where
    A: Into<Address>,
  {
    self.from.extend(addresses.into_iter().map(Into::into));
    self
  }

  /// Sink addresses; repeated calls append
  pub fn to<A>(mut self, addresses: impl IntoIterator<Item = A>) -> Self
  where
    A: Into<Address>,
  {
    self.to.extend(addresses.into_iter().map(Into::into));
    self
  }

  /// Capacity of every created stream; 0 for rendezvous
  pub fn capacity(mut self, capacity: usize) -> Self {
    self.capacity = capacity;
    self
  }

  /// Create every stream elastic, even single-producer ones
  pub fn elastic(mut self) -> Self {
    self.elastic = true;
    self
  }

  pub fn stitch(&self) -> Stitch {
    self.stitch
  }

  fn stream<T>(&self, producers: usize) -> Stream<T> {
    if self.elastic || producers > 1 {
      ElasticStream::new(self.capacity).into_stream()
    } else {
      Stream::new(self.capacity)
    }
  }

  /// Producers per stream, and the (source, sink, stream index) pairs to wire
  fn plan(&self) -> (Vec<usize>, Vec<(Address, Address, usize)>) {
    let sources = self.from.len();
    let mut producers = Vec::new();
    let mut pairs = Vec::new();
    match self.stitch {
      Stitch::Unary => {
        producers.push(sources);
        for source in &self.from {
          for sink in &self.to {
            pairs.push((source.clone(), sink.clone(), 0));
          }
        }
      }
      Stitch::Weave => {
        for source in &self.from {
          for sink in &self.to {
            pairs.push((source.clone(), sink.clone(), producers.len()));
            producers.push(1);
          }
        }
      }
      Stitch::Divergent => {
        for source in &self.from {
          for sink in &self.to {
            pairs.push((source.clone(), sink.clone(), producers.len()));
          }
          producers.push(1);
        }
      }
      Stitch::Convergent => {
        for sink in &self.to {
          for source in &self.from {
            pairs.push((source.clone(), sink.clone(), producers.len()));
          }
          producers.push(sources);
        }
      }
    }
    (producers, pairs)
  }

  /// Wire `pipeline` and return the streams created.
  ///
  /// Every address and every segment's arity is checked before anything is
  /// connected, so a failed route leaves the pipeline untouched.
  pub fn route<T>(&self, pipeline: &mut Pipeline<T>) -> Result<Vec<Stream<T>>, FlowError>
  where
    T: Clone + Send + 'static,
  {
    pipeline.check_open()?;
    for address in &self.from {
      pipeline.check_role(address, Role::Source)?;
    }
    for address in &self.to {
      pipeline.check_role(address, Role::Sink)?;
    }

    let (producers, pairs) = self.plan();
    pipeline.check_wiring(&pairs)?;

    let streams: Vec<Stream<T>> = producers.iter().map(|&count| self.stream(count)).collect();
    for (source, sink, index) in &pairs {
      pipeline.connect(source, sink, &streams[*index])?;
    }

    debug!(
      pipeline = %pipeline.name(),
      stitch = %self.stitch,
      sources = self.from.len(),
      sinks = self.to.len(),
      streams = streams.len(),
      "Routed"
    );
    Ok(streams)
  }
}
