//! Addressable segment registry and stream wiring
//!
//! A [`Pipeline`] maps [`Address`]es to segments, each registered as a source,
//! a sink, or both. [`Router`]s wire registered addresses with streams
//! according to a [`Stitch`], and [`Pipeline::flow`] starts every segment in
//! one task group.
//!
//! ```text
//!           ┌──────────────── pipeline "numbers" ────────────────┐
//! outlets ──▶ numbers:input ─▶ parity ─┬─▶ even ─┐                │
//!           │                          └─▶ odd  ─┴─▶ numbers:output ──▶ inlets
//!           └────────────────────────────────────────────────────┘
//! ```
//!
//! Boundary relays (`{name}:input`, `{name}:output`) are [`Confluence`]
//! segments created on the first `flow` from the declared boundary
//! connections. They carry values between the pipeline's own inputs/outputs
//! and its inner segments, which is what lets a pipeline be registered inside
//! another pipeline.
//!
//! Flowing seals the pipeline: later registration or routing fails with
//! [`ContractViolation::Sealed`].

mod router;


use std::collections::{BTreeMap, HashMap, HashSet};

use sluice_core::{Address, AddressError};
use tracing::{debug, warn};

pub use self::router::{Router, Stitch};
use crate::{
  error::{ContractViolation, FlowError, Role, Side},
  group::TaskGroup,
  segment::{Confluence, Flow, FlowOptions, Segment, Sink, Source},
  stream::{Inlet, Outlet, Stream},
};

const KIND: &str = "Pipeline";

// ============================================================================
// Registry Entries
// ============================================================================

enum Entry<T> {
  Source(Box<dyn Source<T>>),
  Sink(Box<dyn Sink<T>>),
  Segment(Box<dyn Segment<T>>),
}

impl<T> Entry<T> {
  fn plays(&self, role: Role) -> bool {
    matches!(
      (self, role),
      (Entry::Segment(_), _) | (Entry::Source(_), Role::Source) | (Entry::Sink(_), Role::Sink)
    )
  }

  fn connect_outputs(&mut self, address: &Address, inlets: Vec<Inlet<T>>) -> Result<(), FlowError> {
    match self {
      Entry::Source(source) => source.connect_outputs(inlets),
      Entry::Segment(segment) => segment.connect_outputs(inlets),
      Entry::Sink(_) => Err(FlowError::WrongRole {
        address: address.clone(),
        role: Role::Source,
      }),
    }
  }

  fn connect_inputs(&mut self, address: &Address, outlets: Vec<Outlet<T>>) -> Result<(), FlowError> {
    match self {
      Entry::Sink(sink) => sink.connect_inputs(outlets),
      Entry::Segment(segment) => segment.connect_inputs(outlets),
      Entry::Source(_) => Err(FlowError::WrongRole {
        address: address.clone(),
        role: Role::Sink,
      }),
    }
  }

  fn check_outputs(&self, address: &Address, additional: usize) -> Result<(), FlowError> {
    match self {
      Entry::Source(source) => source.check_outputs(additional),
      Entry::Segment(segment) => segment.check_outputs(additional),
      Entry::Sink(_) => Err(FlowError::WrongRole {
        address: address.clone(),
        role: Role::Source,
      }),
    }
  }

  fn check_inputs(&self, address: &Address, additional: usize) -> Result<(), FlowError> {
    match self {
      Entry::Sink(sink) => sink.check_inputs(additional),
      Entry::Segment(segment) => segment.check_inputs(additional),
      Entry::Source(_) => Err(FlowError::WrongRole {
        address: address.clone(),
        role: Role::Sink,
      }),
    }
  }

  fn flow(&mut self, group: &TaskGroup, options: FlowOptions) -> Result<(), FlowError> {
    match self {
      Entry::Source(source) => source.flow(group, options),
      Entry::Sink(sink) => sink.flow(group, options),
      Entry::Segment(segment) => segment.flow(group, options),
    }
  }

  fn kind(&self) -> &'static str {
    match self {
      Entry::Source(source) => source.kind(),
      Entry::Sink(sink) => sink.kind(),
      Entry::Segment(segment) => segment.kind(),
    }
  }
}

/// One edge of the route table
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Route {
  pub source: Address,
  pub sink: Address,
  pub stream: u64,
}

/// A boundary connection declared before the pipeline flows
struct Boundary {
  stitch: Stitch,
  capacity: usize,
  addresses: Vec<Address>,
}

// ============================================================================
// Pipeline
// ============================================================================

/// Registry of addressed segments and the streams between them
pub struct Pipeline<T> {
  name: Address,
  entries: BTreeMap<Address, Entry<T>>,
  routes: HashMap<(Address, Address), Stream<T>>,
  attached: HashSet<(Address, u64, Role)>,

  boundary_inputs: Vec<Boundary>,
  boundary_outputs: Vec<Boundary>,
  external_inputs: Vec<Outlet<T>>,
  external_outputs: Vec<Inlet<T>>,

  sealed: bool,
}

impl<T> Pipeline<T>
where
  T: Clone + Send + 'static,
{
  pub fn new(name: impl Into<Address>) -> Self {
    Self {
      name: name.into(),
      entries: BTreeMap::new(),
      routes: HashMap::new(),
      attached: HashSet::new(),
      boundary_inputs: Vec::new(),
      boundary_outputs: Vec::new(),
      external_inputs: Vec::new(),
      external_outputs: Vec::new(),
      sealed: false,
    }
  }

  pub fn name(&self) -> &Address {
    &self.name
  }

  pub fn is_sealed(&self) -> bool {
    self.sealed
  }

  /// Registered addresses in order
  pub fn addresses(&self) -> Vec<Address> {
    self.entries.keys().cloned().collect()
  }

  /// Route table, sorted by source then sink
  pub fn routes(&self) -> Vec<Route> {
    let mut routes: Vec<Route> = self
      .routes
      .iter()
      .map(|((source, sink), stream)| Route {
        source: source.clone(),
        sink: sink.clone(),
        stream: stream.id(),
      })
      .collect();
    routes.sort();
    routes
  }

  /// The stream carrying values from `source` to `sink`, if routed
  pub fn stream(&self, source: &Address, sink: &Address) -> Option<&Stream<T>> {
    self.routes.get(&(source.clone(), sink.clone()))
  }

  // ==========================================================================
  // Registration
  // ==========================================================================

  /// Register a segment that plays both roles
  pub fn segment(&mut self, address: impl Into<Address>, segment: impl Segment<T> + 'static) -> Result<&mut Self, FlowError> {
    self.register(address.into(), Entry::Segment(Box::new(segment)))
  }

  /// Register a segment that only produces values
  pub fn source(&mut self, address: impl Into<Address>, source: impl Source<T> + 'static) -> Result<&mut Self, FlowError> {
    self.register(address.into(), Entry::Source(Box::new(source)))
  }

  /// Register a segment that only consumes values
  pub fn sink(&mut self, address: impl Into<Address>, sink: impl Sink<T> + 'static) -> Result<&mut Self, FlowError> {
    self.register(address.into(), Entry::Sink(Box::new(sink)))
  }

  /// Registering an address again replaces the segment and forgets its routes
  fn register(&mut self, address: Address, entry: Entry<T>) -> Result<&mut Self, FlowError> {
    self.check_open()?;
    if let Some(previous) = self.entries.insert(address.clone(), entry) {
      debug!(pipeline = %self.name, address = %address, replaced = previous.kind(), "Replacing registered segment");
      self
        .routes
        .retain(|(source, sink), _| source != &address && sink != &address);
      self.attached.retain(|(attached, _, _)| attached != &address);
    }
    Ok(self)
  }

  // ==========================================================================
  // Wiring
  // ==========================================================================

  pub(crate) fn check_open(&self) -> Result<(), FlowError> {
    if self.sealed {
      return Err(
        ContractViolation::Sealed {
          pipeline: self.name.clone(),
        }
        .into(),
      );
    }
    Ok(())
  }

  pub(crate) fn check_role(&self, address: &Address, role: Role) -> Result<(), FlowError> {
    if !self.entry(address)?.plays(role) {
      return Err(FlowError::WrongRole {
        address: address.clone(),
        role,
      });
    }
    Ok(())
  }

  fn entry(&self, address: &Address) -> Result<&Entry<T>, FlowError> {
    self
      .entries
      .get(address)
      .ok_or_else(|| AddressError::NotFound(address.clone()).into())
  }

  /// Check that attaching `(source, sink, stream)` triples would succeed,
  /// without changing anything.
  ///
  /// Streams are plan-local keys: the same key means the same new stream.
  /// Pairs that are already routed are skipped, as `connect` skips them.
  pub(crate) fn check_wiring(&self, pairs: &[(Address, Address, usize)]) -> Result<(), FlowError> {
    self.check_open()?;

    let mut seen = HashSet::new();
    let mut outputs: BTreeMap<&Address, HashSet<usize>> = BTreeMap::new();
    let mut inputs: BTreeMap<&Address, HashSet<usize>> = BTreeMap::new();
    for (source, sink, stream) in pairs {
      self.check_role(source, Role::Source)?;
      self.check_role(sink, Role::Sink)?;
      if self.routes.contains_key(&(source.clone(), sink.clone())) || !seen.insert((source, sink)) {
        continue;
      }
      outputs.entry(source).or_default().insert(*stream);
      inputs.entry(sink).or_default().insert(*stream);
    }

    for (address, streams) in outputs {
      self.entry(address)?.check_outputs(address, streams.len())?;
    }
    for (address, streams) in inputs {
      self.entry(address)?.check_inputs(address, streams.len())?;
    }
    Ok(())
  }

  /// Wire `source` to `sink` through `stream`.
  ///
  /// Both addresses and both segments' arities are checked before anything
  /// changes. A segment already attached to `stream` is not attached again,
  /// and a (source, sink) pair that is already routed is left as is.
  /// Attaching a new source to an elastic stream acquires it once.
  pub fn connect(&mut self, source: &Address, sink: &Address, stream: &Stream<T>) -> Result<(), FlowError> {
    self.check_open()?;
    self.check_role(source, Role::Source)?;
    self.check_role(sink, Role::Sink)?;

    let pair = (source.clone(), sink.clone());
    if self.routes.contains_key(&pair) {
      debug!(pipeline = %self.name, source = %source, sink = %sink, "Route exists, skipping");
      return Ok(());
    }

    let source_key = (source.clone(), stream.id(), Role::Source);
    let sink_key = (sink.clone(), stream.id(), Role::Sink);
    if !self.attached.contains(&source_key) {
      self.entry(source)?.check_outputs(source, 1)?;
    }
    if !self.attached.contains(&sink_key) {
      self.entry(sink)?.check_inputs(sink, 1)?;
    }

    stream.set_inlet_address(source);
    stream.set_outlet_address(sink);

    if !self.attached.contains(&source_key) {
      if let Some(entry) = self.entries.get_mut(source) {
        entry.connect_outputs(source, vec![stream.inlet()])?;
      }
      stream.acquire(1);
      self.attached.insert(source_key);
    }

    if !self.attached.contains(&sink_key) {
      if let Some(entry) = self.entries.get_mut(sink) {
        entry.connect_inputs(sink, vec![stream.outlet()])?;
      }
      self.attached.insert(sink_key);
    }

    debug!(pipeline = %self.name, source = %source, sink = %sink, stream = stream.id(), "Connected");
    self.routes.insert(pair, stream.clone());
    Ok(())
  }

  fn input_relay(&self) -> Address {
    Address::new(format!("{}:input", self.name))
  }

  fn output_relay(&self) -> Address {
    Address::new(format!("{}:output", self.name))
  }

  /// Feed the pipeline's own inputs to `to`, through the `{name}:input` relay
  pub fn connect_boundary_input<A>(
    &mut self,
    stitch: Stitch,
    capacity: usize,
    to: impl IntoIterator<Item = A>,
  ) -> Result<&mut Self, FlowError>
  where
    A: Into<Address>,
  {
    self.check_open()?;
    self.boundary_inputs.push(Boundary {
      stitch,
      capacity,
      addresses: to.into_iter().map(Into::into).collect(),
    });
    Ok(self)
  }

  /// Send the values of `from` to the pipeline's own outputs, through the
  /// `{name}:output` relay
  pub fn connect_boundary_output<A>(
    &mut self,
    stitch: Stitch,
    capacity: usize,
    from: impl IntoIterator<Item = A>,
  ) -> Result<&mut Self, FlowError>
  where
    A: Into<Address>,
  {
    self.check_open()?;
    self.boundary_outputs.push(Boundary {
      stitch,
      capacity,
      addresses: from.into_iter().map(Into::into).collect(),
    });
    Ok(self)
  }

  /// Register the boundary relays and route them
  fn resolve_boundaries(&mut self) -> Result<(), FlowError> {
    if self.boundary_inputs.is_empty() && !self.external_inputs.is_empty() {
      return Err(
        ContractViolation::TooMany {
          segment: KIND,
          side: Side::Inputs,
          max: 0,
          actual: self.external_inputs.len(),
        }
        .into(),
      );
    }
    if self.boundary_outputs.is_empty() && !self.external_outputs.is_empty() {
      return Err(
        ContractViolation::TooMany {
          segment: KIND,
          side: Side::Outputs,
          max: 0,
          actual: self.external_outputs.len(),
        }
        .into(),
      );
    }

    if !self.boundary_inputs.is_empty() {
      let relay = self.input_relay();
      let mut confluence = Confluence::new();
      confluence.connect_inputs(std::mem::take(&mut self.external_inputs))?;
      self.register(relay.clone(), Entry::Segment(Box::new(confluence)))?;
      for boundary in std::mem::take(&mut self.boundary_inputs) {
        Router::new(boundary.stitch)
          .capacity(boundary.capacity)
          .from([relay.clone()])
          .to(boundary.addresses)
          .route(self)?;
      }
    }

    if !self.boundary_outputs.is_empty() {
      let relay = self.output_relay();
      let mut confluence = Confluence::new();
      confluence.connect_outputs(std::mem::take(&mut self.external_outputs))?;
      self.register(relay.clone(), Entry::Segment(Box::new(confluence)))?;
      for boundary in std::mem::take(&mut self.boundary_outputs) {
        Router::new(boundary.stitch)
          .capacity(boundary.capacity)
          .from(boundary.addresses)
          .to([relay.clone()])
          .route(self)?;
      }
    }

    Ok(())
  }

  fn start(&mut self, group: &TaskGroup, options: &FlowOptions) -> Result<(), FlowError> {
    self.resolve_boundaries()?;
    self.sealed = true;
    debug!(
      pipeline = %self.name,
      segments = self.entries.len(),
      routes = self.routes.len(),
      "Flowing pipeline"
    );

    let prefix = options.fork().name().map(str::to_string);
    for (address, entry) in self.entries.iter_mut() {
      let name = match &prefix {
        Some(prefix) => format!("{prefix}/{address}"),
        None => address.to_string(),
      };
      let segment_options = options.clone().with_fork(options.fork().clone().with_name(name));
      entry.flow(group, segment_options)?;
    }
    Ok(())
  }
}

impl<T> Flow for Pipeline<T>
where
  T: Clone + Send + 'static,
{
  /// Seal the pipeline and flow every registered segment into `group`.
  ///
  /// Each segment's tasks are named after its address. When a segment fails
  /// to start the group is cancelled and the error returned.
  fn flow(&mut self, group: &TaskGroup, options: FlowOptions) -> Result<(), FlowError> {
    if self.sealed {
      return Err(ContractViolation::AlreadyFlowing { segment: KIND }.into());
    }
    if let Err(err) = self.start(group, &options) {
      warn!(pipeline = %self.name, error = %err, "Pipeline failed to start, cancelling group");
      self.sealed = true;
      group.cancel();
      return Err(err);
    }
    Ok(())
  }

  fn kind(&self) -> &'static str {
    KIND
  }
}

impl<T> Sink<T> for Pipeline<T>
where
  T: Clone + Send + 'static,
{
  fn connect_inputs(&mut self, outlets: Vec<Outlet<T>>) -> Result<(), FlowError> {
    self.check_open()?;
    self.external_inputs.extend(outlets);
    Ok(())
  }

  fn check_inputs(&self, _additional: usize) -> Result<(), FlowError> {
    self.check_open()
  }
}

impl<T> Source<T> for Pipeline<T>
where
  T: Clone + Send + 'static,
{
  fn connect_outputs(&mut self, inlets: Vec<Inlet<T>>) -> Result<(), FlowError> {
    self.check_open()?;
    self.external_outputs.extend(inlets);
    Ok(())
  }

  fn check_outputs(&self, _additional: usize) -> Result<(), FlowError> {
    self.check_open()
  }
}

impl<T> std::fmt::Debug for Pipeline<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Pipeline")
      .field("name", &self.name)
      .field("addresses", &self.entries.keys().collect::<Vec<_>>())
      .field("routes", &self.routes.len())
      .field("sealed", &self.sealed)
      .finish()
  }
}
