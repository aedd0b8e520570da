//! Segment capability model
//!
//! A segment is a unit of dataflow work. It reads from zero or more
//! [`Outlet`]s, writes to zero or more [`Inlet`]s, and starts its tasks in a
//! shared [`TaskGroup`] through a single [`Flow::flow`] call.
//!
//! - [`Source`]: `connect_outputs` + `flow`
//! - [`Sink`]: `connect_inputs` + `flow`
//! - [`Segment`]: both
//!
//! # Variants
//!
//! | Segment | Inputs | Outputs | Behavior |
//! |---|---|---|---|
//! | [`UnarySink`] | 1 | 0 | async fn per value |
//! | [`Emitter`] | 0 | 1 | emit on every tick |
//! | [`LinearTransform`] | 1 | 1 | map every value |
//! | [`Transform`] | 1 | 1 | map or drop |
//! | [`Filter`] | 1 | 1-2 | predicate, optional rejects output |
//! | [`Confluence`] | any | any | copy every value to every output |
//! | [`Delta`] | any | any | first ready output wins, else drop |
//! | [`Switch`] | 1 | any | route by resolved address |
//! | [`BatchSwitch`] | 1 | any | split one value across addresses |
//! | [`Translator`] | 1 | 1 | change value type |
//! | [`TransportSender`] / [`TransportReceiver`] | 1 / 0 | 0 / 1 | bridge a [`Transport`] |
//!
//! Connecting more ports than a segment accepts, flowing with a required
//! port missing, or flowing twice fails immediately with a
//! [`ContractViolation`]. A user function error is fatal to the group.
//!
//! With [`FlowOptions::close_inlets_on_exit`] a segment closes its outputs
//! once all of its tasks have exited; this is how end-of-stream travels down
//! a chain of segments.

mod confluence;
mod delta;
mod emitter;
mod sink;
mod switch;
mod transform;
mod translator;
mod transport;

#[cfg(test)]
mod __tests__;

use std::{
  future::Future,
  sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicUsize, Ordering},
  },
};

use futures::future::{BoxFuture, FutureExt};
use tracing::{debug, trace};

pub use self::{
  confluence::Confluence,
  delta::Delta,
  emitter::Emitter,
  sink::UnarySink,
  switch::{BatchSwitch, Switch},
  transform::{Filter, LinearTransform, Transform},
  translator::Translator,
  transport::{Transport, TransportReceiver, TransportSender},
};
use crate::{
  error::{ContractViolation, FlowError, Side},
  group::{ForkOptions, TaskContext, TaskGroup},
  stream::{Inlet, Outlet},
};

// ============================================================================
// Capabilities
// ============================================================================

/// Something that can be started in a task group
pub trait Flow: Send {
  /// Fork this segment's tasks into `group`. Must be called exactly once.
  fn flow(&mut self, group: &TaskGroup, options: FlowOptions) -> Result<(), FlowError>;

  /// Segment type name for logs and errors
  fn kind(&self) -> &'static str;
}

/// A segment that produces values into inlets
pub trait Source<T>: Flow {
  /// Attach outbound inlets; repeated calls append
  fn connect_outputs(&mut self, inlets: Vec<Inlet<T>>) -> Result<(), FlowError>;

  /// Fail as `connect_outputs` would for `additional` more inlets, without
  /// attaching anything
  fn check_outputs(&self, additional: usize) -> Result<(), FlowError>;
}

/// A segment that consumes values from outlets
pub trait Sink<T>: Flow {
  /// Attach inbound outlets; repeated calls append
  fn connect_inputs(&mut self, outlets: Vec<Outlet<T>>) -> Result<(), FlowError>;

  /// Fail as `connect_inputs` would for `additional` more outlets, without
  /// attaching anything
  fn check_inputs(&self, additional: usize) -> Result<(), FlowError>;
}

/// A segment playing both roles
pub trait Segment<T>: Source<T> + Sink<T> {}

impl<T, S> Segment<T> for S where S: Source<T> + Sink<T> + ?Sized {}

// ============================================================================
// Flow Options
// ============================================================================

/// Options threaded through [`Flow::flow`]
#[derive(Debug, Clone, Default)]
pub struct FlowOptions {
  fork: ForkOptions,
  close_inlets_on_exit: bool,
}

impl FlowOptions {
  pub fn new() -> Self {
    Self::default()
  }

  /// Fork options (name, deferred cleanups) applied to every task of the segment
  pub fn with_fork(mut self, fork: ForkOptions) -> Self {
    self.fork = fork;
    self
  }

  /// Close the segment's outputs once all of its tasks exited
  pub fn close_inlets_on_exit(mut self, close: bool) -> Self {
    self.close_inlets_on_exit = close;
    self
  }

  pub fn fork(&self) -> &ForkOptions {
    &self.fork
  }

  pub fn closes_inlets_on_exit(&self) -> bool {
    self.close_inlets_on_exit
  }

  /// Same options, named `name` unless a name was already set
  pub(crate) fn or_named(mut self, name: impl FnOnce() -> String) -> Self {
    self.fork = self.fork.or_named(name);
    self
  }
}

// ============================================================================
// Ports
// ============================================================================

/// Accepted number of ports on one side
#[derive(Debug, Clone, Copy)]
pub(crate) struct Arity {
  min: usize,
  max: Option<usize>,
}

impl Arity {
  pub(crate) const NONE: Arity = Arity::exactly(0);
  pub(crate) const ANY: Arity = Arity { min: 0, max: None };

  pub(crate) const fn exactly(n: usize) -> Self {
    Self { min: n, max: Some(n) }
  }

  pub(crate) const fn between(min: usize, max: usize) -> Self {
    Self { min, max: Some(max) }
  }
}

/// Arity-checked inputs and outputs of a segment
pub(crate) struct Ports<I, O = I> {
  segment: &'static str,
  inputs: Vec<Outlet<I>>,
  outputs: Vec<Inlet<O>>,
  input_arity: Arity,
  output_arity: Arity,
  flowing: bool,
}

impl<I, O> Ports<I, O> {
  pub(crate) fn new(segment: &'static str, input_arity: Arity, output_arity: Arity) -> Self {
    Self {
      segment,
      inputs: Vec::new(),
      outputs: Vec::new(),
      input_arity,
      output_arity,
      flowing: false,
    }
  }

  fn check_open(&self) -> Result<(), FlowError> {
    if self.flowing {
      return Err(ContractViolation::AlreadyFlowing { segment: self.segment }.into());
    }
    Ok(())
  }

  fn check_max(&self, side: Side, arity: Arity, actual: usize) -> Result<(), FlowError> {
    match arity.max {
      Some(max) if actual > max => Err(
        ContractViolation::TooMany {
          segment: self.segment,
          side,
          max,
          actual,
        }
        .into(),
      ),
      _ => Ok(()),
    }
  }

  fn check_min(&self, side: Side, arity: Arity, actual: usize) -> Result<(), FlowError> {
    if actual < arity.min {
      return Err(
        ContractViolation::TooFew {
          segment: self.segment,
          side,
          min: arity.min,
          actual,
        }
        .into(),
      );
    }
    Ok(())
  }

  pub(crate) fn check_inputs(&self, additional: usize) -> Result<(), FlowError> {
    self.check_open()?;
    self.check_max(Side::Inputs, self.input_arity, self.inputs.len() + additional)
  }

  pub(crate) fn check_outputs(&self, additional: usize) -> Result<(), FlowError> {
    self.check_open()?;
    self.check_max(Side::Outputs, self.output_arity, self.outputs.len() + additional)
  }

  pub(crate) fn connect_inputs(&mut self, outlets: Vec<Outlet<I>>) -> Result<(), FlowError> {
    self.check_inputs(outlets.len())?;
    self.inputs.extend(outlets);
    Ok(())
  }

  pub(crate) fn connect_outputs(&mut self, inlets: Vec<Inlet<O>>) -> Result<(), FlowError> {
    self.check_outputs(inlets.len())?;
    self.outputs.extend(inlets);
    Ok(())
  }

  /// Validate the wiring and hand the ports to the segment's tasks
  pub(crate) fn start(&mut self) -> Result<(Vec<Outlet<I>>, Vec<Inlet<O>>), FlowError> {
    self.check_open()?;
    self.check_min(Side::Inputs, self.input_arity, self.inputs.len())?;
    self.check_min(Side::Outputs, self.output_arity, self.outputs.len())?;
    self.flowing = true;
    Ok((std::mem::take(&mut self.inputs), std::mem::take(&mut self.outputs)))
  }
}

// ============================================================================
// Forking Segment Tasks
// ============================================================================

pub(crate) type TaskBody = Box<dyn FnOnce(TaskContext) -> BoxFuture<'static, Result<(), FlowError>> + Send>;

pub(crate) fn body<F, Fut>(f: F) -> TaskBody
where
  F: FnOnce(TaskContext) -> Fut + Send + 'static,
  Fut: Future<Output = Result<(), FlowError>> + Send + 'static,
{
  Box::new(move |ctx| f(ctx).boxed())
}

/// Closes a segment's outputs when its last task exits
struct ExitCloser<T> {
  segment: &'static str,
  remaining: AtomicUsize,
  inlets: Mutex<Vec<Inlet<T>>>,
}

impl<T> ExitCloser<T> {
  fn release(&self) {
    if self.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
      self.close_now();
    }
  }

  fn close_now(&self) {
    let inlets = std::mem::take(&mut *self.inlets.lock().unwrap_or_else(PoisonError::into_inner));
    trace!(segment = self.segment, outputs = inlets.len(), "Closing segment outputs");
    for inlet in inlets {
      inlet.close();
    }
  }
}

/// Fork one task per body, named after the segment, closing `outputs` after
/// the last one exits when the options ask for it.
pub(crate) fn fork_segment<T>(
  group: &TaskGroup,
  segment: &'static str,
  options: FlowOptions,
  outputs: &[Inlet<T>],
  bodies: Vec<TaskBody>,
) where
  T: Send + 'static,
{
  let options = options.or_named(|| segment.to_string());
  let base = options.fork.name().unwrap_or(segment).to_string();
  let count = bodies.len();
  debug!(segment, name = %base, tasks = count, "Starting segment");

  let closer = options.close_inlets_on_exit.then(|| {
    Arc::new(ExitCloser {
      segment,
      remaining: AtomicUsize::new(count),
      inlets: Mutex::new(outputs.to_vec()),
    })
  });

  if count == 0 {
    if let Some(closer) = &closer {
      closer.close_now();
    }
    return;
  }

  for (index, task) in bodies.into_iter().enumerate() {
    let name = if count > 1 { format!("{base}#{index}") } else { base.clone() };
    let mut fork = options.fork.clone().with_name(name);
    if let Some(closer) = &closer {
      let closer = closer.clone();
      fork = fork.defer(move || closer.release());
    }
    if !group.fork(fork, task)
      && let Some(closer) = &closer
    {
      closer.release();
    }
  }
}
