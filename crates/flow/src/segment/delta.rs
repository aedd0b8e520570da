use std::sync::{
  Arc,
  atomic::{AtomicU64, Ordering},
};

use tracing::trace;

use super::{Arity, Flow, FlowOptions, Ports, Sink, Source, TaskBody, body, fork_segment};
use crate::{
  error::FlowError,
  group::TaskGroup,
  stream::{Inlet, Outlet, TrySendError},
};

const KIND: &str = "Delta";

/// Deliver every value to at most one output: the first, in connection order,
/// that can take it without waiting.
///
/// **A value no output can take right now is dropped.** There is no retry and
/// no backpressure toward the inputs. Drops are counted in
/// [`drop_counter`](Self::drop_counter) and logged at trace level. Use a
/// [`Confluence`](super::Confluence) or a shared stream when every value must
/// arrive.
pub struct Delta<T> {
  ports: Ports<T>,
  dropped: Arc<AtomicU64>,
}

impl<T> Default for Delta<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T> Delta<T> {
  pub fn new() -> Self {
    Self {
      ports: Ports::new(KIND, Arity::ANY, Arity::ANY),
      dropped: Arc::new(AtomicU64::new(0)),
    }
  }

  /// Live count of dropped values, readable after the segment is flowing
  pub fn drop_counter(&self) -> Arc<AtomicU64> {
    self.dropped.clone()
  }

  pub fn dropped(&self) -> u64 {
    self.dropped.load(Ordering::Relaxed)
  }
}

impl<T> Flow for Delta<T>
where
  T: Send + 'static,
{
  fn flow(&mut self, group: &TaskGroup, options: FlowOptions) -> Result<(), FlowError> {
    let (inputs, outputs) = self.ports.start()?;

    let tasks: Vec<TaskBody> = inputs
      .into_iter()
      .map(|input| {
        let outputs = outputs.clone();
        let dropped = self.dropped.clone();
        body(move |ctx| async move {
          'values: while let Some(mut value) = ctx.recv(&input).await? {
            for inlet in &outputs {
              match inlet.try_send(value) {
                Ok(()) => continue 'values,
                Err(TrySendError::Full(returned)) => value = returned,
                Err(TrySendError::Closed(_)) => return Err(FlowError::Closed { stream: inlet.id() }),
              }
            }
            let total = dropped.fetch_add(1, Ordering::Relaxed) + 1;
            trace!(task = ctx.name(), dropped = total, "No output ready, value dropped");
          }
          Ok(())
        })
      })
      .collect();
    fork_segment(group, KIND, options, &outputs, tasks);
    Ok(())
  }

  fn kind(&self) -> &'static str {
    KIND
  }
}

impl<T> Sink<T> for Delta<T>
where
  T: Send + 'static,
{
  fn connect_inputs(&mut self, outlets: Vec<Outlet<T>>) -> Result<(), FlowError> {
    self.ports.connect_inputs(outlets)
  }

  fn check_inputs(&self, additional: usize) -> Result<(), FlowError> {
    self.ports.check_inputs(additional)
  }
}

impl<T> Source<T> for Delta<T>
where
  T: Send + 'static,
{
  fn connect_outputs(&mut self, inlets: Vec<Inlet<T>>) -> Result<(), FlowError> {
    self.ports.connect_outputs(inlets)
  }

  fn check_outputs(&self, additional: usize) -> Result<(), FlowError> {
    self.ports.check_outputs(additional)
  }
}
