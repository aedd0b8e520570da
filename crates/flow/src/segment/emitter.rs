use std::{ops::ControlFlow, time::Duration};

use sluice_core::EmitterConfig;

use super::{Arity, Flow, FlowOptions, Ports, Source, body, fork_segment};
use crate::{
  error::{ContractViolation, FlowError},
  group::{TaskGroup, tick},
  stream::Inlet,
};

const KIND: &str = "Emitter";

/// Source producing a value on every tick of a fixed interval.
///
/// `emit` returning `Ok(None)` ends emission cleanly; an error is fatal.
pub struct Emitter<T, F> {
  ports: Ports<T>,
  period: Duration,
  emit: Option<F>,
}

impl<T, F> Emitter<T, F>
where
  F: FnMut() -> Result<Option<T>, FlowError>,
{
  pub fn new(period: Duration, emit: F) -> Self {
    Self {
      ports: Ports::new(KIND, Arity::NONE, Arity::exactly(1)),
      period,
      emit: Some(emit),
    }
  }

  pub fn with_config(config: &EmitterConfig, emit: F) -> Self {
    Self::new(Duration::from_millis(config.interval_ms), emit)
  }

  pub fn period(&self) -> Duration {
    self.period
  }
}

impl<T, F> Flow for Emitter<T, F>
where
  T: Send + 'static,
  F: FnMut() -> Result<Option<T>, FlowError> + Send + 'static,
{
  fn flow(&mut self, group: &TaskGroup, options: FlowOptions) -> Result<(), FlowError> {
    let (_, outputs) = self.ports.start()?;
    let mut emit = self
      .emit
      .take()
      .ok_or(ContractViolation::AlreadyFlowing { segment: KIND })?;
    let period = self.period;

    let tasks = outputs
      .first()
      .cloned()
      .map(|output| {
        body(move |ctx| async move {
          let sender = ctx.clone();
          tick(ctx, period, move || {
            let next = emit();
            let ctx = sender.clone();
            let output = output.clone();
            async move {
              match next? {
                Some(value) => {
                  ctx.send(&output, value).await?;
                  Ok::<_, FlowError>(ControlFlow::Continue(()))
                }
                None => Ok(ControlFlow::Break(())),
              }
            }
          })
          .await
        })
      })
      .into_iter()
      .collect();
    fork_segment(group, KIND, options, &outputs, tasks);
    Ok(())
  }

  fn kind(&self) -> &'static str {
    KIND
  }
}

impl<T, F> Source<T> for Emitter<T, F>
where
  T: Send + 'static,
  F: FnMut() -> Result<Option<T>, FlowError> + Send + 'static,
{
  fn connect_outputs(&mut self, inlets: Vec<Inlet<T>>) -> Result<(), FlowError> {
    self.ports.connect_outputs(inlets)
  }

  fn check_outputs(&self, additional: usize) -> Result<(), FlowError> {
    self.ports.check_outputs(additional)
  }
}
