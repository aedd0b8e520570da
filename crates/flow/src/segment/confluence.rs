use super::{Arity, Flow, FlowOptions, Ports, Sink, Source, TaskBody, body, fork_segment};
use crate::{
  error::FlowError,
  group::{TaskContext, TaskGroup},
  stream::{Inlet, Outlet},
};

const KIND: &str = "Confluence";

/// Merge any number of inputs and copy every value to every output.
///
/// One task runs per input, so order is preserved per input but not across
/// inputs. Outputs are written in connection order; a slow output holds back
/// the others.
pub struct Confluence<T> {
  ports: Ports<T>,
}

impl<T> Default for Confluence<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T> Confluence<T> {
  pub fn new() -> Self {
    Self {
      ports: Ports::new(KIND, Arity::ANY, Arity::ANY),
    }
  }
}

async fn broadcast<T: Clone>(ctx: &TaskContext, outputs: &[Inlet<T>], value: T) -> Result<(), FlowError> {
  let Some((last, rest)) = outputs.split_last() else {
    return Ok(());
  };
  for inlet in rest {
    ctx.send(inlet, value.clone()).await?;
  }
  ctx.send(last, value).await
}

impl<T> Flow for Confluence<T>
where
  T: Clone + Send + 'static,
{
  fn flow(&mut self, group: &TaskGroup, options: FlowOptions) -> Result<(), FlowError> {
    let (inputs, outputs) = self.ports.start()?;

    let tasks: Vec<TaskBody> = inputs
      .into_iter()
      .map(|input| {
        let outputs = outputs.clone();
        body(move |ctx| async move {
          while let Some(value) = ctx.recv(&input).await? {
            broadcast(&ctx, &outputs, value).await?;
          }
          Ok::<_, FlowError>(())
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

impl<T> Sink<T> for Confluence<T>
where
  T: Clone + Send + 'static,
{
  fn connect_inputs(&mut self, outlets: Vec<Outlet<T>>) -> Result<(), FlowError> {
    self.ports.connect_inputs(outlets)
  }

  fn check_inputs(&self, additional: usize) -> Result<(), FlowError> {
    self.ports.check_inputs(additional)
  }
}

impl<T> Source<T> for Confluence<T>
where
  T: Clone + Send + 'static,
{
  fn connect_outputs(&mut self, inlets: Vec<Inlet<T>>) -> Result<(), FlowError> {
    self.ports.connect_outputs(inlets)
  }

  fn check_outputs(&self, additional: usize) -> Result<(), FlowError> {
    self.ports.check_outputs(additional)
  }
}
