use super::{Arity, Flow, FlowOptions, Ports, Sink, Source, body, fork_segment};
use crate::{
  error::{ContractViolation, FlowError},
  group::TaskGroup,
  stream::{Inlet, Outlet},
};

const KIND: &str = "Translator";

/// Convert values of type `I` from one input into values of type `O` on one output
pub struct Translator<I, O, F> {
  ports: Ports<I, O>,
  translate: Option<F>,
}

impl<I, O, F> Translator<I, O, F>
where
  F: FnMut(I) -> Result<O, FlowError>,
{
  pub fn new(translate: F) -> Self {
    Self {
      ports: Ports::new(KIND, Arity::exactly(1), Arity::exactly(1)),
      translate: Some(translate),
    }
  }
}

impl<I, O, F> Flow for Translator<I, O, F>
where
  I: Send + 'static,
  O: Send + 'static,
  F: FnMut(I) -> Result<O, FlowError> + Send + 'static,
{
  fn flow(&mut self, group: &TaskGroup, options: FlowOptions) -> Result<(), FlowError> {
    let (inputs, outputs) = self.ports.start()?;
    let mut translate = self
      .translate
      .take()
      .ok_or(ContractViolation::AlreadyFlowing { segment: KIND })?;

    let tasks = inputs
      .into_iter()
      .next()
      .zip(outputs.first().cloned())
      .map(|(input, output)| {
        body(move |ctx| async move {
          while let Some(value) = ctx.recv(&input).await? {
            ctx.send(&output, translate(value)?).await?;
          }
          Ok::<_, FlowError>(())
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

impl<I, O, F> Sink<I> for Translator<I, O, F>
where
  I: Send + 'static,
  O: Send + 'static,
  F: FnMut(I) -> Result<O, FlowError> + Send + 'static,
{
  fn connect_inputs(&mut self, outlets: Vec<Outlet<I>>) -> Result<(), FlowError> {
    self.ports.connect_inputs(outlets)
  }

  fn check_inputs(&self, additional: usize) -> Result<(), FlowError> {
    self.ports.check_inputs(additional)
  }
}

impl<I, O, F> Source<O> for Translator<I, O, F>
where
  I: Send + 'static,
  O: Send + 'static,
  F: FnMut(I) -> Result<O, FlowError> + Send + 'static,
{
  fn connect_outputs(&mut self, inlets: Vec<Inlet<O>>) -> Result<(), FlowError> {
    self.ports.connect_outputs(inlets)
  }

  fn check_outputs(&self, additional: usize) -> Result<(), FlowError> {
    self.ports.check_outputs(additional)
  }
}
