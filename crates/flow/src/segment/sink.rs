use std::future::Future;

use super::{Arity, Flow, FlowOptions, Ports, Sink, body, fork_segment};
use crate::{
  error::{ContractViolation, FlowError},
  group::{TaskGroup, range},
  stream::Outlet,
};

const KIND: &str = "UnarySink";

/// Terminal segment calling an async function for every value of its single input
pub struct UnarySink<T, F> {
  ports: Ports<T>,
  func: Option<F>,
}

impl<T, F, Fut> UnarySink<T, F>
where
  F: FnMut(T) -> Fut,
  Fut: Future<Output = Result<(), FlowError>>,
{
  pub fn new(func: F) -> Self {
    Self {
      ports: Ports::new(KIND, Arity::exactly(1), Arity::NONE),
      func: Some(func),
    }
  }
}

impl<T, F, Fut> Flow for UnarySink<T, F>
where
  T: Send + 'static,
  F: FnMut(T) -> Fut + Send + 'static,
  Fut: Future<Output = Result<(), FlowError>> + Send + 'static,
{
  fn flow(&mut self, group: &TaskGroup, options: FlowOptions) -> Result<(), FlowError> {
    let (inputs, outputs) = self.ports.start()?;
    let func = self
      .func
      .take()
      .ok_or(ContractViolation::AlreadyFlowing { segment: KIND })?;
    let tasks = inputs
      .into_iter()
      .next()
      .map(|input| body(move |ctx| range(ctx, input, func)))
      .into_iter()
      .collect();
    fork_segment(group, KIND, options, &outputs, tasks);
    Ok(())
  }

  fn kind(&self) -> &'static str {
    KIND
  }
}

impl<T, F, Fut> Sink<T> for UnarySink<T, F>
where
  T: Send + 'static,
  F: FnMut(T) -> Fut + Send + 'static,
  Fut: Future<Output = Result<(), FlowError>> + Send + 'static,
{
  fn connect_inputs(&mut self, outlets: Vec<Outlet<T>>) -> Result<(), FlowError> {
    self.ports.connect_inputs(outlets)
  }

  fn check_inputs(&self, additional: usize) -> Result<(), FlowError> {
    self.ports.check_inputs(additional)
  }
}
