use std::collections::{BTreeMap, HashMap};

use sluice_core::{Address, AddressError};
use tracing::trace;

use super::{Arity, Flow, FlowOptions, Ports, Sink, Source, body, fork_segment};
use crate::{
  error::{ContractViolation, FlowError},
  group::TaskGroup,
  stream::{Inlet, Outlet},
};

/// Index outputs by the address of the segment reading each one
fn route_table<T>(segment: &'static str, outputs: &[Inlet<T>]) -> Result<HashMap<Address, Inlet<T>>, FlowError> {
  outputs
    .iter()
    .map(|inlet| match inlet.outlet_address() {
      Some(address) => Ok((address, inlet.clone())),
      None => Err(FlowError::from(ContractViolation::Unaddressed {
        segment,
        stream: inlet.id(),
      })),
    })
    .collect()
}

fn lookup<'a, T>(routes: &'a HashMap<Address, Inlet<T>>, address: &Address) -> Result<&'a Inlet<T>, FlowError> {
  routes
    .get(address)
    .ok_or_else(|| AddressError::NotFound(address.clone()).into())
}

// ============================================================================
// Switch
// ============================================================================

const SWITCH: &str = "Switch";

/// Route each value to the output leading to the address `resolve` picks.
///
/// Outputs are matched by their stream's outlet address, which routers set.
/// Resolving to an address with no output is fatal.
pub struct Switch<T, R> {
  ports: Ports<T>,
  resolve: Option<R>,
}

impl<T, R> Switch<T, R>
where
  R: FnMut(&T) -> Result<Address, FlowError>,
{
  pub fn new(resolve: R) -> Self {
    Self {
      ports: Ports::new(SWITCH, Arity::exactly(1), Arity::ANY),
      resolve: Some(resolve),
    }
  }
}

impl<T, R> Flow for Switch<T, R>
where
  T: Send + 'static,
  R: FnMut(&T) -> Result<Address, FlowError> + Send + 'static,
{
  fn flow(&mut self, group: &TaskGroup, options: FlowOptions) -> Result<(), FlowError> {
    let (inputs, outputs) = self.ports.start()?;
    let mut resolve = self
      .resolve
      .take()
      .ok_or(ContractViolation::AlreadyFlowing { segment: SWITCH })?;
    let routes = route_table(SWITCH, &outputs)?;

    let tasks = inputs
      .into_iter()
      .next()
      .map(|input| {
        body(move |ctx| async move {
          while let Some(value) = ctx.recv(&input).await? {
            let address = resolve(&value)?;
            trace!(task = ctx.name(), address = %address, "Switching value");
            ctx.send(lookup(&routes, &address)?, value).await?;
          }
          Ok::<_, FlowError>(())
        })
      })
      .into_iter()
      .collect();
    fork_segment(group, SWITCH, options, &outputs, tasks);
    Ok(())
  }

  fn kind(&self) -> &'static str {
    SWITCH
  }
}

impl<T, R> Sink<T> for Switch<T, R>
where
  T: Send + 'static,
  R: FnMut(&T) -> Result<Address, FlowError> + Send + 'static,
{
  fn connect_inputs(&mut self, outlets: Vec<Outlet<T>>) -> Result<(), FlowError> {
    self.ports.connect_inputs(outlets)
  }

  fn check_inputs(&self, additional: usize) -> Result<(), FlowError> {
    self.ports.check_inputs(additional)
  }
}

impl<T, R> Source<T> for Switch<T, R>
where
  T: Send + 'static,
  R: FnMut(&T) -> Result<Address, FlowError> + Send + 'static,
{
  fn connect_outputs(&mut self, inlets: Vec<Inlet<T>>) -> Result<(), FlowError> {
    self.ports.connect_outputs(inlets)
  }

  fn check_outputs(&self, additional: usize) -> Result<(), FlowError> {
    self.ports.check_outputs(additional)
  }
}

// ============================================================================
// BatchSwitch
// ============================================================================

const BATCH_SWITCH: &str = "BatchSwitch";

/// Split each value into per-address parts and route every part.
///
/// Parts are sent in address order. Delivery is not atomic: when a later
/// address is unknown the earlier parts have already been sent.
pub struct BatchSwitch<T, R> {
  ports: Ports<T>,
  split: Option<R>,
}

impl<T, R> BatchSwitch<T, R>
where
  R: FnMut(T) -> Result<BTreeMap<Address, T>, FlowError>,
{
  pub fn new(split: R) -> Self {
    Self {
      ports: Ports::new(BATCH_SWITCH, Arity::exactly(1), Arity::ANY),
      split: Some(split),
    }
  }
}

impl<T, R> Flow for BatchSwitch<T, R>
where
  T: Send + 'static,
  R: FnMut(T) -> Result<BTreeMap<Address, T>, FlowError> + Send + 'static,
{
  fn flow(&mut self, group: &TaskGroup, options: FlowOptions) -> Result<(), FlowError> {
    let (inputs, outputs) = self.ports.start()?;
    let mut split = self
      .split
      .take()
      .ok_or(ContractViolation::AlreadyFlowing { segment: BATCH_SWITCH })?;
    let routes = route_table(BATCH_SWITCH, &outputs)?;

    let tasks = inputs
      .into_iter()
      .next()
      .map(|input| {
        body(move |ctx| async move {
          while let Some(value) = ctx.recv(&input).await? {
            let parts = split(value)?;
            trace!(task = ctx.name(), parts = parts.len(), "Switching batch");
            for (address, part) in parts {
              ctx.send(lookup(&routes, &address)?, part).await?;
            }
          }
          Ok::<_, FlowError>(())
        })
      })
      .into_iter()
      .collect();
    fork_segment(group, BATCH_SWITCH, options, &outputs, tasks);
    Ok(())
  }

  fn kind(&self) -> &'static str {
    BATCH_SWITCH
  }
}

impl<T, R> Sink<T> for BatchSwitch<T, R>
where
  T: Send + 'static,
  R: FnMut(T) -> Result<BTreeMap<Address, T>, FlowError> + Send + 'static,
{
  fn connect_inputs(&mut self, outlets: Vec<Outlet<T>>) -> Result<(), FlowError> {
    self.ports.connect_inputs(outlets)
  }

  fn check_inputs(&self, additional: usize) -> Result<(), FlowError> {
    self.ports.check_inputs(additional)
  }
}

impl<T, R> Source<T> for BatchSwitch<T, R>
where
  T: Send + 'static,
  R: FnMut(T) -> Result<BTreeMap<Address, T>, FlowError> + Send + 'static,
{
  fn connect_outputs(&mut self, inlets: Vec<Inlet<T>>) -> Result<(), FlowError> {
    self.ports.connect_outputs(inlets)
  }

  fn check_outputs(&self, additional: usize) -> Result<(), FlowError> {
    self.ports.check_outputs(additional)
  }
}
