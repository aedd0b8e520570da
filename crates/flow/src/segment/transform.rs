use tracing::trace;

use super::{Arity, Flow, FlowOptions, Ports, Sink, Source, body, fork_segment};
use crate::{
  error::{ContractViolation, FlowError},
  group::TaskGroup,
  stream::{Inlet, Outlet},
};

/// Wire-level plumbing shared by the 1-to-1 segments in this file
macro_rules! ports_impl {
  ($segment:ident < $($param:ident),+ > where $($bound:tt)+) => {
    impl<$($param),+> Sink<T> for $segment<$($param),+>
    where
      $($bound)+
    {
      fn connect_inputs(&mut self, outlets: Vec<Outlet<T>>) -> Result<(), FlowError> {
        self.ports.connect_inputs(outlets)
      }

      fn check_inputs(&self, additional: usize) -> Result<(), FlowError> {
        self.ports.check_inputs(additional)
      }
    }

    impl<$($param),+> Source<T> for $segment<$($param),+>
    where
      $($bound)+
    {
      fn connect_outputs(&mut self, inlets: Vec<Inlet<T>>) -> Result<(), FlowError> {
        self.ports.connect_outputs(inlets)
      }

      fn check_outputs(&self, additional: usize) -> Result<(), FlowError> {
        self.ports.check_outputs(additional)
      }
    }
  };
}

// ============================================================================
// LinearTransform
// ============================================================================

const LINEAR: &str = "LinearTransform";

/// Map every value of one input onto one output
pub struct LinearTransform<T, F> {
  ports: Ports<T>,
  map: Option<F>,
}

impl<T, F> LinearTransform<T, F>
where
  F: FnMut(T) -> Result<T, FlowError>,
{
  pub fn new(map: F) -> Self {
    Self {
      ports: Ports::new(LINEAR, Arity::exactly(1), Arity::exactly(1)),
      map: Some(map),
    }
  }
}

impl<T, F> Flow for LinearTransform<T, F>
where
  T: Send + 'static,
  F: FnMut(T) -> Result<T, FlowError> + Send + 'static,
{
  fn flow(&mut self, group: &TaskGroup, options: FlowOptions) -> Result<(), FlowError> {
    let (inputs, outputs) = self.ports.start()?;
    let mut map = self
      .map
      .take()
      .ok_or(ContractViolation::AlreadyFlowing { segment: LINEAR })?;

    let tasks = inputs
      .into_iter()
      .next()
      .zip(outputs.first().cloned())
      .map(|(input, output)| {
        body(move |ctx| async move {
          while let Some(value) = ctx.recv(&input).await? {
            ctx.send(&output, map(value)?).await?;
          }
          Ok::<_, FlowError>(())
        })
      })
      .into_iter()
      .collect();
    fork_segment(group, LINEAR, options, &outputs, tasks);
    Ok(())
  }

  fn kind(&self) -> &'static str {
    LINEAR
  }
}

ports_impl!(LinearTransform<T, F> where T: Send + 'static, F: FnMut(T) -> Result<T, FlowError> + Send + 'static);

// ============================================================================
// Transform
// ============================================================================

const TRANSFORM: &str = "Transform";

/// Map values of one input onto one output, dropping those mapped to `None`
pub struct Transform<T, F> {
  ports: Ports<T>,
  map: Option<F>,
}

impl<T, F> Transform<T, F>
where
  F: FnMut(T) -> Result<Option<T>, FlowError>,
{
  pub fn new(map: F) -> Self {
    Self {
      ports: Ports::new(TRANSFORM, Arity::exactly(1), Arity::exactly(1)),
      map: Some(map),
    }
  }
}

impl<T, F> Flow for Transform<T, F>
where
  T: Send + 'static,
  F: FnMut(T) -> Result<Option<T>, FlowError> + Send + 'static,
{
  fn flow(&mut self, group: &TaskGroup, options: FlowOptions) -> Result<(), FlowError> {
    let (inputs, outputs) = self.ports.start()?;
    let mut map = self
      .map
      .take()
      .ok_or(ContractViolation::AlreadyFlowing { segment: TRANSFORM })?;

    let tasks = inputs
      .into_iter()
      .next()
      .zip(outputs.first().cloned())
      .map(|(input, output)| {
        body(move |ctx| async move {
          while let Some(value) = ctx.recv(&input).await? {
            match map(value)? {
              Some(mapped) => ctx.send(&output, mapped).await?,
              None => trace!(task = ctx.name(), "Value dropped by transform"),
            }
          }
          Ok::<_, FlowError>(())
        })
      })
      .into_iter()
      .collect();
    fork_segment(group, TRANSFORM, options, &outputs, tasks);
    Ok(())
  }

  fn kind(&self) -> &'static str {
    TRANSFORM
  }
}

ports_impl!(Transform<T, F> where T: Send + 'static, F: FnMut(T) -> Result<Option<T>, FlowError> + Send + 'static);

// ============================================================================
// Filter
// ============================================================================

const FILTER: &str = "Filter";

/// Pass values matching a predicate to the first output.
///
/// Rejected values go to the second output when one is connected and are
/// dropped otherwise.
pub struct Filter<T, P> {
  ports: Ports<T>,
  predicate: Option<P>,
}

impl<T, P> Filter<T, P>
where
  P: FnMut(&T) -> bool,
{
  pub fn new(predicate: P) -> Self {
    Self {
      ports: Ports::new(FILTER, Arity::exactly(1), Arity::between(1, 2)),
      predicate: Some(predicate),
    }
  }
}

impl<T, P> Flow for Filter<T, P>
where
  T: Send + 'static,
  P: FnMut(&T) -> bool + Send + 'static,
{
  fn flow(&mut self, group: &TaskGroup, options: FlowOptions) -> Result<(), FlowError> {
    let (inputs, outputs) = self.ports.start()?;
    let mut predicate = self
      .predicate
      .take()
      .ok_or(ContractViolation::AlreadyFlowing { segment: FILTER })?;
    let rejects = outputs.get(1).cloned();

    let tasks = inputs
      .into_iter()
      .next()
      .zip(outputs.first().cloned())
      .map(|(input, accepted)| {
        body(move |ctx| async move {
          while let Some(value) = ctx.recv(&input).await? {
            if predicate(&value) {
              ctx.send(&accepted, value).await?;
            } else if let Some(rejects) = &rejects {
              ctx.send(rejects, value).await?;
            } else {
              trace!(task = ctx.name(), "Value rejected by filter");
            }
          }
          Ok::<_, FlowError>(())
        })
      })
      .into_iter()
      .collect();
    fork_segment(group, FILTER, options, &outputs, tasks);
    Ok(())
  }

  fn kind(&self) -> &'static str {
    FILTER
  }
}

ports_impl!(Filter<T, P> where T: Send + 'static, P: FnMut(&T) -> bool + Send + 'static);
