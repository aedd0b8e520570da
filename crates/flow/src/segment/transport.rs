use std::sync::Arc;

use tracing::debug;

use super::{Arity, Flow, FlowOptions, Ports, Sink, Source, body, fork_segment};
use crate::{
  error::{FlowError, TransportError},
  group::TaskGroup,
  stream::{Inlet, Outlet},
};

/// A bidirectional message channel to something outside the process
/// (a socket, an RPC stream, a queue client).
///
/// `receive` returns [`TransportError::EndOfStream`] once the remote side is
/// done; any other error is a failure.
#[async_trait::async_trait]
pub trait Transport<T: Send>: Send + Sync {
  async fn send(&self, value: T) -> Result<(), TransportError>;
  async fn receive(&self) -> Result<T, TransportError>;
  /// Signal that nothing more will be sent
  async fn close_send(&self) -> Result<(), TransportError>;
}

// ============================================================================
// TransportSender
// ============================================================================

const SENDER: &str = "TransportSender";

/// Sink forwarding every value of its single input over a transport, then
/// closing the sending half when the input ends.
pub struct TransportSender<T, X: ?Sized> {
  ports: Ports<T>,
  transport: Arc<X>,
}

impl<T, X> TransportSender<T, X>
where
  T: Send,
  X: Transport<T> + ?Sized,
{
  pub fn new(transport: Arc<X>) -> Self {
    Self {
      ports: Ports::new(SENDER, Arity::exactly(1), Arity::NONE),
      transport,
    }
  }
}

impl<T, X> Flow for TransportSender<T, X>
where
  T: Send + 'static,
  X: Transport<T> + ?Sized + 'static,
{
  fn flow(&mut self, group: &TaskGroup, options: FlowOptions) -> Result<(), FlowError> {
    let (inputs, outputs) = self.ports.start()?;
    let transport = self.transport.clone();

    let tasks = inputs
      .into_iter()
      .next()
      .map(|input| {
        body(move |ctx| async move {
          while let Some(value) = ctx.recv(&input).await? {
            tokio::select! {
              biased;
              _ = ctx.cancelled() => return Err(ctx.err()),
              sent = transport.send(value) => match sent {
                Ok(()) => {}
                Err(TransportError::EndOfStream) => {
                  debug!(task = ctx.name(), "Transport closed by peer, stopping sender");
                  return Ok(());
                }
                Err(err) => return Err(err.into()),
              },
            }
          }
          tokio::select! {
            biased;
            _ = ctx.cancelled() => Err(ctx.err()),
            closed = transport.close_send() => Ok(closed?),
          }
        })
      })
      .into_iter()
      .collect();
    fork_segment(group, SENDER, options, &outputs, tasks);
    Ok(())
  }

  fn kind(&self) -> &'static str {
    SENDER
  }
}

impl<T, X> Sink<T> for TransportSender<T, X>
where
  T: Send + 'static,
  X: Transport<T> + ?Sized + 'static,
{
  fn connect_inputs(&mut self, outlets: Vec<Outlet<T>>) -> Result<(), FlowError> {
    self.ports.connect_inputs(outlets)
  }

  fn check_inputs(&self, additional: usize) -> Result<(), FlowError> {
    self.ports.check_inputs(additional)
  }
}

// ============================================================================
// TransportReceiver
// ============================================================================

const RECEIVER: &str = "TransportReceiver";

/// Source emitting every value received over a transport until end of stream
pub struct TransportReceiver<T, X: ?Sized> {
  ports: Ports<T>,
  transport: Arc<X>,
}

impl<T, X> TransportReceiver<T, X>
where
  T: Send,
  X: Transport<T> + ?Sized,
{
  pub fn new(transport: Arc<X>) -> Self {
    Self {
      ports: Ports::new(RECEIVER, Arity::NONE, Arity::exactly(1)),
      transport,
    }
  }
}

impl<T, X> Flow for TransportReceiver<T, X>
where
  T: Send + 'static,
  X: Transport<T> + ?Sized + 'static,
{
  fn flow(&mut self, group: &TaskGroup, options: FlowOptions) -> Result<(), FlowError> {
    let (_, outputs) = self.ports.start()?;
    let transport = self.transport.clone();

    let tasks = outputs
      .first()
      .cloned()
      .map(|output| {
        body(move |ctx| async move {
          loop {
            let received = tokio::select! {
              biased;
              _ = ctx.cancelled() => return Err(ctx.err()),
              received = transport.receive() => received,
            };
            match received {
              Ok(value) => ctx.send(&output, value).await?,
              Err(TransportError::EndOfStream) => {
                debug!(task = ctx.name(), "Transport reached end of stream");
                return Ok(());
              }
              Err(err) => return Err(FlowError::from(err)),
            }
          }
        })
      })
      .into_iter()
      .collect();
    fork_segment(group, RECEIVER, options, &outputs, tasks);
    Ok(())
  }

  fn kind(&self) -> &'static str {
    RECEIVER
  }
}

impl<T, X> Source<T> for TransportReceiver<T, X>
where
  T: Send + 'static,
  X: Transport<T> + ?Sized + 'static,
{
  fn connect_outputs(&mut self, inlets: Vec<Inlet<T>>) -> Result<(), FlowError> {
    self.ports.connect_outputs(inlets)
  }

  fn check_outputs(&self, additional: usize) -> Result<(), FlowError> {
    self.ports.check_outputs(additional)
  }
}
