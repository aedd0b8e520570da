//! The handle every forked task runs with.

use std::sync::Arc;

use tokio_util::sync::WaitForCancellationFuture;

use super::TaskGroup;
use crate::{
  error::FlowError,
  stream::{Inlet, Outlet},
};

/// Shared cancellable context of a task group, as seen by one task.
///
/// `recv` and `send` race the group's cancellation, so a task blocked on a
/// stream always wakes once the group is cancelled.
#[derive(Clone)]
pub struct TaskContext {
  group: TaskGroup,
  name: Arc<str>,
}

impl TaskContext {
  pub(crate) fn new(group: TaskGroup, name: &str) -> Self {
    Self {
      group,
      name: Arc::from(name),
    }
  }

  /// Name of the task, as given in its fork options
  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn group(&self) -> &TaskGroup {
    &self.group
  }

  pub fn is_cancelled(&self) -> bool {
    self.group.is_cancelled()
  }

  pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
    self.group.cancelled()
  }

  /// Why the group was cancelled; `Cancelled` if it has not been
  pub fn err(&self) -> FlowError {
    self.group.err().unwrap_or(FlowError::Cancelled)
  }

  /// Receive from `outlet`; `Ok(None)` at end of stream, `Err` on cancellation
  pub async fn recv<T>(&self, outlet: &Outlet<T>) -> Result<Option<T>, FlowError> {
    tokio::select! {
      biased;
      _ = self.cancelled() => Err(self.err()),
      value = outlet.recv() => Ok(value),
    }
  }

  /// Send into `inlet`; sending on a closed stream is fatal.
  ///
  /// On a rendezvous stream the value is enqueued before the hand-off
  /// completes. If cancellation wins after that point this returns the
  /// cancellation error, yet a receiver may still take the value.
  pub async fn send<T>(&self, inlet: &Inlet<T>, value: T) -> Result<(), FlowError> {
    tokio::select! {
      biased;
      _ = self.cancelled() => Err(self.err()),
      sent = inlet.send(value) => sent.map_err(|_| FlowError::Closed { stream: inlet.id() }),
    }
  }

  /// Report a non-fatal error without waiting; dropped if the buffer is full
  pub fn transient(&self, error: FlowError) -> bool {
    self.group.report_transient(error)
  }

  /// Report a non-fatal error, waiting for buffer space until cancellation
  pub async fn transient_wait(&self, error: FlowError) -> bool {
    self.group.report_transient_wait(error).await
  }
}

impl std::fmt::Debug for TaskContext {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("TaskContext").field("name", &self.name).finish()
  }
}
