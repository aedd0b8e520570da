//! Shared helpers for task group tests.

use std::time::Duration;

use crate::{error::FlowError, group::TaskContext};

/// Poll `condition` every few milliseconds until it holds or `timeout` elapses
pub async fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
  let deadline = tokio::time::Instant::now() + timeout;
  while tokio::time::Instant::now() < deadline {
    if condition() {
      return true;
    }
    tokio::time::sleep(Duration::from_millis(5)).await;
  }
  condition()
}

/// Task body that parks until the group is cancelled and reports the cause
pub async fn until_cancelled(ctx: TaskContext) -> Result<(), FlowError> {
  ctx.cancelled().await;
  Err(ctx.err())
}

/// Task body failing straight away
pub async fn fail_now(ctx: TaskContext) -> Result<(), FlowError> {
  Err(FlowError::msg(format!("{} failed", ctx.name())))
}
