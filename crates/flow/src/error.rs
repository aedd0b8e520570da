//! Error types shared by task groups, streams and segments.

use std::{fmt, sync::Arc};

use sluice_core::{Address, AddressError};

/// Boxed error accepted from user code
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Shared user error, cheap to clone across waiters
pub type SharedError = Arc<dyn std::error::Error + Send + Sync + 'static>;

// ============================================================================
// Flow Errors
// ============================================================================

/// Terminal error of a task, and the error type of every wiring call.
///
/// Any `Err` returned from a forked task is fatal and cancels its group.
/// [`FlowError::Cancelled`] and [`FlowError::DeadlineExceeded`] are what a task
/// reports after observing the group's cancellation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FlowError {
  #[error("Context cancelled")]
  Cancelled,
  #[error("Context deadline exceeded")]
  DeadlineExceeded,
  #[error(transparent)]
  Address(#[from] AddressError),
  #[error("Segment at {address} cannot act as a {role}")]
  WrongRole { address: Address, role: Role },
  #[error(transparent)]
  Contract(#[from] ContractViolation),
  #[error("Stream {stream} is closed")]
  Closed { stream: u64 },
  #[error("Transport error: {0}")]
  Transport(#[from] TransportError),
  #[error("Task panicked: {0}")]
  Panicked(String),
  #[error("{0}")]
  Task(SharedError),
}

impl FlowError {
  /// Wrap an arbitrary user error as a fatal task error
  pub fn task<E>(error: E) -> Self
  where
    E: Into<BoxError>,
  {
    Self::Task(Arc::from(error.into()))
  }

  /// Fatal task error carrying only a message
  pub fn msg(message: impl Into<String>) -> Self {
    let message: String = message.into();
    Self::task(message)
  }

  /// True for the errors a task reports after observing cancellation
  pub fn is_cancellation(&self) -> bool {
    matches!(self, Self::Cancelled | Self::DeadlineExceeded)
  }

  /// Ranking used when several tasks report: real failures outrank the
  /// cancellation they trigger.
  pub(crate) fn significance(&self) -> u8 {
    if self.is_cancellation() { 1 } else { 2 }
  }
}

// ============================================================================
// Contract Violations
// ============================================================================

/// Which side of a segment a port belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
  Inputs,
  Outputs,
}

impl fmt::Display for Side {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Side::Inputs => f.write_str("inputs"),
      Side::Outputs => f.write_str("outputs"),
    }
  }
}

/// Role a registered segment is looked up in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
  Source,
  Sink,
}

impl fmt::Display for Role {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Role::Source => f.write_str("source"),
      Role::Sink => f.write_str("sink"),
    }
  }
}

/// Programmer errors in wiring or driving segments.
///
/// These are returned immediately by the call that commits them and never
/// leave a segment half-wired.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContractViolation {
  #[error("{segment} accepts at most {max} {side}, got {actual}")]
  TooMany {
    segment: &'static str,
    side: Side,
    max: usize,
    actual: usize,
  },
  #[error("{segment} requires at least {min} {side}, got {actual}")]
  TooFew {
    segment: &'static str,
    side: Side,
    min: usize,
    actual: usize,
  },
  #[error("{segment} is already flowing")]
  AlreadyFlowing { segment: &'static str },
  #[error("Pipeline {pipeline} is sealed and cannot be rewired")]
  Sealed { pipeline: Address },
  #[error("{segment} output on stream {stream} has no destination address")]
  Unaddressed { segment: &'static str, stream: u64 },
}

// ============================================================================
// Transport Errors
// ============================================================================

/// Errors returned by a [`Transport`](crate::segment::Transport)
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
  /// Graceful end of the remote stream; not a failure
  #[error("End of stream")]
  EndOfStream,
  #[error("{0}")]
  Failed(SharedError),
}

impl TransportError {
  pub fn failed<E>(error: E) -> Self
  where
    E: Into<BoxError>,
  {
    Self::Failed(Arc::from(error.into()))
  }
}
