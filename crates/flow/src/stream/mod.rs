//! Addressable, bounded streams between segments
//!
//! A [`Stream`] is a FIFO conduit split into a send-only [`Inlet`] and a
//! receive-only [`Outlet`]. Both capabilities are cheap to clone, so one
//! stream can be shared by several producers (fan-in) or several consumers
//! (fan-out, where consumers compete for values).
//!
//! ```text
//! source ──Inlet──▶ [ stream (capacity) ] ──Outlet──▶ sink
//! ```
//!
//! Capacity 0 gives a rendezvous stream: `send` completes only once a receiver
//! has taken the value. Capacity > 0 buffers and blocks senders only when full.
//!
//! The inlet/outlet addresses are metadata for diagnostics and address-based
//! routing (see [`Switch`](crate::segment::Switch)); they never affect delivery.
//!
//! Closing ends the stream for receivers once the buffer drains. Sending after
//! close is a producer bug and fails with [`SendError`]. An
//! [`ElasticStream`] closes only after every acquired producer has closed.

mod elastic;
mod queue;


use std::{
  fmt,
  sync::{
    Arc, Once, PoisonError, RwLock,
    atomic::{AtomicI64, AtomicU64, Ordering},
  },
};

use sluice_core::Address;
use tracing::trace;

pub use self::elastic::ElasticStream;
use self::queue::Queue;

static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(1);

// ============================================================================
// Errors
// ============================================================================

/// The stream was closed; the unsent value is returned
#[derive(Debug, PartialEq, Eq)]
pub struct SendError<T>(pub T);

impl<T> fmt::Display for SendError<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("sending on a closed stream")
  }
}

impl<T: fmt::Debug> std::error::Error for SendError<T> {}

/// Failure of a non-blocking send; the value is returned
#[derive(Debug, PartialEq, Eq)]
pub enum TrySendError<T> {
  /// No capacity right now (or no receiver waiting on a rendezvous stream)
  Full(T),
  Closed(T),
}

impl<T> TrySendError<T> {
  pub fn into_inner(self) -> T {
    match self {
      Self::Full(value) | Self::Closed(value) => value,
    }
  }

  pub fn is_full(&self) -> bool {
    matches!(self, Self::Full(_))
  }
}

impl<T> fmt::Display for TrySendError<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Full(_) => f.write_str("stream is full"),
      Self::Closed(_) => f.write_str("sending on a closed stream"),
    }
  }
}

impl<T: fmt::Debug> std::error::Error for TrySendError<T> {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TryRecvError {
  #[error("stream is empty")]
  Empty,
  #[error("stream is closed")]
  Closed,
}

// ============================================================================
// Shared State
// ============================================================================

struct Shared<T> {
  id: u64,
  queue: Queue<T>,
  inlet_address: RwLock<Option<Address>>,
  outlet_address: RwLock<Option<Address>>,
  /// Outstanding producers; present only for elastic streams
  refs: Option<AtomicI64>,
  close_once: Once,
}

impl<T> Shared<T> {
  fn new(capacity: usize, elastic: bool) -> Self {
    Self {
      id: NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed),
      queue: Queue::new(capacity),
      inlet_address: RwLock::new(None),
      outlet_address: RwLock::new(None),
      refs: elastic.then(|| AtomicI64::new(0)),
      close_once: Once::new(),
    }
  }

  /// Release one producer and close when none remain. Returns true only for
  /// the call that actually closed the queue.
  fn close(&self) -> bool {
    if let Some(refs) = &self.refs {
      let remaining = refs.fetch_sub(1, Ordering::AcqRel) - 1;
      if remaining > 0 {
        trace!(stream = self.id, remaining, "Stream released");
        return false;
      }
    }

    let mut closed_now = false;
    self.close_once.call_once(|| {
      self.queue.close();
      closed_now = true;
    });
    if closed_now {
      trace!(stream = self.id, "Stream closed");
    }
    closed_now
  }

  fn acquire(&self, producers: usize) -> bool {
    match &self.refs {
      Some(refs) => {
        let producers = i64::try_from(producers).unwrap_or(i64::MAX);
        refs.fetch_add(producers, Ordering::AcqRel);
        true
      }
      None => false,
    }
  }

  fn read_address(slot: &RwLock<Option<Address>>) -> Option<Address> {
    slot.read().unwrap_or_else(PoisonError::into_inner).clone()
  }

  fn write_address(slot: &RwLock<Option<Address>>, address: Address) {
    *slot.write().unwrap_or_else(PoisonError::into_inner) = Some(address);
  }
}

// ============================================================================
// Stream
// ============================================================================

/// A bounded, addressable conduit of values.
///
/// Cloning yields another handle to the same stream.
pub struct Stream<T> {
  shared: Arc<Shared<T>>,
}

impl<T> Clone for Stream<T> {
  fn clone(&self) -> Self {
    Self {
      shared: self.shared.clone(),
    }
  }
}

impl<T> Stream<T> {
  /// Create a stream. Capacity 0 makes a rendezvous stream.
  pub fn new(capacity: usize) -> Self {
    Self {
      shared: Arc::new(Shared::new(capacity, false)),
    }
  }

  fn elastic(capacity: usize) -> Self {
    Self {
      shared: Arc::new(Shared::new(capacity, true)),
    }
  }

  /// Process-unique identifier, used in logs and route tables
  pub fn id(&self) -> u64 {
    self.shared.id
  }

  /// Send-only capability
  pub fn inlet(&self) -> Inlet<T> {
    Inlet {
      shared: self.shared.clone(),
    }
  }

  /// Receive-only capability
  pub fn outlet(&self) -> Outlet<T> {
    Outlet {
      shared: self.shared.clone(),
    }
  }

  pub fn set_inlet_address(&self, address: impl Into<Address>) {
    Shared::<T>::write_address(&self.shared.inlet_address, address.into());
  }

  pub fn set_outlet_address(&self, address: impl Into<Address>) {
    Shared::<T>::write_address(&self.shared.outlet_address, address.into());
  }

  /// Address of the segment writing into this stream
  pub fn inlet_address(&self) -> Option<Address> {
    Shared::<T>::read_address(&self.shared.inlet_address)
  }

  /// Address of the segment reading from this stream
  pub fn outlet_address(&self) -> Option<Address> {
    Shared::<T>::read_address(&self.shared.outlet_address)
  }

  /// Close the stream (for elastic streams: release one producer).
  /// Returns true when this call closed the underlying queue.
  pub fn close(&self) -> bool {
    self.shared.close()
  }

  pub fn len(&self) -> usize {
    self.shared.queue.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn capacity(&self) -> usize {
    self.shared.queue.capacity()
  }

  pub fn is_closed(&self) -> bool {
    self.shared.queue.is_closed()
  }

  /// True when closing is reference counted
  pub fn is_elastic(&self) -> bool {
    self.shared.refs.is_some()
  }

  /// True when both handles refer to the same stream
  pub fn same_stream(&self, other: &Stream<T>) -> bool {
    Arc::ptr_eq(&self.shared, &other.shared)
  }

  /// Register producers on an elastic stream; ignored for fixed streams
  pub(crate) fn acquire(&self, producers: usize) -> bool {
    self.shared.acquire(producers)
  }
}

impl<T> fmt::Debug for Stream<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Stream")
      .field("id", &self.id())
      .field("capacity", &self.capacity())
      .field("inlet_address", &self.inlet_address())
      .field("outlet_address", &self.outlet_address())
      .field("elastic", &self.is_elastic())
      .finish()
  }
}

// ============================================================================
// Inlet
// ============================================================================

/// Send-only capability of a [`Stream`]
pub struct Inlet<T> {
  shared: Arc<Shared<T>>,
}

impl<T> Clone for Inlet<T> {
  fn clone(&self) -> Self {
    Self {
      shared: self.shared.clone(),
    }
  }
}

impl<T> Inlet<T> {
  /// Send a value, waiting while the stream is full.
  ///
  /// On a rendezvous stream this also waits for a receiver to take the value.
  /// Dropping the future during that wait leaves the value enqueued.
  pub async fn send(&self, value: T) -> Result<(), SendError<T>> {
    self.shared.queue.push(value).await.map_err(SendError)
  }

  /// Send only if the stream can take the value right now
  pub fn try_send(&self, value: T) -> Result<(), TrySendError<T>> {
    self.shared.queue.try_push(value)
  }

  /// Close the stream this inlet feeds (refcounted for elastic streams)
  pub fn close(&self) -> bool {
    self.shared.close()
  }

  pub fn id(&self) -> u64 {
    self.shared.id
  }

  pub fn inlet_address(&self) -> Option<Address> {
    Shared::<T>::read_address(&self.shared.inlet_address)
  }

  pub fn outlet_address(&self) -> Option<Address> {
    Shared::<T>::read_address(&self.shared.outlet_address)
  }

  pub fn is_closed(&self) -> bool {
    self.shared.queue.is_closed()
  }

  pub fn len(&self) -> usize {
    self.shared.queue.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl<T> fmt::Debug for Inlet<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Inlet").field("stream", &self.id()).finish()
  }
}

// ============================================================================
// Outlet
// ============================================================================

/// Receive-only capability of a [`Stream`]
pub struct Outlet<T> {
  shared: Arc<Shared<T>>,
}

impl<T> Clone for Outlet<T> {
  fn clone(&self) -> Self {
    Self {
      shared: self.shared.clone(),
    }
  }
}

impl<T> Outlet<T> {
  /// Receive the next value; `None` once the stream is closed and drained
  pub async fn recv(&self) -> Option<T> {
    self.shared.queue.pop().await
  }

  pub fn try_recv(&self) -> Result<T, TryRecvError> {
    self.shared.queue.try_pop()
  }

  pub fn id(&self) -> u64 {
    self.shared.id
  }

  pub fn inlet_address(&self) -> Option<Address> {
    Shared::<T>::read_address(&self.shared.inlet_address)
  }

  pub fn outlet_address(&self) -> Option<Address> {
    Shared::<T>::read_address(&self.shared.outlet_address)
  }

  pub fn is_closed(&self) -> bool {
    self.shared.queue.is_closed()
  }

  pub fn len(&self) -> usize {
    self.shared.queue.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl<T> fmt::Debug for Outlet<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Outlet").field("stream", &self.id()).finish()
  }
}
