//! Resizable, reference-counted stream for multi-producer fan-in.

use std::ops::Deref;

use tracing::debug;

use super::Stream;

/// A [`Stream`] whose capacity can change at runtime and whose close is
/// reference counted.
///
/// Producers sharing the stream each [`acquire`](Self::acquire) it and call
/// [`close`](Stream::close) (directly or through their inlet) when done. The
/// underlying queue is closed exactly once, when the counter reaches zero or
/// below; later calls are no-ops.
///
/// ```ignore
/// let merged = ElasticStream::<u64>::new(8);
/// merged.acquire(2);
/// merged.close(); // one producer left
/// merged.close(); // closes
/// merged.close(); // no-op
/// ```
pub struct ElasticStream<T> {
  stream: Stream<T>,
}

impl<T> Clone for ElasticStream<T> {
  fn clone(&self) -> Self {
    Self {
      stream: self.stream.clone(),
    }
  }
}

impl<T> ElasticStream<T> {
  pub fn new(capacity: usize) -> Self {
    Self {
      stream: Stream::elastic(capacity),
    }
  }

  /// Change capacity. Takes effect immediately: blocked senders proceed if it
  /// grew, and if it shrank below the current length senders wait for the
  /// surplus to drain.
  pub fn resize(&self, capacity: usize) {
    debug!(stream = self.stream.id(), capacity, "Resizing elastic stream");
    self.stream.shared.queue.resize(capacity);
  }

  /// Register `producers` additional producers that must each close
  pub fn acquire(&self, producers: usize) {
    self.stream.acquire(producers);
  }

  /// The plain stream handle, e.g. for a route table
  pub fn stream(&self) -> &Stream<T> {
    &self.stream
  }

  pub fn into_stream(self) -> Stream<T> {
    self.stream
  }
}

impl<T> Deref for ElasticStream<T> {
  type Target = Stream<T>;

  fn deref(&self) -> &Self::Target {
    &self.stream
  }
}

impl<T> std::fmt::Debug for ElasticStream<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_tuple("ElasticStream").field(&self.stream).finish()
  }
}
