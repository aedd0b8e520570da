//! Bounded FIFO queue behind every stream.
//!
//! A `VecDeque` ring buffer under a short-lived `std::sync::Mutex`, with
//! `Notify` wakeups for blocked senders and receivers. Capacity 0 is a
//! rendezvous: one value may be in flight and its sender waits until a
//! receiver has taken it.

use std::{
  collections::VecDeque,
  sync::{Mutex, MutexGuard, PoisonError},
};

use tokio::sync::Notify;

use super::{TryRecvError, TrySendError};

struct State<T> {
  buf: VecDeque<T>,
  capacity: usize,
  closed: bool,
  pushed: u64,
  popped: u64,
  /// Receivers currently parked in `pop`
  waiting_receivers: usize,
}

impl<T> State<T> {
  /// Values that may sit in the buffer before `push` blocks
  fn slots(&self) -> usize {
    self.capacity.max(1)
  }
}

pub(crate) struct Queue<T> {
  state: Mutex<State<T>>,
  readable: Notify,
  writable: Notify,
  consumed: Notify,
}

impl<T> Queue<T> {
  pub(crate) fn new(capacity: usize) -> Self {
    Self {
      state: Mutex::new(State {
        buf: VecDeque::with_capacity(capacity),
        capacity,
        closed: false,
        pushed: 0,
        popped: 0,
        waiting_receivers: 0,
      }),
      readable: Notify::new(),
      writable: Notify::new(),
      consumed: Notify::new(),
    }
  }

  fn lock(&self) -> MutexGuard<'_, State<T>> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Push a value, waiting for space. Returns the value if the queue is closed.
  pub(crate) async fn push(&self, value: T) -> Result<(), T> {
    let ticket = loop {
      let notified = self.writable.notified();
      tokio::pin!(notified);
      notified.as_mut().enable();

      {
        let mut state = self.lock();
        if state.closed {
          return Err(value);
        }
        if state.buf.len() < state.slots() {
          state.buf.push_back(value);
          state.pushed += 1;
          let ticket = state.pushed;
          let rendezvous = state.capacity == 0;
          drop(state);

          self.readable.notify_waiters();
          if !rendezvous {
            return Ok(());
          }
          break ticket;
        }
      }

      notified.await;
    };

    // Rendezvous: wait for the hand-off to complete
    loop {
      let notified = self.consumed.notified();
      tokio::pin!(notified);
      notified.as_mut().enable();

      {
        let state = self.lock();
        if state.popped >= ticket || state.closed {
          return Ok(());
        }
      }

      notified.await;
    }
  }

  /// Push without waiting.
  ///
  /// A rendezvous queue only accepts a value when a receiver is parked and
  /// nothing else is already in flight for it.
  pub(crate) fn try_push(&self, value: T) -> Result<(), TrySendError<T>> {
    let mut state = self.lock();
    if state.closed {
      return Err(TrySendError::Closed(value));
    }

    let ready = if state.capacity == 0 {
      state.buf.len() < state.waiting_receivers
    } else {
      state.buf.len() < state.capacity
    };
    if !ready {
      return Err(TrySendError::Full(value));
    }

    state.buf.push_back(value);
    state.pushed += 1;
    drop(state);

    self.readable.notify_waiters();
    Ok(())
  }

  /// Pop the next value, waiting until one arrives. `None` once closed and drained.
  pub(crate) async fn pop(&self) -> Option<T> {
    loop {
      let notified = self.readable.notified();
      tokio::pin!(notified);
      notified.as_mut().enable();

      {
        let mut state = self.lock();
        if let Some(value) = state.buf.pop_front() {
          state.popped += 1;
          drop(state);
          self.writable.notify_waiters();
          self.consumed.notify_waiters();
          return Some(value);
        }
        if state.closed {
          return None;
        }
        state.waiting_receivers += 1;
      }

      let parked = Parked { queue: self };
      notified.await;
      drop(parked);
    }
  }

  pub(crate) fn try_pop(&self) -> Result<T, TryRecvError> {
    let mut state = self.lock();
    match state.buf.pop_front() {
      Some(value) => {
        state.popped += 1;
        drop(state);
        self.writable.notify_waiters();
        self.consumed.notify_waiters();
        Ok(value)
      }
      None if state.closed => Err(TryRecvError::Closed),
      None => Err(TryRecvError::Empty),
    }
  }

  /// Close the queue. Buffered values remain receivable.
  pub(crate) fn close(&self) {
    self.lock().closed = true;
    self.readable.notify_waiters();
    self.writable.notify_waiters();
    self.consumed.notify_waiters();
  }

  /// Change capacity in place. Growing wakes blocked senders; shrinking lets
  /// the surplus drain before senders proceed.
  pub(crate) fn resize(&self, capacity: usize) {
    self.lock().capacity = capacity;
    self.writable.notify_waiters();
  }

  pub(crate) fn len(&self) -> usize {
    self.lock().buf.len()
  }

  pub(crate) fn capacity(&self) -> usize {
    self.lock().capacity
  }

  pub(crate) fn is_closed(&self) -> bool {
    self.lock().closed
  }
}

/// Keeps `waiting_receivers` accurate when a parked `pop` is woken or dropped
struct Parked<'a, T> {
  queue: &'a Queue<T>,
}

impl<T> Drop for Parked<'_, T> {
  fn drop(&mut self) {
    let mut state = self.queue.lock();
    state.waiting_receivers = state.waiting_receivers.saturating_sub(1);
  }
}
