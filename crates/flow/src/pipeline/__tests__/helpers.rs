//! Shared helpers for pipeline tests.

use std::{
  sync::{Arc, Mutex},
  time::Duration,
};

use crate::{
  error::FlowError,
  segment::{Confluence, Emitter, Segment, Sink, Source, UnarySink},
};

/// A segment playing both roles, for wiring-only tests
pub fn relay() -> impl Segment<u64> {
  Confluence::new()
}

/// Emits `1..=count`, one value per millisecond
pub fn counter(count: u64) -> impl Source<u64> {
  let mut next = 0;
  Emitter::new(Duration::from_millis(1), move || {
    next += 1;
    Ok((next <= count).then_some(next))
  })
}

/// Sink appending every value to the returned buffer
pub fn collector() -> (impl Sink<u64>, Arc<Mutex<Vec<u64>>>) {
  let collected = Arc::new(Mutex::new(Vec::new()));
  let buffer = collected.clone();
  let sink = UnarySink::new(move |value: u64| {
    let buffer = buffer.clone();
    async move {
      buffer
        .lock()
        .map_err(|_| FlowError::msg("collector poisoned"))?
        .push(value);
      Ok(())
    }
  });
  (sink, collected)
}

/// Collected values in ascending order
pub fn sorted(collected: &Arc<Mutex<Vec<u64>>>) -> Vec<u64> {
  let mut values = collected.lock().map(|values| values.clone()).unwrap_or_default();
  values.sort_unstable();
  values
}
