//! Supervised task groups
//!
//! A [`TaskGroup`] forks tokio tasks bound to one shared
//! [`CancellationToken`] and supervises them as a unit:
//!
//! - **Census**: forked and exited counters; `running = forked - exited`
//! - **Fail-fast**: the first task returning `Err` cancels every sibling; all
//!   tasks still report their own result
//! - **Waiting**: [`wait_on_any`](TaskGroup::wait_on_any) and
//!   [`wait_on_all`](TaskGroup::wait_on_all) retire reports; `wait_on_all`
//!   returns the most significant error (real failure > cancellation > ok)
//! - **Transient errors**: a bounded, non-cancelling side channel
//! - **Closers**: run exactly once after cancellation, when no task is running
//!
//! # Lifecycle
//!
//! ```text
//! new ─▶ fork* ─▶ (first Err | cancel | deadline) ─▶ tasks drain ─▶ closers
//!                         wait_on_all ◀── reports ──┘
//! ```
//!
//! Fire-and-forget is a valid usage mode, but a caller that never waits never
//! observes fatal errors. Transient errors must be drained through
//! [`take_transient_errors`](TaskGroup::take_transient_errors); once the buffer
//! is full further reports are dropped (never blocking task exit).
//!
//! There is no retry policy here: a task that wants retries implements them.

mod context;
mod options;


use std::{
  any::Any,
  future::Future,
  ops::ControlFlow,
  panic::AssertUnwindSafe,
  sync::{
    Arc, Mutex, MutexGuard, PoisonError,
    atomic::{AtomicBool, AtomicU8, AtomicU64, AtomicUsize, Ordering},
  },
  time::Duration,
};

use dashmap::DashMap;
use futures::FutureExt;
use sluice_core::GroupConfig;
use tokio::{
  sync::{mpsc, watch},
  time::MissedTickBehavior,
};
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::{debug, trace, warn};

pub use self::{context::TaskContext, options::ForkOptions};
use crate::{error::FlowError, stream::Outlet};

const CAUSE_NONE: u8 = 0;
const CAUSE_CANCELLED: u8 = 1;
const CAUSE_DEADLINE: u8 = 2;

type Closer = Box<dyn FnOnce() + Send>;

/// Record of one forked task, kept until its report is retired by a waiter
#[derive(Debug, Clone)]
pub struct Routine {
  pub key: String,
  pub running: bool,
  pub error: Option<FlowError>,
}

struct Inner {
  token: CancellationToken,
  parent: Option<TaskGroup>,
  cause: AtomicU8,

  next_id: AtomicU64,
  forked: AtomicUsize,
  exited: watch::Sender<usize>,
  reported: AtomicUsize,
  routines: DashMap<u64, Routine>,
  reports_tx: mpsc::UnboundedSender<u64>,
  reports_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<u64>>,

  transient_tx: mpsc::Sender<FlowError>,
  transient_rx: Mutex<Option<mpsc::Receiver<FlowError>>>,
  transient_dropped: AtomicU64,

  closers: Mutex<Vec<Closer>>,
  closer_armed: AtomicBool,
  closed: AtomicBool,
}

/// Handle to a supervised group of tasks. Cheap to clone.
#[derive(Clone)]
pub struct TaskGroup {
  inner: Arc<Inner>,
}

impl Default for TaskGroup {
  fn default() -> Self {
    Self::new()
  }
}

impl TaskGroup {
  pub fn new() -> Self {
    Self::with_config(&GroupConfig::default())
  }

  pub fn with_config(config: &GroupConfig) -> Self {
    Self::build(CancellationToken::new(), None, config.transient_capacity)
  }

  fn build(token: CancellationToken, parent: Option<TaskGroup>, transient_capacity: usize) -> Self {
    let (reports_tx, reports_rx) = mpsc::unbounded_channel();
    let (transient_tx, transient_rx) = mpsc::channel(transient_capacity.max(1));
    let (exited, _) = watch::channel(0);

    Self {
      inner: Arc::new(Inner {
        token,
        parent,
        cause: AtomicU8::new(CAUSE_NONE),
        next_id: AtomicU64::new(0),
        forked: AtomicUsize::new(0),
        exited,
        reported: AtomicUsize::new(0),
        routines: DashMap::new(),
        reports_tx,
        reports_rx: tokio::sync::Mutex::new(reports_rx),
        transient_tx,
        transient_rx: Mutex::new(Some(transient_rx)),
        transient_dropped: AtomicU64::new(0),
        closers: Mutex::new(Vec::new()),
        closer_armed: AtomicBool::new(false),
        closed: AtomicBool::new(false),
      }),
    }
  }

  /// A nested group for a sub-graph: cancelled with this group, but with its
  /// own census, reports and closers. Failures inside do not cancel the parent.
  pub fn child(&self) -> Self {
    Self::build(
      self.inner.token.child_token(),
      Some(self.clone()),
      self.inner.transient_tx.max_capacity(),
    )
  }

  /// Cancel the group with a deadline error once `timeout` elapses.
  ///
  /// Must be called inside a tokio runtime.
  pub fn with_timeout(self, timeout: Duration) -> Self {
    let group = self.clone();
    tokio::spawn(async move {
      tokio::select! {
        _ = group.inner.token.cancelled() => {}
        _ = tokio::time::sleep(timeout) => {
          debug!(timeout_ms = timeout.as_millis() as u64, "Group deadline exceeded");
          group.cancel_with(CAUSE_DEADLINE);
        }
      }
    });
    self
  }

  // ==========================================================================
  // Cancellation
  // ==========================================================================

  pub fn cancel(&self) {
    self.cancel_with(CAUSE_CANCELLED);
  }

  fn cancel_with(&self, cause: u8) {
    let _ = self
      .inner
      .cause
      .compare_exchange(CAUSE_NONE, cause, Ordering::AcqRel, Ordering::Acquire);
    self.inner.token.cancel();
  }

  pub fn is_cancelled(&self) -> bool {
    self.inner.token.is_cancelled()
  }

  pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
    self.inner.token.cancelled()
  }

  /// The underlying token, for integrating with code outside the group
  pub fn token(&self) -> CancellationToken {
    self.inner.token.clone()
  }

  /// Cancellation cause: `None` while live
  pub fn err(&self) -> Option<FlowError> {
    if !self.is_cancelled() {
      return None;
    }
    match self.inner.cause.load(Ordering::Acquire) {
      CAUSE_DEADLINE => Some(FlowError::DeadlineExceeded),
      CAUSE_CANCELLED => Some(FlowError::Cancelled),
      _ => Some(
        self
          .inner
          .parent
          .as_ref()
          .and_then(TaskGroup::err)
          .unwrap_or(FlowError::Cancelled),
      ),
    }
  }

  // ==========================================================================
  // Census
  // ==========================================================================

  pub fn forked(&self) -> usize {
    self.inner.forked.load(Ordering::SeqCst)
  }

  pub fn exited(&self) -> usize {
    *self.inner.exited.borrow()
  }

  pub fn running(&self) -> usize {
    let exited = self.exited();
    self.forked().saturating_sub(exited)
  }

  /// Records of tasks whose reports have not been retired yet
  pub fn routines(&self) -> Vec<Routine> {
    self.inner.routines.iter().map(|entry| entry.value().clone()).collect()
  }

  fn outstanding(&self) -> usize {
    self
      .forked()
      .saturating_sub(self.inner.reported.load(Ordering::SeqCst))
  }

  // ==========================================================================
  // Forking
  // ==========================================================================

  /// Fork `f` with the group's context.
  ///
  /// Returns false without starting anything if the group is already
  /// cancelled. An `Err` from `f` (or a panic) cancels the group.
  pub fn fork<F, Fut>(&self, options: ForkOptions, f: F) -> bool
  where
    F: FnOnce(TaskContext) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), FlowError>> + Send + 'static,
  {
    if self.is_cancelled() {
      debug!(task = options.name().unwrap_or("<unnamed>"), "Group cancelled, not forking");
      return false;
    }

    let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
    let (name, defers) = options.into_parts();
    let key = name.unwrap_or_else(|| format!("task-{id}"));

    self.inner.routines.insert(
      id,
      Routine {
        key: key.clone(),
        running: true,
        error: None,
      },
    );
    self.inner.forked.fetch_add(1, Ordering::SeqCst);
    trace!(task = %key, "Forking task");

    let ctx = TaskContext::new(self.clone(), &key);
    let group = self.clone();
    tokio::spawn(async move {
      let outcome = AssertUnwindSafe(async move { f(ctx).await }).catch_unwind().await;
      let result = match outcome {
        Ok(result) => result,
        Err(panic) => Err(FlowError::Panicked(panic_message(panic.as_ref()))),
      };

      for defer in &defers {
        defer();
      }
      group.exit(id, &key, result);
    });

    true
  }

  fn exit(&self, id: u64, key: &str, result: Result<(), FlowError>) {
    let error = result.err();
    match &error {
      Some(err) if err.is_cancellation() => debug!(task = %key, error = %err, "Task stopped on cancellation"),
      Some(err) => warn!(task = %key, error = %err, "Task failed, cancelling group"),
      None => trace!(task = %key, "Task exited"),
    }
    if error.is_some() {
      self.cancel();
    }

    if let Some(mut routine) = self.inner.routines.get_mut(&id) {
      routine.running = false;
      routine.error = error;
    }
    self.inner.exited.send_modify(|exited| *exited += 1);
    let _ = self.inner.reports_tx.send(id);
  }

  /// Fork a loop calling `f` for every value from `outlet`.
  ///
  /// Ends cleanly when the stream closes, with the cancellation cause when
  /// the group is cancelled, and with `f`'s error when it fails.
  pub fn go_range<T, F, Fut>(&self, options: ForkOptions, outlet: Outlet<T>, f: F) -> bool
  where
    T: Send + 'static,
    F: FnMut(T) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), FlowError>> + Send + 'static,
  {
    self.fork(options, move |ctx| range(ctx, outlet, f))
  }

  /// Fork a loop calling `f` every `period`, first after one period.
  ///
  /// `f` returns `ControlFlow::Break` to stop; cancellation and errors stop
  /// the loop like [`go_range`](Self::go_range).
  pub fn go_tick<F, Fut>(&self, options: ForkOptions, period: Duration, f: F) -> bool
  where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<ControlFlow<()>, FlowError>> + Send + 'static,
  {
    self.fork(options, move |ctx| tick(ctx, period, f))
  }

  // ==========================================================================
  // Waiting
  // ==========================================================================

  fn retire(&self, id: u64) -> Option<FlowError> {
    self.inner.reported.fetch_add(1, Ordering::SeqCst);
    self.inner.routines.remove(&id).and_then(|(_, routine)| routine.error)
  }

  /// Wait for one task to report.
  ///
  /// Returns that task's error. A clean exit returns `Ok` when
  /// `allow_nil_result` is set and is otherwise skipped. Returns `Ok`
  /// immediately once nothing is outstanding.
  pub async fn wait_on_any(&self, allow_nil_result: bool) -> Result<(), FlowError> {
    let mut reports = self.inner.reports_rx.lock().await;
    loop {
      if self.outstanding() == 0 {
        return Ok(());
      }
      let Some(id) = reports.recv().await else {
        return Ok(());
      };
      match self.retire(id) {
        Some(err) => return Err(err),
        None if allow_nil_result => return Ok(()),
        None => continue,
      }
    }
  }

  /// Wait for every outstanding task to report.
  ///
  /// Returns the most significant error: a real failure outranks the
  /// cancellation it caused, which outranks success.
  pub async fn wait_on_all(&self) -> Result<(), FlowError> {
    let mut reports = self.inner.reports_rx.lock().await;
    let mut worst: Option<FlowError> = None;

    while self.outstanding() > 0 {
      let Some(id) = reports.recv().await else {
        break;
      };
      if let Some(err) = self.retire(id)
        && worst
          .as_ref()
          .is_none_or(|current| err.significance() > current.significance())
      {
        worst = Some(err);
      }
    }

    match worst {
      Some(err) => Err(err),
      None => Ok(()),
    }
  }

  /// Cancel the group and wait for every task to report
  pub async fn shutdown(&self) -> Result<(), FlowError> {
    self.cancel();
    self.wait_on_all().await
  }

  async fn idle(&self) {
    let mut exits = self.inner.exited.subscribe();
    let inner = self.inner.clone();
    let _ = exits
      .wait_for(|exited| *exited >= inner.forked.load(Ordering::SeqCst))
      .await;
  }

  // ==========================================================================
  // Transient Errors
  // ==========================================================================

  /// Hand the transient error receiver to the caller. Only the first call gets it.
  pub fn take_transient_errors(&self) -> Option<mpsc::Receiver<FlowError>> {
    self
      .inner
      .transient_rx
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .take()
  }

  /// Report a non-fatal error. Never blocks; returns false if it was dropped.
  pub fn report_transient(&self, error: FlowError) -> bool {
    match self.inner.transient_tx.try_send(error) {
      Ok(()) => true,
      Err(mpsc::error::TrySendError::Full(error)) => {
        let dropped = self.inner.transient_dropped.fetch_add(1, Ordering::Relaxed) + 1;
        warn!(error = %error, dropped, "Transient error buffer full, dropping");
        false
      }
      Err(mpsc::error::TrySendError::Closed(error)) => {
        self.inner.transient_dropped.fetch_add(1, Ordering::Relaxed);
        trace!(error = %error, "Transient error receiver gone, dropping");
        false
      }
    }
  }

  pub(crate) async fn report_transient_wait(&self, error: FlowError) -> bool {
    tokio::select! {
      biased;
      _ = self.cancelled() => false,
      sent = self.inner.transient_tx.send(error) => sent.is_ok(),
    }
  }

  /// Transient errors dropped because the buffer was full or undrained
  pub fn transient_dropped(&self) -> u64 {
    self.inner.transient_dropped.load(Ordering::Relaxed)
  }

  // ==========================================================================
  // Closers
  // ==========================================================================

  fn lock_closers(&self) -> MutexGuard<'_, Vec<Closer>> {
    self.inner.closers.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Register cleanup to run once the group is cancelled and every task has
  /// exited. Runs even if nothing was ever forked. A closer added after the
  /// group closed runs immediately.
  ///
  /// Must be called inside a tokio runtime.
  pub fn add_closer(&self, closer: impl FnOnce() + Send + 'static) {
    if self.inner.closed.load(Ordering::Acquire) {
      closer();
      return;
    }

    self.lock_closers().push(Box::new(closer));
    if self.inner.closed.load(Ordering::Acquire) {
      self.run_closers();
      return;
    }

    if !self.inner.closer_armed.swap(true, Ordering::AcqRel) {
      let group = self.clone();
      tokio::spawn(async move {
        group.cancelled().await;
        group.idle().await;
        group.inner.closed.store(true, Ordering::Release);
        group.run_closers();
      });
    }
  }

  fn run_closers(&self) {
    let closers = std::mem::take(&mut *self.lock_closers());
    if !closers.is_empty() {
      debug!(count = closers.len(), "Running group closers");
    }
    for closer in closers {
      closer();
    }
  }
}

impl std::fmt::Debug for TaskGroup {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("TaskGroup")
      .field("forked", &self.forked())
      .field("exited", &self.exited())
      .field("cancelled", &self.is_cancelled())
      .finish()
  }
}

// ============================================================================
// Loop Bodies
// ============================================================================

/// Drive `f` over every value of `outlet` until end of stream
pub(crate) async fn range<T, F, Fut>(ctx: TaskContext, outlet: Outlet<T>, mut f: F) -> Result<(), FlowError>
where
  F: FnMut(T) -> Fut,
  Fut: Future<Output = Result<(), FlowError>>,
{
  while let Some(value) = ctx.recv(&outlet).await? {
    f(value).await?;
  }
  trace!(task = ctx.name(), stream = outlet.id(), "Input exhausted");
  Ok(())
}

/// Call `f` every `period` until it breaks
pub(crate) async fn tick<F, Fut>(ctx: TaskContext, period: Duration, mut f: F) -> Result<(), FlowError>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<ControlFlow<()>, FlowError>>,
{
  let mut ticker = tokio::time::interval(period.max(Duration::from_nanos(1)));
  ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

  // Skip the immediate tick
  ticker.tick().await;

  loop {
    tokio::select! {
      biased;
      _ = ctx.cancelled() => return Err(ctx.err()),
      _ = ticker.tick() => {}
    }
    if f().await?.is_break() {
      return Ok(());
    }
  }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
  if let Some(message) = panic.downcast_ref::<&str>() {
    (*message).to_string()
  } else if let Some(message) = panic.downcast_ref::<String>() {
    message.clone()
  } else {
    "unknown panic".to_string()
  }
}
