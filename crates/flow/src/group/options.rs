//! Per-fork options: task naming and deferred cleanups.

use std::{fmt, sync::Arc};

type Defer = Arc<dyn Fn() + Send + Sync>;

/// Options applied to one [`fork`](super::TaskGroup::fork).
///
/// Options are cheap to clone so a segment can apply the same set to each of
/// its tasks; every deferred cleanup then runs once per task it was attached to.
#[derive(Clone, Default)]
pub struct ForkOptions {
  name: Option<String>,
  defers: Vec<Defer>,
}

impl ForkOptions {
  pub fn new() -> Self {
    Self::default()
  }

  /// Options with a task name, used in logs and routine records
  pub fn named(name: impl Into<String>) -> Self {
    Self::new().with_name(name)
  }

  pub fn with_name(mut self, name: impl Into<String>) -> Self {
    self.name = Some(name.into());
    self
  }

  /// Set the name only if none was given
  pub(crate) fn or_named(mut self, name: impl FnOnce() -> String) -> Self {
    if self.name.is_none() {
      self.name = Some(name());
    }
    self
  }

  /// Run `cleanup` after the task body returns, before its exit is reported
  pub fn defer(mut self, cleanup: impl Fn() + Send + Sync + 'static) -> Self {
    self.defers.push(Arc::new(cleanup));
    self
  }

  pub fn name(&self) -> Option<&str> {
    self.name.as_deref()
  }

  pub(crate) fn into_parts(self) -> (Option<String>, Vec<Defer>) {
    (self.name, self.defers)
  }
}

impl fmt::Debug for ForkOptions {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ForkOptions")
      .field("name", &self.name)
      .field("defers", &self.defers.len())
      .finish()
  }
}
