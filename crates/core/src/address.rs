//! Symbolic addresses for segments and pipeline boundaries.

use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};

/// Opaque, comparable name of a segment or pipeline boundary endpoint.
///
/// Cheap to clone; the string is shared.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(Arc<str>);

impl Address {
  pub fn new(name: impl AsRef<str>) -> Self {
    Self(Arc::from(name.as_ref()))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for Address {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl fmt::Debug for Address {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Address({:?})", &*self.0)
  }
}

impl From<&str> for Address {
  fn from(name: &str) -> Self {
    Self::new(name)
  }
}

impl From<String> for Address {
  fn from(name: String) -> Self {
    Self(Arc::from(name))
  }
}

impl From<&Address> for Address {
  fn from(address: &Address) -> Self {
    address.clone()
  }
}

impl AsRef<str> for Address {
  fn as_ref(&self) -> &str {
    &self.0
  }
}

/// Errors raised when resolving an address
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
  #[error("Address not found: {0}")]
  NotFound(Address),
}
