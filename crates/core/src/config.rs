//! Configuration system for Sluice.
//!
//! Config priority: explicit path > `SLUICE_CONFIG` > user (~/.config/sluice/config.toml) > defaults

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ============================================================================
// Errors
// ============================================================================

/// Errors raised while loading an explicitly requested config file
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error("Failed to read config {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("Invalid config {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },
}

// ============================================================================
// Stream Configuration
// ============================================================================

/// Defaults applied to streams created by routers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
  /// Buffered capacity of router-created streams (default: 16)
  /// 0 creates rendezvous streams where every send waits for a receiver.
  pub capacity: usize,
}

impl Default for StreamConfig {
  fn default() -> Self {
    Self { capacity: 16 }
  }
}

// ============================================================================
// Task Group Configuration
// ============================================================================

/// Supervised task group settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupConfig {
  /// Buffer size of the transient (non-fatal) error channel (default: 64)
  /// Transient errors reported while the buffer is full are dropped.
  pub transient_capacity: usize,
}

impl Default for GroupConfig {
  fn default() -> Self {
    Self { transient_capacity: 64 }
  }
}

// ============================================================================
// Emitter Configuration
// ============================================================================

/// Emitter settings used by the demo pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmitterConfig {
  /// Milliseconds between emitter ticks (default: 10)
  pub interval_ms: u64,
}

impl Default for EmitterConfig {
  fn default() -> Self {
    Self { interval_ms: 10 }
  }
}

// ============================================================================
// Log Configuration
// ============================================================================

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
  /// Log level: "off", "error", "warn", "info", "debug", "trace"
  /// Default: "info"
  #[serde(default = "default_log_level")]
  pub level: String,

  /// Colored console output (default: true)
  #[serde(default = "default_ansi")]
  pub ansi: bool,
}

fn default_log_level() -> String {
  "info".to_string()
}
fn default_ansi() -> bool {
  true
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: default_log_level(),
      ansi: default_ansi(),
    }
  }
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
  /// Stream defaults
  #[serde(default)]
  pub stream: StreamConfig,

  /// Task group settings
  #[serde(default)]
  pub group: GroupConfig,

  /// Emitter settings
  #[serde(default)]
  pub emitter: EmitterConfig,

  /// Logging settings
  #[serde(default)]
  pub log: LogConfig,
}

impl Config {
  /// Load config from an explicit path, reporting read and parse failures
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })
  }

  /// Load config from `SLUICE_CONFIG` or the user config, falling back to defaults
  pub fn load_default() -> Self {
    if let Ok(path) = std::env::var("SLUICE_CONFIG")
      && let Ok(config) = Self::load(Path::new(&path))
    {
      return config;
    }

    if let Some(user_config_path) = Self::user_config_path()
      && user_config_path.exists()
      && let Ok(config) = Self::load(&user_config_path)
    {
      return config;
    }

    Self::default()
  }

  /// Get the user-level config path
  pub fn user_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("XDG_CONFIG_HOME") {
      return Some(PathBuf::from(path).join("sluice").join("config.toml"));
    }

    dirs::config_dir().map(|p: PathBuf| p.join("sluice").join("config.toml"))
  }

  /// Generate a default config file as a string
  pub fn generate_template() -> String {
    let defaults = Self::default();
    format!(
      r#"# Sluice Configuration
# Place in ~/.config/sluice/config.toml or point SLUICE_CONFIG at a file

[stream]
# Capacity of streams created by routers (0 = rendezvous)
capacity = {capacity}

[group]
# Transient error buffer; reports beyond this are dropped until drained
transient_capacity = {transient_capacity}

[emitter]
# Milliseconds between emitter ticks
interval_ms = {interval_ms}

[log]
# off, error, warn, info, debug, trace (RUST_LOG overrides)
level = "{level}"
ansi = {ansi}
"#,
      capacity = defaults.stream.capacity,
      transient_capacity = defaults.group.transient_capacity,
      interval_ms = defaults.emitter.interval_ms,
      level = defaults.log.level,
      ansi = defaults.log.ansi,
    )
  }
}
