//! Console logging for the CLI

use sluice_core::LogConfig;
use tracing_subscriber::{
  EnvFilter,
  filter::{Directive, LevelFilter},
};

/// Parse log level from config string
fn parse_log_level(level: &str) -> Option<tracing::Level> {
  match level.to_lowercase().as_str() {
    "off" => None,
    "error" => Some(tracing::Level::ERROR),
    "warn" => Some(tracing::Level::WARN),
    "debug" => Some(tracing::Level::DEBUG),
    "trace" => Some(tracing::Level::TRACE),
    _ => Some(tracing::Level::INFO),
  }
}

/// Build the filter: `[log] level` as the default directive, `RUST_LOG` on top
fn env_filter(config: &LogConfig) -> EnvFilter {
  let directive: Directive = match parse_log_level(&config.level) {
    Some(level) => level.into(),
    None => LevelFilter::OFF.into(),
  };
  EnvFilter::builder().with_default_directive(directive).from_env_lossy()
}

/// Initialize console logging with config-driven settings
pub fn init_logging(config: &LogConfig) {
  tracing_subscriber::fmt()
    .with_env_filter(env_filter(config))
    .with_target(true)
    .with_ansi(config.ansi)
    .with_writer(std::io::stderr)
    .init();
}
