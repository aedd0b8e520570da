//! Shared types for Sluice: addresses and configuration.

pub mod address;
pub mod config;

pub use address::{Address, AddressError};
pub use config::{Config, ConfigError, EmitterConfig, GroupConfig, LogConfig, StreamConfig};
