//! CLI command implementations

mod config;
mod demo;

pub use config::{cmd_config_show, cmd_config_template, load_config};
pub use demo::cmd_demo;
