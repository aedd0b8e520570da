//! Configuration commands (show, template)

use anyhow::{Context, Result};
use sluice_core::Config;
use std::path::Path;

/// Load the explicit config file if one was given, otherwise the default chain
pub fn load_config(path: Option<&Path>) -> Result<Config> {
  match path {
    Some(path) => Config::load(path).with_context(|| format!("Failed to load config {}", path.display())),
    None => Ok(Config::load_default()),
  }
}

/// Show the effective configuration
pub fn cmd_config_show(config: &Config, explicit: Option<&Path>) -> Result<()> {
  if let Some(path) = explicit {
    println!("Using config: {:?}", path);
  } else if let Ok(path) = std::env::var("SLUICE_CONFIG") {
    println!("Using SLUICE_CONFIG: {:?}", path);
  } else if let Some(user_path) = Config::user_config_path()
    && user_path.exists()
  {
    println!("Using user config: {:?}", user_path);
  } else {
    println!("Using default configuration (no config file found)");
  }
  println!();

  let toml_str = toml::to_string_pretty(config).context("Failed to render config")?;
  println!("{}", toml_str);

  Ok(())
}

/// Print a commented default config file
pub fn cmd_config_template() -> Result<()> {
  print!("{}", Config::generate_template());
  Ok(())
}
