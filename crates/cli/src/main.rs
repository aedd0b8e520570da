//! Sluice CLI - run the demo pipeline and inspect configuration

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod logging;

use commands::{cmd_config_show, cmd_config_template, cmd_demo, load_config};
use logging::init_logging;

#[derive(Parser)]
#[command(name = "sluice")]
#[command(about = "Supervised stream pipelines")]
#[command(after_help = "\
QUICK START:
  sluice demo                     # Square even numbers, double-square odd ones
  sluice demo --count 10          # Emit 1..=10
  sluice config template          # Print a commented config file")]
struct Cli {
  /// Config file (default: SLUICE_CONFIG, then ~/.config/sluice/config.toml)
  #[arg(long, global = true, value_name = "PATH")]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Commands,
}

/// Subcommands for `sluice config`
#[derive(Subcommand)]
pub enum ConfigCommand {
  /// Show the effective configuration as TOML
  Show,
  /// Print a commented default config file
  Template,
}

#[derive(Subcommand)]
enum Commands {
  /// Run the parity round trip: numbers -> parity -> {even, odd} -> collect
  #[command(long_about = "Run the parity round trip pipeline.\n\n\
    An emitter produces 1..=COUNT, a switch routes each value by parity, even values \
    are squared and odd values double-squared, and every result is collected and printed.")]
  Demo {
    /// How many numbers to emit
    #[arg(short, long, default_value = "3")]
    count: u64,
    /// Milliseconds between emitted numbers (default: [emitter] interval_ms)
    #[arg(long, value_name = "MS")]
    interval_ms: Option<u64>,
  },
  /// Inspect configuration
  Config {
    #[command(subcommand)]
    command: ConfigCommand,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();
  let config = load_config(cli.config.as_deref())?;
  init_logging(&config.log);

  match cli.command {
    Commands::Demo { count, interval_ms } => cmd_demo(&config, count, interval_ms).await,
    Commands::Config { command } => match command {
      ConfigCommand::Show => cmd_config_show(&config, cli.config.as_deref()),
      ConfigCommand::Template => cmd_config_template(),
    },
  }
}
