//! Demo command: the parity round trip

use std::{
  sync::{Arc, Mutex, PoisonError},
  time::Duration,
};

use anyhow::{Context, Result};
use flow::{
  Address, Flow, FlowError, FlowOptions, ForkOptions, Pipeline, Router, Stitch, TaskGroup,
  segment::{Emitter, LinearTransform, Switch, UnarySink},
};
use sluice_core::Config;
use tracing::{info, warn};

type Collected = Arc<Mutex<Vec<u64>>>;

/// numbers -> parity -> {even: x*x, odd: 2*x*x} -> collect
fn parity_pipeline(config: &Config, count: u64, period: Duration) -> Result<(Pipeline<u64>, Collected), FlowError> {
  let collected: Collected = Arc::new(Mutex::new(Vec::new()));
  let buffer = collected.clone();

  let mut next = 0;
  let numbers = Emitter::new(period, move || {
    next += 1;
    Ok((next <= count).then_some(next))
  });
  let parity = Switch::new(|value: &u64| Ok(Address::from(if value % 2 == 0 { "even" } else { "odd" })));
  let collect = UnarySink::new(move |value: u64| {
    let buffer = buffer.clone();
    async move {
      buffer.lock().unwrap_or_else(PoisonError::into_inner).push(value);
      Ok(())
    }
  });

  let mut pipeline = Pipeline::new("demo");
  pipeline
    .source("numbers", numbers)?
    .segment("parity", parity)?
    .segment("even", LinearTransform::new(|value: u64| Ok(value * value)))?
    .segment("odd", LinearTransform::new(|value: u64| Ok(2 * value * value)))?
    .sink("collect", collect)?;

  Router::with_config(Stitch::Unary, &config.stream)
    .from(["numbers"])
    .to(["parity"])
    .route(&mut pipeline)?;
  Router::with_config(Stitch::Weave, &config.stream)
    .from(["parity"])
    .to(["even", "odd"])
    .route(&mut pipeline)?;
  Router::with_config(Stitch::Convergent, &config.stream)
    .from(["even", "odd"])
    .to(["collect"])
    .route(&mut pipeline)?;

  Ok((pipeline, collected))
}

/// Run the demo pipeline to completion and return the collected values in order
async fn run(config: &Config, count: u64, period: Duration) -> Result<Vec<u64>> {
  let group = TaskGroup::with_config(&config.group);
  let (mut pipeline, collected) = parity_pipeline(config, count, period).context("Failed to wire demo pipeline")?;

  info!(count, period_ms = period.as_millis() as u64, "Running demo pipeline");
  pipeline
    .flow(
      &group,
      FlowOptions::new()
        .with_fork(ForkOptions::named("demo"))
        .close_inlets_on_exit(true),
    )
    .context("Failed to start demo pipeline")?;
  group.wait_on_all().await.context("Demo pipeline failed")?;

  let dropped = group.transient_dropped();
  if dropped > 0 {
    warn!(dropped, "Transient errors were dropped");
  }

  let mut values = collected.lock().unwrap_or_else(PoisonError::into_inner).clone();
  values.sort_unstable();
  Ok(values)
}

/// Run the parity round trip and print each result
pub async fn cmd_demo(config: &Config, count: u64, interval_ms: Option<u64>) -> Result<()> {
  let period = Duration::from_millis(interval_ms.unwrap_or(config.emitter.interval_ms));
  let values = run(config, count, period).await?;

  println!("Collected {} values", values.len());
  for value in values {
    println!("  {}", value);
  }
  Ok(())
}
