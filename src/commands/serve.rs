//! Polling commands: the long-running scheduler and one-off fetches.

use anyhow::{Context, Result};
use tracing::{info, warn};

use super::AppContext;

/// Starts every enabled source loop, then waits for Ctrl-C and stops them all.
pub async fn run_serve_command(ctx: &AppContext) -> Result<()> {
    let scheduler = ctx.scheduler();
    let summary = scheduler.start_all().await?;
    for (source_id, reason) in &summary.failed {
        warn!(source_id = %source_id, reason = %reason, "source loop not started");
    }
    info!(
        started = summary.started.len(),
        failed = summary.failed.len(),
        "scheduler running, press Ctrl-C to stop"
    );
    if summary.started.is_empty() {
        println!("No enabled sources started; waiting anyway. Press Ctrl-C to stop.");
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    info!("shutdown requested");
    let stopped = scheduler.stop_all().await;
    for (source_id, error) in &stopped.panicked {
        warn!(source_id = %source_id, error = %error, "source loop panicked");
    }
    println!(
        "Stopped {} source loops",
        stopped.stopped.len() + stopped.panicked.len()
    );
    Ok(())
}

pub async fn run_fetch_command(ctx: &AppContext, source_id: &str) -> Result<()> {
    let outcome = ctx.scheduler().one_off_fetch(source_id).await?;
    println!(
        "Fetched {} items from {source_id}: {} new, {} already stored",
        outcome.fetched,
        outcome.inserted,
        outcome.skipped()
    );
    Ok(())
}
