//! CLI command implementations.

pub mod cluster;
pub mod init;
pub mod monitor;
pub mod server;

use anyhow::{Context, Result};
use embedkv::{Deadline, ExecProvider, Supervised};
use std::path::PathBuf;
use std::time::Duration;

/// Provider for `--exec`, or the bundled table.
pub(crate) fn exec_provider(exec: Option<PathBuf>) -> ExecProvider {
    exec.map_or_else(ExecProvider::default, ExecProvider::always)
}

/// Deadline for `--timeout-secs`.
pub(crate) fn deadline(timeout_secs: Option<u64>) -> Deadline {
    timeout_secs.map(Duration::from_secs).into()
}

/// Starts `target`, waits for Ctrl+C, then stops it.
///
/// A failed start stops whatever did come up before returning the error.
pub(crate) async fn run_until_interrupted(target: &dyn Supervised, what: &str) -> Result<()> {
    if let Err(e) = target.start().await {
        if let Err(stop) = target.stop().await {
            tracing::warn!("cleanup after failed start: {stop}");
        }
        return Err(e).with_context(|| format!("Failed to start {what}"));
    }

    println!();
    println!("{what} running. Press Ctrl+C to stop.");
    println!();

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;

    println!("Received Ctrl+C, stopping {what}...");
    target
        .stop()
        .await
        .with_context(|| format!("Failed to stop {what}"))?;
    println!("{what} stopped.");

    Ok(())
}
