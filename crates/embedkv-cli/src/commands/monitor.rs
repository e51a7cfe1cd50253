//! Monitor command - runs one monitor watching the default primary.

use anyhow::{Context, Result};
use embedkv::MonitorConfig;
use std::path::PathBuf;

pub async fn run(port: u16, exec: Option<PathBuf>, timeout_secs: Option<u64>) -> Result<()> {
    let monitor = MonitorConfig::default()
        .port(port)
        .provider(super::exec_provider(exec))
        .deadline(super::deadline(timeout_secs))
        .build()
        .context("Failed to configure monitor")?;

    println!("  Port: {}", monitor.port());

    super::run_until_interrupted(&monitor, "Monitor").await
}
