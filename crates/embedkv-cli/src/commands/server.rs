//! Server command - runs one store server.

use anyhow::{Context, Result, bail};
use embedkv::ServerConfig;
use std::path::PathBuf;

pub async fn run(
    port: u16,
    tls_port: Option<u16>,
    replica_of: Option<&str>,
    exec: Option<PathBuf>,
    timeout_secs: Option<u64>,
) -> Result<()> {
    let mut config = ServerConfig::default()
        .port(port)
        .tls_port(tls_port.unwrap_or(0))
        .provider(super::exec_provider(exec))
        .deadline(super::deadline(timeout_secs));
    if let Some(target) = replica_of {
        let (host, primary) = parse_host_port(target)?;
        config = config.replica_of(host, primary);
    }

    let server = config.build().context("Failed to configure server")?;

    println!("  Port:       {}", server.port());
    if let Some(tls) = server.tls_ports().first() {
        println!("  TLS port:   {tls}");
    }
    if let Some(target) = replica_of {
        println!("  Replica of: {target}");
    }

    super::run_until_interrupted(&server, "Server").await
}

/// Parses `HOST:PORT`, splitting on the last colon.
pub fn parse_host_port(value: &str) -> Result<(String, u16)> {
    let Some((host, port)) = value.rsplit_once(':') else {
        bail!("Expected HOST:PORT, got '{value}'");
    };
    if host.is_empty() {
        bail!("Missing host in '{value}'");
    }
    let port = port
        .parse()
        .with_context(|| format!("Invalid port in '{value}'"))?;
    Ok((host.to_string(), port))
}
