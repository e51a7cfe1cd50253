//! embedkv command-line runner.
//!
//! Starts throwaway store processes and keeps them running until Ctrl+C.
//!
//! # Quick Start
//!
//! ```bash
//! # A single server on port 7000
//! embedkv server --port 7000 --exec /opt/redis/redis-server
//!
//! # A whole topology described in a file
//! embedkv init topology.toml --group orders:2 --monitors 3
//! embedkv cluster --config topology.toml
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// embedkv - ephemeral key-value store processes for tests and local development.
#[derive(Parser)]
#[command(name = "embedkv")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single server.
    Server {
        /// Port to listen on.
        #[arg(short, long, default_value = "6379")]
        port: u16,

        /// TLS port to listen on.
        #[arg(long)]
        tls_port: Option<u16>,

        /// Replicate from a primary (HOST:PORT).
        #[arg(long)]
        replica_of: Option<String>,

        /// Store executable; the bundled name for this platform otherwise.
        #[arg(short, long)]
        exec: Option<PathBuf>,

        /// Give up if the server isn't ready within this many seconds.
        #[arg(short, long)]
        timeout_secs: Option<u64>,
    },

    /// Run a single monitor watching the default primary.
    Monitor {
        /// Port to listen on.
        #[arg(short, long, default_value = "26379")]
        port: u16,

        /// Store executable; the bundled name for this platform otherwise.
        #[arg(short, long)]
        exec: Option<PathBuf>,

        /// Give up if the monitor isn't ready within this many seconds.
        #[arg(short, long)]
        timeout_secs: Option<u64>,
    },

    /// Run every member of a topology file.
    Cluster {
        /// Topology file (TOML).
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Write a topology file.
    Init {
        /// Path of the file to create.
        path: PathBuf,

        /// Replication group as NAME:REPLICAS (repeatable).
        #[arg(short, long = "group")]
        groups: Vec<String>,

        /// Number of monitors.
        #[arg(short, long, default_value = "1")]
        monitors: usize,

        /// Monitors that must agree before a failover.
        #[arg(short, long, default_value = "1")]
        quorum: u32,

        /// First server port.
        #[arg(long, default_value = "6379")]
        starting_port: u16,

        /// Store executable written into the file.
        #[arg(short, long)]
        exec: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Server {
            port,
            tls_port,
            replica_of,
            exec,
            timeout_secs,
        } => run_async(commands::server::run(
            port,
            tls_port,
            replica_of.as_deref(),
            exec,
            timeout_secs,
        )),
        Commands::Monitor {
            port,
            exec,
            timeout_secs,
        } => run_async(commands::monitor::run(port, exec, timeout_secs)),
        Commands::Cluster { config } => run_async(commands::cluster::run(&config)),
        Commands::Init {
            path,
            groups,
            monitors,
            quorum,
            starting_port,
            exec,
        } => commands::init::run(&path, &groups, monitors, quorum, starting_port, exec),
    }
}

fn run_async(command: impl Future<Output = Result<()>>) -> Result<()> {
    tokio::runtime::Runtime::new()?.block_on(command)
}
