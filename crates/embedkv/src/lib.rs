//! Ephemeral key-value store processes for tests and local development.
//!
//! Spawns and supervises store server and monitor (sentinel) processes:
//! - [`Instance`]: one child process with start/stop/readiness detection
//! - [`PortProvider`]: sequential, predefined or OS-assigned ports
//! - [`TopologyBuilder`]: replication groups watched by monitors
//! - [`Cluster`]: every member driven as one unit
//!
//! Children left running when the program exits are killed by a process-wide
//! exit hook (see [`finalizer`]).

pub mod cluster;
pub mod config;
pub mod error;
pub mod exec;
pub mod finalizer;
pub mod instance;
pub mod monitor;
pub mod ports;
pub mod readiness;
pub mod server;
pub mod topology;

pub use cluster::Cluster;
pub use config::TopologyFile;
pub use error::{Error, Result};
pub use exec::{Arch, ExecProvider, Os};
pub use instance::{DiagnosticSink, Instance, InstanceStatus, OutputStream, Role, Supervised};
pub use monitor::MonitorConfig;
pub use ports::{EphemeralPorts, PortProvider, PredefinedPorts, SequentialPorts};
pub use readiness::Deadline;
pub use server::ServerConfig;
pub use topology::{ReplicationGroup, TopologyBuilder};

use std::path::Path;

/// Loads a topology file and builds its cluster, stopped.
pub fn load_cluster(path: &Path) -> Result<Cluster> {
    TopologyFile::load(path)?.into_builder()?.build()
}

/// Loads a topology file, builds its cluster and starts it.
///
/// On a failed start the members already running are stopped before the
/// error is returned.
pub async fn start_cluster(path: &Path) -> Result<Cluster> {
    let cluster = load_cluster(path)?;
    if let Err(e) = cluster.start().await {
        if let Err(stop) = cluster.stop().await {
            tracing::warn!("cleanup after failed start: {stop}");
        }
        return Err(e);
    }
    Ok(cluster)
}
