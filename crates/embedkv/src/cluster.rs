//! Composite controller: monitors and servers driven as one unit.

use crate::instance::{Instance, Supervised};
use crate::{Error, Result};
use async_trait::async_trait;
use tracing::{info, warn};

/// Monitors followed by servers, started and stopped together.
#[derive(Debug)]
pub struct Cluster {
    monitors: Vec<Instance>,
    servers: Vec<Instance>,
}

impl Cluster {
    /// Takes ownership of the members; order is preserved.
    pub fn new(monitors: Vec<Instance>, servers: Vec<Instance>) -> Self {
        Self { monitors, servers }
    }

    pub fn monitors(&self) -> &[Instance] {
        &self.monitors
    }

    pub fn servers(&self) -> &[Instance] {
        &self.servers
    }

    fn members(&self) -> impl Iterator<Item = &Instance> {
        self.monitors.iter().chain(&self.servers)
    }

    /// Starts every monitor, then every server, in order.
    ///
    /// Stops at the first failure without rolling back: members already
    /// started keep running until [`Cluster::stop`] is called.
    pub async fn start(&self) -> Result<()> {
        for member in self.members() {
            if let Err(e) = member.start().await {
                warn!(
                    role = %member.role(),
                    port = member.port(),
                    running = self.running_count(),
                    "cluster start aborted: {e}"
                );
                return Err(e);
            }
        }
        info!(
            monitors = self.monitors.len(),
            servers = self.servers.len(),
            "cluster started"
        );
        Ok(())
    }

    /// Stops every member, monitors first, even when some fail.
    ///
    /// All failures are reported together as [`Error::StopFailed`].
    pub async fn stop(&self) -> Result<()> {
        let mut failures = Vec::new();
        for member in self.members() {
            if let Err(e) = member.stop().await {
                warn!(role = %member.role(), port = member.port(), "failed to stop: {e}");
                failures.push(e);
            }
        }

        if failures.is_empty() {
            info!("cluster stopped");
            Ok(())
        } else {
            Err(Error::StopFailed(failures))
        }
    }

    /// True iff every member is active.
    pub fn is_active(&self) -> bool {
        self.members().all(Instance::is_active)
    }

    /// Number of active members.
    pub fn running_count(&self) -> usize {
        self.members().filter(|m| m.is_active()).count()
    }

    /// Monitor ports, then server ports.
    pub fn ports(&self) -> Vec<u16> {
        self.members().flat_map(Instance::ports).collect()
    }

    pub fn tls_ports(&self) -> Vec<u16> {
        self.members().flat_map(Instance::tls_ports).collect()
    }

    pub fn monitor_ports(&self) -> Vec<u16> {
        self.monitors.iter().flat_map(Instance::ports).collect()
    }

    pub fn monitor_tls_ports(&self) -> Vec<u16> {
        self.monitors.iter().flat_map(Instance::tls_ports).collect()
    }

    pub fn server_ports(&self) -> Vec<u16> {
        self.servers.iter().flat_map(Instance::ports).collect()
    }

    pub fn server_tls_ports(&self) -> Vec<u16> {
        self.servers.iter().flat_map(Instance::tls_ports).collect()
    }
}

#[async_trait]
impl Supervised for Cluster {
    async fn start(&self) -> Result<()> {
        Cluster::start(self).await
    }

    async fn stop(&self) -> Result<()> {
        Cluster::stop(self).await
    }

    fn is_active(&self) -> bool {
        Cluster::is_active(self)
    }

    fn ports(&self) -> Vec<u16> {
        Cluster::ports(self)
    }

    fn tls_ports(&self) -> Vec<u16> {
        Cluster::tls_ports(self)
    }
}
