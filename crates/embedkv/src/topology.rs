//! Topology builder: replication groups plus monitors, built into a [`Cluster`].

use crate::Result;
use crate::cluster::Cluster;
use crate::monitor::{self, MonitorConfig, MonitoredGroup};
use crate::ports::{EphemeralPorts, PortProvider, PredefinedPorts, SequentialPorts};
use crate::readiness::Deadline;
use crate::server::{self, ServerConfig};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// A named primary and its replicas.
///
/// Ports are drawn when the group is declared, primary first, so groups built
/// from one provider never overlap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationGroup {
    name: String,
    primary: u16,
    replicas: Vec<u16>,
}

impl ReplicationGroup {
    /// Allocates the primary port and then `replicas` replica ports from `ports`.
    pub fn allocate(
        name: impl Into<String>,
        replicas: usize,
        ports: &dyn PortProvider,
    ) -> Result<Self> {
        let primary = ports.next_port()?;
        let replicas = (0..replicas)
            .map(|_| ports.next_port())
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            name: name.into(),
            primary,
            replicas,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn primary(&self) -> u16 {
        self.primary
    }

    pub fn replicas(&self) -> &[u16] {
        &self.replicas
    }
}

/// Builds a [`Cluster`] of monitors watching one or more replication groups.
///
/// Defaults: one monitor on sequential ports from 26379, quorum 1, servers on
/// sequential ports from 6379, primaries addressed as `127.0.0.1`.
pub struct TopologyBuilder {
    monitor_count: usize,
    quorum: u32,
    host: String,
    monitor_ports: Arc<dyn PortProvider>,
    server_ports: Arc<dyn PortProvider>,
    groups: Vec<ReplicationGroup>,
    server_template: ServerConfig,
    monitor_template: MonitorConfig,
}

impl Default for TopologyBuilder {
    fn default() -> Self {
        Self {
            monitor_count: 1,
            quorum: 1,
            host: server::DEFAULT_BIND.to_string(),
            monitor_ports: Arc::new(SequentialPorts::new(monitor::DEFAULT_PORT)),
            server_ports: Arc::new(SequentialPorts::new(server::DEFAULT_PORT)),
            groups: Vec::new(),
            server_template: ServerConfig::default(),
            monitor_template: MonitorConfig::default(),
        }
    }
}

impl TopologyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Template for every server; port and replication are set per member.
    pub fn server_template(mut self, template: ServerConfig) -> Self {
        self.server_template = template;
        self
    }

    /// Template for every monitor; port and groups are set per member.
    pub fn monitor_template(mut self, template: MonitorConfig) -> Self {
        self.monitor_template = template;
        self
    }

    pub fn monitor_count(mut self, count: usize) -> Self {
        self.monitor_count = count;
        self
    }

    pub fn quorum(mut self, quorum: u32) -> Self {
        self.quorum = quorum;
        self
    }

    /// Host replicas and monitors use to reach primaries.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Readiness deadline applied to every member.
    pub fn deadline(mut self, deadline: impl Into<Deadline>) -> Self {
        let deadline = deadline.into();
        self.server_template.deadline = deadline;
        self.monitor_template.deadline = deadline;
        self
    }

    /// Uses exactly `ports` for monitors and sets the monitor count to match.
    pub fn monitor_ports(mut self, ports: Vec<u16>) -> Self {
        self.monitor_count = ports.len();
        self.monitor_ports = Arc::new(PredefinedPorts::new(ports));
        self
    }

    pub fn monitor_starting_port(mut self, port: u16) -> Self {
        self.monitor_ports = Arc::new(SequentialPorts::new(port));
        self
    }

    pub fn monitor_port_provider(mut self, provider: Arc<dyn PortProvider>) -> Self {
        self.monitor_ports = provider;
        self
    }

    /// Draws server ports from `ports`; affects groups declared afterwards.
    pub fn server_ports(mut self, ports: Vec<u16>) -> Self {
        self.server_ports = Arc::new(PredefinedPorts::new(ports));
        self
    }

    pub fn server_starting_port(mut self, port: u16) -> Self {
        self.server_ports = Arc::new(SequentialPorts::new(port));
        self
    }

    pub fn server_port_provider(mut self, provider: Arc<dyn PortProvider>) -> Self {
        self.server_ports = provider;
        self
    }

    pub fn ephemeral_monitors(self) -> Self {
        self.monitor_port_provider(Arc::new(EphemeralPorts))
    }

    pub fn ephemeral_servers(self) -> Self {
        self.server_port_provider(Arc::new(EphemeralPorts))
    }

    /// OS-assigned ports for every member.
    pub fn ephemeral(self) -> Self {
        self.ephemeral_monitors().ephemeral_servers()
    }

    /// Declares a group and allocates its ports now.
    pub fn replication_group(mut self, name: impl Into<String>, replicas: usize) -> Result<Self> {
        let group = ReplicationGroup::allocate(name, replicas, self.server_ports.as_ref())?;
        debug!(
            group = group.name(),
            primary = group.primary(),
            replicas = ?group.replicas(),
            "allocated replication group"
        );
        self.groups.push(group);
        Ok(self)
    }

    pub fn groups(&self) -> &[ReplicationGroup] {
        &self.groups
    }

    /// Builds servers (each primary, then its replicas) and monitors watching every group.
    ///
    /// Monitor ports are drawn here, so each call yields new monitor ports.
    pub fn build(&self) -> Result<Cluster> {
        let servers = self.build_servers()?;
        let monitors = self.build_monitors()?;
        Ok(Cluster::new(monitors, servers))
    }

    fn build_servers(&self) -> Result<Vec<crate::Instance>> {
        let mut servers = Vec::new();
        for group in &self.groups {
            servers.push(self.server_config().port(group.primary).build()?);
            for &replica in &group.replicas {
                servers.push(
                    self.server_config()
                        .port(replica)
                        .replica_of(self.host.clone(), group.primary)
                        .build()?,
                );
            }
        }
        Ok(servers)
    }

    fn build_monitors(&self) -> Result<Vec<crate::Instance>> {
        let watched: Vec<MonitoredGroup> = self
            .groups
            .iter()
            .map(|g| MonitoredGroup::new(g.name.clone(), self.host.clone(), g.primary, self.quorum))
            .collect();

        (0..self.monitor_count)
            .map(|_| {
                let port = self.monitor_ports.next_port()?;
                MonitorConfig {
                    groups: watched.clone(),
                    ..self.monitor_config()
                }
                .port(port)
                .build()
            })
            .collect()
    }

    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            settings: self.server_template.settings.clone(),
            ..self.server_template.fresh()
        }
    }

    fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            settings: self.monitor_template.settings.clone(),
            ..self.monitor_template.fresh()
        }
    }
}

impl fmt::Debug for TopologyBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TopologyBuilder")
            .field("monitor_count", &self.monitor_count)
            .field("quorum", &self.quorum)
            .field("host", &self.host)
            .field("groups", &self.groups)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::exec::ExecProvider;
    use std::fs;
    use tempfile::TempDir;

    fn provider(dir: &TempDir) -> ExecProvider {
        let exe = dir.path().join("kv-server");
        fs::write(&exe, b"").unwrap();
        ExecProvider::always(exe)
    }

    fn builder(dir: &TempDir) -> TopologyBuilder {
        TopologyBuilder::new()
            .server_template(ServerConfig::default().provider(provider(dir)))
            .monitor_template(MonitorConfig::default().provider(provider(dir)))
    }

    fn tail(args: &[String], n: usize) -> Vec<&str> {
        args[args.len() - n..].iter().map(String::as_str).collect()
    }

    #[test]
    fn group_draws_primary_before_replicas() {
        let ports = SequentialPorts::new(7000);
        let group = ReplicationGroup::allocate("g1", 2, &ports).unwrap();

        assert_eq!(group.name(), "g1");
        assert_eq!(group.primary(), 7000);
        assert_eq!(group.replicas(), [7001, 7002]);
    }

    #[test]
    fn groups_from_one_provider_never_overlap() {
        let dir = TempDir::new().unwrap();
        let b = builder(&dir)
            .server_starting_port(7000)
            .replication_group("g1", 2)
            .unwrap()
            .replication_group("g2", 1)
            .unwrap();

        assert_eq!(b.groups()[0].primary(), 7000);
        assert_eq!(b.groups()[1].primary(), 7003);
        assert_eq!(b.groups()[1].replicas(), [7004]);
    }

    #[test]
    fn replicas_point_at_their_primary() {
        let dir = TempDir::new().unwrap();
        let cluster = builder(&dir)
            .server_starting_port(7000)
            .replication_group("g1", 2)
            .unwrap()
            .build()
            .unwrap();

        let servers = cluster.servers();
        assert_eq!(servers.len(), 3);
        assert_eq!(tail(servers[0].args(), 2), ["--port", "7000"]);
        assert_eq!(
            tail(servers[1].args(), 5),
            ["--port", "7001", "--replicaof", "127.0.0.1", "7000"]
        );
        assert_eq!(
            tail(servers[2].args(), 5),
            ["--port", "7002", "--replicaof", "127.0.0.1", "7000"]
        );
        assert_eq!(cluster.server_ports(), vec![7000, 7001, 7002]);
    }

    #[test]
    fn composite_ports_list_monitors_first() {
        let dir = TempDir::new().unwrap();
        let cluster = builder(&dir)
            .monitor_starting_port(26500)
            .server_starting_port(7000)
            .replication_group("g1", 2)
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(cluster.ports(), vec![26500, 7000, 7001, 7002]);
        assert!(cluster.tls_ports().is_empty());
        assert!(!cluster.is_active());
    }

    #[test]
    fn every_monitor_watches_every_group() {
        let dir = TempDir::new().unwrap();
        let cluster = builder(&dir)
            .monitor_ports(vec![26600, 26601])
            .quorum(2)
            .with_host("10.1.1.1")
            .server_starting_port(7000)
            .replication_group("g1", 1)
            .unwrap()
            .replication_group("g2", 1)
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(cluster.monitor_ports(), vec![26600, 26601]);
        for monitor in cluster.monitors() {
            let conf = fs::read_to_string(&monitor.args()[1]).unwrap();
            assert!(conf.contains("sentinel monitor g1 10.1.1.1 7000 2\n"));
            assert!(conf.contains("sentinel monitor g2 10.1.1.1 7002 2\n"));
        }
    }

    #[test]
    fn predefined_server_ports_run_out() {
        let dir = TempDir::new().unwrap();
        let result = builder(&dir)
            .server_ports(vec![7000, 7001])
            .replication_group("g1", 2);

        assert!(matches!(result, Err(Error::PortsExhausted(2))));
    }

    #[test]
    fn monitor_count_zero_builds_only_servers() {
        let dir = TempDir::new().unwrap();
        let cluster = builder(&dir)
            .monitor_count(0)
            .replication_group("g1", 0)
            .unwrap()
            .build()
            .unwrap();

        assert!(cluster.monitors().is_empty());
        assert_eq!(cluster.servers().len(), 1);
    }

    #[test]
    fn template_settings_reach_every_server() {
        let dir = TempDir::new().unwrap();
        let cluster = TopologyBuilder::new()
            .server_template(
                ServerConfig::default()
                    .provider(provider(&dir))
                    .setting("appendonly no"),
            )
            .monitor_count(0)
            .server_starting_port(7100)
            .replication_group("g1", 1)
            .unwrap()
            .build()
            .unwrap();

        for server in cluster.servers() {
            let conf = fs::read_to_string(&server.args()[1]).unwrap();
            assert!(conf.starts_with("appendonly no\n"));
        }
    }

    #[test]
    fn ephemeral_ports_are_nonzero() {
        let dir = TempDir::new().unwrap();
        let cluster = builder(&dir)
            .ephemeral()
            .replication_group("g1", 1)
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(cluster.ports().len(), 3);
        assert!(cluster.ports().iter().all(|&p| p != 0));
    }
}
