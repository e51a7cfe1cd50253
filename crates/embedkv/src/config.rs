//! Topology file loading and saving.

use crate::Result;
use crate::exec::ExecProvider;
use crate::monitor::{self, MonitorConfig};
use crate::readiness::Deadline;
use crate::server::{self, ServerConfig};
use crate::topology::TopologyBuilder;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A cluster topology as stored on disk.
///
/// ```toml
/// executable = "/opt/redis/redis-server"
/// quorum = 2
///
/// [monitors]
/// count = 3
/// starting_port = 26379
///
/// [servers]
/// starting_port = 7000
///
/// [[groups]]
/// name = "orders"
/// replicas = 2
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyFile {
    /// Store executable used on every platform; the built-in table otherwise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executable: Option<PathBuf>,

    /// Address members bind to.
    pub bind: String,

    /// Host replicas and monitors use to reach primaries.
    pub host: String,

    /// Monitors that must agree before a failover.
    pub quorum: u32,

    /// Readiness deadline per member; unset waits indefinitely.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub readiness_timeout_ms: Option<u64>,

    pub monitors: MonitorSection,

    pub servers: ServerSection,

    pub groups: Vec<GroupSection>,
}

/// `[monitors]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSection {
    pub count: usize,
    pub starting_port: u16,

    /// Explicit ports; overrides `count` and `starting_port`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ports: Option<Vec<u16>>,

    /// OS-assigned ports; wins over everything else.
    pub ephemeral: bool,
}

/// `[servers]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub starting_port: u16,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ports: Option<Vec<u16>>,

    pub ephemeral: bool,
}

/// One `[[groups]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSection {
    pub name: String,
    #[serde(default)]
    pub replicas: usize,
}

impl Default for TopologyFile {
    fn default() -> Self {
        Self {
            executable: None,
            bind: server::DEFAULT_BIND.to_string(),
            host: server::DEFAULT_BIND.to_string(),
            quorum: 1,
            readiness_timeout_ms: None,
            monitors: MonitorSection::default(),
            servers: ServerSection::default(),
            groups: Vec::new(),
        }
    }
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            count: 1,
            starting_port: monitor::DEFAULT_PORT,
            ports: None,
            ephemeral: false,
        }
    }
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            starting_port: server::DEFAULT_PORT,
            ports: None,
            ephemeral: false,
        }
    }
}

impl TopologyFile {
    /// Loads a topology from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let topology: Self = toml::from_str(&content)?;
        Ok(topology)
    }

    /// Saves the topology as TOML, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn deadline(&self) -> Deadline {
        self.readiness_timeout_ms.map(Duration::from_millis).into()
    }

    pub fn exec_provider(&self) -> ExecProvider {
        match &self.executable {
            Some(path) => ExecProvider::always(path),
            None => ExecProvider::default(),
        }
    }

    /// Builder with every group declared, so server ports are already allocated.
    pub fn into_builder(self) -> Result<TopologyBuilder> {
        let provider = self.exec_provider();
        let deadline = self.deadline();

        let mut builder = TopologyBuilder::new()
            .server_template(
                ServerConfig::default()
                    .bind(self.bind.clone())
                    .provider(provider.clone()),
            )
            .monitor_template(MonitorConfig::default().bind(self.bind).provider(provider))
            .deadline(deadline)
            .with_host(self.host)
            .quorum(self.quorum)
            .monitor_count(self.monitors.count);

        builder = match (self.monitors.ephemeral, self.monitors.ports) {
            (true, _) => builder.ephemeral_monitors(),
            (false, Some(ports)) => builder.monitor_ports(ports),
            (false, None) => builder.monitor_starting_port(self.monitors.starting_port),
        };
        builder = match (self.servers.ephemeral, self.servers.ports) {
            (true, _) => builder.ephemeral_servers(),
            (false, Some(ports)) => builder.server_ports(ports),
            (false, None) => builder.server_starting_port(self.servers.starting_port),
        };

        for group in self.groups {
            builder = builder.replication_group(group.name, group.replicas)?;
        }
        Ok(builder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use tempfile::TempDir;

    #[test]
    fn empty_file_uses_defaults() {
        let topology: TopologyFile = toml::from_str("").unwrap();
        assert_eq!(topology, TopologyFile::default());
        assert_eq!(topology.monitors.count, 1);
        assert_eq!(topology.servers.starting_port, 6379);
        assert_eq!(topology.deadline(), Deadline::Infinite);
    }

    #[test]
    fn save_then_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("topology.toml");

        let topology = TopologyFile {
            quorum: 2,
            readiness_timeout_ms: Some(5000),
            groups: vec![GroupSection {
                name: "orders".to_string(),
                replicas: 2,
            }],
            ..TopologyFile::default()
        };
        topology.save(&path).unwrap();

        let loaded = TopologyFile::load(&path).unwrap();
        assert_eq!(loaded, topology);
        assert_eq!(loaded.deadline(), Deadline::after(Duration::from_secs(5)));
    }

    #[test]
    fn missing_file_is_io_error() {
        let temp = TempDir::new().unwrap();
        let result = TopologyFile::load(&temp.path().join("absent.toml"));
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[test]
    fn malformed_file_is_toml_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad.toml");
        fs::write(&path, "quorum = \"many\"").unwrap();

        assert!(matches!(TopologyFile::load(&path), Err(Error::Toml(_))));
    }

    #[test]
    fn builder_allocates_declared_groups() {
        let topology: TopologyFile = toml::from_str(
            r#"
            [servers]
            starting_port = 7000

            [[groups]]
            name = "g1"
            replicas = 2

            [[groups]]
            name = "g2"
            "#,
        )
        .unwrap();

        let builder = topology.into_builder().unwrap();
        let groups = builder.groups();

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].primary(), 7000);
        assert_eq!(groups[0].replicas(), [7001, 7002]);
        assert_eq!(groups[1].primary(), 7003);
        assert!(groups[1].replicas().is_empty());
    }

    #[test]
    fn explicit_server_ports_can_run_out() {
        let topology: TopologyFile = toml::from_str(
            r#"
            [servers]
            ports = [7000]

            [[groups]]
            name = "g1"
            replicas = 1
            "#,
        )
        .unwrap();

        assert!(matches!(
            topology.into_builder(),
            Err(Error::PortsExhausted(1))
        ));
    }

    #[test]
    fn executable_builds_a_cluster() {
        let temp = TempDir::new().unwrap();
        let exe = temp.path().join("kv-server");
        fs::write(&exe, b"").unwrap();

        let topology = TopologyFile {
            executable: Some(exe),
            monitors: MonitorSection {
                ports: Some(vec![26400, 26401]),
                ..MonitorSection::default()
            },
            groups: vec![GroupSection {
                name: "g1".to_string(),
                replicas: 1,
            }],
            ..TopologyFile::default()
        };

        let cluster = topology.into_builder().unwrap().build().unwrap();
        assert_eq!(cluster.ports(), vec![26400, 26401, 6379, 6380]);
    }
}
