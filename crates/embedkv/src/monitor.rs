//! Monitor (sentinel mode) instance configuration.

use crate::exec::ExecProvider;
use crate::instance::{Instance, Role};
use crate::readiness::Deadline;
use crate::server::DEFAULT_BIND;
use crate::{Error, Result};
use std::io::Write;
use std::path::PathBuf;
use tempfile::TempPath;

/// Default monitor port.
pub const DEFAULT_PORT: u16 = 26379;

/// A primary watched by the monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitoredGroup {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub quorum: u32,
}

impl MonitoredGroup {
    pub fn new(name: impl Into<String>, host: impl Into<String>, port: u16, quorum: u32) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
            quorum,
        }
    }
}

impl Default for MonitoredGroup {
    fn default() -> Self {
        Self::new("mymaster", DEFAULT_BIND, crate::server::DEFAULT_PORT, 1)
    }
}

/// Everything needed to build one monitor [`Instance`].
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub bind: String,
    pub port: u16,

    /// Watched primaries; empty means the default `mymaster` group.
    pub groups: Vec<MonitoredGroup>,

    pub down_after_ms: u64,
    pub failover_timeout_ms: u64,
    pub parallel_syncs: u32,

    /// Existing config file used instead of a generated one.
    pub config_file: Option<PathBuf>,

    /// Extra lines appended to the generated file.
    pub settings: Vec<String>,

    pub deadline: Deadline,
    pub provider: ExecProvider,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            port: DEFAULT_PORT,
            groups: Vec::new(),
            down_after_ms: 60_000,
            failover_timeout_ms: 180_000,
            parallel_syncs: 1,
            config_file: None,
            settings: Vec::new(),
            deadline: Deadline::Infinite,
            provider: ExecProvider::default(),
        }
    }
}

impl MonitorConfig {
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn bind(mut self, bind: impl Into<String>) -> Self {
        self.bind = bind.into();
        self
    }

    /// Watches `name` at `host:port`.
    pub fn monitor(
        mut self,
        name: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        quorum: u32,
    ) -> Self {
        self.groups.push(MonitoredGroup::new(name, host, port, quorum));
        self
    }

    pub fn down_after_ms(mut self, millis: u64) -> Self {
        self.down_after_ms = millis;
        self
    }

    pub fn failover_timeout_ms(mut self, millis: u64) -> Self {
        self.failover_timeout_ms = millis;
        self
    }

    pub fn parallel_syncs(mut self, count: u32) -> Self {
        self.parallel_syncs = count;
        self
    }

    pub fn config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    pub fn setting(mut self, line: impl Into<String>) -> Self {
        self.settings.push(line.into());
        self
    }

    pub fn deadline(mut self, deadline: impl Into<Deadline>) -> Self {
        self.deadline = deadline.into();
        self
    }

    pub fn provider(mut self, provider: ExecProvider) -> Self {
        self.provider = provider;
        self
    }

    /// Copy for the next member: keeps bind, timing, deadline and provider.
    pub fn fresh(&self) -> Self {
        Self {
            bind: self.bind.clone(),
            down_after_ms: self.down_after_ms,
            failover_timeout_ms: self.failover_timeout_ms,
            parallel_syncs: self.parallel_syncs,
            deadline: self.deadline,
            provider: self.provider.clone(),
            ..Self::default()
        }
    }

    /// Renders the generated config file.
    pub fn render(&self) -> String {
        let default_group = [MonitoredGroup::default()];
        let groups = if self.groups.is_empty() {
            &default_group[..]
        } else {
            &self.groups[..]
        };

        let mut out = format!("port {}\nbind {}\n", self.port, self.bind);
        for group in groups {
            let name = &group.name;
            out.push_str(&format!(
                "sentinel monitor {name} {} {} {}\n",
                group.host, group.port, group.quorum
            ));
            out.push_str(&format!(
                "sentinel down-after-milliseconds {name} {}\n",
                self.down_after_ms
            ));
            out.push_str(&format!(
                "sentinel failover-timeout {name} {}\n",
                self.failover_timeout_ms
            ));
            out.push_str(&format!(
                "sentinel parallel-syncs {name} {}\n",
                self.parallel_syncs
            ));
        }
        for line in &self.settings {
            out.push_str(line);
            out.push('\n');
        }
        out
    }

    /// Builds a stopped monitor instance.
    pub fn build(self) -> Result<Instance> {
        if self.config_file.is_some() && !self.settings.is_empty() {
            return Err(Error::ConfigConflict(
                "a monitor config file and discrete settings can't be combined".to_string(),
            ));
        }

        let executable = self.provider.resolve()?;
        let (config_path, generated) = match &self.config_file {
            Some(path) => (path.clone(), None),
            None => {
                let generated = write_config(self.port, &self.render())?;
                (generated.to_path_buf(), Some(generated))
            }
        };

        let args = vec![
            executable.display().to_string(),
            config_path.display().to_string(),
            "--sentinel".to_string(),
            "--port".to_string(),
            self.port.to_string(),
        ];

        Ok(Instance::new(Role::Monitor, self.port, args)
            .with_deadline(self.deadline)
            .with_config_file(generated))
    }
}

fn write_config(port: u16, content: &str) -> Result<TempPath> {
    let mut file = tempfile::Builder::new()
        .prefix(&format!("embedkv-sentinel_{port}"))
        .suffix(".conf")
        .tempfile()?;
    file.write_all(content.as_bytes())?;
    file.flush()?;
    Ok(file.into_temp_path())
}
