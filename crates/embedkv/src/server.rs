//! Server instance configuration.

use crate::exec::ExecProvider;
use crate::instance::{Instance, Role};
use crate::readiness::Deadline;
use crate::{Error, Result};
use std::io::Write;
use std::path::PathBuf;
use tempfile::TempPath;

/// Default server port.
pub const DEFAULT_PORT: u16 = 6379;

/// Default bind address.
pub const DEFAULT_BIND: &str = "127.0.0.1";

/// Primary a replica follows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaOf {
    pub host: String,
    pub port: u16,
}

impl ReplicaOf {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

/// Everything needed to build one server [`Instance`].
///
/// Passed by value into [`ServerConfig::build`]; use [`ServerConfig::fresh`]
/// to get a copy for the next member that keeps only the sticky settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address written to the generated config as `bind`.
    pub bind: String,

    pub port: u16,

    /// TLS port, 0 for none.
    pub tls_port: u16,

    pub replica_of: Option<ReplicaOf>,

    /// Existing config file passed to the server as is.
    pub config_file: Option<PathBuf>,

    /// Extra config lines for the generated file.
    pub settings: Vec<String>,

    /// Emit `--slaveof` instead of `--replicaof` for old server releases.
    pub legacy_replication: bool,

    pub deadline: Deadline,

    pub provider: ExecProvider,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            port: DEFAULT_PORT,
            tls_port: 0,
            replica_of: None,
            config_file: None,
            settings: Vec::new(),
            legacy_replication: false,
            deadline: Deadline::Infinite,
            provider: ExecProvider::default(),
        }
    }
}

impl ServerConfig {
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn tls_port(mut self, tls_port: u16) -> Self {
        self.tls_port = tls_port;
        self
    }

    pub fn replica_of(mut self, host: impl Into<String>, port: u16) -> Self {
        self.replica_of = Some(ReplicaOf::new(host, port));
        self
    }

    pub fn bind(mut self, bind: impl Into<String>) -> Self {
        self.bind = bind.into();
        self
    }

    pub fn config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Appends one raw config line, e.g. `appendonly no`.
    pub fn setting(mut self, line: impl Into<String>) -> Self {
        self.settings.push(line.into());
        self
    }

    pub fn legacy_replication(mut self, legacy: bool) -> Self {
        self.legacy_replication = legacy;
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

    /// Copy for the next member: sticky fields kept, per-build fields reset.
    pub fn fresh(&self) -> Self {
        Self {
            bind: self.bind.clone(),
            legacy_replication: self.legacy_replication,
            deadline: self.deadline,
            provider: self.provider.clone(),
            ..Self::default()
        }
    }

    /// Builds a stopped server instance.
    pub fn build(self) -> Result<Instance> {
        if self.config_file.is_some() && !self.settings.is_empty() {
            return Err(Error::ConfigConflict(
                "a server config file and discrete settings can't be combined".to_string(),
            ));
        }

        let executable = self.provider.resolve()?;
        let generated = match self.config_file {
            Some(_) => None,
            None => Some(write_config(self.port, &self.settings, &self.bind)?),
        };
        let config_path = self
            .config_file
            .as_deref()
            .or(generated.as_deref())
            .map(|path| path.display().to_string());

        let mut args = vec![executable.display().to_string()];
        args.extend(config_path);
        args.extend(["--port".to_string(), self.port.to_string()]);
        if self.tls_port > 0 {
            args.extend(["--tls-port".to_string(), self.tls_port.to_string()]);
        }
        if let Some(primary) = &self.replica_of {
            let flag = if self.legacy_replication {
                "--slaveof"
            } else {
                "--replicaof"
            };
            args.extend([flag.to_string(), primary.host.clone(), primary.port.to_string()]);
        }

        Ok(Instance::new(Role::Server, self.port, args)
            .with_tls_port(self.tls_port)
            .with_deadline(self.deadline)
            .with_config_file(generated))
    }
}

fn write_config(port: u16, settings: &[String], bind: &str) -> Result<TempPath> {
    let mut file = tempfile::Builder::new()
        .prefix(&format!("embedkv-server_{port}"))
        .suffix(".conf")
        .tempfile()?;
    for line in settings {
        writeln!(file, "{line}")?;
    }
    writeln!(file, "bind {bind}")?;
    file.flush()?;
    Ok(file.into_temp_path())
}
