//! Error types for supervised instances, port allocation and topology building.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Instance supervision and building errors.
#[derive(Error, Debug)]
pub enum Error {
    /// The child process could not be spawned.
    #[error("Failed to start {role} on port {port}: {source}")]
    Startup {
        role: &'static str,
        port: u16,
        source: std::io::Error,
    },

    /// Standard output ended before a ready line was seen.
    #[error("Can't start {role} on port {port}, output ended before it was ready. Process log:{output}")]
    Readiness {
        role: &'static str,
        port: u16,
        output: String,
    },

    /// The caller-selected readiness deadline passed first.
    #[error("{role} on port {port} was not ready within {deadline:?}. Process log:{output}")]
    DeadlineElapsed {
        role: &'static str,
        port: u16,
        deadline: Duration,
        output: String,
    },

    /// `start()` was called on a live instance.
    #[error("{role} on port {port} is already running")]
    AlreadyActive { role: &'static str, port: u16 },

    /// Waiting for the killed child to exit failed.
    #[error("Failed to stop {role} on port {port}: {source}")]
    StopWait {
        role: &'static str,
        port: u16,
        source: std::io::Error,
    },

    /// One or more members of a composite failed to stop.
    #[error("Failed to stop {} instance(s): {}", .0.len(), join(.0))]
    StopFailed(Vec<Error>),

    /// A predefined port list ran out.
    #[error("Run out of ports after handing out {0}")]
    PortsExhausted(usize),

    /// The operating system would not hand out an ephemeral port.
    #[error("Failed to allocate an ephemeral port: {0}")]
    PortAllocation(std::io::Error),

    /// Mutually exclusive configuration options were set together.
    #[error("Configuration conflict: {0}")]
    ConfigConflict(String),

    /// No executable for this platform could be located.
    #[error("No executable found for {platform}: {path}")]
    ExecutableNotFound { platform: String, path: PathBuf },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML deserialization error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

fn join(errors: &[Error]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type for embedkv operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readiness_error_carries_output() {
        let err = Error::Readiness {
            role: "server",
            port: 6379,
            output: "\nline one\nline two".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("6379"));
        assert!(msg.contains("line one"));
        assert!(msg.contains("line two"));
    }

    #[test]
    fn stop_failed_lists_every_failure() {
        let err = Error::StopFailed(vec![
            Error::ConfigConflict("a".to_string()),
            Error::PortsExhausted(2),
        ]);
        let msg = err.to_string();
        assert!(msg.contains("2 instance(s)"));
        assert!(msg.contains("Configuration conflict: a"));
        assert!(msg.contains("after handing out 2"));
    }
}
