//! Fake store binaries for integration tests.
//!
//! Scripts are run as `/bin/sh <script>`, so they never need the executable
//! bit and never hit ETXTBSY while being written.

#![allow(dead_code)]

use embedkv::{DiagnosticSink, Instance, OutputStream, Role};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const SERVER_READY: &str = "echo '1:M 01 Jan 2024 00:00:00.000 * Ready to accept connections tcp'";
pub const MONITOR_READY: &str = "echo '1:X 01 Jan 2024 00:00:00.000 # Sentinel ID is 6b8f2e0d'";

/// Writes `body` as a shell script named `name` under `dir`.
pub fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("{body}\n")).unwrap();
    path
}

/// Server that prints its ready line and then idles.
pub fn ready_server(dir: &Path, name: &str) -> PathBuf {
    script(dir, name, &format!("echo 'starting'\n{SERVER_READY}\nexec sleep 600"))
}

/// Monitor that prints its ready line and then idles.
pub fn ready_monitor(dir: &Path, name: &str) -> PathBuf {
    script(dir, name, &format!("{MONITOR_READY}\nexec sleep 600"))
}

/// Instance that runs `script` through `/bin/sh`.
pub fn instance(role: Role, port: u16, script: &Path) -> Instance {
    Instance::new(
        role,
        port,
        vec!["/bin/sh".to_string(), script.display().to_string()],
    )
}

/// Sink that keeps every drained line.
#[derive(Default)]
pub struct CollectingSink {
    lines: Mutex<Vec<(OutputStream, String)>>,
}

impl CollectingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn lines(&self) -> Vec<(OutputStream, String)> {
        self.lines.lock().unwrap().clone()
    }

    /// Polls until `line` arrives on `stream` or five seconds pass.
    pub async fn wait_for(&self, stream: OutputStream, line: &str) -> bool {
        for _ in 0..100 {
            if self
                .lines()
                .iter()
                .any(|(s, l)| *s == stream && l == line)
            {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        false
    }
}

impl DiagnosticSink for CollectingSink {
    fn line(&self, _instance: &str, stream: OutputStream, line: &str) {
        self.lines.lock().unwrap().push((stream, line.to_string()));
    }
}
