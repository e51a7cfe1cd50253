//! Supervised store process.

use crate::finalizer::{self, ExitGuard};
use crate::readiness::{self, Deadline, MONITOR_READY, NotReady, ReadyPattern, SERVER_READY};
use crate::{Error, Result};
use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use tempfile::TempPath;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Start/stop/ports contract shared by single instances and whole clusters.
#[async_trait]
pub trait Supervised: Send + Sync {
    /// Starts the process(es) and waits until ready.
    async fn start(&self) -> Result<()>;

    /// Stops the process(es); a no-op when already stopped.
    async fn stop(&self) -> Result<()>;

    /// True when everything is running.
    fn is_active(&self) -> bool;

    /// Listening ports.
    fn ports(&self) -> Vec<u16>;

    /// TLS listening ports.
    fn tls_ports(&self) -> Vec<u16>;
}

/// Which binary mode an instance runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Key-value server (primary or replica).
    Server,

    /// Monitor watching primaries (sentinel mode).
    Monitor,
}

impl Role {
    pub fn name(self) -> &'static str {
        match self {
            Role::Server => "server",
            Role::Monitor => "monitor",
        }
    }

    /// Line pattern announcing that the process accepts connections.
    pub fn ready_pattern(self) -> &'static ReadyPattern {
        match self {
            Role::Server => &SERVER_READY,
            Role::Monitor => &MONITOR_READY,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Lifecycle state of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum InstanceStatus {
    /// Not running. Initial state, and the state after `stop()` or a failed start.
    Stopped = 0,

    /// Spawned, waiting for the ready line.
    Starting = 1,

    /// Ready and serving.
    Active = 2,

    /// Being killed.
    Stopping = 3,
}

impl InstanceStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Starting,
            2 => Self::Active,
            3 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

/// Output stream of a child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl fmt::Display for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OutputStream::Stdout => "stdout",
            OutputStream::Stderr => "stderr",
        })
    }
}

/// Receives lines drained from running children.
pub trait DiagnosticSink: Send + Sync + 'static {
    fn line(&self, instance: &str, stream: OutputStream, line: &str);
}

/// Forwards stderr at WARN and stdout at DEBUG.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn line(&self, instance: &str, stream: OutputStream, line: &str) {
        match stream {
            OutputStream::Stderr => warn!(instance, "{line}"),
            OutputStream::Stdout => debug!(instance, "{line}"),
        }
    }
}

/// One supervised child process.
///
/// `start()` and `stop()` take `&self` and are serialized internally, so an
/// instance can be shared behind an `Arc`. At most one child is alive per
/// instance; every `start()` spawns a fresh child and fresh drain tasks.
pub struct Instance {
    role: Role,
    port: u16,
    tls_port: u16,
    args: Vec<String>,
    deadline: Deadline,
    status: AtomicU8,
    running: Mutex<Option<Running>>,
    sink: Arc<dyn DiagnosticSink>,
    // Generated config file; deleted when the instance is dropped.
    _config_file: Option<TempPath>,
}

struct Running {
    child: Child,
    drains: Vec<JoinHandle<()>>,
    shutdown: CancellationToken,
    _exit_guard: Option<ExitGuard>,
}

/// Stores `Stopped` on drop unless forgotten after a successful start.
struct StartingGuard<'a> {
    status: &'a AtomicU8,
}

impl Drop for StartingGuard<'_> {
    fn drop(&mut self) {
        self.status.store(InstanceStatus::Stopped as u8, Ordering::SeqCst);
    }
}

impl Instance {
    /// Creates a stopped instance.
    ///
    /// `args[0]` is the executable; the child runs in its directory.
    pub fn new(role: Role, port: u16, args: Vec<String>) -> Self {
        Self {
            role,
            port,
            tls_port: 0,
            args,
            deadline: Deadline::Infinite,
            status: AtomicU8::new(InstanceStatus::Stopped as u8),
            running: Mutex::new(None),
            sink: Arc::new(TracingSink),
            _config_file: None,
        }
    }

    /// Sets the TLS port (0 = none).
    pub fn with_tls_port(mut self, tls_port: u16) -> Self {
        self.tls_port = tls_port;
        self
    }

    /// Sets the default readiness deadline used by `start()`.
    pub fn with_deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = deadline;
        self
    }

    /// Routes drained output to `sink` instead of `tracing`.
    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    pub(crate) fn with_config_file(mut self, config_file: Option<TempPath>) -> Self {
        self._config_file = config_file;
        self
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn tls_port(&self) -> u16 {
        self.tls_port
    }

    /// Full command line, executable first.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn deadline(&self) -> Deadline {
        self.deadline
    }

    /// Current lifecycle state (non-blocking).
    pub fn status(&self) -> InstanceStatus {
        InstanceStatus::from_u8(self.status.load(Ordering::SeqCst))
    }

    /// True iff the instance is `Active` (non-blocking).
    pub fn is_active(&self) -> bool {
        self.status() == InstanceStatus::Active
    }

    /// The listening port as a one-element list, or empty if unset.
    pub fn ports(&self) -> Vec<u16> {
        single(self.port)
    }

    /// The TLS port as a one-element list, or empty if unset.
    pub fn tls_ports(&self) -> Vec<u16> {
        single(self.tls_port)
    }

    /// OS process id of the running child.
    pub async fn pid(&self) -> Option<u32> {
        self.running.lock().await.as_ref().and_then(|r| r.child.id())
    }

    /// Starts the child and waits for its ready line using the configured deadline.
    pub async fn start(&self) -> Result<()> {
        self.start_with_deadline(self.deadline).await
    }

    /// Starts the child and waits at most `deadline` for its ready line.
    ///
    /// Fails without spawning anything if the instance is already active.
    /// On any failure the child is reclaimed and the instance stays stopped.
    pub async fn start_with_deadline(&self, deadline: Deadline) -> Result<()> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(Error::AlreadyActive {
                role: self.role.name(),
                port: self.port,
            });
        }

        self.set_status(InstanceStatus::Starting);
        // Resets to Stopped on failure and when this future is dropped mid-launch.
        let starting = StartingGuard {
            status: &self.status,
        };

        let started = self.launch(deadline).await?;
        *running = Some(started);
        self.set_status(InstanceStatus::Active);
        std::mem::forget(starting);
        info!(role = %self.role, port = self.port, "instance started");
        Ok(())
    }

    /// Kills the child and waits for it to exit. No-op when stopped.
    pub async fn stop(&self) -> Result<()> {
        let mut running = self.running.lock().await;
        let Some(Running {
            mut child,
            drains,
            shutdown,
            _exit_guard: exit_guard,
        }) = running.take()
        else {
            return Ok(());
        };

        self.set_status(InstanceStatus::Stopping);
        shutdown.cancel();

        // Fails only if the child already exited; wait() still reaps it.
        if let Err(e) = child.start_kill() {
            debug!(role = %self.role, port = self.port, "kill: {e}");
        }
        let waited = child.wait().await;

        for drain in drains {
            let _ = drain.await;
        }
        drop(exit_guard);
        self.set_status(InstanceStatus::Stopped);

        match waited {
            Ok(exit) => {
                info!(role = %self.role, port = self.port, %exit, "instance stopped");
                Ok(())
            }
            Err(source) => Err(Error::StopWait {
                role: self.role.name(),
                port: self.port,
                source,
            }),
        }
    }

    fn set_status(&self, status: InstanceStatus) {
        self.status.store(status as u8, Ordering::SeqCst);
    }

    fn label(&self) -> String {
        format!("{}:{}", self.role, self.port)
    }

    fn startup_error(&self, source: std::io::Error) -> Error {
        Error::Startup {
            role: self.role.name(),
            port: self.port,
            source,
        }
    }

    async fn launch(&self, deadline: Deadline) -> Result<Running> {
        let (program, rest) = self.args.split_first().ok_or_else(|| {
            self.startup_error(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty command line",
            ))
        })?;

        let mut command = Command::new(program);
        command
            .args(rest)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = Path::new(program).parent().filter(|d| !d.as_os_str().is_empty()) {
            command.current_dir(dir);
        }

        debug!(role = %self.role, port = self.port, args = ?self.args, "spawning");
        let mut child = command.spawn().map_err(|e| self.startup_error(e))?;
        let exit_guard = child.id().map(register_kill);

        let missing = |name: &str| {
            self.startup_error(std::io::Error::other(format!("{name} was not captured")))
        };
        let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing("stderr"))?;

        let shutdown = CancellationToken::new();
        let mut drains = vec![tokio::spawn(drain(
            BufReader::new(stderr).lines(),
            OutputStream::Stderr,
            self.label(),
            shutdown.clone(),
            Arc::clone(&self.sink),
        ))];

        let mut stdout = BufReader::new(stdout).lines();
        match readiness::await_ready(&mut stdout, self.role.ready_pattern(), deadline).await {
            Ok(log) => {
                debug!(role = %self.role, port = self.port, lines = log.lines().len(), "ready");
                drains.push(tokio::spawn(drain(
                    stdout,
                    OutputStream::Stdout,
                    self.label(),
                    shutdown.clone(),
                    Arc::clone(&self.sink),
                )));
                Ok(Running {
                    child,
                    drains,
                    shutdown,
                    _exit_guard: exit_guard,
                })
            }
            Err(not_ready) => {
                shutdown.cancel();
                let _ = child.start_kill();
                let _ = child.wait().await;
                for drain in drains {
                    let _ = drain.await;
                }
                Err(self.not_ready_error(not_ready))
            }
        }
    }

    fn not_ready_error(&self, not_ready: NotReady) -> Error {
        let role = self.role.name();
        let port = self.port;
        match not_ready {
            NotReady::StreamEnded(log) => Error::Readiness {
                role,
                port,
                output: log.render(),
            },
            NotReady::Elapsed(deadline, log) => Error::DeadlineElapsed {
                role,
                port,
                deadline,
                output: log.render(),
            },
            NotReady::Io(source, log) => {
                warn!(role, port, output = %log.render(), "reading output failed");
                Error::Startup { role, port, source }
            }
        }
    }
}

#[async_trait]
impl Supervised for Instance {
    async fn start(&self) -> Result<()> {
        Instance::start(self).await
    }

    async fn stop(&self) -> Result<()> {
        Instance::stop(self).await
    }

    fn is_active(&self) -> bool {
        Instance::is_active(self)
    }

    fn ports(&self) -> Vec<u16> {
        Instance::ports(self)
    }

    fn tls_ports(&self) -> Vec<u16> {
        Instance::tls_ports(self)
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("role", &self.role)
            .field("port", &self.port)
            .field("tls_port", &self.tls_port)
            .field("args", &self.args)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

fn single(port: u16) -> Vec<u16> {
    if port > 0 { vec![port] } else { Vec::new() }
}

/// Forwards lines to `sink` until end of stream, a read error, or shutdown.
async fn drain<R>(
    mut lines: Lines<R>,
    stream: OutputStream,
    label: String,
    shutdown: CancellationToken,
    sink: Arc<dyn DiagnosticSink>,
) where
    R: AsyncBufRead + Unpin,
{
    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            line = lines.next_line() => match line {
                Ok(Some(line)) => sink.line(&label, stream, &line),
                Ok(None) => break,
                Err(e) => {
                    warn!(instance = %label, "stopped draining {stream}: {e}");
                    break;
                }
            },
        }
    }
}

fn register_kill(pid: u32) -> ExitGuard {
    finalizer::register(move || kill_pid(pid))
}

#[cfg(unix)]
fn kill_pid(pid: u32) {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let _ = kill(Pid::from_raw(pid as i32), Signal::SIGKILL);
}

#[cfg(not(unix))]
fn kill_pid(pid: u32) {
    let _ = std::process::Command::new("taskkill")
        .args(["/F", "/PID", &pid.to_string()])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
}
