//! Readiness detection on a child's standard output.
//!
//! The wait reads line by line until a line matches the instance's
//! [`ReadyPattern`]. Every line seen is kept in a [`StartupLog`] so a failed
//! start can report exactly what the process printed.

use std::time::Duration;
use tokio::io::{AsyncBufRead, Lines};

/// Case-insensitive phrases that mark a process as ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadyPattern {
    phrases: &'static [&'static str],
}

/// Server: `* Ready to accept connections` (any case, any prefix).
pub const SERVER_READY: ReadyPattern = ReadyPattern::new(&["ready to accept connections"]);

/// Monitor: `Sentinel runid is ...` on old releases, `Sentinel ID is ...` on new ones.
pub const MONITOR_READY: ReadyPattern = ReadyPattern::new(&["sentinel runid is", "sentinel id is"]);

impl ReadyPattern {
    /// Phrases must be lowercase.
    pub const fn new(phrases: &'static [&'static str]) -> Self {
        Self { phrases }
    }

    /// Returns true if `line` contains any of the phrases, ignoring case.
    pub fn matches(&self, line: &str) -> bool {
        let line = line.to_lowercase();
        self.phrases.iter().any(|phrase| line.contains(phrase))
    }
}

/// How long `start()` may wait for the ready line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Deadline {
    /// Wait until the ready line or end of output.
    #[default]
    Infinite,
    /// Give up after the duration and reclaim the child.
    After(Duration),
}

impl Deadline {
    pub fn after(duration: Duration) -> Self {
        Self::After(duration)
    }

    pub fn duration(self) -> Option<Duration> {
        match self {
            Self::Infinite => None,
            Self::After(duration) => Some(duration),
        }
    }
}

impl From<Option<Duration>> for Deadline {
    fn from(duration: Option<Duration>) -> Self {
        duration.map_or(Self::Infinite, Self::After)
    }
}

/// Output accumulated while waiting for readiness.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartupLog {
    lines: Vec<String>,
}

impl StartupLog {
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Renders every line, each preceded by a newline.
    pub fn render(&self) -> String {
        self.lines.iter().fold(String::new(), |mut out, line| {
            out.push('\n');
            out.push_str(line);
            out
        })
    }

    fn push(&mut self, line: String) {
        self.lines.push(line);
    }
}

/// Why a readiness wait ended without a ready line.
#[derive(Debug)]
pub enum NotReady {
    /// Output ended first.
    StreamEnded(StartupLog),
    /// The deadline passed first.
    Elapsed(Duration, StartupLog),
    /// Reading the output failed.
    Io(std::io::Error, StartupLog),
}

/// Reads `lines` until one matches `pattern`, the stream ends, or `deadline` passes.
///
/// On success the reader is positioned just after the ready line, so the
/// rest of the output can be drained by the caller.
pub async fn await_ready<R>(
    lines: &mut Lines<R>,
    pattern: &ReadyPattern,
    deadline: Deadline,
) -> Result<StartupLog, NotReady>
where
    R: AsyncBufRead + Unpin,
{
    let mut log = StartupLog::default();

    let outcome = match deadline.duration() {
        None => scan(lines, pattern, &mut log).await,
        Some(limit) => {
            let timed = tokio::time::timeout(limit, scan(lines, pattern, &mut log)).await;
            match timed {
                Ok(outcome) => outcome,
                Err(_) => return Err(NotReady::Elapsed(limit, log)),
            }
        }
    };

    match outcome {
        Ok(true) => Ok(log),
        Ok(false) => Err(NotReady::StreamEnded(log)),
        Err(e) => Err(NotReady::Io(e, log)),
    }
}

async fn scan<R>(
    lines: &mut Lines<R>,
    pattern: &ReadyPattern,
    log: &mut StartupLog,
) -> std::io::Result<bool>
where
    R: AsyncBufRead + Unpin,
{
    while let Some(line) = lines.next_line().await? {
        let ready = pattern.matches(&line);
        log.push(line);
        if ready {
            return Ok(true);
        }
    }
    Ok(false)
}
