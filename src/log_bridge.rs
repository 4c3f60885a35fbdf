//! The logging seam between the pipeline, the instrumentation engine and the
//! host's logger.
//!
//! Pipeline code and engines log through [`Log`], a four-level sink with an
//! extra error-with-cause call. [`HostLog`] forwards to the `log` facade,
//! which the binary backs with `env_logger`.

use std::error::Error;
use std::fmt;
use std::sync::Mutex;

pub const TARGET: &str = "fiber_instrument";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Debug,
    Info,
    Warning,
    Error,
}

impl From<Level> for log::Level {
    fn from(level: Level) -> Self {
        match level {
            Level::Debug => log::Level::Debug,
            Level::Info => log::Level::Info,
            Level::Warning => log::Level::Warn,
            Level::Error => log::Level::Error,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warning => "WARNING",
            Level::Error => "ERROR",
        })
    }
}

pub trait Log: Sync {
    fn log(&self, level: Level, message: fmt::Arguments<'_>);

    fn error(&self, message: &str, cause: &(dyn Error + 'static));

    fn debug(&self, message: fmt::Arguments<'_>) {
        self.log(Level::Debug, message);
    }

    fn info(&self, message: fmt::Arguments<'_>) {
        self.log(Level::Info, message);
    }

    fn warn(&self, message: fmt::Arguments<'_>) {
        self.log(Level::Warning, message);
    }
}

/// Forwards to the process-wide `log` logger.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostLog;

impl Log for HostLog {
    fn log(&self, level: Level, message: fmt::Arguments<'_>) {
        log::log!(target: TARGET, log::Level::from(level), "{message}");
    }

    fn error(&self, message: &str, cause: &(dyn Error + 'static)) {
        log::error!(target: TARGET, "{message}: {}", render_cause(cause));
    }
}

/// Keeps every message in memory, for embedding callers that collect
/// diagnostics themselves.
#[derive(Debug, Default)]
pub struct MemoryLog {
    records: Mutex<Vec<(Level, String)>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<(Level, String)> {
        self.records
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn contains(&self, level: Level, needle: &str) -> bool {
        self.records()
            .iter()
            .any(|(l, m)| *l == level && m.contains(needle))
    }

    fn push(&self, level: Level, message: String) {
        if let Ok(mut records) = self.records.lock() {
            records.push((level, message));
        }
    }
}

impl Log for MemoryLog {
    fn log(&self, level: Level, message: fmt::Arguments<'_>) {
        self.push(level, message.to_string());
    }

    fn error(&self, message: &str, cause: &(dyn Error + 'static)) {
        self.push(Level::Error, format!("{message}: {}", render_cause(cause)));
    }
}

/// Renders an error and its sources as `outer: inner: root`.
pub fn render_cause(cause: &(dyn Error + 'static)) -> String {
    let mut out = cause.to_string();
    let mut source = cause.source();
    while let Some(err) = source {
        out.push_str(": ");
        out.push_str(&err.to_string());
        source = err.source();
    }
    out
}

/// Splits an engine's diagnostic output into leveled messages. Lines
/// prefixed with `DEBUG:`, `INFO:`, `WARNING:`/`WARN:` or `ERROR:` keep
/// that level; anything else is debug output.
pub fn parse_line(line: &str) -> (Level, &str) {
    const PREFIXES: [(&str, Level); 5] = [
        ("DEBUG:", Level::Debug),
        ("INFO:", Level::Info),
        ("WARNING:", Level::Warning),
        ("WARN:", Level::Warning),
        ("ERROR:", Level::Error),
    ];
    for (prefix, level) in PREFIXES {
        if let Some(rest) = line.strip_prefix(prefix) {
            return (level, rest.trim_start());
        }
    }
    (Level::Debug, line)
}

pub fn forward_lines(log: &dyn Log, output: &str) {
    for line in output.lines().filter(|l| !l.trim().is_empty()) {
        let (level, message) = parse_line(line);
        log.log(level, format_args!("{message}"));
    }
}
