//! The instrumentation engine seam and the external-process adapter.

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use serde::{Deserialize, Serialize};

use crate::classfile::{ClassFile, ClassFileError};
use crate::classify::{self, ClassFacts};
use crate::database::{ClassDatabase, ClassEntry};
use crate::error::RewriteFailure;
use crate::log_bridge::{self, Log};

/// Flags handed through to the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineOptions {
    pub check: bool,
    pub verbose: bool,
    pub debug: bool,
    pub allow_monitors: bool,
    pub allow_blocking: bool,
}

/// Everything the engine gets to rewrite one class.
#[derive(Clone, Copy)]
pub struct RewriteRequest<'a> {
    pub class_name: &'a str,
    pub bytes: &'a [u8],
    pub entry: &'a ClassEntry,
    pub database: &'a ClassDatabase,
    pub options: &'a EngineOptions,
    pub log: &'a dyn Log,
}

pub trait Engine: Sync {
    /// Reads the suspendability facts of one class file.
    fn analyze(&self, bytes: &[u8]) -> Result<ClassFacts, ClassFileError> {
        classify::analyze(bytes)
    }

    fn rewrite(&self, request: &RewriteRequest<'_>) -> Result<Vec<u8>, RewriteFailure>;
}

/// Analyzes classes but refuses every rewrite, for dry runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassifyOnly;

impl Engine for ClassifyOnly {
    fn rewrite(&self, request: &RewriteRequest<'_>) -> Result<Vec<u8>, RewriteFailure> {
        Err(RewriteFailure::new(format!(
            "Class {} was only classified",
            request.class_name
        )))
    }
}

/// Rejects classes whose suspendable methods hold monitors or make blocking
/// calls, unless the options allow it.
pub fn check_policy(entry: &ClassEntry, options: &EngineOptions) -> Result<(), RewriteFailure> {
    if !options.allow_monitors
        && let Some(method) = entry.monitor_methods.first()
    {
        return Err(RewriteFailure::new(format!(
            "Method {}#{method} is synchronized or enters a monitor; enable allowMonitors to instrument it",
            entry.name
        )));
    }
    if !options.allow_blocking
        && let Some(call) = entry.blocking_calls.first()
    {
        return Err(RewriteFailure::new(format!(
            "Method {}#{} calls blocking method {}; enable allowBlocking to instrument it",
            entry.name, call.method, call.target
        )));
    }
    Ok(())
}

/// Checks that rewritten bytes still form a class file for the same class.
pub fn verify(class_name: &str, bytes: &[u8]) -> Result<(), RewriteFailure> {
    let class = ClassFile::parse(bytes)
        .map_err(|e| RewriteFailure::new(format!("Rewritten class {class_name} is invalid: {e}")))?;
    if class.name != class_name {
        return Err(RewriteFailure::new(format!(
            "Rewritten class is named {} instead of {class_name}",
            class.name
        )));
    }
    Ok(())
}

/// Runs an external instrumentor once per class: the original bytes go to
/// its stdin, the rewritten bytes come back on stdout and stderr lines are
/// forwarded to the log.
#[derive(Debug, Clone)]
pub struct CommandEngine {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandEngine {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn program(&self) -> &std::path::Path {
        &self.program
    }

    fn command(&self, class_name: &str, options: &EngineOptions) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        let flags = [
            (options.check, "--check"),
            (options.verbose, "--verbose"),
            (options.debug, "--debug"),
            (options.allow_monitors, "--allow-monitors"),
            (options.allow_blocking, "--allow-blocking"),
        ];
        for (enabled, flag) in flags {
            if enabled {
                cmd.arg(flag);
            }
        }
        cmd.arg(class_name)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }
}

impl Engine for CommandEngine {
    fn rewrite(&self, request: &RewriteRequest<'_>) -> Result<Vec<u8>, RewriteFailure> {
        check_policy(request.entry, request.options)?;

        let mut child = self
            .command(request.class_name, request.options)
            .spawn()
            .map_err(|e| {
                RewriteFailure::new(format!(
                    "Failed to execute engine {}: {e}",
                    self.program.display()
                ))
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| RewriteFailure::new("Engine stdin is not available"))?;
        let output = std::thread::scope(|scope| {
            let writer = scope.spawn(move || stdin.write_all(request.bytes));
            let output = child.wait_with_output();
            let written = writer.join();
            (output, written)
        });
        let (output, written) = output;
        let output = output
            .map_err(|e| RewriteFailure::new(format!("Failed to wait for engine: {e}")))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        log_bridge::forward_lines(request.log, &stderr);

        if !output.status.success() {
            let detail = stderr
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .map(|l| log_bridge::parse_line(l).1.to_string())
                .unwrap_or_default();
            return Err(RewriteFailure::new(format!(
                "Engine failed ({}): {}",
                output.status,
                detail.trim()
            )));
        }
        // A closed pipe is fine if the engine succeeded without reading everything.
        if let Ok(Err(e)) = written
            && e.kind() != std::io::ErrorKind::BrokenPipe
        {
            return Err(RewriteFailure::new(format!("Failed to send class to engine: {e}")));
        }
        if output.stdout.is_empty() {
            return Err(RewriteFailure::new("Engine produced no output"));
        }
        if request.options.check {
            verify(request.class_name, &output.stdout)?;
        }
        Ok(output.stdout)
    }
}
