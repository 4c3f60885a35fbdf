//! The pipeline: scan, classify, then apply the engine to the work list.

use rayon::prelude::*;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::classpath::ClassPath;
use crate::config::InstrumentConfig;
use crate::database::{ClassDatabase, ClassEntry, DatabaseBuilder, WorkListEntry};
use crate::engine::{Engine, RewriteRequest};
use crate::error::{InstrumentError, Result, RewriteFailure};
use crate::filter::should_instrument;
use crate::log_bridge::Log;
use crate::report::{Outcome, RunReport, hash_bytes};
use crate::scan::{ClassFileRef, ClassScanner};

const TEMP_ATTEMPTS: u32 = 64;

/// What happens to a class whose rewrite failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Leaving the class unrewritten would break it at run time.
    Fatal,
    /// Nothing depends on the rewrite; keep the original bytes.
    Tolerate,
}

pub fn fallback_policy(has_suspend_points: bool) -> FailurePolicy {
    if has_suspend_points {
        FailurePolicy::Fatal
    } else {
        FailurePolicy::Tolerate
    }
}

pub struct Pipeline<'a, E: Engine + ?Sized> {
    config: &'a InstrumentConfig,
    engine: &'a E,
    log: &'a dyn Log,
}

impl<'a, E: Engine + ?Sized> Pipeline<'a, E> {
    pub fn new(config: &'a InstrumentConfig, engine: &'a E, log: &'a dyn Log) -> Self {
        Self {
            config,
            engine,
            log,
        }
    }

    /// Scans and classifies the build directory. No file is modified.
    pub fn classify(&self) -> Result<ClassDatabase> {
        let scanner = ClassScanner::new(&self.config.build_directory)?;
        let root = scanner.root().to_path_buf();
        let files: Vec<ClassFileRef> = scanner.collect();
        self.log.debug(format_args!(
            "Found {} class files under {}",
            files.len(),
            root.display()
        ));

        let analyzed: Vec<_> = files
            .into_par_iter()
            .map(|file| {
                let analyzed = fs::read(&file.path)
                    .map(|bytes| self.engine.analyze(&bytes))
                    .map_err(|e| InstrumentError::io(&file.path, e));
                (file, analyzed)
            })
            .collect();

        let classpath = ClassPath::new(
            std::iter::once(root.clone()).chain(self.config.classpath.iter().cloned()),
        );
        let lists = classpath.suspendable_lists();
        let mut builder = DatabaseBuilder::new(classpath, lists);
        for (file, analyzed) in analyzed {
            builder.note_scanned();
            match analyzed? {
                Ok(facts) => {
                    let name = facts.name.clone();
                    if !builder.record(file, facts) {
                        self.log.debug(format_args!(
                            "Class {name} found more than once; keeping the first copy"
                        ));
                    }
                }
                Err(e) => self.log.warn(format_args!(
                    "Skipping unreadable class file {}: {e}",
                    file.path.display()
                )),
            }
        }

        let database = builder.finish();
        if self.config.options.verbose {
            for entry in database.entries() {
                self.log_classification(entry);
            }
        }
        Ok(database)
    }

    /// Runs the whole pipeline. Classes rewritten before a fatal error stay
    /// rewritten.
    pub fn run(&self) -> Result<RunReport> {
        let start = Instant::now();
        self.log.info(format_args!("Instrumenting fiber classes..."));

        let database = self.classify()?;
        let work_list = database.work_list();
        self.log.info(format_args!(
            "Instrumenting {} classes...",
            work_list.len()
        ));

        let mut report = RunReport::new(
            &self.config.build_directory,
            &database,
            work_list.iter().map(|w| w.name.clone()).collect(),
        );
        for entry in &work_list {
            let outcome = self.apply(&database, entry)?;
            report.push(&entry.name, &entry.file.path, outcome);
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        Ok(report)
    }

    /// Instruments one work-list entry in place.
    pub fn apply(&self, database: &ClassDatabase, entry: &WorkListEntry) -> Result<Outcome> {
        let name = entry.name.as_str();
        if !self.config.inclusions.includes(name) {
            self.log.info(format_args!("class {name} was excluded"));
            return Ok(Outcome::Excluded);
        }
        if !should_instrument(name) {
            self.log.info(format_args!("class {name} is never instrumented, skipping"));
            return Ok(Outcome::Skipped);
        }
        let class = database
            .get(name)
            .ok_or_else(|| InstrumentError::Unclassified(name.to_string()))?;
        if !class.requires_instrumentation() {
            self.log.info(format_args!(
                "class {name} is {:?}, skipping",
                class.classification
            ));
            return Ok(Outcome::Skipped);
        }

        let path = &entry.file.path;
        let original = fs::read(path).map_err(|e| InstrumentError::io(path, e))?;
        self.log.info(format_args!("TRANSFORM: {name} request"));
        if self.config.options.verbose {
            for point in &class.suspend_points {
                self.log.info(format_args!(
                    "  suspend point in {}: {} @{}",
                    point.method, point.target, point.offset
                ));
            }
        }

        let request = RewriteRequest {
            class_name: name,
            bytes: &original,
            entry: class,
            database,
            options: &self.config.options,
            log: self.log,
        };
        match self.engine.rewrite(&request) {
            Ok(rewritten) => {
                replace_file(path, &rewritten)?;
                Ok(Outcome::Rewritten {
                    before: hash_bytes(&original),
                    after: hash_bytes(&rewritten),
                })
            }
            Err(failure) => self.on_failure(class, failure),
        }
    }

    fn on_failure(&self, class: &ClassEntry, failure: RewriteFailure) -> Result<Outcome> {
        match fallback_policy(class.has_suspend_points()) {
            FailurePolicy::Fatal => {
                self.log.error(
                    &format!("Unable to instrument class {}", class.name),
                    &failure,
                );
                Err(InstrumentError::Rewrite {
                    class: class.name.clone(),
                    cause: failure,
                })
            }
            FailurePolicy::Tolerate => {
                if !class.problematic {
                    self.log.debug(format_args!(
                        "Unable to instrument class {}: {failure}",
                        class.name
                    ));
                }
                Ok(Outcome::ToleratedFailure {
                    reason: failure.message,
                })
            }
        }
    }

    fn log_classification(&self, entry: &ClassEntry) {
        if entry.problematic {
            return;
        }
        self.log.info(format_args!(
            "{}: {:?}",
            entry.name, entry.classification
        ));
        for point in &entry.suspend_points {
            self.log.info(format_args!(
                "  {} calls suspendable {}",
                point.method, point.target
            ));
            if !entry.suspendable_methods.contains(&point.method) {
                self.log.warn(format_args!(
                    "Method {}#{} calls suspendable {} but is not marked suspendable",
                    entry.name, point.method, point.target
                ));
            }
        }
    }
}

/// Replaces `path` with `bytes` through a sibling temp file so that readers
/// never see a partially written class. The replacement keeps the original
/// file's permissions; errors name `path`, never the temp file.
fn replace_file(path: &Path, bytes: &[u8]) -> Result<()> {
    let permissions = fs::metadata(path)
        .map_err(|e| InstrumentError::io(path, e))?
        .permissions();
    let (tmp, mut file) = create_sibling_temp(path).map_err(|e| InstrumentError::io(path, e))?;

    let written = file
        .write_all(bytes)
        .and_then(|()| file.sync_all())
        .and_then(|()| fs::set_permissions(&tmp, permissions));
    drop(file);
    if let Err(e) = written.and_then(|()| fs::rename(&tmp, path)) {
        let _ = fs::remove_file(&tmp);
        return Err(InstrumentError::io(path, e));
    }
    Ok(())
}

/// Creates a new temp file next to `path`, never reusing an existing name.
fn create_sibling_temp(path: &Path) -> io::Result<(PathBuf, fs::File)> {
    for attempt in 0..TEMP_ATTEMPTS {
        let mut name = path.as_os_str().to_os_string();
        name.push(format!(".{}.{attempt}.tmp", std::process::id()));
        let tmp = PathBuf::from(name);
        match fs::OpenOptions::new().write(true).create_new(true).open(&tmp) {
            Ok(file) => return Ok((tmp, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }
    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free temp file name next to {}", path.display()),
    ))
}
