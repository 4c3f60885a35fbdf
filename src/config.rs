use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

use crate::cli::{Cli, RunArgs};
use crate::engine::{CommandEngine, EngineOptions};
use crate::error::InstrumentError;
use crate::filter::InclusionPolicy;

pub const CONFIG_ENV: &str = "FIBER_INSTRUMENT_CONFIG";
pub const ENGINE_ENV: &str = "FIBER_INSTRUMENT_ENGINE";

/// Settings for one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentConfig {
    pub build_directory: PathBuf,
    pub options: EngineOptions,
    pub inclusions: InclusionPolicy,
    pub classpath: Vec<PathBuf>,
}

impl InstrumentConfig {
    pub fn new(build_directory: impl Into<PathBuf>) -> Self {
        Self {
            build_directory: build_directory.into(),
            options: EngineOptions::default(),
            inclusions: InclusionPolicy::default(),
            classpath: Vec::new(),
        }
    }
}

/// The JSON configuration file. Keys follow the build-plugin parameter
/// names; relative paths are resolved against the file's directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FileConfig {
    pub build_directory: Option<PathBuf>,
    pub check: Option<bool>,
    pub verbose: Option<bool>,
    pub debug: Option<bool>,
    pub allow_monitors: Option<bool>,
    pub allow_blocking: Option<bool>,
    #[serde(default)]
    pub inclusions: Vec<String>,
    #[serde(default)]
    pub classpath: Vec<PathBuf>,
    pub engine: Option<PathBuf>,
    #[serde(default)]
    pub engine_args: Vec<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut config: FileConfig = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        let base = path.parent().unwrap_or(Path::new(""));
        config.build_directory = config.build_directory.map(|p| base.join(p));
        config.classpath = config.classpath.iter().map(|p| base.join(p)).collect();
        config.engine = config.engine.map(|p| resolve_program(base, p));
        Ok(config)
    }
}

/// Engine programs given as bare names are looked up on `PATH`, so only
/// paths with a directory component are anchored to the config file.
fn resolve_program(base: &Path, program: PathBuf) -> PathBuf {
    if program.components().count() > 1 {
        base.join(program)
    } else {
        program
    }
}

pub fn resolve_config_path(cli: &Cli) -> Option<PathBuf> {
    if let Some(p) = cli.config.clone() {
        return Some(p);
    }
    env::var_os(CONFIG_ENV).map(PathBuf::from)
}

pub fn load_file_config(cli: &Cli) -> Result<FileConfig> {
    match resolve_config_path(cli) {
        Some(path) => FileConfig::load(&path),
        None => Ok(FileConfig::default()),
    }
}

/// Merges command-line arguments over the file configuration. Flags set on
/// either side are enabled; list options from both sides are combined.
pub fn resolve_instrument_config(args: &RunArgs, file: &FileConfig) -> Result<InstrumentConfig> {
    let build_directory = args
        .build_dir
        .clone()
        .or_else(|| file.build_directory.clone())
        .ok_or_else(|| {
            InstrumentError::Config(
                "Missing build directory (pass BUILD_DIR or set buildDirectory in the config file)"
                    .to_string(),
            )
        })?;

    let options = EngineOptions {
        check: args.check || file.check.unwrap_or(false),
        verbose: args.verbose || file.verbose.unwrap_or(false),
        debug: args.debug || file.debug.unwrap_or(false),
        allow_monitors: args.allow_monitors || file.allow_monitors.unwrap_or(false),
        allow_blocking: args.allow_blocking || file.allow_blocking.unwrap_or(false),
    };

    let mut inclusions = InclusionPolicy::new(&file.inclusions);
    inclusions.extend(&args.include);

    let mut classpath = file.classpath.clone();
    classpath.extend(args.classpath.iter().cloned());

    Ok(InstrumentConfig {
        build_directory,
        options,
        inclusions,
        classpath,
    })
}

pub fn resolve_engine(
    program: Option<&Path>,
    engine_args: &[String],
    file: &FileConfig,
) -> Result<CommandEngine> {
    let program = match program {
        Some(p) => p.to_path_buf(),
        None => match env::var_os(ENGINE_ENV) {
            Some(p) => PathBuf::from(p),
            None => file.engine.clone().ok_or_else(|| {
                InstrumentError::Config(format!(
                    "No instrumentation engine configured (use --engine, {ENGINE_ENV} or the engine config key)"
                ))
            })?,
        },
    };

    let mut args = file.engine_args.clone();
    args.extend(engine_args.iter().cloned());
    Ok(CommandEngine::new(program, args))
}
