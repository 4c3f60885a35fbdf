use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "fiber-instrument", version)]
#[command(about = "Instrument compiled classes ahead of time so their suspendable methods can run in fibers")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Json, global = true)]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Classify every class under BUILD_DIR and rewrite the ones that need it.
    Instrument {
        #[command(flatten)]
        run: RunArgs,

        #[arg(long, value_name = "PROGRAM")]
        engine: Option<PathBuf>,

        #[arg(long = "engine-arg", value_name = "ARG", allow_hyphen_values = true)]
        engine_args: Vec<String>,
    },
    /// Classify every class under BUILD_DIR and print the work list without
    /// touching any file.
    Classify {
        #[command(flatten)]
        run: RunArgs,
    },
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    #[arg(value_name = "BUILD_DIR")]
    pub build_dir: Option<PathBuf>,

    #[arg(long)]
    pub check: bool,

    #[arg(long)]
    pub verbose: bool,

    #[arg(long)]
    pub debug: bool,

    #[arg(long)]
    pub allow_monitors: bool,

    #[arg(long)]
    pub allow_blocking: bool,

    #[arg(long = "include", value_name = "PREFIX")]
    pub include: Vec<String>,

    #[arg(long, value_name = "PATH")]
    pub classpath: Vec<PathBuf>,
}

#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Text,
}
