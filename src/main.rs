use anyhow::{Context, Result};
use clap::Parser;
use fiber_instrument::cli::{Cli, Commands, OutputFormat};
use fiber_instrument::config::{load_file_config, resolve_engine, resolve_instrument_config};
use fiber_instrument::engine::ClassifyOnly;
use fiber_instrument::instrument::Pipeline;
use fiber_instrument::log_bridge::HostLog;
use fiber_instrument::report::ClassificationReport;
use serde::Serialize;

fn main() -> Result<()> {
    let cli = parse_cli()?;
    let file = load_file_config(&cli)?;

    match cli.command.clone() {
        Commands::Instrument {
            run,
            engine,
            engine_args,
        } => {
            let config = resolve_instrument_config(&run, &file)?;
            init_logging(config.options.debug);
            let engine = resolve_engine(engine.as_deref(), &engine_args, &file)?;
            let report = Pipeline::new(&config, &engine, &HostLog)
                .run()
                .with_context(|| {
                    format!(
                        "Instrumenting classes in {}",
                        config.build_directory.display()
                    )
                })?;
            write_output(&report, cli.format, || report.to_text())?;
        }
        Commands::Classify { run } => {
            let config = resolve_instrument_config(&run, &file)?;
            init_logging(config.options.debug);
            let database = Pipeline::new(&config, &ClassifyOnly, &HostLog)
                .classify()
                .with_context(|| {
                    format!(
                        "Classifying classes in {}",
                        config.build_directory.display()
                    )
                })?;
            let report = ClassificationReport::new(&config.build_directory, &database);
            write_output(&report, cli.format, || report.to_text())?;
        }
    }

    Ok(())
}

fn parse_cli() -> Result<Cli> {
    let args: Vec<String> = std::env::args().collect();
    Ok(Cli::parse_from(rewrite_args_for_implicit_instrument(args)))
}

/// Inserts `instrument` when no subcommand follows the global options, so
/// `fiber-instrument target/classes` works.
fn rewrite_args_for_implicit_instrument(mut args: Vec<String>) -> Vec<String> {
    let subcommands = ["instrument", "classify", "help"];
    let passthrough = ["-h", "--help", "-V", "--version"];

    let mut idx = 1usize;
    while idx < args.len() {
        let a = args[idx].as_str();
        if a == "--config" || a == "--format" || a == "-f" {
            idx += 2;
            continue;
        }
        if a.starts_with("--config=") || a.starts_with("--format=") {
            idx += 1;
            continue;
        }
        break;
    }

    let idx = idx.min(args.len());
    let explicit = args
        .get(idx)
        .is_some_and(|t| subcommands.contains(&t.as_str()) || passthrough.contains(&t.as_str()));
    if !explicit {
        args.insert(idx, "instrument".to_string());
    }

    args
}

fn init_logging(debug: bool) {
    if std::env::var_os("RUST_LOG").is_some() {
        let _ = env_logger::try_init();
        return;
    }
    let level = if debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    let _ = env_logger::Builder::new()
        .filter_level(level)
        .target(env_logger::Target::Stderr)
        .try_init();
}

fn write_output<T: Serialize>(
    value: &T,
    format: OutputFormat,
    text: impl FnOnce() -> String,
) -> Result<()> {
    let content = match format {
        OutputFormat::Json => serde_json::to_string_pretty(value)?,
        OutputFormat::Text => text(),
    };
    print!("{content}");
    if !content.ends_with('\n') {
        println!();
    }
    Ok(())
}
