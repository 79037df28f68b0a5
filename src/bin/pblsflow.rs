//! pblsflow CLI Binary
//!
//! Command-line interface for the pblsflow orchestrator.

use clap::Parser;
use pblsflow::cli::{Cli, RunContext};
use pblsflow::config::ConfigLoader;
use pblsflow::error::OrchestratorError;
use pblsflow::logging::{init_logging, LoggingConfig};
use std::process;
use tracing::{error, info};

fn main() {
    let cli = Cli::parse();

    let logging_config = match build_logging_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", pblsflow::cli::map_error(&e));
            process::exit(1);
        }
    };
    if let Err(e) = init_logging(&logging_config) {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(1);
    }

    info!("pblsflow starting");

    let context = match RunContext::new(cli.workspace.clone(), cli.config.clone(), cli.dry_run) {
        Ok(ctx) => ctx,
        Err(e) => {
            error!("Error loading configuration: {}", e);
            eprintln!("{}", pblsflow::cli::map_error(&e));
            process::exit(1);
        }
    };

    match context.execute(&cli.command) {
        Ok(output) => {
            info!("Command completed successfully");
            if !output.is_empty() {
                println!("{}", output);
            }
        }
        Err(e) => {
            error!("Command failed: {}", e);
            eprintln!("{}", pblsflow::cli::map_error(&e));
            process::exit(1);
        }
    }
}

/// Precedence: CLI flags, then `PBLSFLOW_LOG*` variables, then the config
/// file, then defaults. A config that fails to load falls back to defaults
/// here; the error surfaces when the run context loads it.
fn build_logging_config(cli: &Cli) -> Result<LoggingConfig, OrchestratorError> {
    let loaded = match cli.config {
        Some(ref path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(&cli.workspace),
    };
    let mut config = loaded.map(|c| c.logging).unwrap_or_default().with_env_overrides()?;

    if cli.verbose {
        config.level = "debug".to_string();
    }
    if let Some(ref level) = cli.log_level {
        config.level = level.clone();
    }
    if let Some(ref format) = cli.log_format {
        config.format = format.parse()?;
    }
    if let Some(ref output) = cli.log_output {
        config.output = output.parse()?;
    }
    if let Some(ref file) = cli.log_file {
        config.file = file.clone();
    }
    if config.file.is_relative() {
        config.file = cli.workspace.join(&config.file);
    }
    Ok(config)
}
