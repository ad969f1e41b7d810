//! Binary entry point for dataport.
//!
//! Drives the transfer gateway against a JSON snapshot of the customer store.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow needless_pass_by_value for command functions
#![allow(clippy::needless_pass_by_value)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

mod commands;

use anyhow::Context;
use clap::{Parser, Subcommand};
use commands::{ExportArgs, ImportArgs, TemplateArgs, Workspace};
use dataport::config::DataportConfig;
use dataport::observability;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Dataport - bulk import and export of structured records.
#[derive(Parser)]
#[command(name = "dataport")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true, env = "DATAPORT_CONFIG")]
    config: Option<PathBuf>,

    /// Customer store snapshot file.
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Import records from a file or URL.
    Import(ImportArgs),

    /// Export records to a file, stdout or URL.
    Export(ExportArgs),

    /// Write an import template for a profile.
    Template(TemplateArgs),

    /// Check a payload against a profile without storing anything.
    Validate(ImportArgs),

    /// List registered profiles and their fields.
    Profiles,
}

/// Main entry point.
#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref(), cli.store.clone()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e:#}");
            return ExitCode::FAILURE;
        },
    };

    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    if let Err(e) = observability::init_logging(&logging) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    match run_command(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        },
    }
}

/// Loads the configuration file (explicit or default) and applies overrides.
fn load_config(path: Option<&Path>, store: Option<PathBuf>) -> anyhow::Result<DataportConfig> {
    let config = match path {
        Some(path) => DataportConfig::load_from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => DataportConfig::load_default(),
    };
    let mut config = config.with_env_overrides()?;
    if let Some(store) = store {
        config.store_path = store;
    }
    Ok(config)
}

/// Runs the selected command.
async fn run_command(command: Commands, config: DataportConfig) -> anyhow::Result<()> {
    let workspace = Workspace::open(&config)
        .with_context(|| format!("opening store {}", config.store_path.display()))?;

    match command {
        Commands::Import(args) => commands::cmd_import(&workspace, args).await?,
        Commands::Export(args) => commands::cmd_export(&workspace, args).await?,
        Commands::Template(args) => commands::cmd_template(&workspace, args)?,
        Commands::Validate(args) => commands::cmd_validate(&workspace, args).await?,
        Commands::Profiles => commands::cmd_profiles(&workspace),
    }
    Ok(())
}
