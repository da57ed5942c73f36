//! CLI argument parsing and command dispatch.

pub mod args;
pub mod commands;

use anyhow::Result;
use args::{Cli, Commands};
use clap::Parser;

use crate::config::Config;
use crate::logging;
use crate::output::OutputFormat;

/// Run the CLI application.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }
    logging::init(cli.verbose, !cli.no_color);

    // Load configuration, then apply command-line overrides
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(key) = cli.api_key {
        config.monitor.host_intel.api_key = Some(key);
    }
    if let Some(db) = cli.db {
        config.monitor.database = db;
    }
    if let Some(log) = cli.log {
        config.monitor.log_path = log;
    }

    let output_format = cli
        .output
        .or(config.output_format)
        .unwrap_or(OutputFormat::Pretty);

    let ctx = commands::Context {
        config,
        config_path: cli.config,
        output_format,
    };

    match cli.command {
        Commands::Refresh(args) => commands::refresh::execute(ctx, args).await,
        Commands::Watch(args) => commands::watch::execute(ctx, args).await,
        Commands::Flows(args) => commands::flows::execute(ctx, args).await,
        Commands::ScanLan(args) => commands::scan_lan::execute(ctx, args).await,
        Commands::Config(args) => commands::config::execute(ctx, args).await,
    }
}
