//! Command implementations.

pub mod config;
pub mod flows;
pub mod refresh;
pub mod scan_lan;
pub mod watch;

use anyhow::{Context as _, Result};
use std::path::PathBuf;
use tunnelwatch::{FlowFilter, MonitorConfig};

use crate::cli::args::AsnFilterArgs;
use crate::config::Config;
use crate::output::OutputFormat;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Loaded configuration with command-line overrides applied
    pub config: Config,

    /// Explicit config file, if one was given
    pub config_path: Option<PathBuf>,

    /// Output format
    pub output_format: OutputFormat,
}

impl Context {
    /// Monitor settings, with a relative database path placed in the
    /// per-user data directory.
    pub fn monitor_config(&self) -> Result<MonitorConfig> {
        let mut monitor = self.config.monitor.clone();
        if monitor.database.is_relative() {
            let dir = Config::data_dir()?;
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("creating {}", dir.display()))?;
            monitor.database = dir.join(&monitor.database);
        }
        tracing::debug!(database = %monitor.database.display(), log = %monitor.log_path.display(), "monitor settings");
        Ok(monitor)
    }
}

impl AsnFilterArgs {
    /// No `--asn` means every flow.
    pub fn to_filter(&self) -> FlowFilter {
        if self.asns.is_empty() {
            FlowFilter::any()
        } else {
            FlowFilter::asns(self.asns.iter().copied())
        }
    }
}
