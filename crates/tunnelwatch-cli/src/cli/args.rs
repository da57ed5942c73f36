//! Command-line argument definitions using clap.

use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::output::OutputFormat;

/// Teredo tunnel flow monitor
///
/// Reads allowed UDP/3544 flows from the firewall log (and optionally a live
/// capture), attributes them to local processes, resolves the remote ASN and
/// location, and keeps a deduplicated history.
#[derive(Parser, Debug)]
#[command(name = "tunnelwatch")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Host-intelligence API key for geolocation (or set TUNNELWATCH_API_KEY)
    #[arg(short = 'k', long, env = "TUNNELWATCH_API_KEY", global = true, hide_env_values = true)]
    pub api_key: Option<String>,

    /// Configuration file (default: per-user config directory)
    #[arg(short, long, env = "TUNNELWATCH_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Flow database
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Firewall log to read
    #[arg(long, global = true)]
    pub log: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, value_enum)]
    pub output: Option<OutputFormat>,

    /// Increase verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ingest the firewall log once and show the most recent flows
    Refresh(RefreshArgs),

    /// Refresh periodically until interrupted, optionally capturing live
    Watch(WatchArgs),

    /// Show stored flows without ingesting anything
    Flows(FlowsArgs),

    /// List devices on the local network
    ScanLan(ScanLanArgs),

    /// Manage CLI configuration
    Config(ConfigArgs),
}

// ============================================================================
// Shared filter
// ============================================================================

#[derive(Args, Debug, Clone, Default)]
pub struct AsnFilterArgs {
    /// Only show flows to these ASNs (repeatable or comma-separated)
    #[arg(long = "asn", value_delimiter = ',')]
    pub asns: Vec<u32>,
}

// ============================================================================
// Refresh command
// ============================================================================

#[derive(Args, Debug)]
pub struct RefreshArgs {
    #[command(flatten)]
    pub filter: AsnFilterArgs,

    /// Log lines to examine (default from config)
    #[arg(short = 'n', long)]
    pub lines: Option<usize>,
}

// ============================================================================
// Watch command
// ============================================================================

#[derive(Args, Debug)]
pub struct WatchArgs {
    #[command(flatten)]
    pub filter: AsnFilterArgs,

    /// Seconds between refreshes (default from config)
    #[arg(short, long)]
    pub interval: Option<u64>,

    /// Also capture live traffic (needs the live-capture feature)
    #[arg(long)]
    pub capture: bool,

    /// Capture interface (default: first suitable device)
    #[arg(long, requires = "capture")]
    pub interface: Option<String>,
}

// ============================================================================
// Flows command
// ============================================================================

#[derive(Args, Debug)]
pub struct FlowsArgs {
    #[command(flatten)]
    pub filter: AsnFilterArgs,

    /// Most recent records to load (default from config)
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Show flows per minute instead of individual flows
    #[arg(long, conflicts_with = "asns_only")]
    pub per_minute: bool,

    /// Show the ASNs seen in the loaded window
    #[arg(long = "list-asns")]
    pub asns_only: bool,
}

// ============================================================================
// Scan LAN command
// ============================================================================

#[derive(Args, Debug)]
pub struct ScanLanArgs {
    /// Skip reverse DNS names
    #[arg(long)]
    pub no_resolve: bool,

    /// Neighbour table to read (default from config)
    #[arg(long)]
    pub table: Option<PathBuf>,
}

// ============================================================================
// Config command
// ============================================================================

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Set a configuration value
    Set {
        /// Key to set (e.g., api_key, log_path, port)
        key: String,

        /// Value to set
        value: String,
    },

    /// Show config file path
    Path,
}
