//! # tunnelwatch-cli
//!
//! Command-line front-end for the tunnelwatch flow monitor.
//!
//! ## Features
//!
//! - **Refresh**: ingest the firewall log and show the latest flows
//! - **Watch**: periodic refresh, optionally alongside live capture
//! - **Flows**: read-only view with ASN filtering, per-minute counts and the ASN list
//! - **Scan LAN**: neighbour-table device discovery
//! - **Multiple output formats**: Pretty tables, JSON, CSV, YAML

pub mod cli;
pub mod config;
pub mod logging;
pub mod output;

pub use cli::run;
