//! Teredo flow ingestion, enrichment, storage and querying.
//!
//! Two independent sources feed the same pipeline:
//!
//! - [`FirewallLog`] tails a firewall log on every refresh trigger
//! - a [`PacketSource`] is read continuously by the capture task
//!   ([`FlowMonitor::spawn_capture`]); [`PcapSource`] is the libpcap-backed
//!   source behind the `live-capture` feature
//!
//! Both hand [`RawCandidate`](tunnelwatch_core::RawCandidate)s to the
//! [`Enricher`], and the results land in the [`FlowStore`], which deduplicates
//! on (timestamp, src, dst, pid). The query layer turns the most recent window
//! into a [`FlowSnapshot`] for the front-end.
//!
//! # Example
//!
//! ```rust,ignore
//! use tunnelwatch_monitor::{FlowFilter, FlowMonitor, MonitorConfig};
//!
//! let monitor = FlowMonitor::from_config(MonitorConfig::default())?;
//! let report = monitor.refresh(&FlowFilter::any()).await?;
//! println!("{} new flows", report.ingest.inserted);
//! ```

#![doc(html_root_url = "https://docs.rs/tunnelwatch-monitor/0.3.0")]

pub mod capture;
mod config;
mod enrichment;
pub mod logfile;
mod monitor;
pub mod query;
mod store;

#[cfg(feature = "live-capture")]
pub use capture::PcapSource;
pub use capture::{CaptureStats, LinkType, NextFrame, PacketSource};
pub use config::{HostIntelConfig, MonitorConfig, TEREDO_PORT};
pub use enrichment::{Enricher, Enrichment, DEFAULT_LOOKUP_TIMEOUT};
pub use logfile::{FirewallLog, LogBatch, LogEntry};
pub use monitor::{FlowMonitor, IngestReport, RefreshReport};
pub use query::{FlowFilter, FlowSnapshot, MinuteBucket, RefreshCycle, RefreshPhase};
pub use store::{FlowStore, InsertOutcome};
