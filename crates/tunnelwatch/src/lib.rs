//! Teredo tunnel flow monitor.
//!
//! Watches outbound UDP/3544 flows from a firewall log and (optionally) a
//! live capture, attributes each flow to a local process, resolves the
//! destination's ASN and approximate location, and keeps a deduplicated
//! history in SQLite.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use tunnelwatch::{FlowFilter, FlowMonitor, MonitorConfig};
//!
//! #[tokio::main]
//! async fn main() -> tunnelwatch::Result<()> {
//!     let config = MonitorConfig::load("tunnelwatch.toml".as_ref())?;
//!     let monitor = FlowMonitor::from_config(config)?;
//!
//!     let report = monitor.refresh(&FlowFilter::any()).await?;
//!     for record in &report.snapshot.records {
//!         println!("{} -> {} {:?}", record.src, record.dst, record.exe);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - `default` - Uses rustls for TLS
//! - `rustls` - Use rustls for TLS (recommended)
//! - `native-tls` - Use system native TLS
//! - `live-capture` - libpcap packet source (`PcapSource`)

#![doc(html_root_url = "https://docs.rs/tunnelwatch/0.3.0")]

// Re-export core types
pub use tunnelwatch_core::*;

// Re-export lookups
pub use tunnelwatch_lookup as lookup;
pub use tunnelwatch_lookup::{
    CymruWhois, Disabled, GeoLookup, HostIntelClient, NeighborTable, OwnershipLookup,
    ProcessLookup, ProcfsLookup, ReverseDns,
};

// Re-export the monitor
pub use tunnelwatch_monitor::*;

// Re-export runtime for convenience
pub use serde;
pub use serde_json;
pub use tokio;
pub use tokio_util::sync::CancellationToken;
