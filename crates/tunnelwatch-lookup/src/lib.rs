//! External lookups consumed by the tunnelwatch enrichment pipeline.
//!
//! Every lookup is fallible and optional. Each client implements one of the
//! lookup traits in [`traits`] so the pipeline can be assembled from real
//! clients in production and from fakes in tests:
//!
//! - [`ProcfsLookup`]: pid to executable path via `/proc`
//! - [`CymruWhois`]: address to ASN and owner via the Team Cymru whois service
//! - [`HostIntelClient`]: address to latitude/longitude via a
//!   Shodan-compatible host API
//!
//! [`NeighborTable`] and [`ReverseDns`] back the "scan LAN" trigger.

#![doc(html_root_url = "https://docs.rs/tunnelwatch-lookup/0.3.0")]

mod config;
mod hostintel;
mod neighbors;
mod process;
mod rdns;
pub mod traits;
mod whois;

pub use config::RateLimitConfig;
pub use hostintel::{
    HostIntelClient, HostIntelClientBuilder, HostSummary,
    DEFAULT_BASE_URL as DEFAULT_HOST_INTEL_URL,
};
pub use neighbors::{parse_arp_table, NeighborTable, DEFAULT_ARP_TABLE};
pub use process::ProcfsLookup;
pub use rdns::ReverseDns;
pub use traits::{Disabled, GeoLookup, OwnershipLookup, ProcessLookup};
pub use tunnelwatch_core::{LookupFailure, LookupResult};
pub use whois::{parse_cymru_response, CymruWhois, DEFAULT_WHOIS_SERVER};
