//! Core types and errors for the tunnelwatch flow monitor.
//!
//! This crate provides the foundational types shared by every other crate:
//!
//! - **Types**: [`RawCandidate`], [`EnrichedRecord`], [`Device`] and the
//!   attribute groups ([`NetworkOwner`], [`GeoPoint`]) that keep paired
//!   fields together
//! - **Errors**: [`MonitorError`] for caller-visible failures and
//!   [`LookupFailure`] for contained enrichment failures
//!
//! # Example
//!
//! ```rust,ignore
//! use tunnelwatch_core::{EnrichedRecord, RawCandidate};
//!
//! fn describe(record: &EnrichedRecord) {
//!     println!("{} -> {} asn={:?}", record.src, record.dst, record.asn());
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/tunnelwatch-core/0.3.0")]

mod error;
pub mod types;

pub use error::{LookupFailure, LookupKind, LookupResult, MonitorError, Result};
pub use types::*;
