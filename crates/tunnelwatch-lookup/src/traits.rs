//! Lookup seams of the enrichment pipeline.

use async_trait::async_trait;
use std::net::IpAddr;
use tunnelwatch_core::{GeoPoint, LookupFailure, LookupResult, NetworkOwner};

/// Resolves a local process id to its executable path
#[async_trait]
pub trait ProcessLookup: Send + Sync {
    /// Executable path of `pid`, or why it could not be resolved
    async fn executable(&self, pid: u32) -> LookupResult<String>;
}

/// Resolves an address to the autonomous system that announces it
#[async_trait]
pub trait OwnershipLookup: Send + Sync {
    /// ASN and owner name of `ip`
    async fn owner(&self, ip: IpAddr) -> LookupResult<NetworkOwner>;
}

/// Resolves an address to an approximate position
#[async_trait]
pub trait GeoLookup: Send + Sync {
    /// Latitude and longitude of `ip`
    async fn locate(&self, ip: IpAddr) -> LookupResult<GeoPoint>;
}

/// A lookup that is switched off. Every call fails with
/// [`LookupFailure::Unavailable`].
#[derive(Debug, Clone)]
pub struct Disabled {
    reason: String,
}

impl Disabled {
    /// Create a disabled lookup with the given reason
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl ProcessLookup for Disabled {
    async fn executable(&self, _pid: u32) -> LookupResult<String> {
        Err(LookupFailure::Unavailable(self.reason.clone()))
    }
}

#[async_trait]
impl OwnershipLookup for Disabled {
    async fn owner(&self, _ip: IpAddr) -> LookupResult<NetworkOwner> {
        Err(LookupFailure::Unavailable(self.reason.clone()))
    }
}

#[async_trait]
impl GeoLookup for Disabled {
    async fn locate(&self, _ip: IpAddr) -> LookupResult<GeoPoint> {
        Err(LookupFailure::Unavailable(self.reason.clone()))
    }
}
