//! Flow enrichment by combining data from multiple lookups.
//!
//! The three lookups run concurrently against the same candidate and write
//! disjoint fields, so their order does not matter. A failed or timed-out
//! lookup leaves its attribute group empty; [`Enricher::enrich`] itself never
//! fails.

use std::future::Future;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use tunnelwatch_core::{
    is_globally_routable, EnrichedRecord, LookupFailure, LookupKind, LookupResult, RawCandidate,
};
use tunnelwatch_lookup::{Disabled, GeoLookup, OwnershipLookup, ProcessLookup};

/// Default deadline for each lookup
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// An enriched record plus the reasons any lookup came back empty
#[derive(Debug, Clone)]
pub struct Enrichment {
    pub record: EnrichedRecord,
    pub failures: Vec<(LookupKind, LookupFailure)>,
}

impl Enrichment {
    /// Failure of one lookup, if it failed
    #[must_use]
    pub fn failure(&self, kind: LookupKind) -> Option<&LookupFailure> {
        self.failures
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, failure)| failure)
    }
}

/// Builder-style enrichment pipeline with injected lookups
#[derive(Clone)]
pub struct Enricher {
    process: Arc<dyn ProcessLookup>,
    ownership: Arc<dyn OwnershipLookup>,
    geo: Arc<dyn GeoLookup>,
    timeout: Duration,
}

impl Default for Enricher {
    fn default() -> Self {
        Self {
            process: Arc::new(Disabled::new("process lookup not configured")),
            ownership: Arc::new(Disabled::new("ownership lookup not configured")),
            geo: Arc::new(Disabled::new("geolocation not configured")),
            timeout: DEFAULT_LOOKUP_TIMEOUT,
        }
    }
}

impl std::fmt::Debug for Enricher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Enricher")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Enricher {
    /// Create an enricher with every lookup disabled
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the process lookup
    #[must_use]
    pub fn with_process(mut self, lookup: Arc<dyn ProcessLookup>) -> Self {
        self.process = lookup;
        self
    }

    /// Set the ownership lookup
    #[must_use]
    pub fn with_ownership(mut self, lookup: Arc<dyn OwnershipLookup>) -> Self {
        self.ownership = lookup;
        self
    }

    /// Set the geolocation lookup
    #[must_use]
    pub fn with_geo(mut self, lookup: Arc<dyn GeoLookup>) -> Self {
        self.geo = lookup;
        self
    }

    /// Set the per-lookup deadline
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enrich a candidate, discarding failure reasons
    pub async fn enrich(&self, candidate: &RawCandidate) -> EnrichedRecord {
        self.enrich_detailed(candidate).await.record
    }

    /// Enrich a candidate and report which lookups failed and why
    pub async fn enrich_detailed(&self, candidate: &RawCandidate) -> Enrichment {
        let dst = candidate.dst;
        let (exe, owner, location) = tokio::join!(
            self.bounded(self.resolve_process(candidate.pid)),
            self.bounded(routable(dst, self.ownership.owner(dst))),
            self.bounded(routable(dst, self.geo.locate(dst))),
        );

        let mut record = EnrichedRecord::unattributed(candidate);
        let mut failures = Vec::new();
        record.exe = settle(LookupKind::Process, exe, &mut failures);
        record.owner = settle(LookupKind::Ownership, owner, &mut failures);
        record.location = settle(LookupKind::Geolocation, location, &mut failures);

        if !failures.is_empty() {
            let transient = failures.iter().filter(|(_, f)| f.is_transient()).count();
            debug!(
                src = %candidate.src,
                dst = %candidate.dst,
                origin = %candidate.origin,
                transient,
                failures = ?failures,
                "enrichment degraded"
            );
        }

        Enrichment { record, failures }
    }

    async fn resolve_process(&self, pid: Option<u32>) -> LookupResult<String> {
        match pid {
            Some(pid) => self.process.executable(pid).await,
            None => Err(LookupFailure::NotFound("no process id".into())),
        }
    }

    async fn bounded<T>(&self, lookup: impl Future<Output = LookupResult<T>>) -> LookupResult<T> {
        tokio::time::timeout(self.timeout, lookup)
            .await
            .unwrap_or(Err(LookupFailure::Timeout(self.timeout)))
    }
}

async fn routable<T>(
    ip: IpAddr,
    lookup: impl Future<Output = LookupResult<T>>,
) -> LookupResult<T> {
    if is_globally_routable(ip) {
        lookup.await
    } else {
        Err(LookupFailure::NotRoutable(ip))
    }
}

fn settle<T>(
    kind: LookupKind,
    result: LookupResult<T>,
    failures: &mut Vec<(LookupKind, LookupFailure)>,
) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(failure) => {
            failures.push((kind, failure));
            None
        }
    }
}
