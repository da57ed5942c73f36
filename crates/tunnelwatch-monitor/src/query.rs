//! Query and filter layer: ASN vocabulary, ASN selection, per-minute series
//! and the refresh cycle state machine.

use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use tokio::sync::watch;
use tracing::{debug, warn};
use tunnelwatch_core::{minute_bucket, EnrichedRecord, MonitorError, NetworkOwner, Result};

/// ASN selection applied to a result set.
///
/// `any()` matches every record, including those with no known owner. An
/// explicit selection only matches records whose ASN is in it, so an empty
/// selection matches nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowFilter {
    asns: Option<BTreeSet<u32>>,
}

impl FlowFilter {
    /// No restriction
    #[must_use]
    pub const fn any() -> Self {
        Self { asns: None }
    }

    /// Only records announced by one of `asns`
    pub fn asns(asns: impl IntoIterator<Item = u32>) -> Self {
        Self {
            asns: Some(asns.into_iter().collect()),
        }
    }

    /// The explicit selection, if any
    #[must_use]
    pub const fn selected(&self) -> Option<&BTreeSet<u32>> {
        self.asns.as_ref()
    }

    /// Returns true if `record` passes the filter
    #[must_use]
    pub fn matches(&self, record: &EnrichedRecord) -> bool {
        match &self.asns {
            None => true,
            Some(set) => record.asn().is_some_and(|asn| set.contains(&asn)),
        }
    }
}

/// Flow count for one minute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MinuteBucket {
    /// Start of the minute
    pub minute: NaiveDateTime,
    /// Records observed during it
    pub count: usize,
}

/// Distinct owners seen in `records`, ordered by ASN.
///
/// If an ASN appears with different names, the first one seen is kept.
pub fn asn_vocabulary<'a>(records: impl IntoIterator<Item = &'a EnrichedRecord>) -> Vec<NetworkOwner> {
    let mut owners: BTreeMap<u32, &str> = BTreeMap::new();
    for owner in records.into_iter().filter_map(|r| r.owner.as_ref()) {
        owners.entry(owner.asn).or_insert(&owner.name);
    }
    owners
        .into_iter()
        .map(|(asn, name)| NetworkOwner {
            asn,
            name: name.to_string(),
        })
        .collect()
}

/// Per-minute record counts, ascending by minute. Empty minutes are omitted.
pub fn per_minute_counts<'a>(records: impl IntoIterator<Item = &'a EnrichedRecord>) -> Vec<MinuteBucket> {
    let mut counts: BTreeMap<NaiveDateTime, usize> = BTreeMap::new();
    for record in records {
        *counts.entry(minute_bucket(record.observed_at)).or_default() += 1;
    }
    counts
        .into_iter()
        .map(|(minute, count)| MinuteBucket { minute, count })
        .collect()
}

/// Everything the front-end renders after one refresh
#[derive(Debug, Clone, Default, Serialize)]
pub struct FlowSnapshot {
    /// Filtered records, newest first
    pub records: Vec<EnrichedRecord>,
    /// ASN choices, derived from the whole window before filtering
    pub vocabulary: Vec<NetworkOwner>,
    /// Per-minute counts over the filtered records
    pub per_minute: Vec<MinuteBucket>,
    /// Records loaded before filtering
    pub window: usize,
}

impl FlowSnapshot {
    /// Derive a snapshot from the most recent window of records
    #[must_use]
    pub fn build(window: Vec<EnrichedRecord>, filter: &FlowFilter) -> Self {
        let vocabulary = asn_vocabulary(&window);
        let loaded = window.len();
        let records: Vec<EnrichedRecord> =
            window.into_iter().filter(|r| filter.matches(r)).collect();
        let per_minute = per_minute_counts(&records);

        Self {
            records,
            vocabulary,
            per_minute,
            window: loaded,
        }
    }

    /// Returns true if no record passed the filter
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Phase of the refresh cycle
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RefreshPhase {
    #[default]
    Idle,
    Loading,
    Succeeded,
    Failed(String),
}

/// Idle → Loading → (Succeeded | Failed) → Idle, published on a watch channel
#[derive(Debug)]
pub struct RefreshCycle {
    phase: watch::Sender<RefreshPhase>,
}

impl Default for RefreshCycle {
    fn default() -> Self {
        Self::new()
    }
}

impl RefreshCycle {
    /// A cycle in the `Idle` phase
    #[must_use]
    pub fn new() -> Self {
        let (phase, _) = watch::channel(RefreshPhase::Idle);
        Self { phase }
    }

    /// Observe phase transitions
    pub fn subscribe(&self) -> watch::Receiver<RefreshPhase> {
        self.phase.subscribe()
    }

    /// Current phase
    pub fn phase(&self) -> RefreshPhase {
        self.phase.borrow().clone()
    }

    /// Run one cycle around `load`.
    ///
    /// Fails with [`MonitorError::RefreshInProgress`] without calling `load`
    /// if another cycle is loading.
    pub async fn run<T, F>(&self, load: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let started = self.phase.send_if_modified(|phase| {
            if *phase == RefreshPhase::Loading {
                false
            } else {
                *phase = RefreshPhase::Loading;
                true
            }
        });
        if !started {
            debug!("refresh rejected, another cycle is loading");
            return Err(MonitorError::RefreshInProgress);
        }

        let result = load.await;
        match &result {
            Ok(_) => {
                self.phase.send_replace(RefreshPhase::Succeeded);
            }
            Err(e) => {
                warn!(error = %e, "refresh failed");
                self.phase.send_replace(RefreshPhase::Failed(e.to_string()));
            }
        }
        self.phase.send_replace(RefreshPhase::Idle);
        result
    }
}
