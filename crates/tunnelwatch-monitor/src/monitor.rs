//! The flow monitor: owns the ingestors, the enrichment pipeline and the
//! store, and exposes the front-end triggers.

use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use tunnelwatch_core::{Device, MonitorError, RawCandidate, Result};
use tunnelwatch_lookup::{
    CymruWhois, Disabled, GeoLookup, HostIntelClient, NeighborTable, ProcfsLookup,
    RateLimitConfig, ReverseDns,
};

use crate::capture::{capture_loop, CaptureCounters, CaptureStats, PacketSource};
use crate::config::MonitorConfig;
use crate::enrichment::Enricher;
use crate::logfile::FirewallLog;
use crate::query::{FlowFilter, FlowSnapshot, RefreshCycle, RefreshPhase};
use crate::store::{FlowStore, InsertOutcome};

/// What one log ingestion pass did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Log lines examined
    pub scanned: usize,
    /// Lines dropped as malformed
    pub malformed: usize,
    /// Allowed flows to the port of interest
    pub candidates: usize,
    /// Candidates skipped without enrichment because their key was stored
    pub already_stored: usize,
    /// Records inserted
    pub inserted: usize,
    /// Records that lost an insert race to an identical key
    pub duplicates: usize,
}

/// Result of a refresh trigger
#[derive(Debug, Clone, Serialize)]
pub struct RefreshReport {
    pub ingest: IngestReport,
    pub snapshot: FlowSnapshot,
}

/// Enrichment plus storage, shared by both ingestion paths
#[derive(Debug)]
struct Pipeline {
    enricher: Enricher,
    store: FlowStore,
}

impl Pipeline {
    async fn process(&self, candidate: RawCandidate) -> Result<InsertOutcome> {
        let record = self.enricher.enrich(&candidate).await;
        self.store.save(record).await
    }
}

/// Teredo flow monitor
#[derive(Debug)]
pub struct FlowMonitor {
    config: MonitorConfig,
    log: FirewallLog,
    pipeline: Arc<Pipeline>,
    cycle: RefreshCycle,
}

impl FlowMonitor {
    /// Assemble a monitor from already-built components
    #[must_use]
    pub fn new(config: MonitorConfig, enricher: Enricher, store: FlowStore) -> Self {
        let log = FirewallLog::new(&config.log_path, config.port);
        Self {
            config,
            log,
            pipeline: Arc::new(Pipeline { enricher, store }),
            cycle: RefreshCycle::new(),
        }
    }

    /// Build the production monitor: procfs process attribution, Team Cymru
    /// ownership, host-intel geolocation when an API key is configured, and
    /// a file-backed store.
    pub fn from_config(config: MonitorConfig) -> Result<Self> {
        config.validate()?;
        let timeout = config.lookup_timeout();

        let geo: Arc<dyn GeoLookup> = match &config.host_intel.api_key {
            Some(key) => Arc::new(
                HostIntelClient::builder(key.clone())
                    .base_url(config.host_intel.base_url.clone())
                    .timeout(timeout)
                    .rate_limit(
                        RateLimitConfig::new()
                            .requests_per_second(config.host_intel.requests_per_second),
                    )
                    .build()?,
            ),
            None => {
                info!("no host-intelligence API key, geolocation disabled");
                Arc::new(Disabled::new("no host-intelligence API key configured"))
            }
        };

        let enricher = Enricher::new()
            .with_process(Arc::new(ProcfsLookup::new()))
            .with_ownership(Arc::new(
                CymruWhois::new(config.whois_server.clone()).timeout(timeout),
            ))
            .with_geo(geo)
            .with_timeout(timeout);

        let store = FlowStore::open(&config.database)?;
        Ok(Self::new(config, enricher, store))
    }

    /// Active configuration
    #[must_use]
    pub const fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// The flow store
    #[must_use]
    pub fn store(&self) -> &FlowStore {
        &self.pipeline.store
    }

    /// Observe refresh cycle phases
    pub fn phases(&self) -> watch::Receiver<RefreshPhase> {
        self.cycle.subscribe()
    }

    /// Tail the firewall log once and store every new allowed flow.
    ///
    /// An unreadable log fails the whole pass. Lookup failures never do.
    #[instrument(skip(self), fields(path = %self.log.path().display()))]
    pub async fn ingest_log(&self) -> Result<IngestReport> {
        let batch = self.log.read_recent(self.config.tail_lines).await?;
        let mut report = IngestReport {
            scanned: batch.scanned,
            malformed: batch.malformed,
            candidates: batch.candidates.len(),
            ..IngestReport::default()
        };

        let store = &self.pipeline.store;
        let mut seen = HashSet::new();
        let mut fresh = Vec::new();
        for candidate in batch.candidates {
            if !seen.insert(candidate.key()) || store.has(candidate.key()).await? {
                report.already_stored += 1;
                continue;
            }
            fresh.push(candidate);
        }

        let pipeline = &self.pipeline;
        let outcomes: Vec<Result<InsertOutcome>> = stream::iter(fresh)
            .map(|candidate| pipeline.process(candidate))
            .buffer_unordered(self.config.max_in_flight.max(1))
            .collect()
            .await;

        for outcome in outcomes {
            match outcome? {
                InsertOutcome::Inserted => report.inserted += 1,
                InsertOutcome::Duplicate => report.duplicates += 1,
            }
        }

        debug!(?report, "log ingestion finished");
        Ok(report)
    }

    /// Read-only view of the most recent window, filtered by `filter`
    pub async fn view(&self, filter: &FlowFilter) -> Result<FlowSnapshot> {
        let window = self
            .pipeline
            .store
            .recent(FlowFilter::any(), self.config.query_window)
            .await?;
        Ok(FlowSnapshot::build(window, filter))
    }

    /// One refresh cycle: ingest the log, then load and aggregate the
    /// most recent window.
    ///
    /// The cycle is `Loading` only while the store is read; ingestion and
    /// its lookups run before it. An ingest failure is still reported
    /// through the `Failed` phase. Rejected with
    /// [`MonitorError::RefreshInProgress`] while another cycle is loading.
    pub async fn refresh(&self, filter: &FlowFilter) -> Result<RefreshReport> {
        let ingest = self.ingest_log().await;
        self.cycle
            .run(async {
                let ingest = ingest?;
                let snapshot = self.view(filter).await?;
                Ok(RefreshReport { ingest, snapshot })
            })
            .await
    }

    /// Devices in the neighbour table, optionally named by reverse DNS
    pub async fn scan_lan(&self, resolve_names: bool) -> Result<Vec<Device>> {
        let table = NeighborTable::new(&self.config.arp_table);
        if resolve_names {
            let resolver = ReverseDns::new(self.config.lookup_timeout());
            table.discover(Some(&resolver)).await
        } else {
            table.discover(None).await
        }
    }

    /// Start the live capture task.
    ///
    /// `source` is read on the blocking pool; each decoded flow is enriched
    /// and stored by its own task, with at most `max_in_flight` running.
    /// The task ends when `token` is cancelled or the source is exhausted,
    /// waits for in-flight records and returns the totals. A failing source
    /// ends only this task.
    pub fn spawn_capture<S>(&self, source: S, token: CancellationToken) -> JoinHandle<Result<CaptureStats>>
    where
        S: PacketSource + 'static,
    {
        let (tx, rx) = mpsc::channel(self.config.capture_queue.max(1));
        let counters = Arc::new(CaptureCounters::default());
        let port = self.config.port;

        let reader = {
            let token = token.clone();
            let counters = counters.clone();
            tokio::task::spawn_blocking(move || {
                let mut source = source;
                capture_loop(&mut source, port, &tx, &token, &counters)
            })
        };

        let consumer = Consumer {
            pipeline: self.pipeline.clone(),
            counters,
            limit: Arc::new(Semaphore::new(self.config.max_in_flight.max(1))),
        };
        tokio::spawn(consumer.run(rx, reader, token))
    }
}

struct Consumer {
    pipeline: Arc<Pipeline>,
    counters: Arc<CaptureCounters>,
    limit: Arc<Semaphore>,
}

impl Consumer {
    async fn run(
        self,
        mut rx: mpsc::Receiver<RawCandidate>,
        reader: JoinHandle<Result<()>>,
        token: CancellationToken,
    ) -> Result<CaptureStats> {
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                () = token.cancelled() => break,
                candidate = rx.recv() => {
                    let Some(candidate) = candidate else { break };
                    let permit = tokio::select! {
                        () = token.cancelled() => None,
                        permit = self.limit.clone().acquire_owned() => permit.ok(),
                    };
                    let Some(permit) = permit else {
                        self.counters.record_dropped();
                        break;
                    };
                    let pipeline = self.pipeline.clone();
                    let counters = self.counters.clone();
                    tasks.spawn(async move {
                        let _permit = permit;
                        match pipeline.process(candidate).await {
                            Ok(InsertOutcome::Inserted) => counters.record_stored(),
                            Ok(InsertOutcome::Duplicate) => counters.record_duplicate(),
                            Err(e) => {
                                warn!(error = %e, "failed to store captured flow");
                                counters.record_error();
                            }
                        }
                    });
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        warn!(error = %e, "capture enrichment task panicked");
                    }
                }
            }
        }

        // Queued but not started: counted, not enriched
        rx.close();
        let mut abandoned = 0_u64;
        while rx.recv().await.is_some() {
            self.counters.record_dropped();
            abandoned += 1;
        }
        if abandoned > 0 {
            debug!(abandoned, "discarded queued captured flows on shutdown");
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "capture enrichment task panicked");
            }
        }

        reader
            .await
            .map_err(|e| MonitorError::source_unavailable("capture interface", e))??;

        let stats = self.counters.snapshot();
        info!(?stats, "capture task finished");
        Ok(stats)
    }
}
