//! Refresh cycle: fetch every source concurrently, normalize, merge, publish.
//!
//! Refreshes are never mutually exclusive. Each one takes a sequence number
//! when it starts; a result is published only if no refresh with a higher
//! number has been published before it, so a slow early refresh can never
//! overwrite a newer view.

use super::filter::{self, FilterCriteria};
use super::merger;
use super::metrics::{MetricsAggregator, PaymentMetrics};
use super::normalizer::{CustomerIndex, Normalizer};
use crate::config::Config;
use crate::domain::ports::{CustomerDirectoryRef, FetchQuery, RefreshTrigger, SourceAdapterRef};
use crate::domain::record::{PaymentRecord, SourceKind};
use crate::error::{NormalizationError, SourceError};
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct SourceFailure {
    pub source_kind: SourceKind,
    pub error: SourceError,
}

/// Side channel describing everything that degraded a refresh.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefreshReport {
    pub sequence: u64,
    /// Raw rows returned per source that answered.
    pub fetched: BTreeMap<SourceKind, usize>,
    pub source_failures: Vec<SourceFailure>,
    pub normalization_errors: Vec<NormalizationError>,
    pub duplicates: usize,
    pub directory_error: Option<SourceError>,
}

impl RefreshReport {
    pub fn is_degraded(&self) -> bool {
        !self.source_failures.is_empty() || self.directory_error.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct Snapshot {
    pub sequence: u64,
    pub query: FetchQuery,
    pub records: Arc<Vec<PaymentRecord>>,
    pub report: RefreshReport,
}

#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    Applied(Arc<Snapshot>),
    /// A newer refresh was already published; this result was discarded.
    Stale { sequence: u64, current: u64 },
}

impl RefreshOutcome {
    pub fn snapshot(&self) -> Option<&Arc<Snapshot>> {
        match self {
            RefreshOutcome::Applied(snapshot) => Some(snapshot),
            RefreshOutcome::Stale { .. } => None,
        }
    }
}

/// Owns the source adapters and the last published view.
pub struct PaymentAggregator {
    sources: Vec<SourceAdapterRef>,
    directory: CustomerDirectoryRef,
    config: Config,
    sequence: AtomicU64,
    current: RwLock<Option<Arc<Snapshot>>>,
}

impl PaymentAggregator {
    pub fn new(sources: Vec<SourceAdapterRef>, directory: CustomerDirectoryRef, config: Config) -> Self {
        Self {
            sources,
            directory,
            config,
            sequence: AtomicU64::new(0),
            current: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn adapter(&self, kind: SourceKind) -> Option<&SourceAdapterRef> {
        self.sources.iter().find(|source| source.kind() == kind)
    }

    /// Runs one full refresh cycle with the given fetch hints.
    pub async fn refresh(&self, mut query: FetchQuery) -> RefreshOutcome {
        query.page_size = self.config.page_size;
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(sequence, sources = self.sources.len(), "refresh started");

        let fetches = self.sources.iter().map(|source| {
            let query = &query;
            async move { (source.kind(), source.fetch(query).await) }
        });
        let (directory, settled) = tokio::join!(self.directory.bulk_load(), join_all(fetches));

        let mut report = RefreshReport {
            sequence,
            ..RefreshReport::default()
        };
        let customers = match directory {
            Ok(names) => CustomerIndex::new(names),
            Err(e) => {
                warn!(sequence, error = %e, "customer directory unavailable");
                report.directory_error = Some(e);
                CustomerIndex::default()
            }
        };
        let normalizer = Normalizer::new(Arc::new(customers), self.config.default_currency.clone());

        let mut batches = Vec::with_capacity(settled.len());
        for (kind, result) in settled {
            match result {
                Ok(raws) => {
                    report.fetched.insert(kind, raws.len());
                    let batch = normalizer.normalize_batch(raws);
                    report.normalization_errors.extend(batch.errors);
                    batches.push((kind, batch.records));
                }
                Err(error) => {
                    warn!(sequence, source = %kind, error = %error, "source fetch failed");
                    report.source_failures.push(SourceFailure {
                        source_kind: kind,
                        error,
                    });
                }
            }
        }

        let merged = merger::merge(batches);
        report.duplicates = merged.duplicates;

        let snapshot = Arc::new(Snapshot {
            sequence,
            query,
            records: Arc::new(merged.records),
            report,
        });
        self.publish(snapshot).await
    }

    /// Repeats the last published query, or an unfiltered one.
    pub async fn refresh_latest(&self) -> RefreshOutcome {
        let query = self
            .current
            .read()
            .await
            .as_ref()
            .map(|snapshot| snapshot.query.clone())
            .unwrap_or_default();
        self.refresh(query).await
    }

    async fn publish(&self, snapshot: Arc<Snapshot>) -> RefreshOutcome {
        let mut current = self.current.write().await;
        if let Some(existing) = current.as_ref()
            && existing.sequence >= snapshot.sequence
        {
            debug!(
                sequence = snapshot.sequence,
                current = existing.sequence,
                "discarding stale refresh"
            );
            return RefreshOutcome::Stale {
                sequence: snapshot.sequence,
                current: existing.sequence,
            };
        }
        info!(
            sequence = snapshot.sequence,
            records = snapshot.records.len(),
            failures = snapshot.report.source_failures.len(),
            dropped = snapshot.report.normalization_errors.len(),
            "refresh applied"
        );
        *current = Some(Arc::clone(&snapshot));
        RefreshOutcome::Applied(snapshot)
    }

    pub async fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.current.read().await.clone()
    }

    pub async fn records(&self) -> Arc<Vec<PaymentRecord>> {
        self.snapshot()
            .await
            .map(|snapshot| Arc::clone(&snapshot.records))
            .unwrap_or_default()
    }

    pub async fn view(&self, criteria: &FilterCriteria) -> Vec<PaymentRecord> {
        filter::apply(&self.records().await, criteria)
    }

    pub async fn metrics(&self, criteria: &FilterCriteria) -> PaymentMetrics {
        let aggregator = MetricsAggregator::new(
            self.config.metrics.offset(),
            self.config.metrics.top_n,
        );
        aggregator.aggregate(&self.view(criteria).await)
    }
}

/// Refresh trigger that runs `refresh_latest` on a spawned task.
pub struct SpawnRefresh {
    aggregator: Arc<PaymentAggregator>,
}

impl SpawnRefresh {
    pub fn new(aggregator: Arc<PaymentAggregator>) -> Self {
        Self { aggregator }
    }
}

impl RefreshTrigger for SpawnRefresh {
    fn trigger(&self) {
        let aggregator = Arc::clone(&self.aggregator);
        tokio::spawn(async move {
            aggregator.refresh_latest().await;
        });
    }
}
