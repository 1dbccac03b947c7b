#![allow(dead_code)]

use paysync::application::mutation::MutationGateway;
use paysync::application::pipeline::PaymentAggregator;
use paysync::config::Config;
use paysync::domain::ports::{NotificationKind, NotificationSink, RefreshTrigger, SourceAdapterRef};
use paysync::domain::raw::RawFields;
use paysync::domain::record::SourceKind;
use paysync::infrastructure::in_memory::{InMemoryDirectory, InMemorySource};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub fn row(value: Value) -> RawFields {
    value.as_object().cloned().expect("row must be a JSON object")
}

/// Minimal valid row for `kind` with the given id, amount and status.
pub fn payment(id: &str, amount: i64, status: &str, created_at: &str) -> RawFields {
    row(serde_json::json!({
        "id": id,
        "amount": amount,
        "status": status,
        "created_at": created_at,
    }))
}

/// Five in-memory sources plus directory, wired into one aggregator.
pub struct Harness {
    pub sources: BTreeMap<SourceKind, InMemorySource>,
    pub directory: InMemoryDirectory,
    pub aggregator: Arc<PaymentAggregator>,
    pub notifier: Arc<RecordingNotifier>,
}

impl Harness {
    pub fn new(rows: Vec<(SourceKind, Vec<RawFields>)>) -> Self {
        Self::with_config(rows, Config::default())
    }

    pub fn with_config(rows: Vec<(SourceKind, Vec<RawFields>)>, config: Config) -> Self {
        let mut by_kind: HashMap<SourceKind, Vec<RawFields>> = rows.into_iter().collect();
        let sources: BTreeMap<SourceKind, InMemorySource> = SourceKind::PRIORITY
            .into_iter()
            .map(|kind| {
                let rows = by_kind.remove(&kind).unwrap_or_default();
                (kind, InMemorySource::with_rows(kind, rows))
            })
            .collect();
        let adapters: Vec<SourceAdapterRef> = sources
            .values()
            .map(|source| Arc::new(source.clone()) as SourceAdapterRef)
            .collect();
        let directory = InMemoryDirectory::new(HashMap::from([
            ("c-1".to_string(), "Neema Kweka".to_string()),
            ("c-2".to_string(), "Juma Said".to_string()),
        ]));
        let aggregator = Arc::new(PaymentAggregator::new(
            adapters,
            Arc::new(directory.clone()),
            config,
        ));
        Self {
            sources,
            directory,
            aggregator,
            notifier: Arc::new(RecordingNotifier::default()),
        }
    }

    pub fn source(&self, kind: SourceKind) -> &InMemorySource {
        &self.sources[&kind]
    }

    pub fn gateway(&self) -> MutationGateway {
        MutationGateway::new(Arc::clone(&self.aggregator), self.notifier.clone())
    }

    pub fn total_writes(&self) -> usize {
        self.sources.values().map(InMemorySource::write_count).sum()
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<(NotificationKind, String)>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<(NotificationKind, String)> {
        self.messages.lock().unwrap().clone()
    }

    pub fn count(&self, kind: NotificationKind) -> usize {
        self.messages().iter().filter(|(k, _)| *k == kind).count()
    }
}

impl NotificationSink for RecordingNotifier {
    fn notify(&self, kind: NotificationKind, message: &str) {
        self.messages.lock().unwrap().push((kind, message.to_string()));
    }
}

/// Refresh trigger that only counts.
#[derive(Default)]
pub struct CountingTrigger {
    count: AtomicUsize,
}

impl CountingTrigger {
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl RefreshTrigger for CountingTrigger {
    fn trigger(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}
