use super::{row_id, select_page};
use crate::domain::ports::{
    ChangeEvent, ChangeFeed, ChangeOperation, CustomerDirectory, FeedMessage, FeedStatus,
    FeedSubscription, FetchQuery, RecordUpdate, SourceAdapter,
};
use crate::domain::raw::{RawFields, RawRecord};
use crate::domain::record::SourceKind;
use crate::error::{ConnectionError, SourceError};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{RwLock, mpsc};
use tracing::debug;

/// A thread-safe in-memory backing collection.
///
/// Rows are kept raw, exactly as the real collection would hand them out.
/// Failure switches let tests take the source offline or make writes fail.
#[derive(Clone)]
pub struct InMemorySource {
    kind: SourceKind,
    rows: Arc<RwLock<Vec<RawFields>>>,
    unavailable: Arc<AtomicBool>,
    reject_writes: Arc<AtomicBool>,
    writes: Arc<AtomicUsize>,
    feed: Option<InMemoryChangeFeed>,
}

impl InMemorySource {
    pub fn new(kind: SourceKind) -> Self {
        Self {
            kind,
            rows: Arc::default(),
            unavailable: Arc::default(),
            reject_writes: Arc::default(),
            writes: Arc::default(),
            feed: None,
        }
    }

    pub fn with_rows(kind: SourceKind, rows: Vec<RawFields>) -> Self {
        Self {
            rows: Arc::new(RwLock::new(rows)),
            ..Self::new(kind)
        }
    }

    /// Publishes an UPDATE/INSERT on `feed` after every successful change.
    pub fn with_feed(mut self, feed: InMemoryChangeFeed) -> Self {
        self.feed = Some(feed);
        self
    }

    pub async fn insert(&self, row: RawFields) {
        self.rows.write().await.push(row);
        self.publish(ChangeOperation::Insert);
    }

    pub async fn rows(&self) -> Vec<RawFields> {
        self.rows.read().await.clone()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn set_reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    /// Successful writes so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn publish(&self, operation: ChangeOperation) {
        if let Some(feed) = &self.feed {
            feed.publish(ChangeEvent {
                collection: self.kind.collection().to_string(),
                operation,
                timestamp: Utc::now(),
            });
        }
    }

    fn unavailable_error(&self, reason: &str) -> SourceError {
        SourceError::Unavailable {
            source_kind: self.kind,
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl SourceAdapter for InMemorySource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn fetch(&self, query: &FetchQuery) -> Result<Vec<RawRecord>, SourceError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(self.unavailable_error("connection refused"));
        }
        let rows = self.rows.read().await.clone();
        Ok(select_page(self.kind, rows, query))
    }

    async fn write(&self, update: RecordUpdate) -> Result<(), SourceError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(self.unavailable_error("connection refused"));
        }
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(self.unavailable_error("write rejected"));
        }
        {
            let mut rows = self.rows.write().await;
            let row = rows
                .iter_mut()
                .find(|row| row_id(self.kind, row).as_deref() == Some(update.id.as_str()))
                .ok_or_else(|| SourceError::NotFound {
                    source_kind: self.kind,
                    id: update.id.clone(),
                })?;
            row.extend(update.fields);
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        debug!(source = %self.kind, id = %update.id, "row updated");
        self.publish(ChangeOperation::Update);
        Ok(())
    }
}

/// Customer id → name map held in memory.
#[derive(Default, Clone)]
pub struct InMemoryDirectory {
    names: Arc<RwLock<HashMap<String, String>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryDirectory {
    pub fn new(names: HashMap<String, String>) -> Self {
        Self {
            names: Arc::new(RwLock::new(names)),
            unavailable: Arc::default(),
        }
    }

    pub async fn insert(&self, id: impl Into<String>, name: impl Into<String>) {
        self.names.write().await.insert(id.into(), name.into());
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl CustomerDirectory for InMemoryDirectory {
    async fn bulk_load(&self) -> Result<HashMap<String, String>, SourceError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SourceError::Storage("customer directory offline".into()));
        }
        Ok(self.names.read().await.clone())
    }
}

const FEED_BUFFER: usize = 256;

#[derive(Default)]
struct FeedState {
    subscribers: HashMap<u64, mpsc::Sender<FeedMessage>>,
    next_id: u64,
    fail_next: u32,
    subscribe_calls: usize,
    manual_ack: bool,
}

/// Loopback change feed. Every subscriber sees every published event; the
/// test hooks simulate transport failures.
#[derive(Clone, Default)]
pub struct InMemoryChangeFeed {
    state: Arc<Mutex<FeedState>>,
}

impl InMemoryChangeFeed {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FeedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscriptions wait for [`ack_all`](Self::ack_all) instead of being
    /// acknowledged immediately.
    pub fn set_manual_ack(&self, manual: bool) {
        self.lock().manual_ack = manual;
    }

    /// The next `n` subscribe calls fail.
    pub fn fail_next_subscribes(&self, n: u32) {
        self.lock().fail_next = n;
    }

    pub fn publish(&self, event: ChangeEvent) {
        let state = self.lock();
        for tx in state.subscribers.values() {
            let _ = tx.try_send(FeedMessage::Change(event.clone()));
        }
    }

    pub fn ack_all(&self) {
        let state = self.lock();
        for tx in state.subscribers.values() {
            let _ = tx.try_send(FeedMessage::Status(FeedStatus::Subscribed));
        }
    }

    /// Reports `status` to every subscriber and forgets them, as a transport
    /// drop would.
    pub fn drop_all(&self, status: FeedStatus) {
        let mut state = self.lock();
        for (_, tx) in state.subscribers.drain() {
            let _ = tx.try_send(FeedMessage::Status(status.clone()));
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    pub fn subscribe_calls(&self) -> usize {
        self.lock().subscribe_calls
    }
}

#[async_trait]
impl ChangeFeed for InMemoryChangeFeed {
    async fn subscribe(&self, collections: &[String]) -> Result<FeedSubscription, ConnectionError> {
        let mut state = self.lock();
        state.subscribe_calls += 1;
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(ConnectionError::SubscribeFailed("channel refused".into()));
        }

        let (tx, rx) = mpsc::channel(FEED_BUFFER);
        if !state.manual_ack {
            let _ = tx.try_send(FeedMessage::Status(FeedStatus::Subscribed));
        }
        let id = state.next_id;
        state.next_id += 1;
        state.subscribers.insert(id, tx);
        debug!(id, collections = collections.len(), "feed subscriber added");

        let shared = Arc::clone(&self.state);
        Ok(FeedSubscription::new(
            rx,
            Box::new(move || {
                shared
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .subscribers
                    .remove(&id);
            }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: serde_json::Value) -> RawFields {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_write_merges_fields_and_counts() {
        let source = InMemorySource::with_rows(
            SourceKind::CustomerPayment,
            vec![row(json!({ "id": "p1", "status": "pending", "created_at": "2025-09-17" }))],
        );
        let mut fields = RawFields::new();
        fields.insert("status".into(), json!("completed"));

        source
            .write(RecordUpdate {
                id: "p1".into(),
                fields,
            })
            .await
            .unwrap();

        let rows = source.rows().await;
        assert_eq!(rows[0]["status"], "completed");
        assert_eq!(rows[0]["created_at"], "2025-09-17");
        assert_eq!(source.write_count(), 1);
    }

    #[tokio::test]
    async fn test_write_to_unknown_id_is_not_found() {
        let source = InMemorySource::new(SourceKind::Ledger);
        let err = source
            .write(RecordUpdate {
                id: "nope".into(),
                fields: RawFields::new(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::NotFound { .. }));
        assert_eq!(source.write_count(), 0);
    }

    #[tokio::test]
    async fn test_unavailable_source_fails_fetch() {
        let source = InMemorySource::new(SourceKind::DevicePayment);
        source.set_unavailable(true);
        let err = source.fetch(&FetchQuery::default()).await.unwrap_err();
        assert_eq!(
            err,
            SourceError::Unavailable {
                source_kind: SourceKind::DevicePayment,
                reason: "connection refused".into()
            }
        );
    }

    #[tokio::test]
    async fn test_feed_subscription_lifecycle() {
        let feed = InMemoryChangeFeed::new();
        let mut subscription = feed.subscribe(&["customer_payments".into()]).await.unwrap();
        assert_eq!(
            subscription.next().await,
            Some(FeedMessage::Status(FeedStatus::Subscribed))
        );
        assert_eq!(feed.subscriber_count(), 1);

        subscription.unsubscribe();
        subscription.unsubscribe();
        assert_eq!(feed.subscriber_count(), 0);

        feed.fail_next_subscribes(1);
        assert!(feed.subscribe(&[]).await.is_err());
        assert!(feed.subscribe(&[]).await.is_ok());
        assert_eq!(feed.subscribe_calls(), 3);
    }
}
