use super::raw::{RawFields, RawRecord};
use super::record::{DateRange, PaymentRecord, PaymentStatus, SourceKind};
use crate::error::{ConnectionError, Result, SourceError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Parameters of one adapter fetch. Hints narrow the result; the page size caps it.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchQuery {
    pub date_range: Option<DateRange>,
    pub status: Option<PaymentStatus>,
    pub method: Option<String>,
    pub page_size: usize,
}

impl Default for FetchQuery {
    fn default() -> Self {
        Self {
            date_range: None,
            status: None,
            method: None,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Minimal set of columns to overwrite on one row of a backing collection.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordUpdate {
    pub id: String,
    pub fields: RawFields,
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn kind(&self) -> SourceKind;
    async fn fetch(&self, query: &FetchQuery) -> std::result::Result<Vec<RawRecord>, SourceError>;
    async fn write(&self, update: RecordUpdate) -> std::result::Result<(), SourceError>;
}

pub type SourceAdapterRef = Arc<dyn SourceAdapter>;

#[async_trait]
pub trait CustomerDirectory: Send + Sync {
    /// Whole id → name map, loaded once per refresh.
    async fn bulk_load(&self) -> std::result::Result<HashMap<String, String>, SourceError>;
}

pub type CustomerDirectoryRef = Arc<dyn CustomerDirectory>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Info,
    Success,
    Warning,
    Error,
}

/// Fire-and-forget user notifications.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, kind: NotificationKind, message: &str);
}

pub type NotificationSinkRef = Arc<dyn NotificationSink>;

pub trait ExportFormatter: Send + Sync {
    fn serialize(&self, records: &[PaymentRecord]) -> Result<Vec<u8>>;
    fn extension(&self) -> &'static str;
}

pub trait CurrencyFormatter: Send + Sync {
    fn format(&self, amount: Decimal, currency: &str, locale: &str) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeOperation {
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub collection: String,
    pub operation: ChangeOperation,
    pub timestamp: DateTime<Utc>,
}

/// Channel status reported by the change feed transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedStatus {
    Subscribed,
    Closed,
    ChannelError(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedMessage {
    Status(FeedStatus),
    Change(ChangeEvent),
}

/// Live subscription to a change feed. Dropping it unsubscribes.
pub struct FeedSubscription {
    events: mpsc::Receiver<FeedMessage>,
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl FeedSubscription {
    pub fn new(events: mpsc::Receiver<FeedMessage>, cancel: Box<dyn FnOnce() + Send>) -> Self {
        Self {
            events,
            cancel: Some(cancel),
        }
    }

    /// Next message; `None` once the transport has gone away.
    pub async fn next(&mut self) -> Option<FeedMessage> {
        self.events.recv().await
    }

    /// Idempotent.
    pub fn unsubscribe(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
        self.events.close();
    }
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[async_trait]
pub trait ChangeFeed: Send + Sync {
    async fn subscribe(
        &self,
        collections: &[String],
    ) -> std::result::Result<FeedSubscription, ConnectionError>;
}

pub type ChangeFeedRef = Arc<dyn ChangeFeed>;

/// Receives the coalesced "data changed, refresh now" signal.
pub trait RefreshTrigger: Send + Sync {
    fn trigger(&self);
}

pub type RefreshTriggerRef = Arc<dyn RefreshTrigger>;
