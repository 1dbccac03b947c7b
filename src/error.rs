use crate::domain::record::{PaymentStatus, SourceKind};
use thiserror::Error;

/// Failure of a single backing collection. Recovered locally during a refresh.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    #[error("source {source_kind} unavailable: {reason}")]
    Unavailable {
        source_kind: SourceKind,
        reason: String,
    },
    #[error("record {id} not found in {source_kind}")]
    NotFound { source_kind: SourceKind, id: String },
    #[error("storage error: {0}")]
    Storage(String),
}

/// A raw record that could not be projected into a `PaymentRecord`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NormalizationError {
    #[error("{0} record has no usable id")]
    MissingId(SourceKind),
    #[error("{source_kind} record {id} has no usable timestamp")]
    MissingTimestamp { source_kind: SourceKind, id: String },
    #[error("{source_kind} record {id} has a negative amount")]
    NegativeAmount { source_kind: SourceKind, id: String },
    #[error("{source_kind} record {id} has an amount above the supported limit")]
    AmountOutOfRange { source_kind: SourceKind, id: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConnectionError {
    #[error("subscribe failed: {0}")]
    SubscribeFailed(String),
    #[error("gave up after {attempts} reconnect attempts")]
    GaveUp { attempts: u32 },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MutationError {
    #[error("cannot {action} record {id}: status is {from}")]
    InvalidTransition {
        id: String,
        from: PaymentStatus,
        action: String,
    },
    #[error("no source adapter registered for {0}")]
    NoAdapter(SourceKind),
    #[error("write to record {id} failed: {source}")]
    WriteFailed {
        id: String,
        #[source]
        source: SourceError,
    },
}

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Normalization(#[from] NormalizationError),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Mutation(#[from] MutationError),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, PaymentError>;
