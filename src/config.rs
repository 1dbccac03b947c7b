//! Runtime configuration.
//!
//! Every section has defaults, so a config file only needs the keys it changes.

use crate::domain::ports::DEFAULT_PAGE_SIZE;
use crate::domain::record::SourceKind;
use crate::error::{PaymentError, Result};
use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Upper bound on records returned by one adapter fetch.
    pub page_size: usize,
    pub default_currency: String,
    pub sync: SyncPolicy,
    pub metrics: MetricsConfig,
    pub mutation: MutationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            default_currency: "TZS".to_string(),
            sync: SyncPolicy::default(),
            metrics: MetricsConfig::default(),
            mutation: MutationConfig::default(),
        }
    }
}

impl Config {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let config: Config = serde_json::from_reader(file)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(PaymentError::Config("page_size must be positive".into()));
        }
        if self.default_currency.trim().is_empty() {
            return Err(PaymentError::Config("default_currency is empty".into()));
        }
        if self.sync.backoff_base_ms == 0 {
            return Err(PaymentError::Config(
                "sync.backoff_base_ms must be positive".into(),
            ));
        }
        if FixedOffset::east_opt(self.metrics.utc_offset_secs).is_none() {
            return Err(PaymentError::Config(format!(
                "metrics.utc_offset_secs out of range: {}",
                self.metrics.utc_offset_secs
            )));
        }
        Ok(())
    }
}

/// Reconnect and debounce timing for the realtime sync manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncPolicy {
    /// Minimum spacing between two connection attempts.
    pub cooldown_ms: u64,
    /// Delay before the first reconnect; doubles with every further attempt.
    pub backoff_base_ms: u64,
    pub max_attempts: u32,
    /// Change notifications within this window collapse into one refresh.
    pub debounce_ms: u64,
    pub collections: Vec<String>,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            cooldown_ms: 5_000,
            backoff_base_ms: 10_000,
            max_attempts: 2,
            debounce_ms: 3_000,
            collections: SourceKind::PRIORITY
                .iter()
                .map(|kind| kind.collection().to_string())
                .collect(),
        }
    }
}

impl SyncPolicy {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// `base * 2^(attempt-1)`, saturating.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.backoff_base_ms).saturating_mul(factor)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub top_n: usize,
    /// Offset used to bucket records into local days and hours.
    pub utc_offset_secs: i32,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            top_n: 5,
            utc_offset_secs: 3 * 3600,
        }
    }
}

impl MetricsConfig {
    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_secs).unwrap_or_else(|| Utc.fix())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MutationConfig {
    /// Apply confirm/approve to sibling records of the same order.
    pub cascade: bool,
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self { cascade: true }
    }
}
