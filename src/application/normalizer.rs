use crate::domain::raw::RawRecord;
use crate::domain::record::{Amount, Flag, PaymentRecord, PaymentStatus};
use crate::domain::resolution::{Field, ResolutionTable, canonical_method};
use crate::error::NormalizationError;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

pub const UNKNOWN_CUSTOMER: &str = "Unknown Customer";
pub const UNKNOWN_METHOD: &str = "unknown";

/// Customer id → display name, built once per refresh from the directory.
#[derive(Debug, Clone, Default)]
pub struct CustomerIndex {
    names: HashMap<String, String>,
}

impl CustomerIndex {
    pub fn new(names: HashMap<String, String>) -> Self {
        Self { names }
    }

    pub fn name(&self, customer_id: &str) -> Option<&str> {
        self.names.get(customer_id).map(String::as_str)
    }
}

/// Output of normalizing one source's page.
#[derive(Debug, Default)]
pub struct NormalizedBatch {
    pub records: Vec<PaymentRecord>,
    pub errors: Vec<NormalizationError>,
}

/// Projects raw source rows into the canonical `PaymentRecord` schema.
pub struct Normalizer {
    customers: Arc<CustomerIndex>,
    default_currency: String,
}

impl Normalizer {
    pub fn new(customers: Arc<CustomerIndex>, default_currency: impl Into<String>) -> Self {
        Self {
            customers,
            default_currency: default_currency.into(),
        }
    }

    pub fn normalize(&self, raw: &RawRecord) -> Result<PaymentRecord, NormalizationError> {
        let kind = raw.kind();
        let table = ResolutionTable::for_kind(kind);
        let fields = raw.fields();

        let id = table
            .text(Field::Id, fields)
            .ok_or(NormalizationError::MissingId(kind))?;

        let created_at = table.timestamp(Field::CreatedAt, fields).ok_or_else(|| {
            NormalizationError::MissingTimestamp {
                source_kind: kind,
                id: id.clone(),
            }
        })?;

        let amount = match table.decimal(Field::Amount, fields) {
            Some(value) if value.is_sign_negative() && !value.is_zero() => {
                return Err(NormalizationError::NegativeAmount {
                    source_kind: kind,
                    id,
                });
            }
            Some(value) => Amount::new(value).ok_or_else(|| NormalizationError::AmountOutOfRange {
                source_kind: kind,
                id: id.clone(),
            })?,
            None => Amount::ZERO,
        };
        // Fees never decide whether a payment is kept: a negative or
        // out-of-range fee reads as zero.
        let fees = match table.decimal(Field::Fees, fields) {
            Some(value) => Amount::new(value).unwrap_or_else(|| {
                debug!(source = %kind, id = %id, fees = %value, "fee outside range, using zero");
                Amount::ZERO
            }),
            None => Amount::ZERO,
        };

        let customer_id = table.text(Field::CustomerId, fields);
        let customer_name = table
            .text(Field::CustomerName, fields)
            .or_else(|| {
                customer_id
                    .as_deref()
                    .and_then(|cid| self.customers.name(cid))
                    .map(str::to_string)
            })
            .unwrap_or_else(|| UNKNOWN_CUSTOMER.to_string());

        let method = table
            .resolve(Field::Method, fields)
            .and_then(canonical_method)
            .unwrap_or_else(|| UNKNOWN_METHOD.to_string());

        let currency = table
            .text(Field::Currency, fields)
            .map(|code| code.to_ascii_uppercase())
            .unwrap_or_else(|| self.default_currency.clone());

        let status = table
            .text(Field::Status, fields)
            .map(|raw| PaymentStatus::parse(&raw))
            .unwrap_or(PaymentStatus::Unknown);

        let short_id: String = id.chars().take(8).collect::<String>().to_uppercase();
        let transaction_id = table
            .text(Field::TransactionId, fields)
            .unwrap_or_else(|| format!("TXN-{short_id}"));
        let reference = table
            .text(Field::Reference, fields)
            .unwrap_or_else(|| format!("REF-{short_id}"));

        let metadata = table
            .resolve(Field::Metadata, fields)
            .and_then(|value| value.as_object().cloned())
            .unwrap_or_default();

        let flagged = table.flag(Field::Flagged, fields);
        Ok(PaymentRecord {
            id,
            source_kind: kind,
            customer_id,
            customer_name,
            amount,
            currency,
            method,
            status,
            fees,
            reference,
            transaction_id,
            order_id: table.text(Field::OrderId, fields),
            failure_reason: table.text(Field::FailureReason, fields),
            created_at,
            metadata,
            starred: table.flag(Field::Starred, fields),
            flag: Flag {
                flagged,
                reason: flagged
                    .then(|| table.text(Field::FlagReason, fields))
                    .flatten(),
            },
        })
    }

    /// Normalizes a page, dropping and counting rows that cannot be projected.
    pub fn normalize_batch(&self, raws: Vec<RawRecord>) -> NormalizedBatch {
        let mut batch = NormalizedBatch::default();
        for raw in raws {
            match self.normalize(&raw) {
                Ok(record) => batch.records.push(record),
                Err(e) => {
                    debug!(error = %e, "dropping raw record");
                    batch.errors.push(e);
                }
            }
        }
        batch
    }
}
