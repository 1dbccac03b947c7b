use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Backing collection a record originated from.
///
/// Variant order is the merge priority: dedicated tables first, the generic
/// ledger last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    CustomerPayment,
    PurchaseOrderPayment,
    DevicePayment,
    RepairPayment,
    Ledger,
}

impl SourceKind {
    pub const PRIORITY: [SourceKind; 5] = [
        SourceKind::CustomerPayment,
        SourceKind::PurchaseOrderPayment,
        SourceKind::DevicePayment,
        SourceKind::RepairPayment,
        SourceKind::Ledger,
    ];

    /// Lower value wins when two sources carry the same id.
    pub fn priority(self) -> usize {
        self as usize
    }

    pub fn collection(self) -> &'static str {
        match self {
            SourceKind::CustomerPayment => "customer_payments",
            SourceKind::PurchaseOrderPayment => "purchase_order_payments",
            SourceKind::DevicePayment => "device_payments",
            SourceKind::RepairPayment => "repair_payments",
            SourceKind::Ledger => "payment_transactions",
        }
    }

    pub fn from_collection(name: &str) -> Option<Self> {
        Self::PRIORITY
            .into_iter()
            .find(|kind| kind.collection() == name)
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.collection())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Approved,
    Refunded,
    Cancelled,
    Unknown,
}

impl PaymentStatus {
    pub const ALL: [PaymentStatus; 7] = [
        PaymentStatus::Pending,
        PaymentStatus::Completed,
        PaymentStatus::Failed,
        PaymentStatus::Approved,
        PaymentStatus::Refunded,
        PaymentStatus::Cancelled,
        PaymentStatus::Unknown,
    ];

    /// Maps any source vocabulary onto the canonical set. Never fails.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" | "processing" => PaymentStatus::Pending,
            "completed" | "complete" | "paid" | "success" | "successful" => {
                PaymentStatus::Completed
            }
            "failed" | "error" | "declined" => PaymentStatus::Failed,
            "approved" => PaymentStatus::Approved,
            "refunded" => PaymentStatus::Refunded,
            "cancelled" | "canceled" => PaymentStatus::Cancelled,
            _ => PaymentStatus::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Approved => "approved",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::Cancelled => "cancelled",
            PaymentStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A non-negative monetary amount no larger than [`Amount::LIMIT`].
///
/// The upper bound keeps sums over any realistic page of records far from
/// `Decimal`'s range.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub const ZERO: Self = Self(Decimal::ZERO);
    pub const LIMIT: Decimal = dec!(1_000_000_000_000_000);

    /// Returns `None` for negative values and values above [`Amount::LIMIT`].
    pub fn new(value: Decimal) -> Option<Self> {
        (Decimal::ZERO..=Self::LIMIT)
            .contains(&value)
            .then_some(Self(value))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = String;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| format!("amount {value} outside 0..={}", Self::LIMIT))
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Flag {
    pub flagged: bool,
    pub reason: Option<String>,
}

/// Canonical view of a payment regardless of which collection it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: String,
    pub source_kind: SourceKind,
    pub customer_id: Option<String>,
    pub customer_name: String,
    pub amount: Amount,
    pub currency: String,
    pub method: String,
    pub status: PaymentStatus,
    pub fees: Amount,
    pub reference: String,
    pub transaction_id: String,
    /// Logical order the payment belongs to (sale, purchase order, device, repair).
    pub order_id: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub starred: bool,
    pub flag: Flag,
}

impl PaymentRecord {
    pub fn net_amount(&self) -> Decimal {
        self.amount.value() - self.fees.value()
    }
}

/// Inclusive time window on `created_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    /// Bounds are reordered if given back to front.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self {
                start: end,
                end: start,
            }
        }
    }

    /// Whole local calendar days `first..=last` in the given offset.
    pub fn days(first: NaiveDate, last: NaiveDate, offset: FixedOffset) -> Option<Self> {
        let start = first
            .and_hms_opt(0, 0, 0)?
            .and_local_timezone(offset)
            .single()?;
        let end = last
            .and_hms_nano_opt(23, 59, 59, 999_999_999)?
            .and_local_timezone(offset)
            .single()?;
        Some(Self::new(start.with_timezone(&Utc), end.with_timezone(&Utc)))
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }
}
