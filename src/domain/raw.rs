use super::record::SourceKind;
use serde::{Deserialize, Serialize};

pub type RawFields = serde_json::Map<String, serde_json::Value>;

/// Source-specific record as returned by an adapter, consumed once by the normalizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", content = "fields", rename_all = "snake_case")]
pub enum RawRecord {
    CustomerPayment(RawFields),
    PurchaseOrderPayment(RawFields),
    DevicePayment(RawFields),
    RepairPayment(RawFields),
    Ledger(RawFields),
}

impl RawRecord {
    pub fn new(kind: SourceKind, fields: RawFields) -> Self {
        match kind {
            SourceKind::CustomerPayment => RawRecord::CustomerPayment(fields),
            SourceKind::PurchaseOrderPayment => RawRecord::PurchaseOrderPayment(fields),
            SourceKind::DevicePayment => RawRecord::DevicePayment(fields),
            SourceKind::RepairPayment => RawRecord::RepairPayment(fields),
            SourceKind::Ledger => RawRecord::Ledger(fields),
        }
    }

    pub fn kind(&self) -> SourceKind {
        match self {
            RawRecord::CustomerPayment(_) => SourceKind::CustomerPayment,
            RawRecord::PurchaseOrderPayment(_) => SourceKind::PurchaseOrderPayment,
            RawRecord::DevicePayment(_) => SourceKind::DevicePayment,
            RawRecord::RepairPayment(_) => SourceKind::RepairPayment,
            RawRecord::Ledger(_) => SourceKind::Ledger,
        }
    }

    pub fn fields(&self) -> &RawFields {
        match self {
            RawRecord::CustomerPayment(fields)
            | RawRecord::PurchaseOrderPayment(fields)
            | RawRecord::DevicePayment(fields)
            | RawRecord::RepairPayment(fields)
            | RawRecord::Ledger(fields) => fields,
        }
    }
}
