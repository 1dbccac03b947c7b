//! Ordered field-resolution tables.
//!
//! Every source stores the same logical fields under different names. Each
//! `ResolutionTable` lists, per logical field, the raw paths to try in order;
//! the first present, non-empty value wins. Dotted paths (`customers.name`)
//! descend into embedded objects. Adding a source means adding one table.

use super::raw::RawFields;
use super::record::SourceKind;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Id,
    Amount,
    Fees,
    Method,
    Currency,
    Status,
    CustomerId,
    CustomerName,
    Reference,
    TransactionId,
    OrderId,
    FailureReason,
    CreatedAt,
    Metadata,
    Starred,
    Flagged,
    FlagReason,
}

type Chain = &'static [&'static str];

#[derive(Debug)]
pub struct ResolutionTable {
    pub id: Chain,
    pub amount: Chain,
    pub fees: Chain,
    pub method: Chain,
    pub currency: Chain,
    pub status: Chain,
    pub customer_id: Chain,
    pub customer_name: Chain,
    pub reference: Chain,
    pub transaction_id: Chain,
    pub order_id: Chain,
    pub failure_reason: Chain,
    pub created_at: Chain,
    pub metadata: Chain,
    pub starred: Chain,
    pub flagged: Chain,
    pub flag_reason: Chain,
}

static CUSTOMER_PAYMENTS: ResolutionTable = ResolutionTable {
    id: &["id"],
    amount: &["amount", "total_amount"],
    fees: &["fees", "processing_fees"],
    method: &["method", "payment_method"],
    currency: &["currency", "currency_code"],
    status: &["status", "payment_status"],
    customer_id: &["customer_id"],
    customer_name: &["customers.name", "customer_name"],
    reference: &["reference", "reference_number"],
    transaction_id: &["transaction_id"],
    order_id: &["sale_id", "device_id"],
    failure_reason: &["failure_reason"],
    created_at: &["payment_date", "created_at"],
    metadata: &["metadata"],
    starred: &["is_starred", "starred"],
    flagged: &["is_flagged", "flagged"],
    flag_reason: &["flag_reason"],
};

static PURCHASE_ORDER_PAYMENTS: ResolutionTable = ResolutionTable {
    id: &["id"],
    amount: &["amount", "paid_amount"],
    fees: &["fees"],
    method: &["payment_method", "method"],
    currency: &["currency"],
    status: &["status"],
    customer_id: &["supplier_id"],
    customer_name: &["supplier.name", "supplier_name"],
    reference: &["reference"],
    transaction_id: &["transaction_id", "payment_reference"],
    order_id: &["purchase_order_id"],
    failure_reason: &["failure_reason", "notes"],
    created_at: &["payment_date", "created_at"],
    metadata: &["metadata"],
    starred: &["is_starred"],
    flagged: &["is_flagged"],
    flag_reason: &["flag_reason"],
};

static DEVICE_PAYMENTS: ResolutionTable = ResolutionTable {
    id: &["id"],
    amount: &["amount", "payment_amount"],
    fees: &["fees"],
    method: &["method", "payment_method"],
    currency: &["currency"],
    status: &["status", "payment_status"],
    customer_id: &["customer_id"],
    customer_name: &["customers.name", "customer_name"],
    reference: &["reference"],
    transaction_id: &["transaction_id"],
    order_id: &["device_id"],
    failure_reason: &["failure_reason"],
    created_at: &["payment_date", "created_at"],
    metadata: &["metadata"],
    starred: &["is_starred"],
    flagged: &["is_flagged"],
    flag_reason: &["flag_reason"],
};

static REPAIR_PAYMENTS: ResolutionTable = ResolutionTable {
    id: &["id"],
    amount: &["amount", "repair_cost"],
    fees: &["fees"],
    method: &["payment_method", "method"],
    currency: &["currency"],
    status: &["payment_status", "status"],
    customer_id: &["customer_id"],
    customer_name: &["customer_name"],
    reference: &["reference"],
    transaction_id: &["transaction_id"],
    order_id: &["repair_id", "device_id"],
    failure_reason: &["failure_reason"],
    created_at: &["paid_at", "created_at"],
    metadata: &["metadata"],
    starred: &["is_starred"],
    flagged: &["is_flagged"],
    flag_reason: &["flag_reason"],
};

static PAYMENT_TRANSACTIONS: ResolutionTable = ResolutionTable {
    id: &["id"],
    amount: &["amount"],
    fees: &["fee", "fees"],
    method: &["provider", "payment_method"],
    currency: &["currency"],
    status: &["status"],
    customer_id: &["customer_id"],
    customer_name: &["customer_name"],
    reference: &["reference"],
    transaction_id: &["transaction_id"],
    order_id: &["order_id"],
    failure_reason: &["failure_reason", "error_message"],
    created_at: &["created_at"],
    metadata: &["metadata"],
    starred: &["is_starred"],
    flagged: &["is_flagged"],
    flag_reason: &["flag_reason"],
};

impl ResolutionTable {
    pub fn for_kind(kind: SourceKind) -> &'static ResolutionTable {
        match kind {
            SourceKind::CustomerPayment => &CUSTOMER_PAYMENTS,
            SourceKind::PurchaseOrderPayment => &PURCHASE_ORDER_PAYMENTS,
            SourceKind::DevicePayment => &DEVICE_PAYMENTS,
            SourceKind::RepairPayment => &REPAIR_PAYMENTS,
            SourceKind::Ledger => &PAYMENT_TRANSACTIONS,
        }
    }

    pub fn chain(&self, field: Field) -> Chain {
        match field {
            Field::Id => self.id,
            Field::Amount => self.amount,
            Field::Fees => self.fees,
            Field::Method => self.method,
            Field::Currency => self.currency,
            Field::Status => self.status,
            Field::CustomerId => self.customer_id,
            Field::CustomerName => self.customer_name,
            Field::Reference => self.reference,
            Field::TransactionId => self.transaction_id,
            Field::OrderId => self.order_id,
            Field::FailureReason => self.failure_reason,
            Field::CreatedAt => self.created_at,
            Field::Metadata => self.metadata,
            Field::Starred => self.starred,
            Field::Flagged => self.flagged,
            Field::FlagReason => self.flag_reason,
        }
    }

    /// The column written back when the field is updated.
    pub fn primary(&self, field: Field) -> &'static str {
        self.chain(field).first().copied().unwrap_or("")
    }

    /// First value along the chain that is present, non-null and not a blank string.
    pub fn resolve<'a>(&self, field: Field, fields: &'a RawFields) -> Option<&'a Value> {
        self.chain(field)
            .iter()
            .filter_map(|path| lookup(fields, path))
            .find(|value| is_usable(value))
    }

    pub fn text(&self, field: Field, fields: &RawFields) -> Option<String> {
        self.chain(field)
            .iter()
            .filter_map(|path| lookup(fields, path))
            .find_map(as_text)
    }

    /// First entry along the chain that parses as a decimal.
    pub fn decimal(&self, field: Field, fields: &RawFields) -> Option<Decimal> {
        self.chain(field)
            .iter()
            .filter_map(|path| lookup(fields, path))
            .find_map(as_decimal)
    }

    pub fn timestamp(&self, field: Field, fields: &RawFields) -> Option<DateTime<Utc>> {
        self.chain(field)
            .iter()
            .filter_map(|path| lookup(fields, path))
            .find_map(as_timestamp)
    }

    pub fn flag(&self, field: Field, fields: &RawFields) -> bool {
        self.chain(field)
            .iter()
            .filter_map(|path| lookup(fields, path))
            .find_map(as_bool)
            .unwrap_or(false)
    }
}

fn lookup<'a>(fields: &'a RawFields, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = fields.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn is_usable(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        _ => true,
    }
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_decimal(s: &str) -> Option<Decimal> {
    let s = s.trim();
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .ok()
}

fn as_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => parse_decimal(&n.to_string()),
        Value::String(s) => parse_decimal(s),
        _ => None,
    }
}

fn as_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_timestamp(s.trim()),
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}

/// Accepts RFC 3339, naive `YYYY-MM-DD[ T]HH:MM:SS[.f]` (read as UTC) and bare dates.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Display name for a payment method value.
///
/// Structured methods (`{"type": "multiple", ...}`) collapse to `Multiple`;
/// known codes map to their display names; anything else passes through trimmed.
pub fn canonical_method(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(method_display_name(s.trim())),
        Value::Object(obj) => {
            let kind = obj.get("type").and_then(Value::as_str);
            if kind.is_some_and(|k| k.eq_ignore_ascii_case("multiple")) {
                return Some("Multiple".to_string());
            }
            obj.get("method")
                .or_else(|| obj.get("type"))
                .and_then(canonical_method)
        }
        _ => None,
    }
}

fn method_display_name(code: &str) -> String {
    match code.to_ascii_lowercase().as_str() {
        "cash" => "Cash".to_string(),
        "card" => "Card".to_string(),
        "transfer" | "bank_transfer" => "Bank Transfer".to_string(),
        "mpesa" | "m-pesa" | "mobile_money" => "M-Pesa".to_string(),
        _ => code.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn fields(value: Value) -> RawFields {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_amount_falls_back_to_alias() {
        let table = ResolutionTable::for_kind(SourceKind::CustomerPayment);
        let raw = fields(json!({ "amount": null, "total_amount": "250.50" }));
        assert_eq!(table.decimal(Field::Amount, &raw), Some(dec!(250.50)));

        let raw = fields(json!({ "amount": "n/a", "total_amount": 10 }));
        assert_eq!(table.decimal(Field::Amount, &raw), Some(dec!(10)));

        let raw = fields(json!({}));
        assert_eq!(table.decimal(Field::Amount, &raw), None);
    }

    #[test]
    fn test_dotted_path_reads_embedded_object() {
        let table = ResolutionTable::for_kind(SourceKind::CustomerPayment);
        let raw = fields(json!({ "customers": { "name": "Amina" }, "customer_name": "Other" }));
        assert_eq!(
            table.text(Field::CustomerName, &raw),
            Some("Amina".to_string())
        );
    }

    #[test]
    fn test_blank_strings_are_skipped() {
        let table = ResolutionTable::for_kind(SourceKind::PurchaseOrderPayment);
        let raw = fields(json!({ "transaction_id": "  ", "payment_reference": "PR-9" }));
        assert_eq!(
            table.text(Field::TransactionId, &raw),
            Some("PR-9".to_string())
        );
    }

    #[test]
    fn test_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2025, 9, 17, 10, 30, 0).unwrap();
        assert_eq!(parse_timestamp("2025-09-17T13:30:00+03:00"), Some(expected));
        assert_eq!(parse_timestamp("2025-09-17 10:30:00"), Some(expected));
        assert_eq!(
            parse_timestamp("2025-09-17"),
            Some(Utc.with_ymd_and_hms(2025, 9, 17, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_canonical_method() {
        assert_eq!(canonical_method(&json!("mobile_money")), Some("M-Pesa".into()));
        assert_eq!(canonical_method(&json!("Tigo Pesa")), Some("Tigo Pesa".into()));
        assert_eq!(
            canonical_method(&json!({ "type": "multiple", "details": [] })),
            Some("Multiple".into())
        );
        assert_eq!(canonical_method(&json!({ "method": "card" })), Some("Card".into()));
        assert_eq!(canonical_method(&json!(null)), None);
    }

    #[test]
    fn test_primary_is_first_entry() {
        let table = ResolutionTable::for_kind(SourceKind::RepairPayment);
        assert_eq!(table.primary(Field::Status), "payment_status");
    }
}
