use crate::domain::ports::ExportFormatter;
use crate::domain::record::PaymentRecord;
use crate::error::{PaymentError, Result};
use chrono::SecondsFormat;
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;

/// Flat CSV projection of a `PaymentRecord`.
#[derive(Debug, Serialize)]
struct ExportRow<'a> {
    id: &'a str,
    source: &'a str,
    transaction_id: &'a str,
    reference: &'a str,
    customer: &'a str,
    amount: Decimal,
    fees: Decimal,
    net_amount: Decimal,
    currency: &'a str,
    method: &'a str,
    status: &'a str,
    created_at: String,
    order_id: &'a str,
    failure_reason: &'a str,
    starred: bool,
    flagged: bool,
}

impl<'a> From<&'a PaymentRecord> for ExportRow<'a> {
    fn from(record: &'a PaymentRecord) -> Self {
        Self {
            id: &record.id,
            source: record.source_kind.collection(),
            transaction_id: &record.transaction_id,
            reference: &record.reference,
            customer: &record.customer_name,
            amount: record.amount.value(),
            fees: record.fees.value(),
            net_amount: record.net_amount(),
            currency: &record.currency,
            method: &record.method,
            status: record.status.as_str(),
            created_at: record.created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            order_id: record.order_id.as_deref().unwrap_or_default(),
            failure_reason: record.failure_reason.as_deref().unwrap_or_default(),
            starred: record.starred,
            flagged: record.flag.flagged,
        }
    }
}

/// Writes payment records as CSV, one row per record, header first.
pub struct PaymentWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> PaymentWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_records(&mut self, records: &[PaymentRecord]) -> Result<()> {
        for record in records {
            self.writer.serialize(ExportRow::from(record))?;
        }
        self.writer.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| PaymentError::Io(e.into_error()))
    }
}

/// `ExportFormatter` producing a CSV file.
#[derive(Debug, Default, Clone, Copy)]
pub struct CsvExporter;

impl ExportFormatter for CsvExporter {
    fn serialize(&self, records: &[PaymentRecord]) -> Result<Vec<u8>> {
        let mut writer = PaymentWriter::new(Vec::new());
        writer.write_records(records)?;
        writer.into_inner()
    }

    fn extension(&self) -> &'static str {
        "csv"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::record::{Amount, Flag, PaymentStatus, SourceKind};
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn record() -> PaymentRecord {
        PaymentRecord {
            id: "p1".into(),
            source_kind: SourceKind::DevicePayment,
            customer_id: Some("c-1".into()),
            customer_name: "Rehema, Ltd".into(),
            amount: Amount::new(dec!(1500)).unwrap(),
            currency: "TZS".into(),
            method: "M-Pesa".into(),
            status: PaymentStatus::Completed,
            fees: Amount::new(dec!(25.5)).unwrap(),
            reference: "REF-P1".into(),
            transaction_id: "TXN-P1".into(),
            order_id: Some("dev-9".into()),
            failure_reason: None,
            created_at: Utc.with_ymd_and_hms(2025, 9, 17, 8, 30, 0).unwrap(),
            metadata: Default::default(),
            starred: true,
            flag: Flag::default(),
        }
    }

    #[test]
    fn test_csv_export_has_header_and_quotes() {
        let bytes = CsvExporter.serialize(&[record()]).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let mut lines = text.lines();

        assert_eq!(
            lines.next().unwrap(),
            "id,source,transaction_id,reference,customer,amount,fees,net_amount,currency,method,status,created_at,order_id,failure_reason,starred,flagged"
        );
        assert_eq!(
            lines.next().unwrap(),
            "p1,device_payments,TXN-P1,REF-P1,\"Rehema, Ltd\",1500,25.5,1474.5,TZS,M-Pesa,completed,2025-09-17T08:30:00Z,dev-9,,true,false"
        );
        assert!(lines.next().is_none());
    }

    #[test]
    fn test_csv_export_empty() {
        let bytes = CsvExporter.serialize(&[]).unwrap();
        assert!(bytes.is_empty());
        assert_eq!(CsvExporter.extension(), "csv");
    }
}
