use crate::domain::record::{DateRange, PaymentRecord, PaymentStatus, SourceKind};
use serde::{Deserialize, Serialize};

/// Per-query predicates. Unset fields do not constrain; set fields combine with AND.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterCriteria {
    pub search_text: Option<String>,
    pub status: Option<PaymentStatus>,
    pub method: Option<String>,
    pub currency: Option<String>,
    pub date_range: Option<DateRange>,
    pub source: Option<SourceKind>,
}

impl FilterCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn search(mut self, text: impl Into<String>) -> Self {
        self.search_text = Some(text.into());
        self
    }

    pub fn status(mut self, status: PaymentStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    pub fn date_range(mut self, range: DateRange) -> Self {
        self.date_range = Some(range);
        self
    }

    pub fn source(mut self, source: SourceKind) -> Self {
        self.source = Some(source);
        self
    }

    pub fn matches(&self, record: &PaymentRecord) -> bool {
        self.matches_search(record)
            && self.status.is_none_or(|status| record.status == status)
            && self
                .method
                .as_deref()
                .is_none_or(|method| record.method == method)
            && self
                .currency
                .as_deref()
                .is_none_or(|currency| record.currency == currency)
            && self
                .date_range
                .is_none_or(|range| range.contains(record.created_at))
            && self.source.is_none_or(|source| record.source_kind == source)
    }

    fn matches_search(&self, record: &PaymentRecord) -> bool {
        let Some(needle) = self
            .search_text
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
        else {
            return true;
        };
        let needle = needle.to_lowercase();
        [
            record.customer_name.as_str(),
            record.transaction_id.as_str(),
            record.reference.as_str(),
            record.method.as_str(),
            record.currency.as_str(),
        ]
        .iter()
        .any(|haystack| haystack.to_lowercase().contains(&needle))
    }
}

/// Records matching `criteria`, in their original order. The input is untouched.
pub fn apply(records: &[PaymentRecord], criteria: &FilterCriteria) -> Vec<PaymentRecord> {
    records
        .iter()
        .filter(|record| criteria.matches(record))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::record::{Amount, Flag};
    use chrono::{TimeZone, Utc};

    fn record(id: &str, name: &str, status: PaymentStatus, method: &str, day: u32) -> PaymentRecord {
        PaymentRecord {
            id: id.to_string(),
            source_kind: SourceKind::CustomerPayment,
            customer_id: None,
            customer_name: name.to_string(),
            amount: Amount::ZERO,
            currency: "TZS".into(),
            method: method.to_string(),
            status,
            fees: Amount::ZERO,
            reference: format!("REF-{id}"),
            transaction_id: format!("TXN-{id}"),
            order_id: None,
            failure_reason: None,
            created_at: Utc.with_ymd_and_hms(2025, 9, day, 12, 0, 0).unwrap(),
            metadata: Default::default(),
            starred: false,
            flag: Flag::default(),
        }
    }

    fn sample() -> Vec<PaymentRecord> {
        vec![
            record("p1", "Neema Kweka", PaymentStatus::Completed, "Cash", 1),
            record("p2", "Juma Said", PaymentStatus::Pending, "M-Pesa", 2),
            record("p3", "neema kweka", PaymentStatus::Completed, "M-Pesa", 3),
        ]
    }

    #[test]
    fn test_empty_criteria_keeps_everything() {
        let records = sample();
        assert_eq!(apply(&records, &FilterCriteria::new()), records);
    }

    #[test]
    fn test_search_is_case_insensitive_across_fields() {
        let records = sample();
        assert_eq!(apply(&records, &FilterCriteria::new().search("NEEMA")).len(), 2);
        assert_eq!(apply(&records, &FilterCriteria::new().search("txn-p2")).len(), 1);
        assert_eq!(apply(&records, &FilterCriteria::new().search("pesa")).len(), 2);
        assert_eq!(apply(&records, &FilterCriteria::new().search("tzs")).len(), 3);
        assert_eq!(apply(&records, &FilterCriteria::new().search("   ")).len(), 3);
    }

    #[test]
    fn test_predicates_combine_with_and() {
        let records = sample();
        let criteria = FilterCriteria::new()
            .status(PaymentStatus::Completed)
            .method("M-Pesa");
        let result = apply(&records, &criteria);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].id, "p3");
    }

    #[test]
    fn test_date_range_is_inclusive() {
        let records = sample();
        let range = DateRange::new(
            Utc.with_ymd_and_hms(2025, 9, 1, 12, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 9, 2, 12, 0, 0).unwrap(),
        );
        let ids: Vec<String> = apply(&records, &FilterCriteria::new().date_range(range))
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["p1", "p2"]);
    }

    #[test]
    fn test_filters_commute() {
        let records = sample();
        let by_status = FilterCriteria::new().status(PaymentStatus::Completed);
        let by_method = FilterCriteria::new().method("M-Pesa");

        let a = apply(&apply(&records, &by_status), &by_method);
        let b = apply(&apply(&records, &by_method), &by_status);
        assert_eq!(a, b);
    }
}
