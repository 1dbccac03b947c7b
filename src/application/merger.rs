use crate::domain::record::{PaymentRecord, SourceKind};
use std::cmp::Ordering;
use std::collections::HashSet;

#[derive(Debug, Default)]
pub struct MergeOutcome {
    pub records: Vec<PaymentRecord>,
    /// Records dropped because a higher-priority source already had the id.
    pub duplicates: usize,
}

/// Unions per-source batches into one id-unique, canonically ordered set.
///
/// Batches are visited in source priority order regardless of the order they
/// are passed in, so the first occurrence of an id is always the most
/// authoritative one.
pub fn merge(mut batches: Vec<(SourceKind, Vec<PaymentRecord>)>) -> MergeOutcome {
    batches.sort_by_key(|(kind, _)| kind.priority());

    let capacity = batches.iter().map(|(_, records)| records.len()).sum();
    let mut seen: HashSet<String> = HashSet::with_capacity(capacity);
    let mut outcome = MergeOutcome {
        records: Vec::with_capacity(capacity),
        duplicates: 0,
    };

    for (_, records) in batches {
        for record in records {
            if seen.insert(record.id.clone()) {
                outcome.records.push(record);
            } else {
                outcome.duplicates += 1;
            }
        }
    }

    outcome.records.sort_by(canonical_order);
    outcome
}

/// Newest first; ties broken by id.
pub fn canonical_order(a: &PaymentRecord, b: &PaymentRecord) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| a.id.cmp(&b.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::record::{Amount, Flag, PaymentStatus};
    use chrono::{TimeZone, Utc};

    fn record(id: &str, kind: SourceKind, minute: u32) -> PaymentRecord {
        PaymentRecord {
            id: id.to_string(),
            source_kind: kind,
            customer_id: None,
            customer_name: "Unknown Customer".into(),
            amount: Amount::ZERO,
            currency: "TZS".into(),
            method: "Cash".into(),
            status: PaymentStatus::Completed,
            fees: Amount::ZERO,
            reference: String::new(),
            transaction_id: String::new(),
            order_id: None,
            failure_reason: None,
            created_at: Utc.with_ymd_and_hms(2025, 9, 17, 10, minute, 0).unwrap(),
            metadata: Default::default(),
            starred: false,
            flag: Flag::default(),
        }
    }

    #[test]
    fn test_priority_wins_regardless_of_input_order() {
        let outcome = merge(vec![
            (SourceKind::Ledger, vec![record("B", SourceKind::Ledger, 1)]),
            (
                SourceKind::CustomerPayment,
                vec![record("B", SourceKind::CustomerPayment, 1)],
            ),
        ]);

        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].source_kind, SourceKind::CustomerPayment);
        assert_eq!(outcome.duplicates, 1);
    }

    #[test]
    fn test_sorted_newest_first_with_id_tiebreak() {
        let outcome = merge(vec![(
            SourceKind::DevicePayment,
            vec![
                record("b", SourceKind::DevicePayment, 5),
                record("a", SourceKind::DevicePayment, 5),
                record("c", SourceKind::DevicePayment, 9),
            ],
        )]);

        let ids: Vec<&str> = outcome.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_duplicates_within_one_source_collapse() {
        let outcome = merge(vec![(
            SourceKind::RepairPayment,
            vec![
                record("x", SourceKind::RepairPayment, 1),
                record("x", SourceKind::RepairPayment, 2),
            ],
        )]);
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].created_at.format("%M").to_string(), "01");
    }
}
