//! Routes state-changing actions to the source a record came from.
//!
//! Order of operations for one request:
//! 1. check the record's current status, as seen in the last published view,
//!    against the action's legal origins;
//! 2. write the minimal update through the owning source adapter;
//! 3. optionally cascade the same action onto sibling records of the order;
//! 4. refresh the aggregated view.
//!
//! Only step 2 can fail the request. Cascade failures are counted in the
//! returned report and never unwind the primary write.

use super::pipeline::{PaymentAggregator, RefreshOutcome};
use crate::domain::ports::{NotificationKind, NotificationSinkRef, RecordUpdate, SourceAdapterRef};
use crate::domain::raw::RawFields;
use crate::domain::record::{PaymentRecord, PaymentStatus};
use crate::domain::resolution::{Field, ResolutionTable};
use crate::domain::transition::MutationAction;
use crate::error::MutationError;
use chrono::{DateTime, SecondsFormat, Utc};
use futures::future::join_all;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

pub const SYSTEM_ACTOR: &str = "system";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MutationPayload {
    /// Failure reason for `reject`, flag reason for `flag`.
    pub reason: Option<String>,
    pub actor: Option<String>,
}

impl MutationPayload {
    pub fn reason(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            actor: None,
        }
    }

    fn actor(&self) -> &str {
        self.actor.as_deref().unwrap_or(SYSTEM_ACTOR)
    }
}

#[derive(Debug, Clone)]
pub struct MutationReport {
    pub id: String,
    pub previous: PaymentStatus,
    pub status: PaymentStatus,
    /// Sibling records updated by the cascade.
    pub cascaded: usize,
    pub cascade_failures: usize,
    pub refresh: RefreshOutcome,
}

pub struct MutationGateway {
    aggregator: Arc<PaymentAggregator>,
    notifier: NotificationSinkRef,
}

impl MutationGateway {
    pub fn new(aggregator: Arc<PaymentAggregator>, notifier: NotificationSinkRef) -> Self {
        Self {
            aggregator,
            notifier,
        }
    }

    pub async fn mutate(
        &self,
        record: &PaymentRecord,
        action: MutationAction,
        payload: MutationPayload,
    ) -> Result<MutationReport, MutationError> {
        // The caller's copy may predate an earlier mutation; validate against
        // the last published view when it knows the record.
        let records = self.aggregator.records().await;
        let record = records
            .iter()
            .find(|current| current.id == record.id && current.source_kind == record.source_kind)
            .unwrap_or(record);
        if !action.allows(record.status) {
            warn!(
                id = %record.id,
                status = %record.status,
                action = %action,
                "rejected illegal transition"
            );
            return Err(MutationError::InvalidTransition {
                id: record.id.clone(),
                from: record.status,
                action: action.to_string(),
            });
        }
        let adapter = self
            .aggregator
            .adapter(record.source_kind)
            .cloned()
            .ok_or(MutationError::NoAdapter(record.source_kind))?;

        let now = Utc::now();
        let update = build_update(record, action, &payload, now);
        if let Err(source) = adapter.write(update).await {
            self.notifier.notify(
                NotificationKind::Error,
                &format!("Failed to {action} payment {}: {source}", record.id),
            );
            return Err(MutationError::WriteFailed {
                id: record.id.clone(),
                source,
            });
        }

        let status = action.target().unwrap_or(record.status);
        info!(
            target: "paysync::audit",
            id = %record.id,
            source = %record.source_kind,
            action = %action,
            previous = %record.status,
            status = %status,
            actor = payload.actor(),
            "payment mutated"
        );

        let (cascaded, cascade_failures) =
            if self.aggregator.config().mutation.cascade && action.cascades() {
                self.cascade(record, action, &payload, &adapter, now).await
            } else {
                (0, 0)
            };

        let message = match cascade_failures {
            0 => format!("Payment {} {}", record.id, past_tense(action)),
            n => format!(
                "Payment {} {}; {n} related record(s) could not be updated",
                record.id,
                past_tense(action)
            ),
        };
        self.notifier.notify(
            if cascade_failures == 0 {
                NotificationKind::Success
            } else {
                NotificationKind::Warning
            },
            &message,
        );

        let refresh = self.aggregator.refresh_latest().await;
        Ok(MutationReport {
            id: record.id.clone(),
            previous: record.status,
            status,
            cascaded,
            cascade_failures,
            refresh,
        })
    }

    /// Applies `action` to every sibling of `record` that shares its order and
    /// may legally take the action. Returns `(updated, failed)`.
    async fn cascade(
        &self,
        record: &PaymentRecord,
        action: MutationAction,
        payload: &MutationPayload,
        adapter: &SourceAdapterRef,
        now: DateTime<Utc>,
    ) -> (usize, usize) {
        let Some(order_id) = record.order_id.as_deref() else {
            return (0, 0);
        };
        let records = self.aggregator.records().await;
        let siblings: Vec<&PaymentRecord> = records
            .iter()
            .filter(|sibling| {
                sibling.id != record.id
                    && sibling.source_kind == record.source_kind
                    && sibling.order_id.as_deref() == Some(order_id)
                    && action.allows(sibling.status)
            })
            .collect();

        let writes = siblings.iter().map(|sibling| {
            let update = build_update(sibling, action, payload, now);
            async move { (sibling.id.as_str(), adapter.write(update).await) }
        });
        let mut updated = 0;
        let mut failed = 0;
        for (id, result) in join_all(writes).await {
            match result {
                Ok(()) => updated += 1,
                Err(e) => {
                    warn!(id, order_id, error = %e, "cascade update failed");
                    failed += 1;
                }
            }
        }
        (updated, failed)
    }
}

fn past_tense(action: MutationAction) -> &'static str {
    match action {
        MutationAction::Confirm => "confirmed",
        MutationAction::Approve => "approved",
        MutationAction::Reject => "rejected",
        MutationAction::Refund => "refunded",
        MutationAction::Cancel => "cancelled",
        MutationAction::Retry => "queued for retry",
        MutationAction::Star => "starred",
        MutationAction::Unstar => "unstarred",
        MutationAction::Flag => "flagged",
        MutationAction::Unflag => "unflagged",
    }
}

/// Minimal column set for `action`, keyed by the owning source's primary
/// column names.
pub fn build_update(
    record: &PaymentRecord,
    action: MutationAction,
    payload: &MutationPayload,
    now: DateTime<Utc>,
) -> RecordUpdate {
    let table = ResolutionTable::for_kind(record.source_kind);
    let mut fields = RawFields::new();
    let mut set = |field: Field, value: Value| {
        fields.insert(table.primary(field).to_string(), value);
    };

    if let Some(status) = action.target() {
        set(Field::Status, Value::from(status.as_str()));
    }
    match action {
        MutationAction::Reject => {
            if let Some(reason) = &payload.reason {
                set(Field::FailureReason, Value::from(reason.as_str()));
            }
        }
        MutationAction::Star => set(Field::Starred, Value::Bool(true)),
        MutationAction::Unstar => set(Field::Starred, Value::Bool(false)),
        MutationAction::Flag => {
            set(Field::Flagged, Value::Bool(true));
            set(
                Field::FlagReason,
                payload.reason.as_deref().map_or(Value::Null, Value::from),
            );
        }
        MutationAction::Unflag => {
            set(Field::Flagged, Value::Bool(false));
            set(Field::FlagReason, Value::Null);
        }
        _ => {}
    }

    fields.insert(
        "updated_at".to_string(),
        Value::from(now.to_rfc3339_opts(SecondsFormat::Secs, true)),
    );
    fields.insert("updated_by".to_string(), Value::from(payload.actor()));

    RecordUpdate {
        id: record.id.clone(),
        fields,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::record::{Amount, Flag, SourceKind};
    use chrono::TimeZone;

    fn record(kind: SourceKind, status: PaymentStatus) -> PaymentRecord {
        PaymentRecord {
            id: "pay-1".into(),
            source_kind: kind,
            customer_id: None,
            customer_name: "Unknown Customer".into(),
            amount: Amount::ZERO,
            currency: "TZS".into(),
            method: "Cash".into(),
            status,
            fees: Amount::ZERO,
            reference: "REF-PAY-1".into(),
            transaction_id: "TXN-PAY-1".into(),
            order_id: None,
            failure_reason: None,
            created_at: Utc.with_ymd_and_hms(2025, 9, 17, 9, 0, 0).unwrap(),
            metadata: Default::default(),
            starred: false,
            flag: Flag::default(),
        }
    }

    #[test]
    fn test_update_uses_source_status_column() {
        let now = Utc.with_ymd_and_hms(2025, 9, 17, 10, 0, 0).unwrap();
        let update = build_update(
            &record(SourceKind::RepairPayment, PaymentStatus::Pending),
            MutationAction::Confirm,
            &MutationPayload::default(),
            now,
        );
        assert_eq!(update.id, "pay-1");
        assert_eq!(update.fields["payment_status"], "completed");
        assert_eq!(update.fields["updated_at"], "2025-09-17T10:00:00Z");
        assert_eq!(update.fields["updated_by"], SYSTEM_ACTOR);
        assert!(!update.fields.contains_key("status"));
    }

    #[test]
    fn test_reject_records_reason() {
        let update = build_update(
            &record(SourceKind::CustomerPayment, PaymentStatus::Pending),
            MutationAction::Reject,
            &MutationPayload::reason("card declined"),
            Utc::now(),
        );
        assert_eq!(update.fields["status"], "failed");
        assert_eq!(update.fields["failure_reason"], "card declined");
    }

    #[test]
    fn test_flag_actions_leave_status_alone() {
        let payload = MutationPayload {
            reason: Some("amount mismatch".into()),
            actor: Some("auditor".into()),
        };
        let update = build_update(
            &record(SourceKind::Ledger, PaymentStatus::Completed),
            MutationAction::Flag,
            &payload,
            Utc::now(),
        );
        assert!(!update.fields.contains_key("status"));
        assert_eq!(update.fields["is_flagged"], true);
        assert_eq!(update.fields["flag_reason"], "amount mismatch");
        assert_eq!(update.fields["updated_by"], "auditor");

        let cleared = build_update(
            &record(SourceKind::Ledger, PaymentStatus::Completed),
            MutationAction::Unflag,
            &payload,
            Utc::now(),
        );
        assert_eq!(cleared.fields["is_flagged"], false);
        assert!(cleared.fields["flag_reason"].is_null());
    }
}
