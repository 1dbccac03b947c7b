//! Summary statistics over a record set.
//!
//! All ratios are computed in `Decimal` and guard against an empty
//! denominator, so no metric is ever NaN or infinite.

use crate::domain::record::{PaymentRecord, PaymentStatus, SourceKind};
use chrono::{FixedOffset, NaiveDate, Timelike};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

pub const UNKNOWN_REASON: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentMetrics {
    pub total_count: usize,
    pub total_amount: Decimal,
    pub completed_amount: Decimal,
    pub pending_amount: Decimal,
    pub failed_amount: Decimal,
    /// Amount per status, every status present in the set.
    pub by_status: BTreeMap<PaymentStatus, Decimal>,
    pub total_fees: Decimal,
    pub average_amount: Decimal,
    /// Completed records as a percentage of all records, one decimal.
    pub success_rate: Decimal,
    pub methods: Vec<MethodSummary>,
    pub sources: BTreeMap<SourceKind, BucketTotals>,
    pub daily: Vec<DailySummary>,
    pub hourly: Vec<HourlySummary>,
    pub top_customers: Vec<CustomerSummary>,
    pub failure_reasons: Vec<FailureReasonSummary>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BucketTotals {
    pub count: usize,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MethodSummary {
    pub method: String,
    pub count: usize,
    pub amount: Decimal,
    /// Share of the total amount.
    pub percentage: Decimal,
    pub success_rate: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub count: usize,
    pub total: Decimal,
    pub completed: Decimal,
    pub pending: Decimal,
    pub failed: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlySummary {
    pub hour: u32,
    pub count: usize,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerSummary {
    pub customer_id: Option<String>,
    pub customer_name: String,
    pub count: usize,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureReasonSummary {
    pub reason: String,
    pub count: usize,
}

/// `part / whole * 100`, one decimal, `0` when `whole` is zero.
pub fn percentage(part: Decimal, whole: Decimal) -> Decimal {
    if whole.is_zero() {
        return Decimal::ZERO;
    }
    let ratio = match part.checked_mul(Decimal::ONE_HUNDRED) {
        Some(scaled) => scaled / whole,
        None => part / whole * Decimal::ONE_HUNDRED,
    };
    ratio
        .round_dp_with_strategy(1, RoundingStrategy::MidpointAwayFromZero)
        .normalize()
}

/// Accumulates without panicking; totals pin at `Decimal::MAX`.
fn add(total: &mut Decimal, amount: Decimal) {
    *total = total.saturating_add(amount);
}

pub struct MetricsAggregator {
    offset: FixedOffset,
    top_n: usize,
}

impl MetricsAggregator {
    pub fn new(offset: FixedOffset, top_n: usize) -> Self {
        Self { offset, top_n }
    }

    pub fn aggregate(&self, records: &[PaymentRecord]) -> PaymentMetrics {
        let mut by_status: BTreeMap<PaymentStatus, Decimal> = BTreeMap::new();
        let mut sources: BTreeMap<SourceKind, BucketTotals> = BTreeMap::new();
        let mut methods: HashMap<&str, (BucketTotals, usize)> = HashMap::new();
        let mut daily: BTreeMap<NaiveDate, DailySummary> = BTreeMap::new();
        let mut hourly: Vec<HourlySummary> = (0..24)
            .map(|hour| HourlySummary {
                hour,
                count: 0,
                amount: Decimal::ZERO,
            })
            .collect();
        let mut customers: HashMap<(Option<&str>, &str), BucketTotals> = HashMap::new();
        let mut reasons: HashMap<&str, usize> = HashMap::new();

        let mut total_amount = Decimal::ZERO;
        let mut total_fees = Decimal::ZERO;
        let mut completed_count = 0usize;

        for record in records {
            let amount = record.amount.value();
            add(&mut total_amount, amount);
            add(&mut total_fees, record.fees.value());
            add(by_status.entry(record.status).or_default(), amount);

            let source = sources.entry(record.source_kind).or_default();
            source.count += 1;
            add(&mut source.amount, amount);

            let (method, method_completed) = methods.entry(record.method.as_str()).or_default();
            method.count += 1;
            add(&mut method.amount, amount);
            if record.status == PaymentStatus::Completed {
                completed_count += 1;
                *method_completed += 1;
            }

            let local = record.created_at.with_timezone(&self.offset);
            let day = daily
                .entry(local.date_naive())
                .or_insert_with(|| DailySummary {
                    date: local.date_naive(),
                    count: 0,
                    total: Decimal::ZERO,
                    completed: Decimal::ZERO,
                    pending: Decimal::ZERO,
                    failed: Decimal::ZERO,
                });
            day.count += 1;
            add(&mut day.total, amount);
            match record.status {
                PaymentStatus::Completed => add(&mut day.completed, amount),
                PaymentStatus::Pending => add(&mut day.pending, amount),
                PaymentStatus::Failed => add(&mut day.failed, amount),
                _ => {}
            }

            let hour = &mut hourly[local.hour() as usize];
            hour.count += 1;
            add(&mut hour.amount, amount);

            let customer = customers
                .entry((record.customer_id.as_deref(), record.customer_name.as_str()))
                .or_default();
            customer.count += 1;
            add(&mut customer.amount, amount);

            if record.status == PaymentStatus::Failed {
                let reason = record.failure_reason.as_deref().unwrap_or(UNKNOWN_REASON);
                *reasons.entry(reason).or_default() += 1;
            }
        }

        let total_count = records.len();
        let status_amount = |status: PaymentStatus| by_status.get(&status).copied().unwrap_or_default();

        let mut methods: Vec<MethodSummary> = methods
            .into_iter()
            .map(|(method, (totals, completed))| MethodSummary {
                method: method.to_string(),
                count: totals.count,
                amount: totals.amount,
                percentage: percentage(totals.amount, total_amount),
                success_rate: percentage(Decimal::from(completed), Decimal::from(totals.count)),
            })
            .collect();
        methods.sort_by(|a, b| b.amount.cmp(&a.amount).then_with(|| a.method.cmp(&b.method)));

        let mut top_customers: Vec<CustomerSummary> = customers
            .into_iter()
            .map(|((customer_id, customer_name), totals)| CustomerSummary {
                customer_id: customer_id.map(str::to_string),
                customer_name: customer_name.to_string(),
                count: totals.count,
                amount: totals.amount,
            })
            .collect();
        top_customers.sort_by(|a, b| {
            b.amount
                .cmp(&a.amount)
                .then_with(|| a.customer_name.cmp(&b.customer_name))
                .then_with(|| a.customer_id.cmp(&b.customer_id))
        });
        top_customers.truncate(self.top_n);

        let mut failure_reasons: Vec<FailureReasonSummary> = reasons
            .into_iter()
            .map(|(reason, count)| FailureReasonSummary {
                reason: reason.to_string(),
                count,
            })
            .collect();
        failure_reasons.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.reason.cmp(&b.reason)));
        failure_reasons.truncate(self.top_n);

        let average_amount = if total_count == 0 {
            Decimal::ZERO
        } else {
            (total_amount / Decimal::from(total_count)).round_dp(2)
        };

        PaymentMetrics {
            total_count,
            total_amount,
            completed_amount: status_amount(PaymentStatus::Completed),
            pending_amount: status_amount(PaymentStatus::Pending),
            failed_amount: status_amount(PaymentStatus::Failed),
            total_fees,
            average_amount,
            success_rate: percentage(Decimal::from(completed_count), Decimal::from(total_count)),
            methods,
            sources,
            daily: daily.into_values().collect(),
            hourly,
            top_customers,
            failure_reasons,
            by_status,
        }
    }
}
