//! Per-period, per-category aggregation
//!
//! Buckets settled transactions into non-overlapping periods, sums signed
//! minor-unit amounts per (category, period), and computes deltas against the
//! immediately preceding period. Periods with no activity get zero-valued
//! buckets so downstream time series never have gaps.

use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDate;

use crate::models::{Granularity, PeriodAggregate, Transaction, ALL_CATEGORIES, UNCATEGORIZED};

#[derive(Default, Clone, Copy)]
struct BucketTotals {
    total_minor: i64,
    transaction_count: usize,
    pending_minor: i64,
}

/// Aggregate one account's transactions at the given granularity.
///
/// `assignments` maps transaction id to resolved category; unmapped
/// transactions land in [`UNCATEGORIZED`]. `range` bounds the covered
/// periods; when None, the range spans the earliest to latest posted date.
/// The output is sorted by (category, period start) and includes an
/// [`ALL_CATEGORIES`] rollup row per period.
pub fn aggregate(
    account_id: &str,
    transactions: &[Transaction],
    assignments: &HashMap<String, String>,
    granularity: Granularity,
    range: Option<(NaiveDate, NaiveDate)>,
) -> Vec<PeriodAggregate> {
    let (range_start, range_end) = match range.or_else(|| span_of(transactions)) {
        Some(bounds) => bounds,
        None => return Vec::new(),
    };
    if range_end < range_start {
        return Vec::new();
    }

    let first_period = granularity.period_start(range_start);

    // Category set drives the zero-fill: every category seen in range gets a
    // bucket for every period in range. BTreeSet keeps output order stable.
    let mut categories: BTreeSet<String> = BTreeSet::new();
    let mut totals: HashMap<(String, NaiveDate), BucketTotals> = HashMap::new();

    for tx in transactions {
        if tx.posted < range_start || tx.posted > range_end {
            continue;
        }
        let category = assignments
            .get(&tx.id)
            .map(String::as_str)
            .unwrap_or(UNCATEGORIZED);
        categories.insert(category.to_string());

        let period = granularity.period_start(tx.posted);
        for key in [category, ALL_CATEGORIES] {
            let bucket = totals.entry((key.to_string(), period)).or_default();
            if tx.status.is_settled() {
                bucket.total_minor += tx.amount_minor;
                bucket.transaction_count += 1;
            } else {
                // Pending charges stay out of settled totals but are
                // surfaced per bucket
                bucket.pending_minor += tx.amount_minor;
            }
        }
    }

    categories.insert(ALL_CATEGORIES.to_string());

    let mut aggregates = Vec::new();
    for category in &categories {
        let mut previous_total: Option<i64> = None;
        let mut period = first_period;
        while period <= range_end {
            let bucket = totals
                .get(&(category.clone(), period))
                .copied()
                .unwrap_or_default();
            aggregates.push(PeriodAggregate {
                account_id: account_id.to_string(),
                category: category.clone(),
                granularity,
                period_start: period,
                period_end: granularity.period_end(period),
                total_minor: bucket.total_minor,
                transaction_count: bucket.transaction_count,
                pending_minor: bucket.pending_minor,
                delta_minor: previous_total.map(|prev| bucket.total_minor - prev),
            });
            previous_total = Some(bucket.total_minor);
            period = granularity.next_period_start(period);
        }
    }

    aggregates
}

/// Earliest and latest posted dates, or None for an empty set
fn span_of(transactions: &[Transaction]) -> Option<(NaiveDate, NaiveDate)> {
    let first = transactions.iter().map(|tx| tx.posted).min()?;
    let last = transactions.iter().map(|tx| tx.posted).max()?;
    Some((first, last))
}
