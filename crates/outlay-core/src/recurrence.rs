//! Recurring charge detection
//!
//! Groups transactions by a normalized merchant fingerprint, then looks for
//! subsequences with consistent amounts and intervals that cluster around a
//! known period (weekly, biweekly, monthly, yearly). Detection is a pure
//! function of the transaction history plus configuration, so re-running it
//! on unchanged input yields the same groups with the same ids.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::NaiveDate;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::config::EngineConfig;
use crate::models::{
    FeedbackAction, GroupState, RecurrenceFeedback, RecurrenceGroup, Transaction,
};

/// Payment-method prefixes that vary per transaction and hide the merchant
const PAYMENT_PREFIXES: &[&str] = &[
    "APLPAY ", "APPLEPAY ", "GOOGLE PAY ", "SP * ", "SP *", "SQ * ", "SQ *", "TST* ", "TST*",
    "PAYPAL *",
];

/// Normalize a merchant description into a grouping fingerprint.
///
/// Uppercases, strips payment-method prefixes and `*`/`#` separators, drops
/// purely numeric tokens and trailing digit runs (store numbers, invoice
/// ids), and keeps the first three remaining tokens.
pub fn merchant_fingerprint(description: &str) -> String {
    let mut upper = description.to_uppercase();
    for prefix in PAYMENT_PREFIXES {
        if let Some(rest) = upper.strip_prefix(prefix) {
            upper = rest.to_string();
            break;
        }
    }

    upper
        .replace(['*', '#'], " ")
        .split_whitespace()
        .filter(|token| !token.chars().all(|c| c.is_ascii_digit()))
        .map(|token| token.trim_end_matches(|c: char| c.is_ascii_digit()))
        .filter(|token| !token.is_empty())
        .take(3)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Stable group id: hash of (account, fingerprint, interval).
///
/// Keeping the id independent of member transactions means an unchanged
/// charge pattern keeps its identity across runs and across new occurrences.
fn group_id(account_id: &str, fingerprint: &str, interval_days: i64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(account_id.as_bytes());
    hasher.update(b"|");
    hasher.update(fingerprint.as_bytes());
    hasher.update(b"|");
    hasher.update(interval_days.to_le_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..8])
}

/// A detected pattern within one fingerprint group, before state resolution
struct PatternInfo {
    member_ids: Vec<String>,
    expected_amount_minor: i64,
    interval_days: i64,
    interval_tolerance_days: i64,
    first_seen: NaiveDate,
    last_seen: NaiveDate,
    confidence: f64,
}

/// Detects recurring charges for a single account
pub struct RecurrenceDetector<'a> {
    config: &'a EngineConfig,
}

impl<'a> RecurrenceDetector<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    /// Produce the current set of recurrence groups for an account.
    ///
    /// `previous` carries the last published groups so confirmed state
    /// survives across runs; `feedback` holds user confirm/reject rules.
    /// `today` drives the lapse check and is a parameter for testability.
    pub fn detect(
        &self,
        account_id: &str,
        transactions: &[Transaction],
        previous: &[RecurrenceGroup],
        feedback: &[RecurrenceFeedback],
        today: NaiveDate,
    ) -> Vec<RecurrenceGroup> {
        let mut confirmed_fingerprints = HashSet::new();
        let mut rejected_fingerprints = HashSet::new();
        for entry in feedback {
            match entry.action {
                FeedbackAction::Confirm => confirmed_fingerprints.insert(&entry.fingerprint),
                FeedbackAction::Reject => rejected_fingerprints.insert(&entry.fingerprint),
            };
        }

        let previous_by_id: HashMap<&str, &RecurrenceGroup> =
            previous.iter().map(|g| (g.id.as_str(), g)).collect();

        // Group settled expense charges by fingerprint. BTreeMap keeps the
        // iteration order deterministic, which the idempotence guarantee
        // relies on.
        let mut by_fingerprint: BTreeMap<String, Vec<&Transaction>> = BTreeMap::new();
        for tx in transactions {
            if !tx.status.is_settled() || tx.amount_minor >= 0 {
                continue; // recurring charges are settled expenses
            }
            let fingerprint = merchant_fingerprint(&tx.description);
            if fingerprint.is_empty() {
                continue;
            }
            by_fingerprint.entry(fingerprint).or_default().push(tx);
        }

        let mut groups = Vec::new();
        for (fingerprint, mut txs) in by_fingerprint {
            if rejected_fingerprints.contains(&fingerprint) {
                debug!("Skipping {} - rejected by user", fingerprint);
                continue;
            }
            if txs.len() < self.config.min_occurrences {
                continue;
            }

            txs.sort_by(|a, b| a.posted.cmp(&b.posted).then_with(|| a.id.cmp(&b.id)));

            let Some(pattern) = self.find_pattern(&txs) else {
                continue;
            };

            let id = group_id(account_id, &fingerprint, pattern.interval_days);
            let user_confirmed = confirmed_fingerprints.contains(&fingerprint);
            let state = self.resolve_state(
                previous_by_id.get(id.as_str()).copied(),
                &pattern,
                user_confirmed,
                today,
            );

            debug!(
                "Recurrence group {}: {} every ~{}d @ {} (confidence {:.2}, {})",
                id,
                fingerprint,
                pattern.interval_days,
                pattern.expected_amount_minor,
                pattern.confidence,
                state.as_str()
            );

            groups.push(RecurrenceGroup {
                id,
                account_id: account_id.to_string(),
                fingerprint,
                transaction_ids: pattern.member_ids,
                expected_amount_minor: pattern.expected_amount_minor,
                interval_days: pattern.interval_days,
                interval_tolerance_days: pattern.interval_tolerance_days,
                first_seen: pattern.first_seen,
                last_seen: pattern.last_seen,
                confidence: pattern.confidence,
                state,
            });
        }

        // A transaction belongs to at most one active group: first-match-wins
        // by group creation order (earliest first_seen, then id for a total
        // order).
        groups.sort_by(|a, b| a.first_seen.cmp(&b.first_seen).then_with(|| a.id.cmp(&b.id)));
        let mut claimed: HashSet<String> = HashSet::new();
        groups.retain_mut(|group| {
            group
                .transaction_ids
                .retain(|tx_id| !claimed.contains(tx_id));
            if group.transaction_ids.len() < self.config.min_occurrences {
                return false;
            }
            for tx_id in &group.transaction_ids {
                claimed.insert(tx_id.clone());
            }
            true
        });

        groups
    }

    /// Look for a consistent amount/interval pattern in date-sorted charges
    fn find_pattern(&self, sorted: &[&Transaction]) -> Option<PatternInfo> {
        let amounts: Vec<i64> = sorted.iter().map(|tx| tx.amount_minor.abs()).collect();
        let median_amount = median(&amounts);
        if median_amount == 0 {
            return None;
        }
        let tolerance = self.config.amount_tolerance_for(median_amount);

        // Keep the subsequence whose amounts sit within tolerance of the
        // median; stragglers (one-off larger purchases at the same merchant)
        // drop out without breaking the pattern.
        let members: Vec<&Transaction> = sorted
            .iter()
            .filter(|tx| (tx.amount_minor.abs() - median_amount).abs() <= tolerance)
            .copied()
            .collect();
        if members.len() < self.config.min_occurrences {
            return None;
        }

        let intervals: Vec<i64> = members
            .windows(2)
            .map(|w| (w[1].posted - w[0].posted).num_days())
            .collect();
        if intervals.is_empty() || intervals.iter().any(|&d| d <= 0) {
            return None;
        }

        // The median interval is robust against a missed occurrence (which
        // shows up as one doubled interval); use it to pick the period.
        let median_interval = median(&intervals);
        let interval_days = *self.config.known_intervals_days.iter().find(|&&known| {
            (median_interval - known).abs() <= self.config.interval_tolerance_for(known)
        })?;
        let interval_tolerance_days = self.config.interval_tolerance_for(interval_days);

        // Each interval must land near an integer multiple of the period
        // (a skipped month is two periods, still on schedule), and the
        // residuals must cluster: coefficient of variation below threshold.
        let mut residual_sq_sum = 0.0;
        for &interval in &intervals {
            let multiples = ((interval as f64 / interval_days as f64).round() as i64).max(1);
            let residual = interval - multiples * interval_days;
            if residual.abs() > interval_tolerance_days {
                return None;
            }
            residual_sq_sum += (residual * residual) as f64;
        }
        let cv = (residual_sq_sum / intervals.len() as f64).sqrt() / interval_days as f64;
        if cv > self.config.interval_cv_threshold {
            return None;
        }

        let member_amounts: Vec<i64> = members.iter().map(|tx| tx.amount_minor.abs()).collect();
        let amount_spread = member_amounts
            .iter()
            .map(|a| (a - median_amount).abs())
            .max()
            .unwrap_or(0) as f64
            / tolerance.max(1) as f64;

        Some(PatternInfo {
            member_ids: members.iter().map(|tx| tx.id.clone()).collect(),
            expected_amount_minor: median_amount,
            interval_days,
            interval_tolerance_days,
            first_seen: members.first()?.posted,
            last_seen: members.last()?.posted,
            confidence: confidence_score(
                members.len(),
                cv,
                self.config.interval_cv_threshold,
                amount_spread,
            ),
        })
    }

    /// Resolve the group state from confidence, prior state, user feedback,
    /// and overdue windows.
    fn resolve_state(
        &self,
        previous: Option<&RecurrenceGroup>,
        pattern: &PatternInfo,
        user_confirmed: bool,
        today: NaiveDate,
    ) -> GroupState {
        let was_confirmed = matches!(
            previous.map(|g| g.state),
            Some(GroupState::Confirmed) | Some(GroupState::Lapsed)
        );
        let confirmed = user_confirmed
            || was_confirmed
            || pattern.confidence >= self.config.confirm_confidence;

        if !confirmed {
            return GroupState::Candidate;
        }

        // A single missed occurrence is forgiven; two consecutive missed
        // windows mark the charge lapsed.
        let overdue_after =
            pattern.last_seen + chrono::Duration::days(2 * pattern.interval_days + pattern.interval_tolerance_days);
        if today > overdue_after {
            GroupState::Lapsed
        } else {
            GroupState::Confirmed
        }
    }
}

/// Confidence from sample count and amount/interval variance. More samples
/// and lower variance push it toward 1.
fn confidence_score(samples: usize, cv: f64, cv_threshold: f64, amount_spread: f64) -> f64 {
    let sample_factor = 1.0 - 1.0 / (2.0 * samples as f64);
    let interval_factor = 1.0 - 0.5 * (cv / cv_threshold).clamp(0.0, 1.0);
    let amount_factor = 1.0 - 0.5 * amount_spread.clamp(0.0, 1.0);
    (sample_factor * interval_factor * amount_factor).clamp(0.0, 1.0)
}

/// Median of a non-empty slice; 0 for an empty one
fn median(values: &[i64]) -> i64 {
    if values.is_empty() {
        return 0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2
    } else {
        sorted[mid]
    }
}
