//! Domain models for Outlay

use chrono::{DateTime, Datelike, Days, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::insights::SpendingInsights;

/// Category name assigned when no rule or override matches.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// Pseudo-category used for the per-period rollup across all categories.
pub const ALL_CATEGORIES: &str = "all";

/// Transaction lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// Authorized but not yet settled. Excluded from settled totals,
    /// reported separately as a pending total per bucket.
    Pending,
    Settled,
    /// Settled and later amended through the correction API.
    Corrected,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Settled => "settled",
            Self::Corrected => "corrected",
        }
    }

    /// Corrected records are settled records with amended fields; both
    /// count toward settled totals.
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Settled | Self::Corrected)
    }
}

impl std::str::FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "settled" => Ok(Self::Settled),
            "corrected" => Ok(Self::Corrected),
            _ => Err(format!("Unknown transaction status: {}", s)),
        }
    }
}

/// A raw transaction row as returned by a store adapter, before validation.
///
/// Store adapters are external; rows can arrive with holes (a missing posted
/// date is the common one). Validation turns a row into a [`Transaction`] or
/// a [`Error::MalformedRecord`] that callers skip and log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: String,
    pub account_id: String,
    pub posted: Option<NaiveDate>,
    /// Signed amount in minor units (cents). Negative = expense.
    pub amount_minor: i64,
    /// Raw merchant description as it appears on the statement
    pub description: String,
    /// Exact per-transaction category override set by the user
    pub user_category: Option<String>,
    pub status: TransactionStatus,
}

impl TransactionRecord {
    /// Validate basic invariants and produce an immutable [`Transaction`].
    pub fn into_validated(self) -> Result<Transaction> {
        if self.id.trim().is_empty() {
            return Err(Error::MalformedRecord("empty transaction id".into()));
        }
        if self.account_id.trim().is_empty() {
            return Err(Error::MalformedRecord(format!(
                "transaction {} has no account id",
                self.id
            )));
        }
        let posted = self.posted.ok_or_else(|| {
            Error::MalformedRecord(format!("transaction {} has no posted date", self.id))
        })?;

        Ok(Transaction {
            id: self.id,
            account_id: self.account_id,
            posted,
            amount_minor: self.amount_minor,
            description: self.description,
            user_category: self.user_category,
            status: self.status,
        })
    }
}

/// A validated, immutable-once-settled transaction.
///
/// The engine never mutates source records; corrections arrive as replacement
/// records through the store adapter's correction feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub account_id: String,
    pub posted: NaiveDate,
    /// Signed amount in minor units (cents). Negative = expense.
    pub amount_minor: i64,
    pub description: String,
    pub user_category: Option<String>,
    pub status: TransactionStatus,
}

/// A tagged match predicate for category assignment.
///
/// Rules are evaluated in priority order; the most specific match (longest
/// substring / longest regex pattern) wins, ties broken by earliest-defined
/// rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchPattern {
    /// Case-insensitive substring match against the merchant description
    Substring(String),
    /// Regex match against the merchant description
    Regex(String),
}

impl MatchPattern {
    /// Specificity used for tie-breaking: longer patterns win.
    pub fn specificity(&self) -> usize {
        match self {
            Self::Substring(s) | Self::Regex(s) => s.len(),
        }
    }
}

/// One matching rule inside a category definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryRule {
    pub pattern: MatchPattern,
    /// Inclusive lower bound on the signed minor-unit amount
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_amount_minor: Option<i64>,
    /// Inclusive upper bound on the signed minor-unit amount
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_amount_minor: Option<i64>,
}

impl CategoryRule {
    pub fn amount_in_range(&self, amount_minor: i64) -> bool {
        if let Some(min) = self.min_amount_minor {
            if amount_minor < min {
                return false;
            }
        }
        if let Some(max) = self.max_amount_minor {
            if amount_minor > max {
                return false;
            }
        }
        true
    }
}

/// A user-editable category: a name plus its ordered matching rules
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    #[serde(default)]
    pub rules: Vec<CategoryRule>,
}

/// Recurrence group lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupState {
    /// Pattern detected but below the confidence threshold
    Candidate,
    /// Confidence crossed the threshold, or the user confirmed it
    Confirmed,
    /// Two consecutive expected occurrences missed with no matching charge
    Lapsed,
}

impl GroupState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Candidate => "candidate",
            Self::Confirmed => "confirmed",
            Self::Lapsed => "lapsed",
        }
    }
}

/// A set of transactions believed to represent the same recurring charge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurrenceGroup {
    /// Stable id derived from (account, fingerprint, interval) so that
    /// re-detection on unchanged input yields the same groups
    pub id: String,
    pub account_id: String,
    /// Normalized merchant identifier the group was keyed on
    pub fingerprint: String,
    /// Member transaction ids, in date order
    pub transaction_ids: Vec<String>,
    /// Expected charge amount in minor units (median of members, absolute)
    pub expected_amount_minor: i64,
    /// Expected days between charges
    pub interval_days: i64,
    /// Tolerance window around the expected interval
    pub interval_tolerance_days: i64,
    pub first_seen: NaiveDate,
    pub last_seen: NaiveDate,
    /// How strongly this group resembles a true recurring charge, in [0, 1]
    pub confidence: f64,
    pub state: GroupState,
}

impl RecurrenceGroup {
    /// Date by which the next charge is expected, including tolerance
    pub fn next_expected_by(&self) -> NaiveDate {
        self.last_seen + chrono::Duration::days(self.interval_days + self.interval_tolerance_days)
    }
}

/// User feedback on a detected recurrence group, keyed by fingerprint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackAction {
    /// Treat the group as confirmed regardless of confidence
    Confirm,
    /// Suppress the group entirely
    Reject,
}

/// Confirm/reject feedback fed back into detection as a rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurrenceFeedback {
    pub fingerprint: String,
    pub action: FeedbackAction,
}

/// Aggregation bucket width
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Day,
    Week,
    Month,
    Year,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::Year => "year",
        }
    }

    /// Start of the period containing `date`. Weeks start on Monday.
    pub fn period_start(&self, date: NaiveDate) -> NaiveDate {
        match self {
            Self::Day => date,
            Self::Week => date - Days::new(date.weekday().num_days_from_monday() as u64),
            Self::Month => date.with_day(1).expect("day 1 always valid"),
            Self::Year => NaiveDate::from_ymd_opt(date.year(), 1, 1).expect("jan 1 always valid"),
        }
    }

    /// Start of the period immediately after the one beginning at `start`
    pub fn next_period_start(&self, start: NaiveDate) -> NaiveDate {
        match self {
            Self::Day => start + Days::new(1),
            Self::Week => start + Days::new(7),
            Self::Month => start + Months::new(1),
            Self::Year => start + Months::new(12),
        }
    }

    /// Inclusive end of the period beginning at `start`
    pub fn period_end(&self, start: NaiveDate) -> NaiveDate {
        self.next_period_start(start) - Days::new(1)
    }
}

impl std::str::FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "day" | "daily" => Ok(Self::Day),
            "week" | "weekly" => Ok(Self::Week),
            "month" | "monthly" => Ok(Self::Month),
            "year" | "yearly" => Ok(Self::Year),
            _ => Err(format!("Unknown granularity: {}", s)),
        }
    }
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-period, per-category summary. Fully derived; treated as a cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodAggregate {
    pub account_id: String,
    /// Category name, or [`ALL_CATEGORIES`] for the per-period rollup
    pub category: String,
    pub granularity: Granularity,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    /// Sum of signed settled amounts in minor units
    pub total_minor: i64,
    /// Count of settled transactions in the bucket
    pub transaction_count: usize,
    /// Sum of signed pending amounts, kept out of the settled total
    pub pending_minor: i64,
    /// Change vs. the immediately preceding period of equal length.
    /// None when no prior period exists in the aggregated range.
    pub delta_minor: Option<i64>,
}

/// A configured budget threshold, owned by external configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Budget {
    pub category: String,
    pub granularity: Granularity,
    /// Spend threshold per period, in minor units (always positive)
    pub threshold_minor: i64,
}

/// Severity tiers for budget alerts
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    /// Spend above 75% of the threshold
    Notice,
    /// Spend above 90% of the threshold
    Warning,
    /// Threshold exceeded
    Critical,
}

impl AlertSeverity {
    /// Highest tier reached at the given spend/threshold ratio
    pub fn for_ratio(ratio: f64) -> Option<Self> {
        if ratio > 1.0 {
            Some(Self::Critical)
        } else if ratio > 0.90 {
            Some(Self::Warning)
        } else if ratio > 0.75 {
            Some(Self::Notice)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Notice => "notice",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

/// Dedup key for budget alerts: one alert per (category, period, severity)
pub type AlertKey = (String, NaiveDate, AlertSeverity);

/// A budget threshold crossing for one category and period
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetAlert {
    pub account_id: String,
    pub category: String,
    pub granularity: Granularity,
    pub period_start: NaiveDate,
    pub severity: AlertSeverity,
    /// Absolute spend for the period, in minor units
    pub spent_minor: i64,
    pub threshold_minor: i64,
    /// spent - threshold; negative for sub-threshold tiers
    pub exceeded_by_minor: i64,
    pub message: String,
}

impl BudgetAlert {
    pub fn key(&self) -> AlertKey {
        (self.category.clone(), self.period_start, self.severity)
    }
}

/// The materialized result set for one account.
///
/// Built fresh by every engine run and published as a single atomic swap, so
/// readers always see a complete prior or current version. Everything in here
/// is reconstructible from the transaction set plus current configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub account_id: String,
    /// "Last computed at" timestamp surfaced to read paths alongside
    /// possibly-stale results
    pub computed_at: DateTime<Utc>,
    pub groups: Vec<RecurrenceGroup>,
    pub aggregates: Vec<PeriodAggregate>,
    pub alerts: Vec<BudgetAlert>,
    pub insights: SpendingInsights,
}

/// Format a minor-unit amount as a decimal string, e.g. -999 -> "-9.99"
pub fn format_minor(amount_minor: i64) -> String {
    let sign = if amount_minor < 0 { "-" } else { "" };
    let abs = amount_minor.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}
