//! Spending insights
//!
//! Per-category statistics, trend analysis, and rule-based suggestions over a
//! recent window of settled expenses. Rides inside the published snapshot so
//! read paths get them alongside aggregates.

use std::collections::{BTreeMap, HashMap};

use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::models::{format_minor, Transaction, UNCATEGORIZED};

/// Summary statistics for one category over the analysis window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryStats {
    pub category: String,
    /// Absolute spend in minor units
    pub total_minor: i64,
    pub transaction_count: usize,
    pub average_minor: i64,
    pub min_minor: i64,
    pub max_minor: i64,
    pub percent_of_total: f64,
}

/// Direction of the recent spending trend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
    /// Fewer than two weeks of data in the window
    InsufficientData,
}

/// A single day's spend, used for the highest/lowest day callouts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaySpend {
    pub date: NaiveDate,
    pub total_minor: i64,
}

/// Week-over-week spending trend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpendingTrend {
    pub direction: TrendDirection,
    /// Average weekly spend over the most recent two weeks
    pub recent_weekly_avg_minor: i64,
    /// Average weekly spend over the earliest weeks of the window
    pub earlier_weekly_avg_minor: i64,
    pub daily_average_minor: i64,
    pub highest_day: Option<DaySpend>,
    pub lowest_day: Option<DaySpend>,
}

/// Suggestion flavor, mirrored in priority ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionKind {
    Warning,
    Alert,
    Tip,
    Budget,
    Positive,
    Info,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionPriority {
    Low,
    Medium,
    High,
}

/// A rule-generated spending suggestion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suggestion {
    pub kind: SuggestionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub message: String,
    pub priority: SuggestionPriority,
}

/// Insights over the analysis window for one account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpendingInsights {
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,
    /// Total absolute spend in the window, minor units
    pub total_spent_minor: i64,
    pub expense_count: usize,
    pub categories: Vec<CategoryStats>,
    pub trend: SpendingTrend,
    pub suggestions: Vec<Suggestion>,
}

impl SpendingInsights {
    /// Empty insights for an account with no activity in the window
    pub fn empty(window_start: NaiveDate, window_end: NaiveDate) -> Self {
        Self {
            window_start,
            window_end,
            total_spent_minor: 0,
            expense_count: 0,
            categories: Vec::new(),
            trend: SpendingTrend {
                direction: TrendDirection::InsufficientData,
                recent_weekly_avg_minor: 0,
                earlier_weekly_avg_minor: 0,
                daily_average_minor: 0,
                highest_day: None,
                lowest_day: None,
            },
            suggestions: vec![Suggestion {
                kind: SuggestionKind::Info,
                category: None,
                message: format!(
                    "No expense activity between {} and {}. Nothing to analyze yet.",
                    window_start, window_end
                ),
                priority: SuggestionPriority::Low,
            }],
        }
    }
}

/// Build insights from settled expenses in `[window_start, window_end]`.
pub fn build_insights(
    transactions: &[Transaction],
    assignments: &HashMap<String, String>,
    window_start: NaiveDate,
    window_end: NaiveDate,
) -> SpendingInsights {
    let expenses: Vec<&Transaction> = transactions
        .iter()
        .filter(|tx| {
            tx.status.is_settled()
                && tx.amount_minor < 0
                && tx.posted >= window_start
                && tx.posted <= window_end
        })
        .collect();

    if expenses.is_empty() {
        return SpendingInsights::empty(window_start, window_end);
    }

    let total_spent: i64 = expenses.iter().map(|tx| tx.amount_minor.abs()).sum();
    let categories = category_stats(&expenses, assignments, total_spent);
    let trend = spending_trend(&expenses, window_start, window_end);
    let suggestions = suggestions(&categories, &trend, total_spent);

    SpendingInsights {
        window_start,
        window_end,
        total_spent_minor: total_spent,
        expense_count: expenses.len(),
        categories,
        trend,
        suggestions,
    }
}

fn category_stats(
    expenses: &[&Transaction],
    assignments: &HashMap<String, String>,
    total_spent: i64,
) -> Vec<CategoryStats> {
    let mut grouped: BTreeMap<&str, Vec<i64>> = BTreeMap::new();
    for tx in expenses {
        let category = assignments
            .get(&tx.id)
            .map(String::as_str)
            .unwrap_or(UNCATEGORIZED);
        grouped.entry(category).or_default().push(tx.amount_minor.abs());
    }

    let mut stats: Vec<CategoryStats> = grouped
        .into_iter()
        .map(|(category, amounts)| {
            let total: i64 = amounts.iter().sum();
            CategoryStats {
                category: category.to_string(),
                total_minor: total,
                transaction_count: amounts.len(),
                average_minor: total / amounts.len() as i64,
                min_minor: *amounts.iter().min().expect("non-empty"),
                max_minor: *amounts.iter().max().expect("non-empty"),
                percent_of_total: if total_spent > 0 {
                    total as f64 / total_spent as f64 * 100.0
                } else {
                    0.0
                },
            }
        })
        .collect();

    // Largest spend first
    stats.sort_by(|a, b| b.total_minor.cmp(&a.total_minor));
    stats
}

fn spending_trend(
    expenses: &[&Transaction],
    window_start: NaiveDate,
    window_end: NaiveDate,
) -> SpendingTrend {
    // Group by ISO year-week
    let mut weekly: BTreeMap<(i32, u32), i64> = BTreeMap::new();
    let mut daily: BTreeMap<NaiveDate, i64> = BTreeMap::new();
    for tx in expenses {
        let week = tx.posted.iso_week();
        *weekly.entry((week.year(), week.week())).or_default() += tx.amount_minor.abs();
        *daily.entry(tx.posted).or_default() += tx.amount_minor.abs();
    }

    let total: i64 = expenses.iter().map(|tx| tx.amount_minor.abs()).sum();
    let window_days = (window_end - window_start).num_days().max(1);

    let weeks: Vec<i64> = weekly.values().copied().collect();
    let (direction, recent_avg, earlier_avg) = if weeks.len() < 2 {
        (TrendDirection::InsufficientData, 0, 0)
    } else {
        // Compare the last two weeks against the earliest weeks of the window
        let recent: &[i64] = &weeks[weeks.len().saturating_sub(2)..];
        let earlier: &[i64] = if weeks.len() >= 4 {
            &weeks[..2]
        } else {
            &weeks[..1]
        };
        let recent_avg = recent.iter().sum::<i64>() / recent.len() as i64;
        let earlier_avg = earlier.iter().sum::<i64>() / earlier.len() as i64;
        let direction = if recent_avg as f64 > earlier_avg as f64 * 1.1 {
            TrendDirection::Increasing
        } else if (recent_avg as f64) < earlier_avg as f64 * 0.9 {
            TrendDirection::Decreasing
        } else {
            TrendDirection::Stable
        };
        (direction, recent_avg, earlier_avg)
    };

    let highest_day = daily
        .iter()
        .max_by_key(|(_, total)| **total)
        .map(|(date, total)| DaySpend {
            date: *date,
            total_minor: *total,
        });
    let lowest_day = daily
        .iter()
        .min_by_key(|(_, total)| **total)
        .map(|(date, total)| DaySpend {
            date: *date,
            total_minor: *total,
        });

    SpendingTrend {
        direction,
        recent_weekly_avg_minor: recent_avg,
        earlier_weekly_avg_minor: earlier_avg,
        daily_average_minor: total / window_days,
        highest_day,
        lowest_day,
    }
}

fn suggestions(
    categories: &[CategoryStats],
    trend: &SpendingTrend,
    total_spent: i64,
) -> Vec<Suggestion> {
    let mut out = Vec::new();

    // Dominant categories: top three by spend
    for stats in categories.iter().take(3) {
        if stats.percent_of_total > 30.0 {
            out.push(Suggestion {
                kind: SuggestionKind::Warning,
                category: Some(stats.category.clone()),
                message: format!(
                    "{} is {:.1}% of your spending ({}). Consider reducing it by 15-20%.",
                    stats.category,
                    stats.percent_of_total,
                    format_minor(stats.total_minor)
                ),
                priority: SuggestionPriority::High,
            });
        } else if stats.percent_of_total > 20.0 {
            out.push(Suggestion {
                kind: SuggestionKind::Tip,
                category: Some(stats.category.clone()),
                message: format!(
                    "{} is your top spending category at {}. Consider setting a budget for it.",
                    stats.category,
                    format_minor(stats.total_minor)
                ),
                priority: SuggestionPriority::Medium,
            });
        }
    }

    match trend.direction {
        TrendDirection::Increasing => out.push(Suggestion {
            kind: SuggestionKind::Alert,
            category: None,
            message: format!(
                "Spending is trending up: weekly average went from {} to {}.",
                format_minor(trend.earlier_weekly_avg_minor),
                format_minor(trend.recent_weekly_avg_minor)
            ),
            priority: SuggestionPriority::High,
        }),
        TrendDirection::Decreasing => out.push(Suggestion {
            kind: SuggestionKind::Positive,
            category: None,
            message: format!(
                "Spending is trending down: saving about {} per week vs earlier in the window.",
                format_minor(trend.earlier_weekly_avg_minor - trend.recent_weekly_avg_minor)
            ),
            priority: SuggestionPriority::Low,
        }),
        TrendDirection::Stable | TrendDirection::InsufficientData => {}
    }

    // High-frequency categories invite impulse spending
    for stats in categories {
        if stats.transaction_count > 15 {
            out.push(Suggestion {
                kind: SuggestionKind::Tip,
                category: Some(stats.category.clone()),
                message: format!(
                    "{} {} transactions this window. Consolidating purchases can curb impulse spending.",
                    stats.transaction_count, stats.category
                ),
                priority: SuggestionPriority::Medium,
            });
        }
    }

    if total_spent > 0 {
        let suggested = total_spent * 9 / 10;
        out.push(Suggestion {
            kind: SuggestionKind::Budget,
            category: None,
            message: format!(
                "Based on this window, a total budget of {} would save 10%.",
                format_minor(suggested)
            ),
            priority: SuggestionPriority::Medium,
        });
    }

    if out.is_empty() {
        out.push(Suggestion {
            kind: SuggestionKind::Positive,
            category: None,
            message: "Spending looks well-balanced for this window.".to_string(),
            priority: SuggestionPriority::Low,
        });
    }

    out.sort_by(|a, b| b.priority.cmp(&a.priority));
    out
}

/// Default analysis window ending today
pub fn default_window(today: NaiveDate, window_days: i64) -> (NaiveDate, NaiveDate) {
    (today - Days::new(window_days.max(1) as u64), today)
}
