//! Budget evaluation
//!
//! Compares period aggregates against configured thresholds and emits tiered
//! alerts. Evaluation is a pure function of its inputs and deduplicates on
//! (category, period, severity), so re-evaluating the same exceeded budget
//! produces exactly one alert.

use std::collections::HashSet;

use tracing::warn;

use crate::models::{
    format_minor, AlertKey, AlertSeverity, Budget, BudgetAlert, PeriodAggregate, ALL_CATEGORIES,
};

/// Evaluate budgets against aggregates.
///
/// `known_categories` is the registry snapshot; a budget referencing a
/// category outside it is inconsistent configuration and is skipped with a
/// warning while the remaining entries proceed.
pub fn evaluate(
    aggregates: &[PeriodAggregate],
    budgets: &[Budget],
    known_categories: &HashSet<String>,
) -> Vec<BudgetAlert> {
    let mut seen: HashSet<AlertKey> = HashSet::new();
    let mut alerts = Vec::new();

    for budget in budgets {
        if budget.threshold_minor <= 0 {
            warn!(
                "Skipping budget for {}: non-positive threshold {}",
                budget.category, budget.threshold_minor
            );
            continue;
        }
        if budget.category != ALL_CATEGORIES && !known_categories.contains(&budget.category) {
            warn!(
                "Skipping budget for unknown category {} ({})",
                budget.category, budget.granularity
            );
            continue;
        }

        for aggregate in aggregates {
            if aggregate.category != budget.category || aggregate.granularity != budget.granularity
            {
                continue;
            }

            // Budgets bound spend: the absolute value of the settled total
            let spent = aggregate.total_minor.abs();
            let ratio = spent as f64 / budget.threshold_minor as f64;
            let Some(severity) = AlertSeverity::for_ratio(ratio) else {
                continue;
            };

            let key: AlertKey = (budget.category.clone(), aggregate.period_start, severity);
            if !seen.insert(key) {
                continue; // already emitted for this (category, period, severity)
            }

            let message = match severity {
                AlertSeverity::Critical => format!(
                    "{} spending of {} blew past the {} budget for the {} starting {}",
                    budget.category,
                    format_minor(spent),
                    format_minor(budget.threshold_minor),
                    budget.granularity,
                    aggregate.period_start
                ),
                AlertSeverity::Warning | AlertSeverity::Notice => format!(
                    "{} spending of {} is at {:.0}% of the {} budget for the {} starting {}",
                    budget.category,
                    format_minor(spent),
                    ratio * 100.0,
                    format_minor(budget.threshold_minor),
                    budget.granularity,
                    aggregate.period_start
                ),
            };

            alerts.push(BudgetAlert {
                account_id: aggregate.account_id.clone(),
                category: budget.category.clone(),
                granularity: budget.granularity,
                period_start: aggregate.period_start,
                severity,
                spent_minor: spent,
                threshold_minor: budget.threshold_minor,
                exceeded_by_minor: spent - budget.threshold_minor,
                message,
            });
        }
    }

    alerts
}
