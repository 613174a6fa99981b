//! One-shot analysis command

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use outlay_core::models::{format_minor, ALL_CATEGORIES};
use outlay_core::{
    AccountSnapshot, CancelHandle, Engine, GroupState, MemoryPublisher, ResultPublisher,
};

use super::{load_store, truncate};

pub async fn cmd_analyze(
    config_path: Option<&Path>,
    file: &Path,
    account: Option<&str>,
    today: Option<&str>,
    json: bool,
) -> Result<()> {
    let (store, account_ids, config) = load_store(config_path, file, account)?;

    let today = match today {
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .context("Invalid --today format (use YYYY-MM-DD)")?,
        None => Utc::now().date_naive(),
    };

    let publisher = Arc::new(MemoryPublisher::new());
    let engine = Engine::new(
        store.clone(),
        store.clone(),
        store,
        publisher.clone(),
        config.engine.with_env_overrides(),
    );

    let cancel = CancelHandle::new();
    for account_id in &account_ids {
        engine.run_account_at(account_id, &cancel, today).await?;
        let snapshot = publisher
            .latest(account_id)
            .await?
            .context("Analysis published no snapshot")?;

        if json {
            println!("{}", serde_json::to_string_pretty(snapshot.as_ref())?);
        } else {
            print_report(&snapshot);
        }
    }

    Ok(())
}

fn print_report(snapshot: &AccountSnapshot) {
    println!();
    println!("📒 Account {}", snapshot.account_id);
    println!("   computed at {}", snapshot.computed_at.format("%Y-%m-%d %H:%M:%S UTC"));

    println!();
    println!("🔁 Recurring Charges");
    if snapshot.groups.is_empty() {
        println!("   none detected");
    }
    for group in &snapshot.groups {
        let icon = match group.state {
            GroupState::Confirmed => "✅",
            GroupState::Candidate => "❔",
            GroupState::Lapsed => "💤",
        };
        println!(
            "   {} {:20} │ {:>9} every {:>3}d │ {:.0}% confidence │ next by {}",
            icon,
            truncate(&group.fingerprint, 20),
            format_minor(group.expected_amount_minor),
            group.interval_days,
            group.confidence * 100.0,
            group.next_expected_by()
        );
    }

    println!();
    println!("📊 Spending by Period");
    for aggregate in &snapshot.aggregates {
        if aggregate.category == ALL_CATEGORIES {
            continue;
        }
        let delta = match aggregate.delta_minor {
            Some(d) if d != 0 => format!(" ({}{} vs prior)", if d > 0 { "+" } else { "" }, format_minor(d)),
            _ => String::new(),
        };
        println!(
            "   {} {:16} │ {:>10} │ {:>3} tx{}",
            aggregate.period_start,
            truncate(&aggregate.category, 16),
            format_minor(aggregate.total_minor),
            aggregate.transaction_count,
            delta
        );
    }

    if !snapshot.alerts.is_empty() {
        println!();
        println!("🚨 Budget Alerts");
        for alert in &snapshot.alerts {
            println!("   [{}] {}", alert.severity.as_str(), alert.message);
        }
    }

    if !snapshot.insights.suggestions.is_empty() {
        println!();
        println!("💡 Suggestions");
        for suggestion in &snapshot.insights.suggestions {
            println!("   • {}", suggestion.message);
        }
    }
}
