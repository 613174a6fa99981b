//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `analyze` - One-shot analysis over a CSV export
//! - `watch` - Scheduled recomputation until interrupted

pub mod analyze;
pub mod watch;

// Re-export command functions for main.rs
pub use analyze::*;
pub use watch::*;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use outlay_core::{ConfigFile, MemoryStore};

/// Load configuration, parse the CSV, and seed an in-memory store.
///
/// Returns the store, the account ids to analyze (in stable order), and the
/// loaded configuration.
pub fn load_store(
    config_path: Option<&Path>,
    file: &Path,
    account_filter: Option<&str>,
) -> Result<(Arc<MemoryStore>, Vec<String>, ConfigFile)> {
    let config = match config_path {
        Some(path) => ConfigFile::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ConfigFile::default(),
    };

    let reader = std::fs::File::open(file)
        .with_context(|| format!("Failed to open {}", file.display()))?;
    let records = outlay_core::import::parse_csv(reader)
        .with_context(|| format!("Failed to parse {}", file.display()))?;

    let store = Arc::new(MemoryStore::new());
    store.set_categories(config.categories.clone())?;

    let mut by_account: std::collections::BTreeMap<String, Vec<_>> =
        std::collections::BTreeMap::new();
    for record in records {
        by_account
            .entry(record.account_id.clone())
            .or_default()
            .push(record);
    }

    let mut account_ids = Vec::new();
    for (account_id, records) in by_account {
        if let Some(only) = account_filter {
            if account_id != only {
                continue;
            }
        }
        store.set_budgets(&account_id, config.budgets.clone())?;
        store.add_transactions(&account_id, records)?;
        account_ids.push(account_id);
    }

    anyhow::ensure!(
        !account_ids.is_empty(),
        "No matching transactions in {}",
        file.display()
    );

    Ok((store, account_ids, config))
}

/// Truncate a string to a maximum number of characters, adding "..." if
/// truncated. Counts chars rather than bytes so multibyte merchant names
/// never split mid-character.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
