//! Engine job runner
//!
//! One recomputation job per account: fetch → categorize → detect →
//! aggregate → evaluate → publish. Stages are synchronous and CPU-bound;
//! suspension points sit at the storage I/O boundaries. Results are built
//! fresh each run and published as one atomic snapshot, so a failed or
//! cancelled job leaves the last-known-good snapshot authoritative.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::{debug, info, warn};

use crate::aggregate;
use crate::budget;
use crate::categorize::Categorizer;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::insights;
use crate::models::{AccountSnapshot, Transaction, TransactionRecord};
use crate::recurrence::RecurrenceDetector;
use crate::store::{BudgetSource, CategoryRegistry, ResultPublisher, TransactionStore};

/// Cooperative cancellation flag, checked at stage boundaries only
#[derive(Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Outcome of one engine run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// A new snapshot was published
    Published,
    /// The job was cancelled between stages; nothing was published
    Cancelled,
}

/// The expense analysis engine for all accounts behind one set of stores
pub struct Engine {
    store: Arc<dyn TransactionStore>,
    registry: Arc<dyn CategoryRegistry>,
    budgets: Arc<dyn BudgetSource>,
    publisher: Arc<dyn ResultPublisher>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(
        store: Arc<dyn TransactionStore>,
        registry: Arc<dyn CategoryRegistry>,
        budgets: Arc<dyn BudgetSource>,
        publisher: Arc<dyn ResultPublisher>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            registry,
            budgets,
            publisher,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn publisher(&self) -> &Arc<dyn ResultPublisher> {
        &self.publisher
    }

    /// Run one recomputation job for an account as of today
    pub async fn run_account(&self, account_id: &str, cancel: &CancelHandle) -> Result<RunOutcome> {
        self.run_account_at(account_id, cancel, Utc::now().date_naive())
            .await
    }

    /// Run one recomputation job with an explicit "today", for testability
    pub async fn run_account_at(
        &self,
        account_id: &str,
        cancel: &CancelHandle,
        today: NaiveDate,
    ) -> Result<RunOutcome> {
        // Stage 1: read everything the job needs as snapshots
        let records = self.store.fetch_transactions(account_id, None).await?;
        let corrections = self.store.fetch_corrections(account_id, None).await?;
        let categories = self.registry.list_categories().await?;
        let feedback = self.registry.list_recurrence_feedback(account_id).await?;
        let budgets = self.budgets.list_budgets(account_id).await?;
        let previous = self.publisher.latest(account_id).await?;

        if cancel.is_cancelled() {
            info!("Job for {} cancelled before analysis", account_id);
            return Ok(RunOutcome::Cancelled);
        }

        let transactions = validate_and_merge(account_id, records, corrections);
        debug!(
            "Analyzing {} transactions for {}",
            transactions.len(),
            account_id
        );

        // Stage 2: categorize, then detect recurrences. Detection runs first
        // of the batch stages so recurrence-driven state lands before
        // aggregation consumers read it.
        let categorizer = Categorizer::new(&categories);
        let assignments = categorizer.categorize_all(&transactions);

        let previous_groups: &[_] = previous.as_ref().map(|s| s.groups.as_slice()).unwrap_or(&[]);
        let detector = RecurrenceDetector::new(&self.config);
        let groups = detector.detect(account_id, &transactions, previous_groups, &feedback, today);

        if cancel.is_cancelled() {
            info!("Job for {} cancelled after detection", account_id);
            return Ok(RunOutcome::Cancelled);
        }

        // Stage 3: aggregate at every configured granularity, plus any
        // granularity a budget names. A weekly budget must be evaluated
        // against weekly buckets even when only monthly aggregates are
        // configured for materialization.
        let mut granularities = self.config.granularities.clone();
        for budget in &budgets {
            if !granularities.contains(&budget.granularity) {
                debug!(
                    "Adding {} aggregation for the {} budget",
                    budget.granularity, budget.category
                );
                granularities.push(budget.granularity);
            }
        }

        let mut aggregates = Vec::new();
        for granularity in &granularities {
            aggregates.extend(aggregate::aggregate(
                account_id,
                &transactions,
                &assignments,
                *granularity,
                None,
            ));
        }

        let known_categories: HashSet<String> =
            categories.iter().map(|c| c.name.clone()).collect();
        let alerts = budget::evaluate(&aggregates, &budgets, &known_categories);

        let (window_start, window_end) =
            insights::default_window(today, self.config.insights_window_days);
        let account_insights =
            insights::build_insights(&transactions, &assignments, window_start, window_end);

        if cancel.is_cancelled() {
            info!("Job for {} cancelled before publish", account_id);
            return Ok(RunOutcome::Cancelled);
        }

        // Stage 4: atomic publish; any error is a job failure and the prior
        // snapshot stays authoritative
        let snapshot = AccountSnapshot {
            account_id: account_id.to_string(),
            computed_at: Utc::now(),
            groups,
            aggregates,
            alerts,
            insights: account_insights,
        };
        let groups_count = snapshot.groups.len();
        let aggregates_count = snapshot.aggregates.len();
        let alerts_count = snapshot.alerts.len();

        self.publisher
            .publish(snapshot)
            .await
            .map_err(|e| Error::PublishFailure(e.to_string()))?;

        info!(
            "Published snapshot for {}: {} groups, {} aggregates, {} alerts",
            account_id, groups_count, aggregates_count, alerts_count
        );
        Ok(RunOutcome::Published)
    }
}

/// Apply corrections over the base records (replacement by id), then validate
/// each row. Malformed rows are skipped with a log line; one bad record never
/// aborts the batch.
fn validate_and_merge(
    account_id: &str,
    records: Vec<TransactionRecord>,
    corrections: Vec<TransactionRecord>,
) -> Vec<Transaction> {
    let mut by_id: HashMap<String, TransactionRecord> = records
        .into_iter()
        .map(|r| (r.id.clone(), r))
        .collect();
    for correction in corrections {
        by_id.insert(correction.id.clone(), correction);
    }

    let mut transactions: Vec<Transaction> = by_id
        .into_values()
        .filter_map(|record| match record.into_validated() {
            Ok(tx) => Some(tx),
            Err(e) => {
                warn!("Skipping record for {}: {}", account_id, e);
                None
            }
        })
        .collect();

    transactions.sort_by(|a, b| a.posted.cmp(&b.posted).then_with(|| a.id.cmp(&b.id)));
    transactions
}
