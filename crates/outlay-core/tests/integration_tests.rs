//! Integration tests for outlay-core
//!
//! These tests exercise the full fetch → categorize → detect → aggregate →
//! evaluate → publish workflow through the engine and scheduler.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;

use outlay_core::models::{ALL_CATEGORIES, UNCATEGORIZED};
use outlay_core::{
    AccountSnapshot, Budget, CancelHandle, Category, CategoryRule, Engine, EngineConfig,
    Granularity, GroupState, MatchPattern, MemoryPublisher, MemoryStore, ResultPublisher, Result,
    RunOutcome, Scheduler, TransactionRecord, TransactionStatus,
};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn record(
    id: &str,
    account_id: &str,
    posted: NaiveDate,
    description: &str,
    amount_minor: i64,
) -> TransactionRecord {
    TransactionRecord {
        id: id.into(),
        account_id: account_id.into(),
        posted: Some(posted),
        amount_minor,
        description: description.into(),
        user_category: None,
        status: TransactionStatus::Settled,
    }
}

/// Three monthly Netflix charges, enough to confirm a recurrence group
fn netflix_records(account_id: &str) -> Vec<TransactionRecord> {
    vec![
        record("tx-1", account_id, date(2024, 1, 5), "NETFLIX123", -999),
        record("tx-2", account_id, date(2024, 2, 4), "NETFLIX123", -999),
        record("tx-3", account_id, date(2024, 3, 5), "NETFLIX123", -999),
    ]
}

fn entertainment_category() -> Category {
    Category {
        name: "Entertainment".into(),
        rules: vec![CategoryRule {
            pattern: MatchPattern::Substring("NETFLIX".into()),
            min_amount_minor: None,
            max_amount_minor: None,
        }],
    }
}

fn build_engine(store: Arc<MemoryStore>, publisher: Arc<dyn ResultPublisher>) -> Engine {
    Engine::new(
        store.clone(),
        store.clone(),
        store,
        publisher,
        EngineConfig::default(),
    )
}

#[tokio::test]
async fn test_full_analysis_workflow() {
    let store = Arc::new(MemoryStore::new());
    store
        .add_transactions("acct-1", netflix_records("acct-1"))
        .unwrap();
    store
        .set_categories(vec![entertainment_category()])
        .unwrap();
    store
        .set_budgets(
            "acct-1",
            vec![Budget {
                category: "Entertainment".into(),
                granularity: Granularity::Month,
                threshold_minor: 500,
            }],
        )
        .unwrap();

    let publisher = Arc::new(MemoryPublisher::new());
    let engine = build_engine(store, publisher.clone());

    let outcome = engine
        .run_account_at("acct-1", &CancelHandle::new(), date(2024, 3, 10))
        .await
        .expect("Analysis failed");
    assert_eq!(outcome, RunOutcome::Published);

    let snapshot = publisher.latest("acct-1").await.unwrap().unwrap();

    // One confirmed monthly group covering all three charges
    assert_eq!(snapshot.groups.len(), 1);
    let group = &snapshot.groups[0];
    assert_eq!(group.fingerprint, "NETFLIX");
    assert_eq!(group.interval_days, 30);
    assert_eq!(group.expected_amount_minor, 999);
    assert_eq!(group.state, GroupState::Confirmed);
    assert_eq!(group.transaction_ids, vec!["tx-1", "tx-2", "tx-3"]);

    // Monthly buckets for Entertainment plus the rollup, three periods each
    let entertainment: Vec<_> = snapshot
        .aggregates
        .iter()
        .filter(|a| a.category == "Entertainment")
        .collect();
    assert_eq!(entertainment.len(), 3);
    assert!(entertainment.iter().all(|a| a.total_minor == -999));
    assert_eq!(entertainment[0].period_start, date(2024, 1, 1));
    assert_eq!(entertainment[2].period_start, date(2024, 3, 1));

    let rollup: Vec<_> = snapshot
        .aggregates
        .iter()
        .filter(|a| a.category == ALL_CATEGORIES)
        .collect();
    assert_eq!(rollup.len(), 3);

    // Every month blows past the 5.00 budget
    assert_eq!(snapshot.alerts.len(), 3);
    assert!(snapshot
        .alerts
        .iter()
        .all(|a| a.severity == outlay_core::AlertSeverity::Critical));
    assert_eq!(snapshot.alerts[0].spent_minor, 999);
    assert_eq!(snapshot.alerts[0].exceeded_by_minor, 499);
}

#[tokio::test]
async fn test_budget_granularity_added_to_aggregation() {
    // Default config only materializes monthly aggregates; a weekly budget
    // must still be evaluated against weekly buckets
    let store = Arc::new(MemoryStore::new());
    store
        .add_transactions(
            "acct-1",
            vec![
                record("g1", "acct-1", date(2024, 1, 1), "GYM CLUB", -2000),
                record("g2", "acct-1", date(2024, 1, 8), "GYM CLUB", -2000),
                record("g3", "acct-1", date(2024, 1, 15), "GYM CLUB", -2000),
            ],
        )
        .unwrap();
    store
        .set_categories(vec![Category {
            name: "Fitness".into(),
            rules: vec![CategoryRule {
                pattern: MatchPattern::Substring("GYM".into()),
                min_amount_minor: None,
                max_amount_minor: None,
            }],
        }])
        .unwrap();
    store
        .set_budgets(
            "acct-1",
            vec![Budget {
                category: "Fitness".into(),
                granularity: Granularity::Week,
                threshold_minor: 500,
            }],
        )
        .unwrap();

    let publisher = Arc::new(MemoryPublisher::new());
    let engine = build_engine(store, publisher.clone());

    engine
        .run_account_at("acct-1", &CancelHandle::new(), date(2024, 1, 20))
        .await
        .expect("Analysis failed");

    let snapshot = publisher.latest("acct-1").await.unwrap().unwrap();

    // Weekly buckets exist alongside the configured monthly ones
    let weekly: Vec<_> = snapshot
        .aggregates
        .iter()
        .filter(|a| a.granularity == Granularity::Week && a.category == "Fitness")
        .collect();
    assert_eq!(weekly.len(), 3);
    assert!(weekly.iter().all(|a| a.total_minor == -2000));

    // 20.00 spent against a 5.00 weekly budget, every week
    assert_eq!(snapshot.alerts.len(), 3);
    assert!(snapshot
        .alerts
        .iter()
        .all(|a| a.granularity == Granularity::Week
            && a.severity == outlay_core::AlertSeverity::Critical));
}

#[tokio::test]
async fn test_malformed_records_are_skipped() {
    let store = Arc::new(MemoryStore::new());
    let mut records = netflix_records("acct-1");
    records.push(TransactionRecord {
        id: "tx-bad".into(),
        account_id: "acct-1".into(),
        posted: None,
        amount_minor: -500,
        description: "MYSTERY".into(),
        user_category: None,
        status: TransactionStatus::Settled,
    });
    store.add_transactions("acct-1", records).unwrap();
    store
        .set_categories(vec![entertainment_category()])
        .unwrap();

    let publisher = Arc::new(MemoryPublisher::new());
    let engine = build_engine(store, publisher.clone());

    engine
        .run_account_at("acct-1", &CancelHandle::new(), date(2024, 3, 10))
        .await
        .expect("Analysis failed");

    // The dateless record is dropped; the other three still aggregate
    let snapshot = publisher.latest("acct-1").await.unwrap().unwrap();
    let total: usize = snapshot
        .aggregates
        .iter()
        .filter(|a| a.category == ALL_CATEGORIES)
        .map(|a| a.transaction_count)
        .sum();
    assert_eq!(total, 3);
    assert!(!snapshot
        .aggregates
        .iter()
        .any(|a| a.category == UNCATEGORIZED));
}

#[tokio::test]
async fn test_correction_flows_into_results() {
    let store = Arc::new(MemoryStore::new());
    store
        .add_transactions("acct-1", netflix_records("acct-1"))
        .unwrap();
    store
        .set_categories(vec![entertainment_category()])
        .unwrap();

    // Amend the March charge after settlement
    let mut amended = record("tx-3", "acct-1", date(2024, 3, 5), "NETFLIX123", -1099);
    amended.status = TransactionStatus::Corrected;
    store.add_corrections("acct-1", vec![amended]).unwrap();

    let publisher = Arc::new(MemoryPublisher::new());
    let engine = build_engine(store, publisher.clone());

    engine
        .run_account_at("acct-1", &CancelHandle::new(), date(2024, 3, 10))
        .await
        .expect("Analysis failed");

    let snapshot = publisher.latest("acct-1").await.unwrap().unwrap();
    let march = snapshot
        .aggregates
        .iter()
        .find(|a| a.category == "Entertainment" && a.period_start == date(2024, 3, 1))
        .expect("March bucket missing");
    assert_eq!(march.total_minor, -1099);
}

#[tokio::test]
async fn test_rerun_on_unchanged_input_is_identical() {
    let store = Arc::new(MemoryStore::new());
    store
        .add_transactions("acct-1", netflix_records("acct-1"))
        .unwrap();
    store
        .set_categories(vec![entertainment_category()])
        .unwrap();

    let publisher = Arc::new(MemoryPublisher::new());
    let engine = build_engine(store, publisher.clone());
    let today = date(2024, 3, 10);

    engine
        .run_account_at("acct-1", &CancelHandle::new(), today)
        .await
        .unwrap();
    let first = publisher.latest("acct-1").await.unwrap().unwrap();

    engine
        .run_account_at("acct-1", &CancelHandle::new(), today)
        .await
        .unwrap();
    let second = publisher.latest("acct-1").await.unwrap().unwrap();

    // Same group ids, same aggregates, fresh computed_at
    assert_eq!(first.groups[0].id, second.groups[0].id);
    assert_eq!(first.aggregates, second.aggregates);
    assert!(second.computed_at >= first.computed_at);
}

/// Publisher that can be flipped into a failing mode, wrapping a working one
struct FlakyPublisher {
    inner: MemoryPublisher,
    failing: AtomicBool,
}

impl FlakyPublisher {
    fn new() -> Self {
        Self {
            inner: MemoryPublisher::new(),
            failing: AtomicBool::new(false),
        }
    }

    fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl ResultPublisher for FlakyPublisher {
    async fn publish(&self, snapshot: AccountSnapshot) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(outlay_core::Error::PublishFailure(
                "result store unavailable".into(),
            ));
        }
        self.inner.publish(snapshot).await
    }

    async fn latest(&self, account_id: &str) -> Result<Option<Arc<AccountSnapshot>>> {
        self.inner.latest(account_id).await
    }
}

#[tokio::test]
async fn test_publish_failure_keeps_last_known_good() {
    let store = Arc::new(MemoryStore::new());
    store
        .add_transactions("acct-1", netflix_records("acct-1"))
        .unwrap();
    store
        .set_categories(vec![entertainment_category()])
        .unwrap();

    let publisher = Arc::new(FlakyPublisher::new());
    let engine = build_engine(store.clone(), publisher.clone());

    engine
        .run_account_at("acct-1", &CancelHandle::new(), date(2024, 3, 10))
        .await
        .expect("First run failed");
    let good = publisher.latest("acct-1").await.unwrap().unwrap();

    // New data arrives but the result store goes down
    store
        .add_transactions(
            "acct-1",
            vec![record(
                "tx-4",
                "acct-1",
                date(2024, 4, 4),
                "NETFLIX123",
                -999,
            )],
        )
        .unwrap();
    publisher.set_failing(true);

    let err = engine
        .run_account_at("acct-1", &CancelHandle::new(), date(2024, 4, 10))
        .await
        .expect_err("Publish should have failed");
    assert!(matches!(err, outlay_core::Error::PublishFailure(_)));

    // The prior snapshot is still what readers see
    let current = publisher.latest("acct-1").await.unwrap().unwrap();
    assert!(Arc::ptr_eq(&good, &current));
    assert_eq!(current.groups[0].transaction_ids.len(), 3);
}

#[tokio::test]
async fn test_cancelled_job_publishes_nothing() {
    let store = Arc::new(MemoryStore::new());
    store
        .add_transactions("acct-1", netflix_records("acct-1"))
        .unwrap();
    store
        .set_categories(vec![entertainment_category()])
        .unwrap();

    let publisher = Arc::new(MemoryPublisher::new());
    let engine = build_engine(store, publisher.clone());

    let cancel = CancelHandle::new();
    cancel.cancel();

    let outcome = engine
        .run_account_at("acct-1", &cancel, date(2024, 3, 10))
        .await
        .unwrap();
    assert_eq!(outcome, RunOutcome::Cancelled);
    assert!(publisher.latest("acct-1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_scheduler_trigger_publishes_snapshot() {
    let store = Arc::new(MemoryStore::new());
    store
        .add_transactions("acct-1", netflix_records("acct-1"))
        .unwrap();
    store
        .set_categories(vec![entertainment_category()])
        .unwrap();

    let publisher = Arc::new(MemoryPublisher::new());
    let engine = Arc::new(Engine::new(
        store.clone(),
        store.clone(),
        store,
        publisher.clone(),
        // Long interval so only the ingest trigger can cause the run
        EngineConfig {
            schedule_interval_secs: 3600,
            ..EngineConfig::default()
        },
    ));

    let scheduler = Scheduler::new(engine);
    scheduler.new_transactions("acct-1");

    // Poll until the triggered run publishes
    let mut published = None;
    for _ in 0..200 {
        if let Some(snapshot) = publisher.latest("acct-1").await.unwrap() {
            published = Some(snapshot);
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let snapshot = published.expect("Triggered run never published");
    assert_eq!(snapshot.groups.len(), 1);

    scheduler.shutdown();
}
