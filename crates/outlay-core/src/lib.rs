//! Outlay Core Library
//!
//! Shared functionality for the Outlay expense analysis engine:
//! - Rule-based transaction categorization with user overrides
//! - Recurring charge detection with confidence scoring and lapse tracking
//! - Gap-free period aggregation at multiple granularities
//! - Budget evaluation with tiered, deduplicated alerts
//! - Spending insights (category stats, trends, suggestions)
//! - Per-account recomputation scheduler with retry and backoff
//! - Storage seams and in-memory adapters for the CLI and tests

pub mod aggregate;
pub mod budget;
pub mod categorize;
pub mod config;
pub mod engine;
pub mod error;
pub mod import;
pub mod insights;
pub mod models;
pub mod recurrence;
pub mod scheduler;
pub mod store;

pub use categorize::Categorizer;
pub use config::{ConfigFile, EngineConfig};
pub use engine::{CancelHandle, Engine, RunOutcome};
pub use error::{Error, Result};
pub use insights::{SpendingInsights, SpendingTrend, Suggestion, TrendDirection};
pub use models::{
    AccountSnapshot, AlertSeverity, Budget, BudgetAlert, Category, CategoryRule, Granularity,
    GroupState, MatchPattern, PeriodAggregate, RecurrenceFeedback, RecurrenceGroup, Transaction,
    TransactionRecord, TransactionStatus,
};
pub use recurrence::RecurrenceDetector;
pub use scheduler::{JobState, Scheduler};
pub use store::{
    BudgetSource, CategoryRegistry, MemoryPublisher, MemoryStore, ResultPublisher,
    TransactionStore,
};
