//! Engine configuration
//!
//! Fingerprint normalization, tolerance, interval, and backoff constants are
//! policy choices, so they all live here rather than as hard-coded constants.
//! Configuration can come from a TOML file, environment variables, or the
//! defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;
use crate::models::{Budget, Category, Granularity};

/// Tunable knobs for detection, aggregation, and scheduling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Amount tolerance as a percentage of the median charge (e.g. 2.0 = ±2%)
    pub amount_tolerance_percent: f64,
    /// Absolute amount tolerance floor in minor units
    pub amount_tolerance_minor: i64,
    /// Known recurrence periods in days (weekly, biweekly, monthly, yearly)
    pub known_intervals_days: Vec<i64>,
    /// Interval tolerance as a fraction of the expected interval
    pub interval_tolerance_fraction: f64,
    /// Minimum tolerance window in days, regardless of interval length
    pub interval_tolerance_min_days: i64,
    /// Maximum coefficient of variation for intervals in a recurrence group
    pub interval_cv_threshold: f64,
    /// Minimum qualifying transactions before a merchant can form a group
    pub min_occurrences: usize,
    /// Confidence at which a candidate group becomes confirmed
    pub confirm_confidence: f64,
    /// Granularities the engine materializes aggregates for
    pub granularities: Vec<Granularity>,
    /// Window in days for the spending insights analysis
    pub insights_window_days: i64,
    /// Seconds between scheduled recomputations per account
    pub schedule_interval_secs: u64,
    /// Retry budget before a failing job escalates to a reported error
    pub max_retries: u32,
    /// Base delay for exponential backoff between retries
    pub retry_backoff_secs: u64,
    /// Cap on the backoff delay
    pub retry_backoff_cap_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            amount_tolerance_percent: 2.0,   // ±2% of the median charge
            amount_tolerance_minor: 100,     // never tighter than ±1.00
            known_intervals_days: vec![7, 14, 30, 365],
            interval_tolerance_fraction: 0.2,
            interval_tolerance_min_days: 2,
            interval_cv_threshold: 0.15,
            min_occurrences: 3,              // 2 could be coincidence
            confirm_confidence: 0.8,
            granularities: vec![Granularity::Month],
            insights_window_days: 30,
            schedule_interval_secs: 3600,    // hourly recomputation
            max_retries: 5,
            retry_backoff_secs: 30,
            retry_backoff_cap_secs: 1800,
        }
    }
}

impl EngineConfig {
    /// Tolerance window in minor units for charges around `amount_minor`
    pub fn amount_tolerance_for(&self, amount_minor: i64) -> i64 {
        let pct = (amount_minor.abs() as f64 * self.amount_tolerance_percent / 100.0) as i64;
        pct.max(self.amount_tolerance_minor)
    }

    /// Tolerance window in days around an expected interval
    pub fn interval_tolerance_for(&self, interval_days: i64) -> i64 {
        let frac = (interval_days as f64 * self.interval_tolerance_fraction) as i64;
        frac.max(self.interval_tolerance_min_days)
    }

    /// Apply environment variable overrides (OUTLAY_SCHEDULE_INTERVAL,
    /// OUTLAY_MAX_RETRIES, OUTLAY_RETRY_BACKOFF) on top of `self`.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("OUTLAY_SCHEDULE_INTERVAL") {
            match v.parse() {
                Ok(secs) => self.schedule_interval_secs = secs,
                Err(_) => warn!("Ignoring unparsable OUTLAY_SCHEDULE_INTERVAL={}", v),
            }
        }
        if let Ok(v) = std::env::var("OUTLAY_MAX_RETRIES") {
            match v.parse() {
                Ok(n) => self.max_retries = n,
                Err(_) => warn!("Ignoring unparsable OUTLAY_MAX_RETRIES={}", v),
            }
        }
        if let Ok(v) = std::env::var("OUTLAY_RETRY_BACKOFF") {
            match v.parse() {
                Ok(secs) => self.retry_backoff_secs = secs,
                Err(_) => warn!("Ignoring unparsable OUTLAY_RETRY_BACKOFF={}", v),
            }
        }
        self
    }
}

/// On-disk configuration file: engine knobs plus the user-editable category
/// registry and budget entries
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub engine: EngineConfig,
    pub categories: Vec<Category>,
    pub budgets: Vec<Budget>,
}

impl ConfigFile {
    /// Load a TOML configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&raw)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.min_occurrences, 3);
        assert_eq!(config.known_intervals_days, vec![7, 14, 30, 365]);
        assert_eq!(config.granularities, vec![Granularity::Month]);
    }

    #[test]
    fn test_amount_tolerance_floor() {
        let config = EngineConfig::default();
        // 2% of 999 is ~19 minor units, below the 100 floor
        assert_eq!(config.amount_tolerance_for(-999), 100);
        // 2% of 100_000 is 2_000, above the floor
        assert_eq!(config.amount_tolerance_for(100_000), 2_000);
    }

    #[test]
    fn test_interval_tolerance() {
        let config = EngineConfig::default();
        assert_eq!(config.interval_tolerance_for(7), 2);
        assert_eq!(config.interval_tolerance_for(30), 6);
        assert_eq!(config.interval_tolerance_for(365), 73);
    }

    #[test]
    fn test_load_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[engine]
min_occurrences = 4
schedule_interval_secs = 60

[[categories]]
name = "Entertainment"
rules = [{{ pattern = {{ substring = "NETFLIX" }} }}]

[[budgets]]
category = "Entertainment"
granularity = "month"
threshold_minor = 50000
"#
        )
        .unwrap();

        let config = ConfigFile::load(file.path()).unwrap();
        assert_eq!(config.engine.min_occurrences, 4);
        assert_eq!(config.engine.schedule_interval_secs, 60);
        // Unset engine fields keep their defaults
        assert_eq!(config.engine.max_retries, 5);
        assert_eq!(config.categories.len(), 1);
        assert_eq!(config.budgets[0].threshold_minor, 50000);
    }
}
