//! Error types for Outlay

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// A store adapter failed or timed out. Retried with backoff by the
    /// scheduler; only surfaced after the retry budget is exhausted.
    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    /// A single transaction failed basic invariants (e.g. missing date).
    /// Skipped with a log line; never aborts the whole run.
    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    /// Budget or category configuration is internally inconsistent, e.g. a
    /// budget references a category that does not exist.
    #[error("Inconsistent configuration: {0}")]
    ConfigInconsistent(String),

    /// The atomic snapshot publish failed. The last-known-good snapshot
    /// remains authoritative.
    #[error("Publish failed: {0}")]
    PublishFailure(String),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

pub type Result<T> = std::result::Result<T, Error>;
