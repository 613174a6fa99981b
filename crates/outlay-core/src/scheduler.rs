//! Recomputation scheduler
//!
//! One worker task per account drives periodic recomputation and reacts to
//! ingest triggers. Jobs are serialized within an account by construction (a
//! single task owns the loop); accounts run concurrently. A trigger arriving
//! while a job runs coalesces into exactly one pending re-run via
//! `tokio::sync::Notify` permit semantics, never an unbounded queue.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::engine::{CancelHandle, Engine};

/// Per-account job state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Running,
    /// Last run failed; waiting out a backoff delay before retrying
    FailedRetry,
    /// Retry budget exhausted. Non-fatal: the last-known-good snapshot
    /// remains published, and the next trigger starts a fresh attempt.
    Errored,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::FailedRetry => "failed-retry",
            Self::Errored => "errored",
        }
    }
}

struct Worker {
    notify: Arc<Notify>,
    state: Arc<Mutex<JobState>>,
    cancel: CancelHandle,
    handle: JoinHandle<()>,
}

/// Drives periodic recomputation across accounts
pub struct Scheduler {
    engine: Arc<Engine>,
    workers: Mutex<HashMap<String, Worker>>,
}

impl Scheduler {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            workers: Mutex::new(HashMap::new()),
        }
    }

    /// Start a worker for an account if one is not already running
    pub fn watch_account(&self, account_id: &str) {
        let mut workers = self.workers.lock().expect("scheduler lock poisoned");
        if workers.contains_key(account_id) {
            return;
        }

        let notify = Arc::new(Notify::new());
        let state = Arc::new(Mutex::new(JobState::Idle));
        let cancel = CancelHandle::new();

        let handle = tokio::spawn(worker_loop(
            self.engine.clone(),
            account_id.to_string(),
            notify.clone(),
            state.clone(),
            cancel.clone(),
        ));

        info!("Watching account {}", account_id);
        workers.insert(
            account_id.to_string(),
            Worker {
                notify,
                state,
                cancel,
                handle,
            },
        );
    }

    /// Ingest signal: new transactions arrived for an account. Coalesces
    /// into the account's next run.
    pub fn new_transactions(&self, account_id: &str) {
        self.watch_account(account_id);
        let workers = self.workers.lock().expect("scheduler lock poisoned");
        if let Some(worker) = workers.get(account_id) {
            debug!("Ingest trigger for {}", account_id);
            worker.notify.notify_one();
        }
    }

    /// Current job state for an account, if watched
    pub fn job_state(&self, account_id: &str) -> Option<JobState> {
        let workers = self.workers.lock().expect("scheduler lock poisoned");
        workers
            .get(account_id)
            .map(|w| *w.state.lock().expect("state lock poisoned"))
    }

    /// Cancel all workers. Running jobs stop at the next stage boundary and
    /// publish nothing.
    pub fn shutdown(&self) {
        let mut workers = self.workers.lock().expect("scheduler lock poisoned");
        for (account_id, worker) in workers.drain() {
            debug!("Stopping worker for {}", account_id);
            worker.cancel.cancel();
            worker.notify.notify_one();
            worker.handle.abort();
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn worker_loop(
    engine: Arc<Engine>,
    account_id: String,
    notify: Arc<Notify>,
    state: Arc<Mutex<JobState>>,
    cancel: CancelHandle,
) {
    let interval_secs = engine.config().schedule_interval_secs.max(1);
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
    // Consume the immediate first tick; the initial run comes from the
    // ingest trigger or the first full interval.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                debug!("Scheduled recomputation for {}", account_id);
            }
            _ = notify.notified() => {
                debug!("Triggered recomputation for {}", account_id);
            }
        }

        if cancel.is_cancelled() {
            return;
        }

        run_with_retries(&engine, &account_id, &state, &cancel).await;
    }
}

/// Run one job, retrying with bounded exponential backoff on failure
async fn run_with_retries(
    engine: &Engine,
    account_id: &str,
    state: &Mutex<JobState>,
    cancel: &CancelHandle,
) {
    let config = engine.config();
    let mut attempts: u32 = 0;

    loop {
        set_state(state, JobState::Running);
        match engine.run_account(account_id, cancel).await {
            Ok(outcome) => {
                debug!("Job for {} finished: {:?}", account_id, outcome);
                set_state(state, JobState::Idle);
                return;
            }
            Err(e) => {
                attempts += 1;
                if attempts > config.max_retries {
                    // Escalate, keep last-known-good results in place, and
                    // let the next trigger start over
                    error!(
                        "Job for {} failed {} times, giving up until next trigger: {}",
                        account_id, attempts, e
                    );
                    set_state(state, JobState::Errored);
                    return;
                }

                let backoff = backoff_delay(
                    config.retry_backoff_secs,
                    config.retry_backoff_cap_secs,
                    attempts,
                );
                warn!(
                    "Job for {} failed (attempt {}/{}), retrying in {:?}: {}",
                    account_id, attempts, config.max_retries, backoff, e
                );
                set_state(state, JobState::FailedRetry);
                tokio::time::sleep(backoff).await;

                if cancel.is_cancelled() {
                    return;
                }
            }
        }
    }
}

fn set_state(state: &Mutex<JobState>, value: JobState) {
    *state.lock().expect("state lock poisoned") = value;
}

/// base * 2^(attempt-1), capped
fn backoff_delay(base_secs: u64, cap_secs: u64, attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(16);
    let secs = base_secs.saturating_mul(1u64 << exp).min(cap_secs);
    Duration::from_secs(secs)
}
