//! Scheduled recomputation command

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use outlay_core::{Engine, MemoryPublisher, Scheduler};
use tracing::info;

use super::load_store;

pub async fn cmd_watch(
    config_path: Option<&Path>,
    file: &Path,
    account: Option<&str>,
) -> Result<()> {
    let (store, account_ids, config) = load_store(config_path, file, account)?;

    let publisher = Arc::new(MemoryPublisher::new());
    let engine = Arc::new(Engine::new(
        store.clone(),
        store.clone(),
        store,
        publisher,
        config.engine.with_env_overrides(),
    ));

    let scheduler = Scheduler::new(engine);
    for account_id in &account_ids {
        scheduler.watch_account(account_id);
        // Kick off the initial run instead of waiting out the first interval
        scheduler.new_transactions(account_id);
    }

    info!(
        "Watching {} account(s), press Ctrl-C to stop",
        account_ids.len()
    );
    tokio::signal::ctrl_c().await?;

    info!("Shutting down");
    scheduler.shutdown();
    Ok(())
}
