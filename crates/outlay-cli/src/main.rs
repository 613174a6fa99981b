//! Outlay CLI - Expense analysis engine
//!
//! Usage:
//!   outlay analyze --file tx.csv             Analyze a transaction export
//!   outlay analyze --file tx.csv --json      Same, as machine-readable JSON
//!   outlay watch --file tx.csv               Recompute on a schedule

mod cli;
mod commands;


use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    match cli.command {
        Commands::Analyze {
            file,
            account,
            today,
            json,
        } => {
            commands::cmd_analyze(
                cli.config.as_deref(),
                &file,
                account.as_deref(),
                today.as_deref(),
                json,
            )
            .await
        }
        Commands::Watch { file, account } => {
            commands::cmd_watch(cli.config.as_deref(), &file, account.as_deref()).await
        }
    }
}
