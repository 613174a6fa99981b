//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI
//! arguments. The actual command implementations are in the `commands`
//! module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Outlay - Expense analysis for transaction history
#[derive(Parser)]
#[command(name = "outlay")]
#[command(about = "Categorize spending, detect recurring charges, evaluate budgets", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Configuration file (engine knobs, categories, budgets)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one analysis pass over a transaction CSV and print the results
    Analyze {
        /// CSV file with transaction history
        #[arg(short, long)]
        file: PathBuf,

        /// Only analyze this account (defaults to every account in the file)
        #[arg(short, long)]
        account: Option<String>,

        /// Treat this date as today, for reproducible runs (YYYY-MM-DD)
        #[arg(long)]
        today: Option<String>,

        /// Emit the full snapshot as JSON instead of a report
        #[arg(long)]
        json: bool,
    },

    /// Keep accounts under scheduled recomputation until interrupted
    Watch {
        /// CSV file with transaction history
        #[arg(short, long)]
        file: PathBuf,

        /// Only watch this account (defaults to every account in the file)
        #[arg(short, long)]
        account: Option<String>,
    },
}
