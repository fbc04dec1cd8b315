//! Command implementations for the bike-share collector CLI
//!
//! Each command lives in its own module and returns `anyhow::Result` so
//! failures reach `main` with their full context chain.

pub mod collect;
pub mod report;
pub mod shared;
pub mod stations;

use crate::cli::args::Commands;
use anyhow::Result;
use tokio_util::sync::CancellationToken;

/// Dispatch to the handler for `command`
///
/// Only `collect` observes `cancel`; the report commands finish quickly.
pub async fn run(command: Commands, cancel: CancellationToken) -> Result<()> {
    match command {
        Commands::Collect(args) => collect::run_collect(args, cancel).await,
        Commands::Stations(args) => stations::run_stations(args).await,
        Commands::EmptyDocks(args) => report::run_empty_docks(args).await,
        Commands::Activity(args) => report::run_activity(args).await,
    }
}
