//! Collect command: poll a feed until interrupted

use super::shared::{create_spinner, format_duration, setup_logging};
use crate::cli::args::{CollectArgs, OutputFormat};
use crate::config::CollectorConfig;
use crate::feed::HttpFeed;
use crate::ingest::{CollectStats, Collector};
use crate::persistence::open_store;
use crate::store::SystemSnapshot;
use anyhow::{Context, Result};
use colored::*;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Run the collector until `cancel` fires
///
/// Interruption is the normal way to stop collecting, so it is not an error.
pub async fn run_collect(args: CollectArgs, cancel: CancellationToken) -> Result<()> {
    let start_time = Instant::now();
    setup_logging(&args.verbosity);
    debug!("Collect arguments: {:?}", args);

    args.validate()?;
    let config = args
        .resolve_config()
        .context("Failed to load collector configuration")?;
    info!("Polling {} every {}s", config.feed_url, config.poll_interval_secs);

    let feed = HttpFeed::new(config.feed_url.clone())?;
    let mut collector = Collector::new(feed, config.clone());
    if let Some(path) = &config.snapshot_path {
        let store = open_store(path, config.snapshot_format)
            .with_context(|| format!("Failed to open snapshot {}", path.display()))?;
        collector = collector
            .with_store(store)
            .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
    }

    let progress = args
        .verbosity
        .show_progress()
        .then(|| create_spinner("waiting for first tick (Ctrl+C to stop)"));

    let (stats, snapshot) = collector.run(cancel, progress).await?;

    match args.output_format {
        OutputFormat::Human => {
            if !args.verbosity.quiet {
                print_summary(&stats, &snapshot, &config, start_time.elapsed());
            }
        }
        OutputFormat::Json => print_json_summary(&stats, &snapshot, start_time.elapsed())?,
    }
    Ok(())
}

fn print_summary(
    stats: &CollectStats,
    snapshot: &SystemSnapshot,
    config: &CollectorConfig,
    elapsed: Duration,
) {
    println!("\n{}", "Collection stopped".bright_green().bold());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("   • Feed: {}", config.feed_url.bright_cyan());
    println!("   • Running time: {}", format_duration(elapsed));
    println!(
        "   • Ticks: {} ({} failed)",
        stats.ticks,
        if stats.failed_ticks > 0 {
            stats.failed_ticks.to_string().bright_yellow()
        } else {
            stats.failed_ticks.to_string().normal()
        }
    );
    println!("   • New stations: {}", stats.stations_created);
    println!("   • New observations: {}", stats.observations_appended);
    if stats.records_skipped > 0 {
        println!("   • Records skipped: {}", stats.records_skipped);
    }
    println!(
        "   • Stored: {} stations, {} observations",
        snapshot.station_count(),
        snapshot.observation_count()
    );
    match &config.snapshot_path {
        Some(path) => println!(
            "   • Snapshot: {} ({} writes)",
            path.display().to_string().bright_cyan(),
            stats.snapshots_written
        ),
        None => println!(
            "   • Snapshot: {}",
            "none configured, data was not saved".bright_yellow()
        ),
    }
    println!();
}

fn print_json_summary(
    stats: &CollectStats,
    snapshot: &SystemSnapshot,
    elapsed: Duration,
) -> Result<()> {
    let summary = serde_json::json!({
        "stats": stats,
        "stations_stored": snapshot.station_count(),
        "observations_stored": snapshot.observation_count(),
        "running_time_secs": elapsed.as_secs_f64(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
