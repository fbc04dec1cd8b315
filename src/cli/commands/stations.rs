//! Stations command: list what a snapshot holds

use super::shared::{format_time, setup_logging};
use crate::cli::args::{OutputFormat, StationsArgs};
use crate::models::{StationId, Timestamp};
use crate::persistence::load_snapshot;
use crate::store::SystemSnapshot;
use anyhow::{Context, Result};
use colored::*;
use serde::Serialize;
use tracing::debug;

/// One line of the station listing
#[derive(Debug, Clone, Serialize)]
pub struct StationSummary {
    pub id: StationId,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub capacity: u32,
    pub observations: usize,
    pub first_sample: Option<Timestamp>,
    pub last_sample: Option<Timestamp>,
}

/// Per-station summaries in id order
pub fn summarize(snapshot: &SystemSnapshot) -> Vec<StationSummary> {
    snapshot
        .iter_series()
        .map(|series| StationSummary {
            id: series.id(),
            name: series.station.name.clone(),
            lat: series.station.lat,
            lon: series.station.lon,
            capacity: series.station.capacity,
            observations: series.observations.len(),
            first_sample: series.first_time(),
            last_sample: series.last_time(),
        })
        .collect()
}

pub async fn run_stations(args: StationsArgs) -> Result<()> {
    setup_logging(&args.verbosity);
    debug!("Stations arguments: {:?}", args);

    let snapshot = load_snapshot(&args.snapshot, args.format)
        .with_context(|| format!("Failed to load snapshot {}", args.snapshot.display()))?;
    let summaries = summarize(&snapshot);

    match args.output_format {
        OutputFormat::Human => print_table(&snapshot, &summaries),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summaries)?),
    }
    Ok(())
}

fn print_table(snapshot: &SystemSnapshot, summaries: &[StationSummary]) {
    println!(
        "{} {} stations, {} docks, {} observations",
        "Snapshot:".bright_green().bold(),
        snapshot.station_count(),
        snapshot.total_capacity(),
        snapshot.observation_count()
    );
    if let Some((first, last)) = snapshot.time_span() {
        println!("Samples from {} to {}", format_time(first), format_time(last));
    }
    if let Some(updated) = snapshot.feed_last_updated {
        println!("Feed last updated {}", format_time(updated));
    }
    println!();

    println!(
        "{}",
        format!(
            "{:>6}  {:<40} {:>5} {:>8}  {:<19}  {:<19}",
            "id", "name", "docks", "samples", "first sample", "last sample"
        )
        .bold()
    );
    for summary in summaries {
        println!(
            "{:>6}  {:<40} {:>5} {:>8}  {:<19}  {:<19}",
            summary.id.to_string().bright_yellow(),
            truncate(&summary.name, 40),
            summary.capacity,
            summary.observations,
            summary.first_sample.map(format_time).unwrap_or_default(),
            summary.last_sample.map(format_time).unwrap_or_default(),
        );
    }
}

fn truncate(name: &str, width: usize) -> String {
    if name.chars().count() <= width {
        name.to_string()
    } else {
        let mut short: String = name.chars().take(width - 1).collect();
        short.push('…');
        short
    }
}
