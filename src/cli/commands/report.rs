//! Report commands: city-wide empty docks and activity from a snapshot

use super::shared::{format_time, report_failures, setup_logging};
use crate::aggregate::{
    AggregateHistogram, StationFailure, aggregate_availability, aggregate_histogram, bin_edges,
    sample_times,
};
use crate::cli::args::{ActivityArgs, EmptyDocksArgs, OutputFormat};
use crate::constants::columns;
use crate::export::{export_aggregate_histogram, export_series};
use crate::models::{StationId, Timestamp};
use crate::persistence::{SnapshotFormat, load_snapshot};
use crate::store::SystemSnapshot;
use anyhow::{Context, Result, bail};
use colored::*;
use std::path::Path;
use tracing::{debug, info};

/// Failures listed individually before the rest are summarised
const FAILURES_SHOWN: usize = 5;

fn open_snapshot(path: &Path, format: Option<SnapshotFormat>) -> Result<SystemSnapshot> {
    let snapshot = load_snapshot(path, format)
        .with_context(|| format!("Failed to load snapshot {}", path.display()))?;
    info!(
        "Loaded {} stations with {} observations from {}",
        snapshot.station_count(),
        snapshot.observation_count(),
        path.display()
    );
    Ok(snapshot)
}

pub async fn run_empty_docks(args: EmptyDocksArgs) -> Result<()> {
    setup_logging(&args.verbosity);
    debug!("Empty-docks arguments: {:?}", args);
    args.validate()?;

    let snapshot = open_snapshot(&args.snapshot, args.format)?;
    let end_override = if args.use_feed_time {
        match snapshot.feed_last_updated {
            Some(time) => Some(time),
            None => bail!("Snapshot has no feed refresh time to extend station data to"),
        }
    } else {
        None
    };

    let times = sample_times(args.start, args.end, args.points);
    let availability = aggregate_availability(&snapshot, &times, end_override);
    report_failures(&availability.failures, FAILURES_SHOWN);

    if availability.stations_included == 0 {
        bail!(
            "No station has data covering {} to {}",
            format_time(args.start),
            format_time(args.end)
        );
    }

    if let Some(output) = &args.output {
        let rows = export_series(
            output,
            &times,
            &[
                (columns::EMPTY_DOCKS, availability.empty_docks.as_slice()),
                (columns::TOTAL_BIKES, availability.bikes.as_slice()),
            ],
        )?;
        println!(
            "{} {} samples from {} stations to {}",
            "Exported".bright_green().bold(),
            rows,
            availability.stations_included,
            output.display().to_string().bright_cyan()
        );
        return Ok(());
    }

    match args.output_format {
        OutputFormat::Human => {
            println!(
                "{}",
                format!("{:<19}  {:>11}  {:>11}", "time", "empty docks", "total bikes").bold()
            );
            for ((time, empty), total) in times
                .iter()
                .zip(&availability.empty_docks)
                .zip(&availability.bikes)
            {
                println!("{:<19}  {:>11}  {:>11}", format_time(*time), empty, total);
            }
            println!(
                "\n{} of {} stations included",
                availability.stations_included,
                snapshot.station_count()
            );
        }
        OutputFormat::Json => {
            let rows: Vec<_> = times
                .iter()
                .zip(&availability.empty_docks)
                .zip(&availability.bikes)
                .map(|((time, empty), total)| {
                    serde_json::json!({
                        (columns::TIME): time,
                        (columns::EMPTY_DOCKS): empty,
                        (columns::TOTAL_BIKES): total,
                    })
                })
                .collect();
            let report = serde_json::json!({
                "stations_included": availability.stations_included,
                "excluded_stations": failed_ids(&availability.failures),
                "samples": rows,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}

pub async fn run_activity(args: ActivityArgs) -> Result<()> {
    setup_logging(&args.verbosity);
    debug!("Activity arguments: {:?}", args);
    args.validate()?;

    let snapshot = open_snapshot(&args.snapshot, args.format)?;
    let edges = bin_edges(args.start, args.end, args.step()?)?;
    let activity = aggregate_histogram(&snapshot, &edges, args.mode)
        .context("Failed to bin activity")?;
    report_failures(&activity.failures, FAILURES_SHOWN);

    if let Some(output) = &args.output {
        let rows = export_aggregate_histogram(output, &activity)?;
        println!(
            "{} {} bins from {} stations to {}",
            "Exported".bright_green().bold(),
            rows,
            activity.stations_included,
            output.display().to_string().bright_cyan()
        );
        return Ok(());
    }

    match args.output_format {
        OutputFormat::Human => print_histogram(&activity),
        OutputFormat::Json => {
            let bins: Vec<_> = bins(&activity)
                .map(|(start, end, value)| {
                    serde_json::json!({
                        (columns::BIN_START): start,
                        (columns::BIN_END): end,
                        (columns::ACTIVITY): value,
                    })
                })
                .collect();
            let report = serde_json::json!({
                "mode": activity.mode,
                "stations_included": activity.stations_included,
                "excluded_stations": failed_ids(&activity.failures),
                "total": activity.total(),
                "bins": bins,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}

fn bins(
    activity: &AggregateHistogram,
) -> impl Iterator<Item = (Timestamp, Timestamp, i64)> + '_ {
    activity
        .edges
        .windows(2)
        .zip(&activity.values)
        .map(|(pair, value)| (pair[0], pair[1], *value))
}

fn failed_ids(failures: &[StationFailure]) -> Vec<StationId> {
    failures.iter().map(|f| f.station_id).collect()
}

fn print_histogram(activity: &AggregateHistogram) {
    println!(
        "{}",
        format!("{:<19}  {:<19}  {:>10}", "bin start", "bin end", activity.mode.as_str()).bold()
    );
    for (start, end, value) in bins(activity) {
        println!(
            "{:<19}  {:<19}  {:>10}",
            format_time(start),
            format_time(end),
            value
        );
    }
    println!(
        "\n{} {} over {} bins from {} stations",
        "Total:".bright_green().bold(),
        activity.total(),
        activity.values.len(),
        activity.stations_included
    );
}
