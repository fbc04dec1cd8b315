//! City-wide aggregation of per-station series.
//!
//! Each station is resampled or binned independently and summed onto a shared
//! grid. A station that cannot answer (no data, grid outside its observed
//! range) is logged, reported in the result and left out of the sum; it never
//! aborts the aggregate.

use crate::error::{CollectorError, Result};
use crate::histogram::{ActivityMode, histogram, validate_bin_edges};
use crate::models::{StationId, Timestamp};
use crate::resample::count_at_many;
use crate::store::SystemSnapshot;
use chrono::Duration;
use tracing::{debug, warn};

/// A station left out of an aggregate, with the reason
#[derive(Debug)]
pub struct StationFailure {
    pub station_id: StationId,
    pub error: CollectorError,
}

impl StationFailure {
    /// The failure as a `StationFailure` error variant
    pub fn into_error(self) -> CollectorError {
        self.error.for_station(self.station_id)
    }
}

/// Summed values on a time grid
#[derive(Debug)]
pub struct AggregateSeries {
    pub times: Vec<Timestamp>,
    pub values: Vec<i64>,
    /// Stations that contributed to `values`
    pub stations_included: usize,
    pub failures: Vec<StationFailure>,
}

/// Docked bikes and empty docks from the same resampling pass
#[derive(Debug)]
pub struct CityAvailability {
    pub times: Vec<Timestamp>,
    pub bikes: Vec<i64>,
    pub empty_docks: Vec<i64>,
    pub stations_included: usize,
    pub failures: Vec<StationFailure>,
}

/// Summed activity per bin
#[derive(Debug)]
pub struct AggregateHistogram {
    pub edges: Vec<Timestamp>,
    pub mode: ActivityMode,
    pub values: Vec<i64>,
    pub stations_included: usize,
    pub failures: Vec<StationFailure>,
}

impl AggregateHistogram {
    pub fn total(&self) -> i64 {
        self.values.iter().sum()
    }
}

fn record_failure(
    failures: &mut Vec<StationFailure>,
    station_id: StationId,
    error: CollectorError,
) {
    warn!(
        "Aggregation skipped station {} with error: {}",
        station_id, error
    );
    failures.push(StationFailure { station_id, error });
}

/// Resample every station once on `times`, handing each successful
/// station's capacity and counts to `on_station`
///
/// Returns how many stations were included and the ones that failed.
fn resample_stations(
    snapshot: &SystemSnapshot,
    times: &[Timestamp],
    end_override: Option<Timestamp>,
    mut on_station: impl FnMut(u32, &[u32]),
) -> (usize, Vec<StationFailure>) {
    let mut failures = Vec::new();
    let mut stations_included = 0;

    for series in snapshot.iter_series() {
        match count_at_many(&series, times, end_override) {
            Ok(counts) => {
                on_station(series.station.capacity, &counts);
                stations_included += 1;
            }
            Err(error) => record_failure(&mut failures, series.id(), error),
        }
    }

    debug!(
        "Aggregated {} stations on {} points ({} skipped)",
        stations_included,
        times.len(),
        failures.len()
    );
    (stations_included, failures)
}

/// Sum station values at `times`, where `value(capacity, bikes)` maps one
/// station's count to its contribution
fn aggregate_resampled(
    snapshot: &SystemSnapshot,
    times: &[Timestamp],
    end_override: Option<Timestamp>,
    value: impl Fn(u32, u32) -> i64,
) -> AggregateSeries {
    let mut values = vec![0i64; times.len()];
    let (stations_included, failures) =
        resample_stations(snapshot, times, end_override, |capacity, counts| {
            for (total, &bikes) in values.iter_mut().zip(counts) {
                *total += value(capacity, bikes);
            }
        });

    AggregateSeries {
        times: times.to_vec(),
        values,
        stations_included,
        failures,
    }
}

/// Total bikes docked across the city at each of `times`
pub fn aggregate_counts(
    snapshot: &SystemSnapshot,
    times: &[Timestamp],
    end_override: Option<Timestamp>,
) -> AggregateSeries {
    aggregate_resampled(snapshot, times, end_override, |_, bikes| i64::from(bikes))
}

/// Total empty docks across the city at each of `times`
///
/// Uses capacity minus bikes per station, so a station reporting more bikes
/// than docks contributes a negative value rather than being clamped.
pub fn aggregate_empty_docks(
    snapshot: &SystemSnapshot,
    times: &[Timestamp],
    end_override: Option<Timestamp>,
) -> AggregateSeries {
    aggregate_resampled(snapshot, times, end_override, |capacity, bikes| {
        i64::from(capacity) - i64::from(bikes)
    })
}

/// Total bikes and total empty docks at each of `times`
///
/// Equivalent to [`aggregate_counts`] and [`aggregate_empty_docks`] together,
/// but each station is resampled, and each failure logged, only once.
pub fn aggregate_availability(
    snapshot: &SystemSnapshot,
    times: &[Timestamp],
    end_override: Option<Timestamp>,
) -> CityAvailability {
    let mut bikes = vec![0i64; times.len()];
    let mut empty_docks = vec![0i64; times.len()];
    let (stations_included, failures) =
        resample_stations(snapshot, times, end_override, |capacity, counts| {
            for ((total, empty), &count) in bikes.iter_mut().zip(&mut empty_docks).zip(counts) {
                *total += i64::from(count);
                *empty += i64::from(capacity) - i64::from(count);
            }
        });

    CityAvailability {
        times: times.to_vec(),
        bikes,
        empty_docks,
        stations_included,
        failures,
    }
}

/// Total activity across the city per bin
///
/// # Errors
/// * `InvalidBins` if the edges are not a valid bin specification; this is
///   checked once, before any station is visited
pub fn aggregate_histogram(
    snapshot: &SystemSnapshot,
    edges: &[Timestamp],
    mode: ActivityMode,
) -> Result<AggregateHistogram> {
    validate_bin_edges(edges)?;

    let mut values = vec![0i64; edges.len() - 1];
    let mut failures = Vec::new();
    let mut stations_included = 0;

    for series in snapshot.iter_series() {
        match histogram(&series, edges, mode) {
            Ok(station_hist) => {
                for (total, v) in values.iter_mut().zip(station_hist) {
                    *total += v;
                }
                stations_included += 1;
            }
            Err(error) => record_failure(&mut failures, series.id(), error),
        }
    }

    Ok(AggregateHistogram {
        edges: edges.to_vec(),
        mode,
        values,
        stations_included,
        failures,
    })
}

/// `points` evenly spaced times starting at `start`, all strictly before `end`
pub fn sample_times(start: Timestamp, end: Timestamp, points: usize) -> Vec<Timestamp> {
    if points == 0 || end <= start {
        return Vec::new();
    }
    let span_ms = (end - start).num_milliseconds();
    let step_ms = (span_ms / points as i64).max(1);

    (0..points as i64)
        .map(|i| start + Duration::milliseconds(i * step_ms))
        .take_while(|t| *t < end)
        .collect()
}

/// Edges `start, start + step, ...` strictly before `end`
pub fn bin_edges(start: Timestamp, end: Timestamp, step: Duration) -> Result<Vec<Timestamp>> {
    if step <= Duration::zero() {
        return Err(CollectorError::InvalidBins {
            reason: format!("bin step must be positive, got {}s", step.num_seconds()),
        });
    }

    let mut edges = Vec::new();
    let mut edge = start;
    while edge < end {
        edges.push(edge);
        edge += step;
    }
    Ok(edges)
}
