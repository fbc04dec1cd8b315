//! Step-function resampling of station bike counts.
//!
//! A station's count is right-continuous: at time `t` it equals the count of
//! the latest observation at or before `t`. Queries are only defined between
//! the first observation and an end time (the latest observation, or a
//! caller-supplied override such as the feed refresh time).

use crate::error::{CollectorError, Result};
use crate::models::{StationSeries, Timestamp};

/// Closed time range over which a station's step function is defined
fn domain(
    series: &StationSeries<'_>,
    end_override: Option<Timestamp>,
) -> Result<(Timestamp, Timestamp)> {
    match (series.first_time(), series.last_time()) {
        (Some(start), Some(last)) => Ok((start, end_override.unwrap_or(last))),
        _ => Err(CollectorError::NoData {
            station_id: series.id(),
        }),
    }
}

fn check_in_domain(
    series: &StationSeries<'_>,
    t: Timestamp,
    (start, end): (Timestamp, Timestamp),
) -> Result<()> {
    if t < start || t > end {
        return Err(CollectorError::OutOfRange {
            station_id: series.id(),
            requested: t,
            start,
            end,
        });
    }
    Ok(())
}

/// Bike count in effect at `t`
///
/// # Errors
/// * `NoData` if the station has no observations
/// * `OutOfRange` if `t` is before the first observation or after the end time
pub fn count_at(
    series: &StationSeries<'_>,
    t: Timestamp,
    end_override: Option<Timestamp>,
) -> Result<u32> {
    let bounds = domain(series, end_override)?;
    check_in_domain(series, t, bounds)?;

    // t >= first observation, so at least one observation is <= t
    let in_effect = series.observations.partition_point(|o| o.time <= t) - 1;
    Ok(series.observations[in_effect].bikes)
}

/// Bike counts in effect at each of `times`, returned in the order given
///
/// Query times are ordered once and resolved in a single forward pass: each
/// binary search runs only over the observations not yet passed by the
/// previous (earlier) query.
pub fn count_at_many(
    series: &StationSeries<'_>,
    times: &[Timestamp],
    end_override: Option<Timestamp>,
) -> Result<Vec<u32>> {
    let bounds = domain(series, end_override)?;
    if let Some(&earliest) = times.iter().min() {
        check_in_domain(series, earliest, bounds)?;
    }
    if let Some(&latest) = times.iter().max() {
        check_in_domain(series, latest, bounds)?;
    }

    let mut order: Vec<usize> = (0..times.len()).collect();
    order.sort_by_key(|&i| times[i]);

    let observations = series.observations;
    let mut counts = vec![0; times.len()];
    let mut passed = 0;
    for i in order {
        let t = times[i];
        passed += observations[passed..].partition_point(|o| o.time <= t);
        counts[i] = observations[passed - 1].bikes;
    }

    Ok(counts)
}
