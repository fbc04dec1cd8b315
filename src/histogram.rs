//! Activity histograms from consecutive bike-count changes.
//!
//! Every pair of consecutive observations is a transition whose delta is
//! attributed to the bin holding the later observation's time. Observations
//! and bin edges are both sorted, so a single bin cursor only ever moves
//! forward and a station is binned in O(observations + bins).

use crate::error::{CollectorError, Result};
use crate::models::{StationSeries, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How a transition's delta is folded into its bin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ActivityMode {
    /// Absolute change, direction-agnostic churn
    #[default]
    Both,
    /// Signed change
    Diff,
    /// Only bikes returned
    Increase,
    /// Only bikes taken, as a positive magnitude
    Decrease,
}

impl ActivityMode {
    /// Contribution of one transition with the given signed delta
    pub fn contribution(self, delta: i64) -> i64 {
        match self {
            ActivityMode::Both => delta.abs(),
            ActivityMode::Diff => delta,
            ActivityMode::Increase => delta.max(0),
            ActivityMode::Decrease => (-delta).max(0),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActivityMode::Both => "both",
            ActivityMode::Diff => "diff",
            ActivityMode::Increase => "increase",
            ActivityMode::Decrease => "decrease",
        }
    }
}

impl fmt::Display for ActivityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActivityMode {
    type Err = CollectorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "both" => Ok(ActivityMode::Both),
            "diff" => Ok(ActivityMode::Diff),
            "increase" => Ok(ActivityMode::Increase),
            "decrease" => Ok(ActivityMode::Decrease),
            other => Err(CollectorError::configuration(format!(
                "Unknown activity mode '{}': expected both, diff, increase or decrease",
                other
            ))),
        }
    }
}

/// Check that edges describe at least one bin and are strictly increasing
pub fn validate_bin_edges(edges: &[Timestamp]) -> Result<()> {
    if edges.len() < 2 {
        return Err(CollectorError::InvalidBins {
            reason: format!("need at least 2 edges, got {}", edges.len()),
        });
    }
    if let Some(pos) = edges.windows(2).position(|w| w[0] >= w[1]) {
        return Err(CollectorError::InvalidBins {
            reason: format!(
                "edges must be strictly increasing, edge {} ({}) is not before edge {} ({})",
                pos,
                edges[pos],
                pos + 1,
                edges[pos + 1]
            ),
        });
    }
    Ok(())
}

/// Per-bin activity of one station over `edges.len() - 1` bins
///
/// A transition whose time falls on an interior edge closes the bin ending
/// at that edge; one landing exactly on the first edge belongs to the first
/// bin. Transitions outside `[edges[0], edges[last]]` are ignored. Stations
/// with fewer than two observations produce all zeros.
pub fn histogram(
    series: &StationSeries<'_>,
    edges: &[Timestamp],
    mode: ActivityMode,
) -> Result<Vec<i64>> {
    validate_bin_edges(edges)?;

    let bins = edges.len() - 1;
    let mut counts = vec![0i64; bins];
    let (first_edge, last_edge) = (edges[0], edges[bins]);

    let mut bin = 0;
    for pair in series.observations.windows(2) {
        let t = pair[1].time;
        if t < first_edge || t > last_edge {
            continue;
        }
        // t <= last_edge keeps the cursor inside the histogram
        while t > edges[bin + 1] {
            bin += 1;
        }
        let delta = i64::from(pair[1].bikes) - i64::from(pair[0].bikes);
        counts[bin] += mode.contribution(delta);
    }

    Ok(counts)
}
