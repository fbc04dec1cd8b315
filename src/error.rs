//! Error handling for bike-share collection and series reconstruction.
//!
//! Distinguishes transient feed failures (fetch/parse) from data-range
//! failures raised while resampling a single station, so callers can decide
//! which ones to skip and which ones to surface.

use crate::models::{StationId, Timestamp};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CollectorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Feed fetch failed for {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("Malformed feed payload: {reason}")]
    Parse { reason: String },

    #[error("Feed returned different payloads on consecutive fetches")]
    InconsistentFeed,

    #[error("Time {requested} falls outside of data range [{start}, {end}] for station {station_id}")]
    OutOfRange {
        station_id: StationId,
        requested: Timestamp,
        start: Timestamp,
        end: Timestamp,
    },

    #[error("No data available for station {station_id}")]
    NoData { station_id: StationId },

    #[error("Station {station_id} failed: {source}")]
    StationFailure {
        station_id: StationId,
        #[source]
        source: Box<CollectorError>,
    },

    #[error("Station {station_id} is not registered")]
    UnknownStation { station_id: StationId },

    #[error("Station {station_id} record is missing field '{field}'")]
    MissingField {
        station_id: StationId,
        field: &'static str,
    },

    #[error("Station {station_id} record has an invalid '{field}': {reason}")]
    InvalidField {
        station_id: StationId,
        field: &'static str,
        reason: String,
    },

    #[error("Invalid histogram bins: {reason}")]
    InvalidBins { reason: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Persistence error at {path}: {reason}")]
    Persistence { path: PathBuf, reason: String },

    #[error("Export failed for {path}: {reason}")]
    Export { path: PathBuf, reason: String },
}

impl CollectorError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn parse(reason: impl Into<String>) -> Self {
        Self::Parse {
            reason: reason.into(),
        }
    }

    pub fn persistence(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Persistence {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Attribute this error to one station during aggregation
    pub fn for_station(self, station_id: StationId) -> Self {
        match self {
            already @ Self::StationFailure { .. } => already,
            other => Self::StationFailure {
                station_id,
                source: Box::new(other),
            },
        }
    }

    /// Transient failures are skipped at the tick boundary instead of ending collection
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Fetch { .. } | Self::Parse { .. } | Self::InconsistentFeed
        )
    }
}

pub type Result<T> = std::result::Result<T, CollectorError>;
