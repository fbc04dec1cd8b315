//! Core data structures for bike-share collection.
//!
//! Station metadata, bike-count observations, the flat records produced by
//! the feed, and the read-only series view handed to the resampler and the
//! histogrammer.

use crate::error::{CollectorError, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Point in time of a sample; feeds report epoch milliseconds
pub type Timestamp = DateTime<Utc>;

/// Station identifier, stable across polls
pub type StationId = u32;

/// Convert feed epoch milliseconds into a timestamp
pub fn timestamp_from_millis(millis: i64) -> Option<Timestamp> {
    Utc.timestamp_millis_opt(millis).single()
}

/// Static metadata for one dock location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub id: StationId,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    /// Total docks, fixed at first sight as bikes + empty docks
    pub capacity: u32,
}

/// One bike-count sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub time: Timestamp,
    pub bikes: u32,
}

impl Observation {
    pub fn new(time: Timestamp, bikes: u32) -> Self {
        Self { time, bikes }
    }
}

/// Flat per-station record as delivered by a feed
///
/// Everything except the id is optional because upstream feeds omit tags;
/// the store decides which omissions make the record unusable.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StationRecord {
    pub id: StationId,
    pub name: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub bikes: Option<u32>,
    pub empty_docks: Option<u32>,
    pub last_update_time: Option<Timestamp>,
    pub last_comm_time: Option<Timestamp>,
}

impl StationRecord {
    /// Build station metadata from a first-sight record
    pub fn to_station(&self) -> Result<Station> {
        let name = self.require(self.name.clone(), "name")?;
        let lat = self.require(self.lat, "lat")?;
        let lon = self.require(self.lon, "long")?;
        let bikes = self.require(self.bikes, "nbBikes")?;
        let empty_docks = self.require(self.empty_docks, "nbEmptyDocks")?;
        let capacity = bikes
            .checked_add(empty_docks)
            .ok_or_else(|| CollectorError::InvalidField {
                station_id: self.id,
                field: "nbEmptyDocks",
                reason: format!("{bikes} bikes plus {empty_docks} empty docks overflows"),
            })?;

        Ok(Station {
            id: self.id,
            name,
            lat,
            lon,
            capacity,
        })
    }

    /// The (time, bikes) sample carried by this record
    pub fn observation(&self) -> Result<Observation> {
        let time = self.require(self.last_update_time, "lastUpdateTime")?;
        let bikes = self.require(self.bikes, "nbBikes")?;
        Ok(Observation::new(time, bikes))
    }

    fn require<T>(&self, value: Option<T>, field: &'static str) -> Result<T> {
        value.ok_or(CollectorError::MissingField {
            station_id: self.id,
            field,
        })
    }
}

/// One successful fetch of the feed
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeedPayload {
    /// Provider's global refresh time
    pub last_updated: Option<Timestamp>,
    pub stations: BTreeMap<StationId, StationRecord>,
}

/// What an append did to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    DuplicateTimestamp,
    UnchangedCount,
}

impl AppendOutcome {
    pub fn changed(self) -> bool {
        self == AppendOutcome::Appended
    }
}

/// Read-only view of one station and its time-ordered observations
#[derive(Debug, Clone, Copy)]
pub struct StationSeries<'a> {
    pub station: &'a Station,
    pub observations: &'a [Observation],
}

impl<'a> StationSeries<'a> {
    /// `observations` must be sorted by time
    pub fn new(station: &'a Station, observations: &'a [Observation]) -> Self {
        debug_assert!(observations.windows(2).all(|w| w[0].time <= w[1].time));
        Self {
            station,
            observations,
        }
    }

    pub fn id(&self) -> StationId {
        self.station.id
    }

    pub fn first_time(&self) -> Option<Timestamp> {
        self.observations.first().map(|o| o.time)
    }

    pub fn last_time(&self) -> Option<Timestamp> {
        self.observations.last().map(|o| o.time)
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}
