//! Observation store for all stations of one system
//!
//! Stations and their observations live in two id-keyed tables instead of
//! stations owning back-referenced sample objects. Both tables are ordered
//! maps so every iteration (aggregation, persistence, reports) visits
//! stations by ascending id.

use crate::error::{CollectorError, Result};
use crate::models::{
    AppendOutcome, Observation, Station, StationId, StationRecord, StationSeries, Timestamp,
};
use std::collections::BTreeMap;
use tracing::{debug, trace};

/// Complete in-memory state of a bike-share system
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SystemSnapshot {
    stations: BTreeMap<StationId, Station>,
    observations: BTreeMap<StationId, Vec<Observation>>,
    /// Provider's global refresh time from the most recent fetch
    pub feed_last_updated: Option<Timestamp>,
}

impl SystemSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert station metadata if the id has not been seen
    ///
    /// Returns `true` when the station was created. Metadata of a known
    /// station, capacity included, is never replaced.
    pub fn register_station(&mut self, station: Station) -> bool {
        if self.stations.contains_key(&station.id) {
            return false;
        }
        debug!(
            "Registering station {} ({}) with {} docks",
            station.id, station.name, station.capacity
        );
        self.observations.entry(station.id).or_default();
        self.stations.insert(station.id, station);
        true
    }

    /// Append one sample under the de-duplication rules
    ///
    /// A sample is dropped when its timestamp is already stored, or when its
    /// count equals the count of the latest stored sample. Otherwise it is
    /// inserted at its sorted position, so late arrivals keep the sequence
    /// ordered. A late sample is still compared with the latest count, not
    /// with the sample it would follow.
    pub fn append(
        &mut self,
        station_id: StationId,
        time: Timestamp,
        bikes: u32,
    ) -> Result<AppendOutcome> {
        if !self.stations.contains_key(&station_id) {
            return Err(CollectorError::UnknownStation { station_id });
        }
        let series = self.observations.entry(station_id).or_default();

        let position = series.partition_point(|o| o.time < time);
        if series.get(position).is_some_and(|o| o.time == time) {
            trace!("Station {}: sample at {} already stored", station_id, time);
            return Ok(AppendOutcome::DuplicateTimestamp);
        }

        if series.last().is_some_and(|latest| latest.bikes == bikes) {
            trace!("Station {}: count {} unchanged", station_id, bikes);
            return Ok(AppendOutcome::UnchangedCount);
        }

        series.insert(position, Observation::new(time, bikes));
        Ok(AppendOutcome::Appended)
    }

    /// Create the station on first sight, then append the record's sample
    pub fn ingest_record(&mut self, record: &StationRecord) -> Result<AppendOutcome> {
        let observation = record.observation()?;
        if !self.stations.contains_key(&record.id) {
            self.register_station(record.to_station()?);
        }
        self.append(record.id, observation.time, observation.bikes)
    }

    pub fn station(&self, station_id: StationId) -> Option<&Station> {
        self.stations.get(&station_id)
    }

    /// Sorted observations of a station (empty for unknown ids)
    pub fn observations(&self, station_id: StationId) -> &[Observation] {
        self.observations
            .get(&station_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn series(&self, station_id: StationId) -> Option<StationSeries<'_>> {
        self.stations
            .get(&station_id)
            .map(|station| StationSeries::new(station, self.observations(station_id)))
    }

    /// All stations in ascending id order
    pub fn iter_series(&self) -> impl Iterator<Item = StationSeries<'_>> {
        self.stations
            .values()
            .map(|station| StationSeries::new(station, self.observations(station.id)))
    }

    pub fn stations(&self) -> impl Iterator<Item = &Station> {
        self.stations.values()
    }

    pub fn station_count(&self) -> usize {
        self.stations.len()
    }

    pub fn observation_count(&self) -> usize {
        self.observations.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    /// Total docks across all stations
    pub fn total_capacity(&self) -> u64 {
        self.stations.values().map(|s| u64::from(s.capacity)).sum()
    }

    /// Earliest and latest sample time across all stations
    pub fn time_span(&self) -> Option<(Timestamp, Timestamp)> {
        let first = self
            .observations
            .values()
            .filter_map(|v| v.first())
            .map(|o| o.time)
            .min()?;
        let last = self
            .observations
            .values()
            .filter_map(|v| v.last())
            .map(|o| o.time)
            .max()?;
        Some((first, last))
    }

    /// Restore a station with its full history, as read back from persistence
    ///
    /// The history is sorted and exact-timestamp duplicates are dropped; no
    /// count-based de-duplication is applied to stored data.
    pub fn restore_station(&mut self, station: Station, mut history: Vec<Observation>) {
        history.sort_by_key(|o| o.time);
        history.dedup_by_key(|o| o.time);
        self.observations.insert(station.id, history);
        self.stations.insert(station.id, station);
    }
}
