//! JSON document snapshots
//!
//! Layout: `{"feed_last_updated": ms, "stations": {"<id>": {metadata...,
//! "observations": [{"time": ms, "bikes": n}, ...]}}}`.

use super::SnapshotStore;
use crate::error::{CollectorError, Result};
use crate::models::{Observation, Station, StationId, Timestamp};
use crate::store::SystemSnapshot;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotDocument {
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    feed_last_updated: Option<Timestamp>,
    stations: BTreeMap<StationId, StationDocument>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StationDocument {
    #[serde(flatten)]
    station: Station,
    #[serde(default)]
    observations: Vec<Observation>,
}

/// Snapshot stored as a single JSON file, replaced atomically on save
#[derive(Debug, Clone)]
pub struct JsonSnapshotStore {
    path: PathBuf,
}

impl JsonSnapshotStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn to_document(snapshot: &SystemSnapshot) -> SnapshotDocument {
        let stations = snapshot
            .iter_series()
            .map(|series| {
                (
                    series.id(),
                    StationDocument {
                        station: series.station.clone(),
                        observations: series.observations.to_vec(),
                    },
                )
            })
            .collect();

        SnapshotDocument {
            feed_last_updated: snapshot.feed_last_updated,
            stations,
        }
    }

    fn from_document(document: SnapshotDocument) -> SystemSnapshot {
        let mut snapshot = SystemSnapshot::new();
        snapshot.feed_last_updated = document.feed_last_updated;
        for (_, entry) in document.stations {
            snapshot.restore_station(entry.station, entry.observations);
        }
        snapshot
    }
}

impl SnapshotStore for JsonSnapshotStore {
    fn save(&mut self, snapshot: &SystemSnapshot) -> Result<()> {
        let directory = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&directory)?;

        let document = Self::to_document(snapshot);
        let mut temp = NamedTempFile::new_in(&directory)?;
        {
            let mut writer = BufWriter::new(temp.as_file_mut());
            serde_json::to_writer(&mut writer, &document)
                .map_err(|e| CollectorError::persistence(&self.path, e))?;
            writer.flush()?;
        }
        temp.persist(&self.path)
            .map_err(|e| CollectorError::persistence(&self.path, e.error))?;

        debug!(
            "Wrote JSON snapshot with {} stations to {}",
            snapshot.station_count(),
            self.path.display()
        );
        Ok(())
    }

    fn load(&self) -> Result<SystemSnapshot> {
        if !self.path.exists() {
            return Ok(SystemSnapshot::new());
        }
        let reader = BufReader::new(File::open(&self.path)?);
        let document: SnapshotDocument = serde_json::from_reader(reader)
            .map_err(|e| CollectorError::persistence(&self.path, e))?;
        Ok(Self::from_document(document))
    }

    fn path(&self) -> &Path {
        &self.path
    }
}
