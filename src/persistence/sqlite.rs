//! SQLite snapshots
//!
//! Stations live in `stations`; every stored sample is a row of
//! `bike_counts` keyed by `(station_id, time)`. Saves insert only rows that
//! are not yet present, so saving the same snapshot repeatedly is a no-op and
//! stored station metadata is never rewritten.

use super::SnapshotStore;
use crate::error::{CollectorError, Result};
use crate::models::{Observation, Station, StationId, timestamp_from_millis};
use crate::store::SystemSnapshot;
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

const SCHEMA: &str = "
    PRAGMA foreign_keys = ON;
    CREATE TABLE IF NOT EXISTS stations (
        id      INTEGER PRIMARY KEY,
        name    TEXT    NOT NULL,
        lat     REAL    NOT NULL,
        lon     REAL    NOT NULL,
        ndocks  INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS bike_counts (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        station_id  INTEGER NOT NULL REFERENCES stations(id),
        time        INTEGER NOT NULL,
        nbikes      INTEGER NOT NULL,
        UNIQUE (station_id, time)
    );
    CREATE TABLE IF NOT EXISTS system_info (
        key    TEXT PRIMARY KEY,
        value  INTEGER NOT NULL
    );
";

const FEED_LAST_UPDATED_KEY: &str = "feed_last_updated";

/// Snapshot stored in an SQLite database
#[derive(Debug)]
pub struct SqliteSnapshotStore {
    path: PathBuf,
    conn: Connection,
}

impl SqliteSnapshotStore {
    /// Open (creating if needed) the database and its schema
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(|e| CollectorError::persistence(path, e))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| CollectorError::persistence(path, e))?;

        Ok(Self {
            path: path.to_path_buf(),
            conn,
        })
    }

    fn db_error(&self, error: rusqlite::Error) -> CollectorError {
        CollectorError::persistence(&self.path, error)
    }

    fn write(&mut self, snapshot: &SystemSnapshot) -> rusqlite::Result<usize> {
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut insert_station = tx.prepare_cached(
                "INSERT OR IGNORE INTO stations (id, name, lat, lon, ndocks)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            let mut insert_count = tx.prepare_cached(
                "INSERT OR IGNORE INTO bike_counts (station_id, time, nbikes)
                 VALUES (?1, ?2, ?3)",
            )?;

            for series in snapshot.iter_series() {
                let station = series.station;
                insert_station.execute(params![
                    station.id,
                    station.name,
                    station.lat,
                    station.lon,
                    station.capacity
                ])?;
                for obs in series.observations {
                    inserted += insert_count.execute(params![
                        station.id,
                        obs.time.timestamp_millis(),
                        obs.bikes
                    ])?;
                }
            }

            if let Some(last_updated) = snapshot.feed_last_updated {
                tx.execute(
                    "INSERT OR REPLACE INTO system_info (key, value) VALUES (?1, ?2)",
                    params![FEED_LAST_UPDATED_KEY, last_updated.timestamp_millis()],
                )?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    fn read(&self) -> Result<SystemSnapshot> {
        let mut stations_stmt = self
            .conn
            .prepare("SELECT id, name, lat, lon, ndocks FROM stations ORDER BY id")
            .map_err(|e| self.db_error(e))?;
        let stations = stations_stmt
            .query_map([], |row| {
                Ok(Station {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    lat: row.get(2)?,
                    lon: row.get(3)?,
                    capacity: row.get(4)?,
                })
            })
            .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
            .map_err(|e| self.db_error(e))?;

        let mut counts_stmt = self
            .conn
            .prepare("SELECT station_id, time, nbikes FROM bike_counts ORDER BY station_id, time")
            .map_err(|e| self.db_error(e))?;
        let rows = counts_stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, StationId>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, u32>(2)?,
                ))
            })
            .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
            .map_err(|e| self.db_error(e))?;

        let mut histories: BTreeMap<StationId, Vec<Observation>> = BTreeMap::new();
        for (station_id, millis, bikes) in rows {
            let time = timestamp_from_millis(millis).ok_or_else(|| {
                CollectorError::persistence(
                    &self.path,
                    format!("station {} has invalid time {}", station_id, millis),
                )
            })?;
            histories
                .entry(station_id)
                .or_default()
                .push(Observation::new(time, bikes));
        }

        let feed_last_updated = self
            .conn
            .query_row(
                "SELECT value FROM system_info WHERE key = ?1",
                params![FEED_LAST_UPDATED_KEY],
                |row| row.get::<_, i64>(0),
            )
            .optional()
            .map_err(|e| self.db_error(e))?
            .and_then(timestamp_from_millis);

        let mut snapshot = SystemSnapshot::new();
        snapshot.feed_last_updated = feed_last_updated;
        for station in stations {
            let history = histories.remove(&station.id).unwrap_or_default();
            snapshot.restore_station(station, history);
        }
        Ok(snapshot)
    }
}

impl SnapshotStore for SqliteSnapshotStore {
    fn save(&mut self, snapshot: &SystemSnapshot) -> Result<()> {
        let inserted = self.write(snapshot).map_err(|e| self.db_error(e))?;
        debug!(
            "Committed {} new bike counts to {}",
            inserted,
            self.path.display()
        );
        Ok(())
    }

    fn load(&self) -> Result<SystemSnapshot> {
        self.read()
    }

    fn path(&self) -> &Path {
        &self.path
    }
}
