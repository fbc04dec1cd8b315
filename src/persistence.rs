//! Snapshot persistence.
//!
//! Two interchangeable backends store the full system state: a JSON document
//! keyed by station id, and an SQLite database with a stations table and a
//! foreign-keyed bike count table. Both round-trip metadata and complete
//! observation histories.

pub mod json;
pub mod sqlite;

use crate::error::{CollectorError, Result};
use crate::store::SystemSnapshot;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

pub use json::JsonSnapshotStore;
pub use sqlite::SqliteSnapshotStore;

/// Durable home for a [`SystemSnapshot`]
pub trait SnapshotStore {
    /// Write the complete snapshot
    fn save(&mut self, snapshot: &SystemSnapshot) -> Result<()>;

    /// Read the complete snapshot; a store with nothing saved yields an empty one
    fn load(&self) -> Result<SystemSnapshot>;

    fn path(&self) -> &Path;
}

/// On-disk snapshot format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotFormat {
    Json,
    Sqlite,
}

impl SnapshotFormat {
    /// Infer the format from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_lowercase();
        match extension.as_str() {
            "json" => Some(SnapshotFormat::Json),
            "db" | "sqlite" | "sqlite3" => Some(SnapshotFormat::Sqlite),
            _ => None,
        }
    }
}

impl fmt::Display for SnapshotFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotFormat::Json => f.write_str("json"),
            SnapshotFormat::Sqlite => f.write_str("sqlite"),
        }
    }
}

/// Open the snapshot store at `path`, using `format` or the file extension
///
/// # Errors
/// * `Configuration` if no format is given and the extension is not recognised
/// * `Persistence` if an SQLite database cannot be opened
pub fn open_store(path: &Path, format: Option<SnapshotFormat>) -> Result<Box<dyn SnapshotStore>> {
    let format = format
        .or_else(|| SnapshotFormat::from_path(path))
        .ok_or_else(|| {
            CollectorError::configuration(format!(
                "Cannot infer snapshot format from '{}': use .json, .db or .sqlite, or pass --format",
                path.display()
            ))
        })?;

    let store: Box<dyn SnapshotStore> = match format {
        SnapshotFormat::Json => Box::new(JsonSnapshotStore::new(PathBuf::from(path))),
        SnapshotFormat::Sqlite => Box::new(SqliteSnapshotStore::open(path)?),
    };
    Ok(store)
}

/// Load a snapshot from `path`, failing if the file does not exist
pub fn load_snapshot(path: &Path, format: Option<SnapshotFormat>) -> Result<SystemSnapshot> {
    if !path.exists() {
        return Err(CollectorError::persistence(path, "snapshot file does not exist"));
    }
    open_store(path, format)?.load()
}

#[cfg(test)]
mod tests;
