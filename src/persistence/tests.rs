//! Round-trip tests for both snapshot backends

use super::*;
use crate::models::{Observation, Station, StationId, Timestamp, timestamp_from_millis};
use tempfile::TempDir;

fn ts(millis: i64) -> Timestamp {
    timestamp_from_millis(millis).unwrap()
}

fn station(id: StationId, name: &str, capacity: u32) -> Station {
    Station {
        id,
        name: name.to_string(),
        lat: 45.5 + f64::from(id) / 1000.0,
        lon: -73.6,
        capacity,
    }
}

fn sample_snapshot() -> SystemSnapshot {
    let mut snapshot = SystemSnapshot::new();
    snapshot.feed_last_updated = Some(ts(9_000));

    snapshot.register_station(station(7, "Rachel / Papineau", 23));
    snapshot.append(7, ts(1_000), 4).unwrap();
    snapshot.append(7, ts(2_000), 9).unwrap();
    snapshot.append(7, ts(5_000), 0).unwrap();

    snapshot.register_station(station(3, "Mont-Royal / Clark", 15));
    snapshot.append(3, ts(1_500), 15).unwrap();

    snapshot.register_station(station(11, "Never sampled", 19));
    snapshot
}

fn assert_round_trip(store: &mut dyn SnapshotStore) {
    let original = sample_snapshot();
    store.save(&original).unwrap();

    let loaded = store.load().unwrap();
    assert_eq!(loaded, original);
    assert_eq!(loaded.observations(7).len(), 3);
    assert_eq!(loaded.station(11).unwrap().capacity, 19);
    assert!(loaded.observations(11).is_empty());
}

#[test]
fn test_json_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = JsonSnapshotStore::new(temp_dir.path().join("bixi_data.json"));
    assert_round_trip(&mut store);
}

#[test]
fn test_sqlite_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = SqliteSnapshotStore::open(&temp_dir.path().join("bixi.db")).unwrap();
    assert_round_trip(&mut store);
}

#[test]
fn test_missing_json_loads_empty() {
    let temp_dir = TempDir::new().unwrap();
    let store = JsonSnapshotStore::new(temp_dir.path().join("absent.json"));
    assert!(store.load().unwrap().is_empty());
}

#[test]
fn test_json_document_is_keyed_by_station_id() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("snapshot.json");
    let mut store = JsonSnapshotStore::new(path.clone());
    store.save(&sample_snapshot()).unwrap();

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(raw["feed_last_updated"], 9_000);
    assert_eq!(raw["stations"]["7"]["name"], "Rachel / Papineau");
    assert_eq!(raw["stations"]["7"]["capacity"], 23);
    assert_eq!(raw["stations"]["7"]["observations"][1]["time"], 2_000);
    assert_eq!(raw["stations"]["7"]["observations"][1]["bikes"], 9);
}

#[test]
fn test_sqlite_saves_are_incremental_and_idempotent() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("bixi.db");
    let mut snapshot = sample_snapshot();

    {
        let mut store = SqliteSnapshotStore::open(&path).unwrap();
        store.save(&snapshot).unwrap();
        store.save(&snapshot).unwrap();
        snapshot.append(3, ts(6_000), 2).unwrap();
        store.save(&snapshot).unwrap();
    }

    let reopened = SqliteSnapshotStore::open(&path).unwrap();
    let loaded = reopened.load().unwrap();
    assert_eq!(loaded.observations(3).len(), 2);
    assert_eq!(loaded.observation_count(), 5);
    assert_eq!(loaded.feed_last_updated, Some(ts(9_000)));
}

#[test]
fn test_sqlite_keeps_first_capacity() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("bixi.db");
    let mut store = SqliteSnapshotStore::open(&path).unwrap();
    store.save(&sample_snapshot()).unwrap();

    let mut changed = SystemSnapshot::new();
    changed.restore_station(
        station(7, "Rachel / Papineau", 40),
        vec![Observation::new(ts(1_000), 4)],
    );
    store.save(&changed).unwrap();

    assert_eq!(store.load().unwrap().station(7).unwrap().capacity, 23);
}

#[test]
fn test_format_from_extension() {
    assert_eq!(
        SnapshotFormat::from_path(Path::new("data/bixi.DB")),
        Some(SnapshotFormat::Sqlite)
    );
    assert_eq!(
        SnapshotFormat::from_path(Path::new("bixi_data.json")),
        Some(SnapshotFormat::Json)
    );
    assert_eq!(SnapshotFormat::from_path(Path::new("bixi.txt")), None);
}

#[test]
fn test_open_store_requires_known_format() {
    let temp_dir = TempDir::new().unwrap();
    let result = open_store(&temp_dir.path().join("bixi.txt"), None);
    assert!(matches!(result, Err(CollectorError::Configuration { .. })));

    let forced = open_store(
        &temp_dir.path().join("bixi.txt"),
        Some(SnapshotFormat::Json),
    );
    assert!(forced.is_ok());
}

#[test]
fn test_load_snapshot_requires_existing_file() {
    let temp_dir = TempDir::new().unwrap();
    let result = load_snapshot(&temp_dir.path().join("missing.db"), None);
    assert!(matches!(result, Err(CollectorError::Persistence { .. })));
}
