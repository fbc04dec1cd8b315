use super::*;
use crate::error::CollectorError;
use crate::models::{StationId, StationRecord, timestamp_from_millis};
use crate::persistence::{JsonSnapshotStore, SnapshotStore};
use std::sync::Mutex;
use tempfile::TempDir;

fn ts(millis: i64) -> Timestamp {
    timestamp_from_millis(millis).unwrap()
}

fn record(id: StationId, millis: i64, bikes: u32) -> StationRecord {
    StationRecord {
        id,
        name: Some(format!("Station {id}")),
        lat: Some(45.5),
        lon: Some(-73.6),
        bikes: Some(bikes),
        empty_docks: Some(10 - bikes),
        last_update_time: Some(ts(millis)),
        last_comm_time: Some(ts(millis)),
    }
}

fn payload(records: Vec<StationRecord>) -> FeedPayload {
    let mut payload = FeedPayload {
        last_updated: records.iter().filter_map(|r| r.last_update_time).max(),
        ..Default::default()
    };
    for record in records {
        payload.stations.insert(record.id, record);
    }
    payload
}

/// Replays scripted fetch results and cancels `done` after the last one
struct ScriptedFeed {
    script: Mutex<Vec<Result<FeedPayload>>>,
    done: CancellationToken,
}

impl ScriptedFeed {
    fn new(mut script: Vec<Result<FeedPayload>>, done: CancellationToken) -> Self {
        script.reverse();
        Self {
            script: Mutex::new(script),
            done,
        }
    }
}

impl FeedSource for ScriptedFeed {
    async fn fetch(&self) -> Result<FeedPayload> {
        let mut script = self.script.lock().unwrap();
        let next = script.pop();
        if script.is_empty() {
            self.done.cancel();
        }
        next.unwrap_or_else(|| {
            Err(CollectorError::Fetch {
                url: "scripted".to_string(),
                reason: "script exhausted".to_string(),
            })
        })
    }

    fn describe(&self) -> String {
        "scripted feed".to_string()
    }
}

fn config_without_staleness() -> CollectorConfig {
    CollectorConfig {
        poll_interval_secs: 1,
        stale_after_secs: None,
        ..Default::default()
    }
}

fn idle_collector(config: CollectorConfig) -> Collector<ScriptedFeed> {
    Collector::new(
        ScriptedFeed::new(Vec::new(), CancellationToken::new()),
        config,
    )
}

#[test]
fn test_merge_creates_stations_and_appends() {
    let mut collector = idle_collector(config_without_staleness());

    let summary = collector.merge_payload(
        &payload(vec![record(1, 1_000, 3), record(2, 1_000, 7)]),
        ts(2_000),
    );
    assert_eq!(summary.records, 2);
    assert_eq!(summary.stations_created, 2);
    assert_eq!(summary.appended, 2);
    assert_eq!(collector.snapshot().feed_last_updated, Some(ts(1_000)));

    let summary = collector.merge_payload(
        &payload(vec![record(1, 1_000, 3), record(2, 5_000, 7)]),
        ts(6_000),
    );
    assert_eq!(summary.stations_created, 0);
    assert_eq!(summary.appended, 0);
    assert_eq!(summary.unchanged, 2);
    assert_eq!(collector.snapshot().observation_count(), 2);
}

#[test]
fn test_stations_missing_from_payload_are_untouched() {
    let mut collector = idle_collector(config_without_staleness());
    collector.merge_payload(
        &payload(vec![record(1, 1_000, 3), record(2, 1_000, 7)]),
        ts(2_000),
    );
    collector.merge_payload(&payload(vec![record(1, 3_000, 4)]), ts(4_000));

    assert_eq!(collector.snapshot().observations(1).len(), 2);
    assert_eq!(collector.snapshot().observations(2).len(), 1);
}

#[test]
fn test_stale_stations_are_skipped() {
    let config = CollectorConfig {
        stale_after_secs: Some(60),
        ..Default::default()
    };
    let mut collector = idle_collector(config);

    let now = ts(1_000_000);
    let fresh = record(1, 990_000, 3);
    let stale = StationRecord {
        last_comm_time: Some(ts(100_000)),
        ..record(2, 990_000, 5)
    };
    let silent = StationRecord {
        last_comm_time: None,
        ..record(3, 990_000, 6)
    };

    let summary = collector.merge_payload(&payload(vec![fresh, stale, silent]), now);
    assert_eq!(summary.stale, 1);
    assert_eq!(summary.appended, 2);
    assert!(collector.snapshot().station(2).is_none());
    assert!(collector.snapshot().station(3).is_some());
}

#[test]
fn test_invalid_record_does_not_block_batch() {
    let mut collector = idle_collector(config_without_staleness());
    let broken = StationRecord {
        bikes: None,
        ..record(5, 1_000, 2)
    };

    let summary = collector.merge_payload(&payload(vec![record(4, 1_000, 1), broken]), ts(2_000));
    assert_eq!(summary.invalid, 1);
    assert_eq!(summary.appended, 1);
    assert_eq!(collector.stats().records_skipped, 1);
    assert!(collector.snapshot().station(5).is_none());
}

#[test]
fn test_overflowing_capacity_is_skipped_not_fatal() {
    let mut collector = idle_collector(config_without_staleness());
    let overflowing = StationRecord {
        bikes: Some(u32::MAX),
        empty_docks: Some(1),
        ..record(6, 1_000, 2)
    };

    let summary =
        collector.merge_payload(&payload(vec![record(4, 1_000, 1), overflowing]), ts(2_000));
    assert_eq!(summary.invalid, 1);
    assert_eq!(summary.appended, 1);
    assert!(collector.snapshot().station(6).is_none());
    assert_eq!(collector.snapshot().station(4).unwrap().capacity, 10);
}

#[tokio::test]
async fn test_verified_tick_rejects_inconsistent_reads() {
    let config = CollectorConfig {
        verify_fetch: true,
        ..config_without_staleness()
    };
    let script = vec![
        Ok(payload(vec![record(1, 1_000, 3)])),
        Ok(payload(vec![record(1, 1_000, 4)])),
    ];
    let mut collector = Collector::new(ScriptedFeed::new(script, CancellationToken::new()), config);

    assert!(matches!(
        collector.tick().await,
        Err(CollectorError::InconsistentFeed)
    ));
    assert!(collector.snapshot().is_empty());
}

#[tokio::test]
async fn test_run_survives_failed_fetch_and_saves_on_exit() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("bixi.json");

    let cancel = CancellationToken::new();
    let script = vec![
        Err(CollectorError::parse("truncated document")),
        Ok(payload(vec![record(1, 1_000, 3), record(2, 1_000, 8)])),
    ];
    let feed = ScriptedFeed::new(script, cancel.clone());
    let store = Box::new(JsonSnapshotStore::new(path.clone()));
    let collector = Collector::new(feed, config_without_staleness())
        .with_store(store)
        .unwrap();

    let (stats, snapshot) = collector.run(cancel, None).await.unwrap();
    assert_eq!(stats.ticks, 2);
    assert_eq!(stats.failed_ticks, 1);
    assert_eq!(stats.stations_created, 2);
    assert_eq!(stats.observations_appended, 2);
    assert_eq!(stats.snapshots_written, 1);

    let saved = JsonSnapshotStore::new(path).load().unwrap();
    assert_eq!(saved, snapshot);
}

#[tokio::test]
async fn test_run_resumes_from_existing_snapshot() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("bixi.json");

    let mut earlier = SystemSnapshot::new();
    earlier.ingest_record(&record(1, 1_000, 3)).unwrap();
    JsonSnapshotStore::new(path.clone()).save(&earlier).unwrap();

    let cancel = CancellationToken::new();
    let feed = ScriptedFeed::new(
        vec![Ok(payload(vec![record(1, 2_000, 5)]))],
        cancel.clone(),
    );
    let collector = Collector::new(feed, config_without_staleness())
        .with_store(Box::new(JsonSnapshotStore::new(path)))
        .unwrap();
    assert_eq!(collector.snapshot().observation_count(), 1);

    let (stats, snapshot) = collector.run(cancel, None).await.unwrap();
    assert_eq!(stats.stations_created, 0);
    let counts: Vec<u32> = snapshot.observations(1).iter().map(|o| o.bikes).collect();
    assert_eq!(counts, vec![3, 5]);
}

#[tokio::test]
async fn test_cancelled_before_start_writes_final_snapshot() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("bixi.db");

    let cancel = CancellationToken::new();
    cancel.cancel();
    let store = crate::persistence::open_store(&path, None).unwrap();
    let collector = idle_collector(config_without_staleness())
        .with_store(store)
        .unwrap();

    let (stats, snapshot) = collector.run(cancel, None).await.unwrap();
    assert_eq!(stats.ticks, 0);
    assert_eq!(stats.snapshots_written, 1);
    assert!(snapshot.is_empty());
    assert!(path.exists());
}
