//! End-to-end collection: XML documents through the collector into an SQLite
//! snapshot, read back and aggregated city-wide.

use bikeshare_collector::aggregate::{
    aggregate_availability, aggregate_counts, aggregate_empty_docks, aggregate_histogram,
};
use bikeshare_collector::export::export_aggregate_histogram;
use bikeshare_collector::feed::{FeedSource, parse_station_xml};
use bikeshare_collector::ingest::Collector;
use bikeshare_collector::models::{FeedPayload, timestamp_from_millis};
use bikeshare_collector::persistence::{load_snapshot, open_store};
use bikeshare_collector::{ActivityMode, CollectorConfig, CollectorError, Result, Timestamp};
use std::sync::Mutex;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Serves canned bikeStations documents, cancelling after the last one
struct CannedXmlFeed {
    documents: Mutex<Vec<String>>,
    done: CancellationToken,
}

impl CannedXmlFeed {
    fn new(mut documents: Vec<String>, done: CancellationToken) -> Self {
        documents.reverse();
        Self {
            documents: Mutex::new(documents),
            done,
        }
    }
}

impl FeedSource for CannedXmlFeed {
    async fn fetch(&self) -> Result<FeedPayload> {
        let mut documents = self.documents.lock().unwrap();
        let document = documents.pop().ok_or_else(|| CollectorError::Fetch {
            url: "canned".to_string(),
            reason: "no more documents".to_string(),
        })?;
        if documents.is_empty() {
            self.done.cancel();
        }
        parse_station_xml(&document)
    }

    fn describe(&self) -> String {
        "canned documents".to_string()
    }
}

fn ts(millis: i64) -> Timestamp {
    timestamp_from_millis(millis).unwrap()
}

/// `(id, bikes, empty docks, last update ms)` per station
fn document(feed_ms: i64, stations: &[(u32, u32, u32, i64)]) -> String {
    let mut xml = format!(
        r#"<?xml version="1.0" encoding="utf-8"?><stations lastUpdate="{feed_ms}">"#
    );
    for (id, bikes, empty, updated) in stations {
        xml.push_str(&format!(
            "<station><id>{id}</id><name>Station {id}</name><lat>45.5</lat><long>-73.6</long>\
             <installed>true</installed><nbBikes>{bikes}</nbBikes>\
             <nbEmptyDocks>{empty}</nbEmptyDocks><lastUpdateTime>{updated}</lastUpdateTime>\
             <lastCommWithServer>{updated}</lastCommWithServer></station>"
        ));
    }
    xml.push_str("</stations>");
    xml
}

fn polls() -> Vec<String> {
    vec![
        document(1_000_000, &[(1, 5, 5, 1_000_000), (2, 2, 8, 1_000_000)]),
        document(1_060_000, &[(1, 8, 2, 1_060_000), (2, 2, 8, 1_060_000)]),
        document(1_120_000, &[(1, 3, 7, 1_120_000), (2, 6, 4, 1_120_000)]),
    ]
}

#[tokio::test]
async fn test_collect_persist_and_aggregate() {
    let temp_dir = TempDir::new().unwrap();
    let snapshot_path = temp_dir.path().join("bixi.db");

    let config = CollectorConfig {
        poll_interval_secs: 1,
        snapshot_path: Some(snapshot_path.clone()),
        stale_after_secs: None,
        ..Default::default()
    };
    config.validate().unwrap();

    let cancel = CancellationToken::new();
    let store = open_store(&snapshot_path, None).unwrap();
    let collector = Collector::new(CannedXmlFeed::new(polls(), cancel.clone()), config)
        .with_store(store)
        .unwrap();
    let (stats, _) = collector.run(cancel, None).await.unwrap();

    assert_eq!(stats.ticks, 3);
    assert_eq!(stats.failed_ticks, 0);
    assert_eq!(stats.stations_created, 2);
    assert_eq!(stats.observations_appended, 5);
    assert_eq!(stats.snapshots_written, 1);

    let snapshot = load_snapshot(&snapshot_path, None).unwrap();
    assert_eq!(snapshot.feed_last_updated, Some(ts(1_120_000)));
    assert_eq!(snapshot.station(1).unwrap().capacity, 10);
    assert_eq!(snapshot.observations(2).len(), 2);

    let at = [ts(1_090_000)];
    assert_eq!(aggregate_counts(&snapshot, &at, None).values, vec![10]);
    assert_eq!(aggregate_empty_docks(&snapshot, &at, None).values, vec![10]);
    let availability = aggregate_availability(&snapshot, &at, None);
    assert_eq!((availability.bikes, availability.empty_docks), (vec![10], vec![10]));

    let edges = [ts(1_000_000), ts(1_060_000), ts(1_120_000)];
    let diff = aggregate_histogram(&snapshot, &edges, ActivityMode::Diff).unwrap();
    assert_eq!(diff.values, vec![3, -1]);
    let both = aggregate_histogram(&snapshot, &edges, ActivityMode::Both).unwrap();
    assert_eq!(both.values, vec![3, 9]);
    assert!(both.failures.is_empty());

    let export_path = temp_dir.path().join("activity.csv");
    assert_eq!(export_aggregate_histogram(&export_path, &both).unwrap(), 2);
}

#[tokio::test]
async fn test_restart_does_not_duplicate_history() {
    let temp_dir = TempDir::new().unwrap();
    let snapshot_path = temp_dir.path().join("bixi.json");
    let config = CollectorConfig {
        poll_interval_secs: 1,
        snapshot_path: Some(snapshot_path.clone()),
        stale_after_secs: None,
        ..Default::default()
    };

    for _ in 0..2 {
        let cancel = CancellationToken::new();
        let feed = CannedXmlFeed::new(polls()[..2].to_vec(), cancel.clone());
        let store = open_store(&snapshot_path, None).unwrap();
        Collector::new(feed, config.clone())
            .with_store(store)
            .unwrap()
            .run(cancel, None)
            .await
            .unwrap();
    }

    let snapshot = load_snapshot(&snapshot_path, None).unwrap();
    let counts: Vec<u32> = snapshot.observations(1).iter().map(|o| o.bikes).collect();
    assert_eq!(counts, vec![5, 8]);
    assert_eq!(snapshot.observations(2).len(), 1);
}

#[test]
fn test_aggregate_skips_station_outside_window() {
    let mut snapshot = parse_station_xml(&polls()[0])
        .map(|payload| {
            let mut snapshot = bikeshare_collector::SystemSnapshot::new();
            for record in payload.stations.values() {
                snapshot.ingest_record(record).unwrap();
            }
            snapshot
        })
        .unwrap();
    let late = parse_station_xml(&document(2_000_000, &[(3, 4, 6, 2_000_000)])).unwrap();
    snapshot.ingest_record(&late.stations[&3]).unwrap();

    let series = aggregate_counts(&snapshot, &[ts(1_000_000)], Some(ts(2_000_000)));
    assert_eq!(series.values, vec![7]);
    assert_eq!(series.failures.len(), 1);
    assert_eq!(series.failures[0].station_id, 3);
}
