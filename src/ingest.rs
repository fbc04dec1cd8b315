//! Feed ingestion loop.
//!
//! Polls a [`FeedSource`] on a fixed interval, merges every returned station
//! record into the in-memory [`SystemSnapshot`] and periodically writes the
//! snapshot to a [`SnapshotStore`]. The collector is the only writer: it owns
//! the snapshot outright and runs one tick at a time.
//!
//! Per tick: `Idle -> Fetching -> (Merging -> Idle) | (failure logged -> Idle)`.
//! Fetch and parse failures never end collection; only cancellation does.

use crate::config::CollectorConfig;
use crate::error::Result;
use crate::feed::{FeedSource, fetch_verified};
use crate::models::{AppendOutcome, FeedPayload, Timestamp};
use crate::persistence::SnapshotStore;
use crate::store::SystemSnapshot;
use chrono::Utc;
use indicatif::ProgressBar;
use serde::Serialize;
use std::time::Instant;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Running totals for a collection session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CollectStats {
    pub ticks: usize,
    pub failed_ticks: usize,
    pub stations_created: usize,
    pub observations_appended: usize,
    pub records_skipped: usize,
    pub snapshots_written: usize,
}

/// What one merge did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub records: usize,
    pub stations_created: usize,
    pub appended: usize,
    pub unchanged: usize,
    pub stale: usize,
    pub invalid: usize,
}

impl CollectStats {
    fn absorb(&mut self, summary: &TickSummary) {
        self.stations_created += summary.stations_created;
        self.observations_appended += summary.appended;
        self.records_skipped += summary.stale + summary.invalid;
    }
}

/// Polls a feed and accumulates station histories
pub struct Collector<F: FeedSource> {
    feed: F,
    config: CollectorConfig,
    snapshot: SystemSnapshot,
    store: Option<Box<dyn SnapshotStore>>,
    stats: CollectStats,
    last_saved: Instant,
}

impl<F: FeedSource> Collector<F> {
    pub fn new(feed: F, config: CollectorConfig) -> Self {
        Self {
            feed,
            config,
            snapshot: SystemSnapshot::new(),
            store: None,
            stats: CollectStats::default(),
            last_saved: Instant::now(),
        }
    }

    /// Persist to `store`, resuming from whatever it already holds
    pub fn with_store(mut self, store: Box<dyn SnapshotStore>) -> Result<Self> {
        self.snapshot = store.load()?;
        info!(
            "Resumed {} stations with {} observations from {}",
            self.snapshot.station_count(),
            self.snapshot.observation_count(),
            store.path().display()
        );
        self.store = Some(store);
        Ok(self)
    }

    pub fn snapshot(&self) -> &SystemSnapshot {
        &self.snapshot
    }

    pub fn stats(&self) -> &CollectStats {
        &self.stats
    }

    /// Merge one fetched payload, judging staleness against `now`
    ///
    /// Records that cannot be used (stale, or missing required fields) are
    /// skipped with a warning; the rest of the batch is still merged.
    /// Stations absent from the payload are left untouched.
    pub fn merge_payload(&mut self, payload: &FeedPayload, now: Timestamp) -> TickSummary {
        let mut summary = TickSummary {
            records: payload.stations.len(),
            ..Default::default()
        };
        if payload.last_updated.is_some() {
            self.snapshot.feed_last_updated = payload.last_updated;
        }
        let stale_cutoff = self.config.stale_after().map(|window| now - window);

        for record in payload.stations.values() {
            if let (Some(cutoff), Some(last_comm)) = (stale_cutoff, record.last_comm_time) {
                if last_comm < cutoff {
                    debug!("Station {} silent since {}, ignoring", record.id, last_comm);
                    summary.stale += 1;
                    continue;
                }
            }

            let known = self.snapshot.station(record.id).is_some();
            match self.snapshot.ingest_record(record) {
                Ok(outcome) => {
                    if !known {
                        summary.stations_created += 1;
                    }
                    match outcome {
                        AppendOutcome::Appended => {
                            summary.appended += 1;
                            debug!("Updated station {}", record.id);
                        }
                        AppendOutcome::DuplicateTimestamp | AppendOutcome::UnchangedCount => {
                            summary.unchanged += 1;
                        }
                    }
                }
                Err(e) => {
                    warn!("Skipping station {} update: {}", record.id, e);
                    summary.invalid += 1;
                }
            }
        }

        self.stats.absorb(&summary);
        summary
    }

    /// Fetch once (twice when verifying) and merge the result
    pub async fn tick(&mut self) -> Result<TickSummary> {
        let payload = if self.config.verify_fetch {
            fetch_verified(&self.feed).await?
        } else {
            self.feed.fetch().await?
        };
        Ok(self.merge_payload(&payload, Utc::now()))
    }

    /// Write the snapshot now, if a store is attached
    pub fn save_snapshot(&mut self) -> Result<()> {
        if let Some(store) = self.store.as_mut() {
            store.save(&self.snapshot)?;
            self.stats.snapshots_written += 1;
            self.last_saved = Instant::now();
            info!(
                "Saved {} stations to {}",
                self.snapshot.station_count(),
                store.path().display()
            );
        }
        Ok(())
    }

    fn snapshot_due(&self) -> bool {
        self.store.is_some() && self.last_saved.elapsed() >= self.config.snapshot_interval()
    }

    /// Poll until `cancel` fires, then write a final snapshot
    ///
    /// Cancellation is honoured between ticks and while waiting on a fetch;
    /// a merge, once started, always completes.
    pub async fn run(
        mut self,
        cancel: CancellationToken,
        progress: Option<ProgressBar>,
    ) -> Result<(CollectStats, SystemSnapshot)> {
        info!(
            "Collecting from {} every {}s",
            self.feed.describe(),
            self.config.poll_interval_secs
        );

        let mut ticker = tokio::time::interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            self.stats.ticks += 1;
            debug!("Iteration number {}", self.stats.ticks);

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                outcome = self.tick() => outcome,
            };

            match outcome {
                Ok(summary) => {
                    info!(
                        "Tick {}: {} records, {} new samples, {} new stations",
                        self.stats.ticks,
                        summary.records,
                        summary.appended,
                        summary.stations_created
                    );
                    if let Some(pb) = &progress {
                        pb.set_message(format!(
                            "tick {} | {} stations | {} samples stored",
                            self.stats.ticks,
                            self.snapshot.station_count(),
                            self.snapshot.observation_count()
                        ));
                    }
                }
                Err(e) => {
                    self.stats.failed_ticks += 1;
                    if e.is_transient() {
                        warn!("Tick {} skipped: {}", self.stats.ticks, e);
                    } else {
                        error!("Tick {} failed: {}", self.stats.ticks, e);
                    }
                }
            }

            if self.snapshot_due() {
                if let Err(e) = self.save_snapshot() {
                    error!("Snapshot failed: {}", e);
                }
            }
        }

        info!("Stopped after {} iterations", self.stats.ticks);
        if let Some(pb) = &progress {
            pb.finish_and_clear();
        }
        self.save_snapshot()?;

        let stats = self.stats.clone();
        Ok((stats, self.snapshot))
    }
}

#[cfg(test)]
mod tests;
