//! Bike-share station collector
//!
//! Polls a public bike-share station feed, keeps a de-duplicated history of
//! bike counts per station and answers city-wide questions about it.
//!
//! This library provides:
//! - An observation store with append-and-deduplicate semantics
//! - A step-function resampler for bike counts at arbitrary times
//! - Activity histograms from consecutive count changes
//! - Fault-isolating city-wide aggregation
//! - A cancellable polling loop over any [`feed::FeedSource`]
//! - JSON and SQLite snapshots, Parquet/CSV export

pub mod aggregate;
pub mod cli;
pub mod config;
pub mod constants;
pub mod error;
pub mod export;
pub mod feed;
pub mod histogram;
pub mod ingest;
pub mod models;
pub mod persistence;
pub mod resample;
pub mod store;

// Re-export commonly used types
pub use config::CollectorConfig;
pub use error::{CollectorError, Result};
pub use histogram::ActivityMode;
pub use models::{Observation, Station, StationId, StationSeries, Timestamp};
pub use store::SystemSnapshot;
