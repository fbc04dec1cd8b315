//! Command-line argument definitions for the bike-share collector
//!
//! The CLI is defined with the clap derive API. Collection settings given
//! here are the last configuration layer, applied on top of defaults, the
//! config file and the environment.

use crate::config::CollectorConfig;
use crate::constants::CITY_FEEDS;
use crate::error::{CollectorError, Result};
use crate::histogram::ActivityMode;
use crate::models::Timestamp;
use crate::persistence::SnapshotFormat;
use chrono::{DateTime, NaiveDateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

/// CLI arguments for the bike-share collector
#[derive(Debug, Clone, Parser)]
#[command(
    name = "bikeshare-collector",
    version,
    about = "Record bike-share station availability and analyse city-wide usage",
    long_about = "Polls a public bike-share station feed, keeps a de-duplicated history of \
                  bike counts per station and persists it as a JSON or SQLite snapshot. \
                  Stored snapshots can be queried for city-wide empty docks over time and \
                  for binned pick-up and drop-off activity, printed or exported to Parquet/CSV."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Poll a station feed and record availability changes
    Collect(CollectArgs),
    /// List the stations stored in a snapshot
    Stations(StationsArgs),
    /// City-wide empty docks sampled on a regular time grid
    EmptyDocks(EmptyDocksArgs),
    /// City-wide bike activity binned over time
    Activity(ActivityArgs),
}

/// Logging flags shared by every command
#[derive(Debug, Clone, Default, clap::Args)]
pub struct Verbosity {
    /// Logging verbosity level
    #[arg(
        short = 'v',
        long = "verbose",
        action = clap::ArgAction::Count,
        help = "Increase logging verbosity (-v: info, -vv: debug, -vvv: trace)"
    )]
    pub verbose: u8,

    /// Only show errors. Overrides verbose settings.
    #[arg(
        short = 'q',
        long = "quiet",
        help = "Suppress output except errors",
        conflicts_with = "verbose"
    )]
    pub quiet: bool,
}

impl Verbosity {
    /// Determine the appropriate log level based on verbosity flags
    pub fn get_log_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else {
            match self.verbose {
                0 => "warn",
                1 => "info",
                2 => "debug",
                _ => "trace",
            }
        }
    }

    /// Spinners only when log lines would not interleave with them
    pub fn show_progress(&self) -> bool {
        !self.quiet && self.verbose == 0
    }
}

/// Output format for printed results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output
    #[default]
    Human,
    /// JSON format for scripting
    Json,
}

/// Arguments for the collect command
#[derive(Debug, Clone, Default, Parser)]
pub struct CollectArgs {
    /// Known city whose public feed should be polled
    #[arg(
        long = "city",
        value_name = "NAME",
        conflicts_with = "url",
        help = "Poll the feed of a known city (boston, london, minneapolis, montreal, toronto, washingtondc)"
    )]
    pub city: Option<String>,

    /// Explicit bikeStations XML feed URL
    #[arg(long = "url", value_name = "URL", help = "Poll an explicit feed URL")]
    pub url: Option<String>,

    /// Seconds between polls
    #[arg(
        short = 'i',
        long = "interval",
        value_name = "SECS",
        help = "Seconds between polls (default 10)"
    )]
    pub interval: Option<u64>,

    /// Snapshot destination
    ///
    /// Existing state at this path is loaded before collection starts and
    /// written back periodically and on shutdown.
    #[arg(
        short = 's',
        long = "snapshot",
        value_name = "PATH",
        help = "Snapshot file to resume from and write to (.json, .db, .sqlite)"
    )]
    pub snapshot: Option<PathBuf>,

    /// Seconds between snapshot writes
    #[arg(
        long = "snapshot-interval",
        value_name = "SECS",
        help = "Seconds between snapshot writes (default 300)"
    )]
    pub snapshot_interval: Option<u64>,

    /// Snapshot backend, overriding the file extension
    #[arg(long = "format", value_enum, help = "Snapshot backend")]
    pub format: Option<SnapshotFormat>,

    /// Fetch twice per tick and skip ticks where the reads differ
    #[arg(long = "verify-fetch", help = "Fetch twice per tick and require both reads to match")]
    pub verify_fetch: bool,

    /// Ignore stations silent for longer than this; 0 disables the filter
    #[arg(
        long = "stale-after",
        value_name = "SECS",
        help = "Ignore stations that have not reported for this many seconds (0 disables)"
    )]
    pub stale_after: Option<u64>,

    /// JSON configuration file
    ///
    /// If not specified, `<config dir>/bikeshare-collector/config.json` is
    /// used when it exists.
    #[arg(
        short = 'c',
        long = "config",
        value_name = "FILE",
        help = "Path to configuration file (JSON format)"
    )]
    pub config_file: Option<PathBuf>,

    /// Format of the summary printed on exit
    #[arg(
        long = "output-format",
        value_enum,
        default_value = "human",
        help = "Output format for the session summary"
    )]
    pub output_format: OutputFormat,

    #[command(flatten)]
    pub verbosity: Verbosity,
}

impl CollectArgs {
    /// Validate the collect arguments for consistency
    pub fn validate(&self) -> Result<()> {
        if let Some(city) = &self.city {
            if !CITY_FEEDS
                .iter()
                .any(|(name, _)| name.eq_ignore_ascii_case(city))
            {
                let known: Vec<&str> = CITY_FEEDS.iter().map(|(name, _)| *name).collect();
                return Err(CollectorError::configuration(format!(
                    "Unknown city '{}'. Known cities: {}",
                    city,
                    known.join(", ")
                )));
            }
        }

        if let Some(config_file) = &self.config_file {
            if !config_file.exists() {
                return Err(CollectorError::configuration(format!(
                    "Config file does not exist: {}",
                    config_file.display()
                )));
            }
        }

        Ok(())
    }

    /// Apply command-line overrides on top of an already layered config
    pub fn apply_to(&self, config: &mut CollectorConfig) -> Result<()> {
        config.set_feed(self.city.as_deref(), self.url.as_deref())?;

        if let Some(interval) = self.interval {
            config.poll_interval_secs = interval;
        }
        if let Some(path) = &self.snapshot {
            config.snapshot_path = Some(path.clone());
        }
        if let Some(interval) = self.snapshot_interval {
            config.snapshot_interval_secs = interval;
        }
        if let Some(format) = self.format {
            config.snapshot_format = Some(format);
        }
        if self.verify_fetch {
            config.verify_fetch = true;
        }
        if let Some(secs) = self.stale_after {
            config.stale_after_secs = (secs > 0).then_some(secs);
        }
        Ok(())
    }

    /// Defaults, config file, environment, then these flags; validated
    pub fn resolve_config(&self) -> Result<CollectorConfig> {
        let config_file = match &self.config_file {
            Some(path) => Some(path.clone()),
            None => CollectorConfig::default_config_path()
                .ok()
                .filter(|path| path.exists()),
        };

        let mut config = CollectorConfig::load_layered(config_file.as_deref())?;
        self.apply_to(&mut config)?;
        config.validate()?;
        Ok(config)
    }
}

/// Arguments for the stations command
#[derive(Debug, Clone, Parser)]
pub struct StationsArgs {
    /// Snapshot to read
    #[arg(value_name = "SNAPSHOT")]
    pub snapshot: PathBuf,

    /// Snapshot backend, overriding the file extension
    #[arg(long = "format", value_enum, help = "Snapshot backend")]
    pub format: Option<SnapshotFormat>,

    /// Output format for the station listing
    #[arg(
        long = "output-format",
        value_enum,
        default_value = "human",
        help = "Output format for the station listing"
    )]
    pub output_format: OutputFormat,

    #[command(flatten)]
    pub verbosity: Verbosity,
}

/// Arguments for the empty-docks command
#[derive(Debug, Clone, Parser)]
pub struct EmptyDocksArgs {
    /// Snapshot to read
    #[arg(value_name = "SNAPSHOT")]
    pub snapshot: PathBuf,

    /// Snapshot backend, overriding the file extension
    #[arg(long = "format", value_enum, help = "Snapshot backend")]
    pub format: Option<SnapshotFormat>,

    /// First sample time
    #[arg(
        long = "start",
        value_name = "TIME",
        value_parser = parse_timestamp,
        help = "First sample time (RFC 3339 or 'YYYY-MM-DD HH:MM:SS', UTC)"
    )]
    pub start: Timestamp,

    /// Samples are taken strictly before this time
    #[arg(
        long = "end",
        value_name = "TIME",
        value_parser = parse_timestamp,
        help = "End of the sampling window, exclusive"
    )]
    pub end: Timestamp,

    /// Number of evenly spaced samples
    #[arg(
        short = 'n',
        long = "points",
        value_name = "COUNT",
        default_value_t = 100,
        help = "Number of evenly spaced samples"
    )]
    pub points: usize,

    /// Treat the feed's last refresh time as the end of every station's data
    #[arg(
        long = "use-feed-time",
        help = "Extend every station's data up to the feed's last refresh time"
    )]
    pub use_feed_time: bool,

    /// Export to a .parquet or .csv file instead of printing
    #[arg(
        short = 'o',
        long = "output",
        value_name = "FILE",
        help = "Write results to a .parquet or .csv file"
    )]
    pub output: Option<PathBuf>,

    #[arg(
        long = "output-format",
        value_enum,
        default_value = "human",
        help = "Output format when printing"
    )]
    pub output_format: OutputFormat,

    #[command(flatten)]
    pub verbosity: Verbosity,
}

impl EmptyDocksArgs {
    pub fn validate(&self) -> Result<()> {
        validate_window(self.start, self.end)?;
        if self.points == 0 {
            return Err(CollectorError::configuration(
                "Number of points must be greater than 0",
            ));
        }
        validate_output(self.output.as_deref())
    }
}

/// Arguments for the activity command
#[derive(Debug, Clone, Parser)]
pub struct ActivityArgs {
    /// Snapshot to read
    #[arg(value_name = "SNAPSHOT")]
    pub snapshot: PathBuf,

    /// Snapshot backend, overriding the file extension
    #[arg(long = "format", value_enum, help = "Snapshot backend")]
    pub format: Option<SnapshotFormat>,

    /// Start of the first bin
    #[arg(
        long = "start",
        value_name = "TIME",
        value_parser = parse_timestamp,
        help = "Start of the first bin (RFC 3339 or 'YYYY-MM-DD HH:MM:SS', UTC)"
    )]
    pub start: Timestamp,

    /// Bin edges stop strictly before this time
    #[arg(
        long = "end",
        value_name = "TIME",
        value_parser = parse_timestamp,
        help = "Bin edges are generated strictly before this time"
    )]
    pub end: Timestamp,

    /// Bin width in seconds
    #[arg(
        long = "step",
        value_name = "SECS",
        default_value_t = 3600,
        help = "Bin width in seconds"
    )]
    pub step: u64,

    /// Which count changes are accumulated
    #[arg(
        short = 'm',
        long = "mode",
        value_enum,
        default_value_t = ActivityMode::Both,
        help = "Activity measure: both, diff, increase or decrease"
    )]
    pub mode: ActivityMode,

    /// Export to a .parquet or .csv file instead of printing
    #[arg(
        short = 'o',
        long = "output",
        value_name = "FILE",
        help = "Write results to a .parquet or .csv file"
    )]
    pub output: Option<PathBuf>,

    #[arg(
        long = "output-format",
        value_enum,
        default_value = "human",
        help = "Output format when printing"
    )]
    pub output_format: OutputFormat,

    #[command(flatten)]
    pub verbosity: Verbosity,
}

impl ActivityArgs {
    pub fn validate(&self) -> Result<()> {
        validate_window(self.start, self.end)?;
        if self.step == 0 {
            return Err(CollectorError::configuration(
                "Bin width must be greater than 0 seconds",
            ));
        }
        validate_output(self.output.as_deref())
    }

    pub fn step(&self) -> Result<chrono::Duration> {
        i64::try_from(self.step)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .ok_or_else(|| {
                CollectorError::configuration(format!("Bin width {}s is too large", self.step))
            })
    }
}

fn validate_window(start: Timestamp, end: Timestamp) -> Result<()> {
    if start >= end {
        return Err(CollectorError::configuration(format!(
            "Start time {} must be before end time {}",
            start, end
        )));
    }
    Ok(())
}

fn validate_output(output: Option<&Path>) -> Result<()> {
    if let Some(parent) = output
        .and_then(Path::parent)
        .filter(|p| !p.as_os_str().is_empty())
    {
        if !parent.exists() {
            return Err(CollectorError::configuration(format!(
                "Output file directory does not exist: {}",
                parent.display()
            )));
        }
    }
    Ok(())
}

/// Parse a UTC time given as RFC 3339 or `YYYY-MM-DD HH:MM:SS`
pub fn parse_timestamp(value: &str) -> Result<Timestamp> {
    let value = value.trim();
    if let Ok(time) = DateTime::parse_from_rfc3339(value) {
        return Ok(time.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|_| {
            CollectorError::configuration(format!(
                "Invalid time '{}': expected RFC 3339 or 'YYYY-MM-DD HH:MM:SS'",
                value
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_timestamp_formats() {
        let plain = parse_timestamp("2013-06-01 08:30:00").unwrap();
        let rfc = parse_timestamp("2013-06-01T04:30:00-04:00").unwrap();
        assert_eq!(plain, rfc);
        assert_eq!(plain.timestamp(), 1_370_075_400);

        assert!(parse_timestamp("June 1st").is_err());
        assert!(parse_timestamp("2013-06-01").is_err());
    }

    #[test]
    fn test_log_level() {
        let mut verbosity = Verbosity::default();

        // Default level
        assert_eq!(verbosity.get_log_level(), "warn");
        assert!(verbosity.show_progress());

        verbosity.verbose = 1;
        assert_eq!(verbosity.get_log_level(), "info");
        assert!(!verbosity.show_progress());

        verbosity.verbose = 2;
        assert_eq!(verbosity.get_log_level(), "debug");

        verbosity.verbose = 3;
        assert_eq!(verbosity.get_log_level(), "trace");

        // Quiet mode
        verbosity.quiet = true;
        assert_eq!(verbosity.get_log_level(), "error");
        assert!(!verbosity.show_progress());
    }

    #[test]
    fn test_parse_collect_command() {
        let args = Args::try_parse_from([
            "bikeshare-collector",
            "collect",
            "--city",
            "toronto",
            "--interval",
            "30",
            "--snapshot",
            "toronto.db",
            "--verify-fetch",
            "-vv",
        ])
        .unwrap();

        let Some(Commands::Collect(collect)) = args.command else {
            panic!("expected collect command");
        };
        assert_eq!(collect.city.as_deref(), Some("toronto"));
        assert_eq!(collect.interval, Some(30));
        assert!(collect.verify_fetch);
        assert_eq!(collect.verbosity.verbose, 2);
    }

    #[test]
    fn test_city_and_url_conflict() {
        let result = Args::try_parse_from([
            "bikeshare-collector",
            "collect",
            "--city",
            "boston",
            "--url",
            "https://example.org/bikeStations.xml",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_collect_flags_override_config() {
        let args = CollectArgs {
            url: Some("https://example.org/bikeStations.xml".to_string()),
            interval: Some(60),
            snapshot: Some(PathBuf::from("data/bixi.json")),
            stale_after: Some(0),
            verify_fetch: true,
            ..Default::default()
        };
        let mut config = CollectorConfig {
            poll_interval_secs: 20,
            ..Default::default()
        };
        args.apply_to(&mut config).unwrap();

        assert_eq!(config.feed_url, "https://example.org/bikeStations.xml");
        assert_eq!(config.poll_interval_secs, 60);
        assert_eq!(config.snapshot_path, Some(PathBuf::from("data/bixi.json")));
        assert_eq!(config.stale_after_secs, None);
        assert!(config.verify_fetch);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_collect_validation() {
        let args = CollectArgs {
            city: Some("gotham".to_string()),
            ..Default::default()
        };
        assert!(args.validate().is_err());

        let temp_dir = TempDir::new().unwrap();
        let args = CollectArgs {
            config_file: Some(temp_dir.path().join("missing.json")),
            ..Default::default()
        };
        assert!(args.validate().is_err());

        let args = CollectArgs {
            city: Some("Montreal".to_string()),
            ..Default::default()
        };
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_parse_activity_command() {
        let args = Args::try_parse_from([
            "bikeshare-collector",
            "activity",
            "bixi.db",
            "--start",
            "2013-06-01 00:00:00",
            "--end",
            "2013-06-02 00:00:00",
            "--step",
            "900",
            "--mode",
            "increase",
        ])
        .unwrap();

        let Some(Commands::Activity(activity)) = args.command else {
            panic!("expected activity command");
        };
        assert_eq!(activity.mode, ActivityMode::Increase);
        assert_eq!(activity.step().unwrap(), chrono::Duration::minutes(15));
        assert!(activity.validate().is_ok());
    }

    #[test]
    fn test_report_window_validation() {
        let args = Args::try_parse_from([
            "bikeshare-collector",
            "empty-docks",
            "bixi.db",
            "--start",
            "2013-06-02 00:00:00",
            "--end",
            "2013-06-01 00:00:00",
        ])
        .unwrap();

        let Some(Commands::EmptyDocks(empty_docks)) = args.command else {
            panic!("expected empty-docks command");
        };
        assert_eq!(empty_docks.points, 100);
        assert!(empty_docks.validate().is_err());
    }
}
