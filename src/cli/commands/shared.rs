//! Shared components for CLI commands
//!
//! Logging setup, progress spinners and the small formatting helpers used by
//! more than one command.

use crate::aggregate::StationFailure;
use crate::cli::args::Verbosity;
use crate::models::Timestamp;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tracing::debug;

/// Set up structured logging for a command
///
/// `RUST_LOG` takes precedence over the verbosity flags when set.
pub fn setup_logging(verbosity: &Verbosity) {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let log_level = verbosity.get_log_level();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("bikeshare_collector={}", log_level)));

    if verbosity.quiet {
        // Minimal logging for quiet mode
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_level(true)
                    .with_writer(std::io::stderr)
                    .compact(),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_level(true)
                    .with_timer(fmt::time::uptime())
                    .with_writer(std::io::stderr),
            )
            .init();
    }

    debug!("Logging initialized at level: {}", log_level);
}

/// Spinner ticking on its own while a long-running command works
pub fn create_spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner()
        .template("{spinner:.green} [{elapsed_precise}] {msg}")
    {
        spinner.set_style(style.tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ "));
    }
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner
}

/// Format a duration as `1h 02m 03s`, `2m 03s` or `3.4s`
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {:02}s", minutes, seconds)
    } else {
        format!("{:.1}s", duration.as_secs_f64())
    }
}

pub fn format_time(time: Timestamp) -> String {
    time.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Print stations left out of an aggregate to stderr
pub fn report_failures(failures: &[StationFailure], shown: usize) {
    if failures.is_empty() {
        return;
    }
    eprintln!(
        "{} {} station(s) excluded from the aggregate",
        "⚠".bright_yellow(),
        failures.len().to_string().bright_yellow().bold()
    );
    for failure in failures.iter().take(shown) {
        eprintln!(
            "   • {} {}",
            format!("station {}:", failure.station_id).bright_black(),
            failure.error
        );
    }
    if failures.len() > shown {
        eprintln!("   • ... and {} more (use -v for all)", failures.len() - shown);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::timestamp_from_millis;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(3_400)), "3.4s");
        assert_eq!(format_duration(Duration::from_secs(123)), "2m 03s");
        assert_eq!(format_duration(Duration::from_secs(3_723)), "1h 02m 03s");
    }

    #[test]
    fn test_format_time() {
        let time = timestamp_from_millis(1_370_075_400_000).unwrap();
        assert_eq!(format_time(time), "2013-06-01 08:30:00");
    }
}
