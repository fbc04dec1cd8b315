use bikeshare_collector::cli::{args::Args, commands};
use clap::Parser;
use colored::*;
use std::process;
use tokio_util::sync::CancellationToken;

fn main() {
    let args = Args::parse();

    // If no subcommand was provided, show help and available commands
    let Some(command) = args.command else {
        show_help_and_commands();
        process::exit(0);
    };

    // One writer, one thread: every command runs on a current-thread runtime
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap_or_else(|e| {
            eprintln!("Failed to create async runtime: {}", e);
            process::exit(1);
        });

    let result = runtime.block_on(async {
        let cancellation_token = CancellationToken::new();

        // Ctrl+C only requests shutdown; the command finishes its own cleanup
        let signal_token = cancellation_token.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    eprintln!("\nReceived CTRL+C, shutting down gracefully...");
                    signal_token.cancel();
                }
                Err(e) => eprintln!("Failed to install CTRL+C signal handler: {}", e),
            }
        });

        commands::run(command, cancellation_token).await
    });

    match result {
        Ok(()) => process::exit(0),
        Err(error) => {
            eprintln!("{} {:#}", "Error:".bright_red().bold(), error);
            process::exit(1);
        }
    }
}

/// Show help information and available commands when no subcommand is provided
fn show_help_and_commands() {
    println!("Bike-share Collector - station availability recorder");
    println!("=====================================================");
    println!();
    println!("Poll a public bike-share station feed, record every change in bike");
    println!("counts and analyse city-wide empty docks and activity over time.");
    println!();
    println!("USAGE:");
    println!("    bikeshare-collector <COMMAND> [OPTIONS]");
    println!();
    println!("COMMANDS:");
    println!("    collect       Poll a station feed until interrupted");
    println!("    stations      List the stations stored in a snapshot");
    println!("    empty-docks   City-wide empty docks on a regular time grid");
    println!("    activity      City-wide bike activity binned over time");
    println!("    help          Show this help message or help for specific commands");
    println!();
    println!("OPTIONS:");
    println!("    -h, --help       Show help information");
    println!("    -V, --version    Show version information");
    println!();
    println!("EXAMPLES:");
    println!("    # Record Montreal's stations every 10 seconds into an SQLite snapshot:");
    println!("    bikeshare-collector collect --city montreal --snapshot bixi.db");
    println!();
    println!("    # Empty docks through one day, 96 samples:");
    println!("    bikeshare-collector empty-docks bixi.db \\");
    println!("        --start '2013-06-01 00:00:00' --end '2013-06-02 00:00:00' --points 96");
    println!();
    println!("    # Hourly pick-ups exported to Parquet:");
    println!("    bikeshare-collector activity bixi.db --start '2013-06-01 00:00:00' \\");
    println!("        --end '2013-06-02 00:00:00' --mode decrease --output pickups.parquet");
    println!();
    println!("For detailed help on any command, use:");
    println!("    bikeshare-collector <COMMAND> --help");
}
