//! Pylon CLI - local driver for the recipe pipeline
//!
//! Writes configuration files and replays JSON scenarios against the in-memory ledger.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

/// Pylon: delayed-settlement recipes and stake-weighted fee distribution
#[derive(Parser)]
#[command(name = "pylon")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file path
    #[arg(short, long, global = true, env = "PYLON_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Output directory for config
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// Overwrite an existing config file
        #[arg(long, default_value_t = false)]
        force: bool,
    },

    /// Replay a scenario file against the in-memory ledger
    Simulate {
        /// Scenario file (JSON)
        #[arg(short, long)]
        scenario: PathBuf,

        /// Output format (json, human)
        #[arg(short, long, default_value = "human")]
        format: String,

        /// Write the hash-chained event log here (JSONL)
        #[arg(long)]
        events_out: Option<PathBuf>,
    },

    /// Verify the hash chain of an exported event log
    VerifyEvents {
        /// Event log file (JSONL)
        #[arg(short, long)]
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = commands::load_config(cli.config.clone())?;

    // Initialize logging
    let filter = if cli.verbose {
        "debug".to_string()
    } else {
        config.logging.level.clone()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.logging.include_targets)
        .init();

    match cli.command {
        Commands::Init { output, force } => commands::init::run(output, force),
        Commands::Simulate {
            scenario,
            format,
            events_out,
        } => commands::simulate::run(scenario, format, events_out, &config),
        Commands::VerifyEvents { file } => commands::verify_events::run(file),
    }
}
