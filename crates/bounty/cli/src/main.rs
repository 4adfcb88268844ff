//! bountyctl - operator tooling for the bounty custody ledger
//!
//! - `replay` runs a JSON script of ledger operations against an in-memory
//!   ledger and prints every outcome plus the resulting event journal
//! - `config` prints the effective configuration

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod script;

use config::LedgerConfig;
use script::Replayer;

/// Bounty ledger CLI
#[derive(Parser)]
#[command(name = "bountyctl")]
#[command(about = "Bounty custody ledger tooling", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "BOUNTY_CONFIG")]
    config: Option<String>,

    /// Log level
    #[arg(long, env = "BOUNTY_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "BOUNTY_LOG_JSON")]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Run a script of ledger operations against an in-memory ledger
    Replay {
        /// Path to a JSON array of operations
        script: PathBuf,

        /// Starting time of the replay clock (RFC 3339); defaults to now
        #[arg(long)]
        start: Option<DateTime<Utc>>,
    },

    /// Show the effective configuration
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = LedgerConfig::load(cli.config.as_deref())?;

    // Initialize tracing; logs go to stderr so stdout stays machine-readable
    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| level.into());

    if cli.json || config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    match cli.command {
        Commands::Replay { script, start } => {
            let ops = script::load_script(&script)?;
            tracing::info!(script = %script.display(), ops = ops.len(), "Replaying script");
            let replayer = Replayer::new(&config, start.unwrap_or_else(Utc::now))?;
            let report = replayer.run(ops)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
