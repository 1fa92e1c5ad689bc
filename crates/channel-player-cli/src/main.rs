//! Channel Player CLI - Headless Playback Driver
//!
//! Features:
//! - Scripted coordinator walkthrough (handoff, overlay, adaptive quality)
//! - Simulated playback with live progress
//! - Network classification lookup
//! - Quality tier ladder

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

/// Channel Player CLI - Playback coordination toolkit
#[derive(Parser)]
#[command(name = "channel-player")]
#[command(author = "MyChannel Developers")]
#[command(version)]
#[command(about = "Drive the playback coordinator against a simulated media backend", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    /// Output format (text, json, table)
    #[arg(short, long, default_value = "text")]
    format: String,

    /// Playback configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scripted session: play, resize, overlay, network and power changes, drag, close
    Demo,

    /// Play a simulated video and report progress
    Play {
        /// Source URL
        url: String,

        /// Simulated asset duration in seconds
        #[arg(short, long, default_value = "120")]
        duration: f64,

        /// Seconds to play before closing
        #[arg(short, long, default_value = "5")]
        seconds: u64,

        /// Presentation mode (embedded, mini-player, fullscreen)
        #[arg(short, long, default_value = "fullscreen")]
        mode: String,

        /// Persist resume positions to this file
        #[arg(long)]
        resume_file: Option<PathBuf>,

        /// Cap adaptive quality as in battery saving mode
        #[arg(long)]
        low_power: bool,
    },

    /// Classify a network sample and show the recommended tier
    Classify {
        /// Path status (satisfied, unsatisfied, requires-connection)
        #[arg(short, long, default_value = "satisfied")]
        status: String,

        /// Interface (wifi, cellular, wired, loopback, other)
        #[arg(short, long)]
        interface: Option<String>,

        /// Metered path
        #[arg(long)]
        expensive: bool,

        /// Low data mode
        #[arg(long)]
        constrained: bool,
    },

    /// Show the quality tier ladder
    Tiers,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    if cli.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    channel_player_core::init();

    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Demo => {
            commands::demo(config, &cli.format).await?;
        }
        Commands::Play { url, duration, seconds, mode, resume_file, low_power } => {
            commands::play(config, &url, duration, seconds, &mode, resume_file, low_power, &cli.format).await?;
        }
        Commands::Classify { status, interface, expensive, constrained } => {
            commands::classify(&status, interface.as_deref(), expensive, constrained, &cli.format)?;
        }
        Commands::Tiers => {
            commands::tiers(&cli.format)?;
        }
    }

    Ok(())
}
