use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use spool_tracker::Config;
use tracing_subscriber::{prelude::*, EnvFilter};

mod cmd_evaluate;
mod cmd_replay;

/// Track the filament consumed by Bambu Lab prints in Spoolman.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "spool-tracker")]
struct Cli {
    /// Config file to use
    #[arg(long, short, default_value = "spool-tracker.toml")]
    config: PathBuf,

    /// Default log level, `RUST_LOG` takes precedence.
    #[arg(long, default_value = "info", env = "SPOOL_TRACKER_LOG_LEVEL")]
    log_level: tracing::Level,

    /// Emit logs as JSON.
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the per layer filament usage of a 3MF project as JSON.
    Evaluate {
        /// The project archive.
        archive: PathBuf,

        /// Gcode file inside the archive, defaults to the first plate's.
        #[arg(long)]
        gcode_file: Option<String>,
    },

    /// Feed newline delimited printer reports through the tracker.
    Replay {
        /// File holding one JSON report per line.
        file: PathBuf,

        /// Log consumption instead of reporting it to Spoolman.
        #[arg(long)]
        dry_run: bool,
    },
}

async fn handle_signals() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt()).map_err(|e| {
            tracing::error!(error = format!("{:?}", e), "Failed to set up SIGINT handler");
            e
        })?;
        let mut sigterm = signal(SignalKind::terminate()).map_err(|e| {
            tracing::error!(error = format!("{:?}", e), "Failed to set up SIGTERM handler");
            e
        })?;

        tokio::select! {
            _ = sigint.recv() => {
                tracing::info!("received SIGINT");
            }
            _ = sigterm.recv() => {
                tracing::info!("received SIGTERM");
            }
        }
    }

    #[cfg(windows)]
    {
        tokio::signal::ctrl_c().await.map_err(|e| {
            tracing::error!(error = format!("{:?}", e), "Failed to set up Ctrl+C handler");
            anyhow::Error::new(e)
        })?;

        tracing::info!("received Ctrl+C (SIGINT)");
    }

    tracing::info!("exiting");
    std::process::exit(0);
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tokio::spawn(async { handle_signals().await });

    let filter = EnvFilter::builder()
        .with_default_directive(tracing_subscriber::filter::LevelFilter::from_level(cli.log_level).into())
        .from_env_lossy();

    // Initialize tracing.
    tracing_subscriber::registry()
        .with(filter)
        .with(cli.json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!cli.json).then(|| tracing_subscriber::fmt::layer()))
        .init();

    match cli.command {
        Commands::Evaluate {
            ref archive,
            ref gcode_file,
        } => cmd_evaluate::main(archive, gcode_file.as_deref()).await,
        Commands::Replay { ref file, dry_run } => {
            let cfg = Config::from_file(&cli.config)
                .map_err(|e| anyhow::anyhow!("failed to load config {}: {}", cli.config.display(), e))?;
            cmd_replay::main(&cfg, file, dry_run).await
        }
    }
}
