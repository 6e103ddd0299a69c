//! Headless host for the listmirror sync engine.
//!
//! Loads a TOML configuration, drains engine events into the log, and
//! runs a sync once or on the configured interval.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use listmirror_core::config::SyncSettings;
use listmirror_core::error::{SyncError, SyncResult};
use listmirror_core::events::{EventBus, LogLevel, SyncEvent};
use listmirror_core::run::SyncPhase;
use listmirror_engine::SyncEngine;

#[derive(Parser)]
#[command(name = "listmirror", about = "Mirror a SharePoint list into a relational database")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "listmirror.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a synchronization, once or on the configured interval.
    Sync {
        /// Run exactly once, ignoring any configured interval.
        #[arg(long)]
        once: bool,
    },
    /// Test the SharePoint and database connections.
    TestConnection,
}

fn load_settings(path: &PathBuf) -> SyncResult<SyncSettings> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| SyncError::config(format!("reading {}: {e}", path.display())))?;
    let settings: SyncSettings = toml::from_str(&raw)
        .map_err(|e| SyncError::config(format!("parsing {}: {e}", path.display())))?;
    settings.validate()?;
    Ok(settings)
}

/// Forward engine events into the log until the bus closes.
async fn drain_events(mut rx: mpsc::Receiver<SyncEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            SyncEvent::Progress {
                message,
                percent,
                level,
            } => log_line(level, &format!("[{percent:>3}%] {message}")),
            SyncEvent::Log { message, level } => log_line(level, &message),
            SyncEvent::Status { service, state } => {
                info!("{service}: {state:?}");
            }
            SyncEvent::Completed {
                success,
                message,
                stats,
            } => {
                if success {
                    info!(
                        records_processed = stats.records_processed,
                        records_inserted = stats.records_inserted,
                        duration_seconds = stats.duration_seconds,
                        "{message}"
                    );
                } else {
                    error!(
                        errors = stats.errors,
                        duration_seconds = stats.duration_seconds,
                        "{message}"
                    );
                }
            }
        }
    }
}

fn log_line(level: LogLevel, message: &str) {
    match level {
        LogLevel::Info | LogLevel::Success => info!("{message}"),
        LogLevel::Warning => warn!("{message}"),
        LogLevel::Error => error!("{message}"),
    }
}

/// Run one sync to its terminal phase.
async fn sync_once(engine: &SyncEngine, settings: SyncSettings) -> SyncResult<SyncPhase> {
    engine.start(settings).await?;
    match engine.wait().await {
        Some(run) => Ok(run.phase),
        None => Err(SyncError::internal("sync worker vanished")),
    }
}

async fn run_sync(engine: &SyncEngine, cli: &Cli, once: bool) -> SyncResult<ExitCode> {
    let settings = load_settings(&cli.config)?;
    let interval_secs = settings.sync_interval_secs.filter(|_| !once);

    let Some(interval_secs) = interval_secs else {
        let phase = sync_once(engine, settings).await?;
        return Ok(if phase == SyncPhase::Completed {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        });
    };

    info!("scheduler started, sync interval: {interval_secs}s");
    let mut timer = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));

    loop {
        tokio::select! {
            _ = timer.tick() => {
                match sync_once(engine, settings.clone()).await {
                    Ok(phase) => info!("scheduled sync finished: {phase}"),
                    Err(e) => error!("scheduled sync failed to start: {e}"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received, stopping");
                engine.stop().await;
                engine.wait().await;
                return Ok(ExitCode::SUCCESS);
            }
        }
    }
}

async fn run_test_connection(engine: &SyncEngine, cli: &Cli) -> SyncResult<ExitCode> {
    let settings = load_settings(&cli.config)?;
    let report = engine.test_connections(&settings).await;

    match &report.sharepoint {
        Ok(()) => info!("sharepoint: ok"),
        Err(e) => error!("sharepoint: {e}"),
    }
    match &report.database {
        Ok(()) => info!("database: ok"),
        Err(e) => error!("database: {e}"),
    }

    Ok(if report.all_connected() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let (events, rx) = EventBus::channel(EventBus::DEFAULT_CAPACITY);
    let drain = tokio::spawn(drain_events(rx));
    let engine = SyncEngine::new(events);

    let outcome = match cli.command {
        Command::Sync { once } => run_sync(&engine, &cli, once).await,
        Command::TestConnection => run_test_connection(&engine, &cli).await,
    };

    // Dropping the engine closes the bus, letting the drain task finish.
    drop(engine);
    let _ = drain.await;

    match outcome {
        Ok(code) => code,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
