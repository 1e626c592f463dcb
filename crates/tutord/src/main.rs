//! tutord - The tutoring-center scheduling service
//!
//! This is the main entry point for the tutord service.
//! It wires together all the components:
//! - Configuration loading
//! - Store initialization
//! - Core engine
//! - Periodic reminder sweep

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tutor_config::{Policy, load_config};
use tutor_core::TutorEngine;
use tutor_store::{AuditEvent, AuditEventType, SqliteStore, Store};
use tutor_util::{DATABASE_FILENAME, SystemClock, default_config_path, is_mock_time_active};

/// tutord - Course scheduling and enrollment service for a tutoring center
#[derive(Parser, Debug)]
#[command(name = "tutord")]
#[command(
    about = "Course scheduling and enrollment service for a tutoring center",
    long_about = None
)]
struct Args {
    /// Configuration file path (default: ~/.config/tutord/config.toml)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Data directory override (or set TUTOR_DATA_DIR env var)
    #[arg(short, long, env = "TUTOR_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Run a single sweep, print its report and exit
    #[arg(long)]
    once: bool,
}

/// Load the policy, falling back to defaults when no config file exists
fn load_policy(path: &Path) -> Result<Policy> {
    if !path.exists() {
        warn!(config_path = %path.display(), "No config file found, using defaults");
        return Ok(Policy::default());
    }

    let policy =
        load_config(path).with_context(|| format!("Failed to load config from {:?}", path))?;

    info!(
        config_path = %path.display(),
        sweep_interval_secs = policy.service.sweep_interval.as_secs(),
        cohorts = policy.schedule.iter().count(),
        "Configuration loaded"
    );

    Ok(policy)
}

/// Main service state
struct Service {
    engine: TutorEngine,
    store: Arc<dyn Store>,
    config_path: PathBuf,
}

impl Service {
    fn new(args: &Args) -> Result<Self> {
        let policy = load_policy(&args.config)?;

        let data_dir = args
            .data_dir
            .clone()
            .unwrap_or_else(|| policy.service.data_dir.clone());

        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory {:?}", data_dir))?;

        let db_path = data_dir.join(DATABASE_FILENAME);
        let store: Arc<dyn Store> = Arc::new(
            SqliteStore::open(&db_path)
                .with_context(|| format!("Failed to open database {:?}", db_path))?,
        );

        info!(db_path = %db_path.display(), "Store initialized");

        store.append_audit(AuditEvent::new(AuditEventType::ServiceStarted))?;

        if is_mock_time_active() {
            warn!("Mock time is active; sweep results reflect the shifted clock");
        }

        let engine = TutorEngine::new(policy, store.clone(), Arc::new(SystemClock));

        Ok(Self {
            engine,
            store,
            config_path: args.config.clone(),
        })
    }

    fn sweep_interval(&self) -> Duration {
        self.engine.policy().service.sweep_interval
    }

    fn sweep(&self) {
        if let Err(e) = self.engine.run_sweep() {
            error!(error = %e, "Sweep failed");
        }
    }

    /// Rebuild the engine from the config file; the old one stays on failure
    fn reload(&mut self) {
        match load_policy(&self.config_path) {
            Ok(policy) => {
                self.engine = TutorEngine::new(policy, self.store.clone(), Arc::new(SystemClock));
                info!("Configuration reloaded");
            }
            Err(e) => warn!(error = %e, "Failed to reload configuration, keeping current policy"),
        }
    }

    async fn run(mut self) -> Result<()> {
        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;
        let mut sighup =
            signal(SignalKind::hangup()).context("Failed to create SIGHUP handler")?;

        // First tick fires immediately so a restart sweeps right away
        let mut sweep_timer = tokio::time::interval(self.sweep_interval());

        info!(
            sweep_interval_secs = self.sweep_interval().as_secs(),
            "Service running"
        );

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully");
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully");
                    break;
                }

                // SIGHUP - reload configuration
                _ = sighup.recv() => {
                    info!("Received SIGHUP, reloading configuration");
                    let previous = self.sweep_interval();
                    self.reload();
                    if self.sweep_interval() != previous {
                        sweep_timer = tokio::time::interval(self.sweep_interval());
                        // Skip the immediate tick of the new interval
                        sweep_timer.tick().await;
                    }
                }

                _ = sweep_timer.tick() => {
                    self.sweep();
                }
            }
        }

        info!("Shutting down tutord");

        if let Err(e) = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::ServiceStopped))
        {
            warn!(error = %e, "Failed to log service shutdown");
        }

        info!("Shutdown complete");
        Ok(())
    }

    fn run_once(self) -> Result<()> {
        let report = self.engine.run_sweep().context("Sweep failed")?;
        println!("{}", serde_json::to_string_pretty(&report)?);

        if let Err(e) = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::ServiceStopped))
        {
            warn!(error = %e, "Failed to log service shutdown");
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "tutord starting");

    let service = Service::new(&args)?;
    if args.once {
        service.run_once()
    } else {
        service.run().await
    }
}
