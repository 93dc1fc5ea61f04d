//! # Tandem Daemon
//!
//! Runs the reconciliation engine: lane workers drain the sync queue while
//! detection and health monitoring run on fixed intervals.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Tandem Daemon                                  │
//! │                                                                         │
//! │  config ──► ReconService ──► workers (compliance > high > normal)      │
//! │                  │                                                      │
//! │                  ├──► detection cycle   every detection_interval_secs  │
//! │                  └──► health monitor    every health_interval_secs     │
//! │                                                                         │
//! │  SIGINT / SIGTERM ──► stop schedule ──► stop workers ──► exit          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```text
//! tandemd [--config <path>]
//! ```

mod schedule;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use tandem_sync::{ReconConfig, ReconService};

const DEFAULT_LOG_FILTER: &str = "info,tandem=debug,sqlx=warn";

/// Keeps System B converging on System A.
#[derive(Debug, Parser)]
#[command(name = "tandemd", version)]
struct Args {
    /// TOML config file. Without it the platform config dir is searched.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "Starting Tandem daemon...");

    let config = ReconConfig::load(args.config).context("failed to load configuration")?;
    info!(
        source_db = %config.source_db.path.display(),
        mirror_db = %config.mirror_db.path.display(),
        redis = config.cache.redis_url.is_some(),
        workers = config.queue.workers,
        "Configuration loaded"
    );

    let service = Arc::new(
        ReconService::open(config)
            .await
            .context("failed to open reconciliation engine")?,
    );

    let requeued = service
        .requeue_interrupted_jobs()
        .await
        .context("failed to requeue interrupted jobs")?;
    if requeued > 0 {
        warn!(requeued, "Jobs from a previous run returned to the queue");
    }

    let workers = service.spawn_workers();
    info!(workers = workers.len(), "Lane workers started");

    let (stop_tx, stop_rx) = watch::channel(false);
    let detection = tokio::spawn(schedule::detection_loop(service.clone(), stop_rx.clone()));
    let health = tokio::spawn(schedule::health_loop(service.clone(), stop_rx));

    shutdown_signal().await;

    if stop_tx.send(true).is_err() {
        debug!("Schedule tasks already stopped");
    }
    for (name, task) in [("detection", detection), ("health", health)] {
        if let Err(e) = task.await {
            warn!(task = name, error = %e, "Schedule task ended abnormally");
        }
    }

    service.shutdown();
    for worker in workers {
        if let Err(e) = worker.await {
            warn!(error = %e, "Worker ended abnormally");
        }
    }

    info!("Shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");
}
