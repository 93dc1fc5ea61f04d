//! Periodic detection and health runs.
//!
//! Each loop ticks on its configured interval and skips missed ticks, so a
//! slow run delays the next one instead of stacking runs. Overlap with runs
//! started elsewhere is handled by the engine's run markers.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use tandem_core::OverallStatus;
use tandem_sync::{ReconService, SyncError};

pub async fn detection_loop(service: Arc<ReconService>, mut stop: watch::Receiver<bool>) {
    let period = Duration::from_secs(service.config().schedule.detection_interval_secs);
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(interval_secs = period.as_secs(), "Detection schedule started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = stop.changed() => break,
        }

        match service.run_detection_cycle().await {
            Ok(report) => info!(
                total = report.summary.total,
                critical = report.summary.critical,
                auto_resolvable = report.summary.auto_resolvable,
                "Detection cycle finished"
            ),
            Err(SyncError::RunInProgress { run }) => {
                debug!(run = %run, "Detection cycle skipped, run in progress")
            }
            Err(e) => error!(error = %e, "Detection cycle failed"),
        }
    }

    info!("Detection schedule stopped");
}

pub async fn health_loop(service: Arc<ReconService>, mut stop: watch::Receiver<bool>) {
    let period = Duration::from_secs(service.config().schedule.health_interval_secs);
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(interval_secs = period.as_secs(), "Health schedule started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = stop.changed() => break,
        }

        match service.monitor_sync_health().await {
            Ok(report) if report.overall == OverallStatus::Healthy => {
                debug!(score = report.score, "Sync health ok")
            }
            Ok(report) => warn!(
                score = report.score,
                overall = ?report.overall,
                failing = ?report.failing(),
                recoveries = report.recoveries.len(),
                "Sync health degraded"
            ),
            Err(SyncError::RunInProgress { .. }) => debug!("Health run skipped, run in progress"),
            Err(e) => error!(error = %e, "Health monitoring failed"),
        }
    }

    info!("Health schedule stopped");
}
