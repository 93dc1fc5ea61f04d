//! # Sync Health Monitor
//!
//! Eight checks, a score, and best-effort auto-recovery for whatever fails.
//!
//! ## Check Table
//! ```text
//! ┌───────────────────────┬──────────────────────────────┬──────────────────────┐
//! │ check                 │ healthy when                 │ critical when        │
//! ├───────────────────────┼──────────────────────────────┼──────────────────────┤
//! │ sync_rate             │ success rate ≥ healthy pct   │ < critical pct       │
//! │ queue_backlog         │ pending jobs ≤ threshold     │ > 2 × threshold      │
//! │ failed_jobs           │ failed in window ≤ threshold │ > 2 × threshold      │
//! │ conflict_backlog      │ open ≤ threshold, 0 critical │ any critical         │
//! │ cache                 │ reachable, memory ≤ max pct  │ unreachable          │
//! │ store                 │ both reachable, ping ≤ max   │ unreachable          │
//! │ event_broadcast       │ broadcaster reachable        │ (never)              │
//! │ enforcement_integrity │ no partially_applied         │ (never)              │
//! │                       │ enforcement/compliance rows  │                      │
//! └───────────────────────┴──────────────────────────────┴──────────────────────┘
//! ```
//!
//! ## Recovery
//! ```text
//! sync_rate          clear failure counters, restart workers
//! queue_backlog      purge jobs older than max_job_age, restart workers
//! failed_jobs        restart workers
//! conflict_backlog   auto-resolution pass
//! cache              drop derived entries (summary, report, sync status);
//!                    counters and run markers are kept
//! store              reconnect both pools
//! event_broadcast    none (unresolved)
//! enforcement_integrity  none (unresolved, operator repairs System B)
//! ```
//!
//! The report keeps the check results as measured before recovery; the
//! recovery attempts are listed next to them.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use tandem_core::health::{evaluate_count, evaluate_rate, success_rate, CheckResult, RecoveryAttempt};
use tandem_core::{AlertKind, CheckName, CheckStatus, EnforcementStatus, HealthReport, OverallStatus, Severity};
use tandem_db::Database;

use crate::cache::{get_json, set_json, trailing_hours};
use crate::config::{HealthSettings, QueueSettings};
use crate::context::EngineContext;
use crate::error::{SyncError, SyncResult};
use crate::events::SyncEvent;
use crate::ledger::ConflictLedger;
use crate::resolver::ConflictResolver;
use crate::worker::WorkerControl;

const RUN_NAME: &str = "health";

pub struct HealthMonitor {
    ctx: EngineContext,
    ledger: Arc<ConflictLedger>,
    resolver: Arc<dyn ConflictResolver>,
    workers: WorkerControl,
    settings: HealthSettings,
    max_job_age: Duration,
    marker_ttl: Duration,
}

impl HealthMonitor {
    pub fn new(
        ctx: EngineContext,
        ledger: Arc<ConflictLedger>,
        resolver: Arc<dyn ConflictResolver>,
        workers: WorkerControl,
        settings: HealthSettings,
        queue: &QueueSettings,
        marker_ttl: Duration,
    ) -> Self {
        HealthMonitor {
            ctx,
            ledger,
            resolver,
            workers,
            settings,
            max_job_age: Duration::from_secs(queue.max_job_age_secs),
            marker_ttl,
        }
    }

    /// Evaluates every check, runs recovery for the failing ones, caches the
    /// report and escalates a critical overall status.
    pub async fn monitor(&self) -> SyncResult<HealthReport> {
        let guarded = match self.ctx.begin_run(RUN_NAME, self.marker_ttl).await {
            Ok(()) => true,
            Err(e @ SyncError::RunInProgress { .. }) => {
                info!("Health run skipped, previous run still in progress");
                return Err(e);
            }
            Err(e) => {
                warn!(error = %e, "Run marker unavailable, monitoring without it");
                false
            }
        };

        let mut report = self.evaluate().await;
        for check in report.failing() {
            report.recoveries.push(self.recover(check).await);
        }

        self.store_report(&report).await;

        if report.overall == OverallStatus::Critical {
            let failing: Vec<&str> = report.failing().iter().map(|c| c.as_str()).collect();
            self.ctx
                .raise_alert(
                    AlertKind::CriticalHealth,
                    Severity::Critical,
                    "Sync health critical",
                    &format!("score {}, failing: {}", report.score, failing.join(", ")),
                )
                .await;
        }

        self.ctx.publish(SyncEvent::HealthEvaluated {
            score: report.score,
            overall: report.overall,
        });

        if guarded {
            self.ctx.end_run(RUN_NAME).await;
        }

        if report.overall == OverallStatus::Healthy {
            info!(score = report.score, "Sync health evaluated");
        } else {
            warn!(
                score = report.score,
                overall = %report.overall,
                failing = report.failing().len(),
                recovered = report.recoveries.iter().filter(|r| r.success).count(),
                "Sync health degraded"
            );
        }
        Ok(report)
    }

    /// Runs the checks only. No recovery, no caching.
    pub async fn evaluate(&self) -> HealthReport {
        let mut checks = BTreeMap::new();
        checks.insert(CheckName::SyncRate, self.check_sync_rate().await);
        checks.insert(CheckName::QueueBacklog, self.check_queue_backlog().await);
        checks.insert(CheckName::FailedJobs, self.check_failed_jobs().await);
        checks.insert(CheckName::ConflictBacklog, self.check_conflict_backlog().await);
        checks.insert(CheckName::Cache, self.check_cache().await);
        checks.insert(CheckName::Store, self.check_stores().await);
        checks.insert(CheckName::EventBroadcast, self.check_event_broadcast());
        checks.insert(CheckName::EnforcementIntegrity, self.check_enforcement_integrity().await);

        for (name, check) in checks.iter().filter(|(_, c)| !c.status.is_healthy()) {
            debug!(check = %name, status = ?check.status, message = %check.message, "Health check failing");
        }
        HealthReport::from_checks(checks)
    }

    /// Latest cached report, or a fresh evaluation when none is cached.
    pub async fn latest(&self) -> HealthReport {
        let key = self.ctx.keys.health_report();
        let cached = self
            .ctx
            .deadlines
            .cache("cache.get_health_report", get_json::<HealthReport>(self.ctx.cache.as_ref(), &key))
            .await;
        match cached {
            Ok(Some(report)) => return report,
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Health report cache read failed"),
        }
        self.evaluate().await
    }

    async fn store_report(&self, report: &HealthReport) {
        let key = self.ctx.keys.health_report();
        let ttl = Duration::from_secs(self.settings.health_report_ttl_secs);
        if let Err(e) = self
            .ctx
            .deadlines
            .cache(
                "cache.set_health_report",
                set_json(self.ctx.cache.as_ref(), &key, report, Some(ttl)),
            )
            .await
        {
            warn!(error = %e, "Failed to cache health report");
        }
    }

    // =========================================================================
    // Checks
    // =========================================================================

    async fn read_counters(&self) -> SyncResult<(u64, u64)> {
        let ctx = &self.ctx;
        let (mut successes, mut failures) = (0u64, 0u64);
        for hour in trailing_hours(Utc::now(), self.settings.sync_rate_window_hours) {
            successes += self.read_counter(&ctx.keys.success_counter(hour)).await?;
            failures += self.read_counter(&ctx.keys.failure_counter(hour)).await?;
        }
        Ok((successes, failures))
    }

    async fn read_counter(&self, key: &str) -> SyncResult<u64> {
        let value = self
            .ctx
            .deadlines
            .cache("cache.get_counter", self.ctx.cache.get(key))
            .await?;
        Ok(value.and_then(|v| v.parse::<u64>().ok()).unwrap_or(0))
    }

    async fn check_sync_rate(&self) -> CheckResult {
        let (successes, failures) = match self.read_counters().await {
            Ok(counts) => counts,
            Err(e) => return CheckResult::new(CheckStatus::Unhealthy, format!("sync counters unavailable: {}", e)),
        };
        let rate = success_rate(successes, failures);
        let status = evaluate_rate(
            rate,
            self.settings.sync_rate_healthy_pct,
            self.settings.sync_rate_critical_pct,
        );
        CheckResult::new(
            status,
            format!(
                "{:.1}% success over {}h ({} ok, {} failed)",
                rate, self.settings.sync_rate_window_hours, successes, failures
            ),
        )
        .metric("success_rate_pct", rate)
        .metric("successes", successes as f64)
        .metric("failures", failures as f64)
    }

    async fn check_queue_backlog(&self) -> CheckResult {
        let ctx = &self.ctx;
        match ctx
            .deadlines
            .store("mirror.count_pending_jobs", ctx.mirror.jobs().count_pending())
            .await
        {
            Ok(pending) => {
                let pending = pending.max(0) as u64;
                let threshold = self.settings.queue_backlog_threshold;
                CheckResult::new(
                    evaluate_count(pending, threshold),
                    format!("{} pending jobs (threshold {})", pending, threshold),
                )
                .metric("pending", pending as f64)
            }
            Err(e) => CheckResult::new(CheckStatus::Unhealthy, format!("job queue unavailable: {}", e)),
        }
    }

    async fn check_failed_jobs(&self) -> CheckResult {
        let ctx = &self.ctx;
        let since = Utc::now() - chrono::Duration::seconds(self.settings.failed_jobs_window_secs as i64);
        match ctx
            .deadlines
            .store("mirror.count_failed_jobs", ctx.mirror.failed_jobs().count_since(since))
            .await
        {
            Ok(failed) => {
                let failed = failed.max(0) as u64;
                let threshold = self.settings.failed_jobs_threshold;
                CheckResult::new(
                    evaluate_count(failed, threshold),
                    format!(
                        "{} failed jobs in the last {}s (threshold {})",
                        failed, self.settings.failed_jobs_window_secs, threshold
                    ),
                )
                .metric("failed", failed as f64)
            }
            Err(e) => CheckResult::new(CheckStatus::Unhealthy, format!("failed-job ledger unavailable: {}", e)),
        }
    }

    async fn check_conflict_backlog(&self) -> CheckResult {
        let open = self.ledger.open_len().await;
        let critical = self.ledger.summary().await.critical;
        let threshold = self.settings.conflict_backlog_threshold;

        let status = if critical > 0 {
            CheckStatus::Critical
        } else if open > threshold {
            CheckStatus::Unhealthy
        } else {
            CheckStatus::Healthy
        };
        CheckResult::new(
            status,
            format!("{} unresolved conflicts, {} critical (threshold {})", open, critical, threshold),
        )
        .metric("unresolved", open as f64)
        .metric("critical", critical as f64)
    }

    async fn check_cache(&self) -> CheckResult {
        let ctx = &self.ctx;
        let latency = match ctx.deadlines.cache("cache.ping", ctx.cache.ping()).await {
            Ok(latency) => latency,
            Err(e) => return CheckResult::new(CheckStatus::Critical, format!("cache unreachable: {}", e)),
        };

        let usage = ctx
            .deadlines
            .cache("cache.memory_usage", ctx.cache.memory_usage_pct())
            .await
            .unwrap_or_else(|e| {
                debug!(error = %e, "Cache memory usage unavailable");
                None
            });

        let mut result = match usage {
            Some(pct) if pct > self.settings.cache_memory_max_pct => CheckResult::new(
                CheckStatus::Unhealthy,
                format!("cache memory at {:.1}% (max {:.1}%)", pct, self.settings.cache_memory_max_pct),
            ),
            Some(pct) => CheckResult::new(CheckStatus::Healthy, format!("cache memory at {:.1}%", pct)),
            None => CheckResult::new(CheckStatus::Healthy, "cache reachable"),
        }
        .metric("latency_ms", latency.as_secs_f64() * 1000.0);
        if let Some(pct) = usage {
            result = result.metric("memory_pct", pct);
        }
        result
    }

    async fn check_stores(&self) -> CheckResult {
        let max = Duration::from_millis(self.settings.store_latency_max_ms);
        let source = self.ping_store("source.ping", self.ctx.source.database()).await;
        let mirror = self.ping_store("mirror.ping", self.ctx.mirror.database()).await;

        match (source, mirror) {
            (Ok(a), Ok(b)) => {
                let slowest = a.max(b);
                let status = if slowest > max {
                    CheckStatus::Unhealthy
                } else {
                    CheckStatus::Healthy
                };
                CheckResult::new(
                    status,
                    format!("slowest round-trip {}ms (max {}ms)", slowest.as_millis(), max.as_millis()),
                )
                .metric("source_latency_ms", a.as_secs_f64() * 1000.0)
                .metric("mirror_latency_ms", b.as_secs_f64() * 1000.0)
            }
            (Err(e), _) => CheckResult::new(CheckStatus::Critical, format!("System A unreachable: {}", e)),
            (_, Err(e)) => CheckResult::new(CheckStatus::Critical, format!("System B unreachable: {}", e)),
        }
    }

    async fn ping_store(&self, operation: &str, db: &Database) -> SyncResult<Duration> {
        self.ctx.deadlines.store(operation, db.ping()).await
    }

    fn check_event_broadcast(&self) -> CheckResult {
        if self.ctx.events.is_reachable() {
            CheckResult::new(CheckStatus::Healthy, "event broadcaster reachable")
        } else {
            CheckResult::new(CheckStatus::Unhealthy, "event broadcaster unreachable")
        }
    }

    async fn check_enforcement_integrity(&self) -> CheckResult {
        let ctx = &self.ctx;
        let counted = async {
            let enforcement = ctx
                .deadlines
                .store(
                    "mirror.count_partial_enforcement",
                    ctx.mirror.enforcement().count_by_status(EnforcementStatus::PartiallyApplied),
                )
                .await?;
            let compliance = ctx
                .deadlines
                .store(
                    "mirror.count_partial_compliance",
                    ctx.mirror
                        .compliance_actions()
                        .count_by_status(EnforcementStatus::PartiallyApplied),
                )
                .await?;
            Ok::<_, SyncError>((enforcement, compliance))
        }
        .await;

        match counted {
            Ok((0, 0)) => CheckResult::new(CheckStatus::Healthy, "no partially applied enforcement")
                .metric("partial", 0.0)
                .metric("partial_compliance", 0.0),
            Ok((enforcement, compliance)) => CheckResult::new(
                CheckStatus::Unhealthy,
                format!(
                    "{} enforcement and {} compliance actions only applied in System A",
                    enforcement, compliance
                ),
            )
            .metric("partial", enforcement as f64)
            .metric("partial_compliance", compliance as f64),
            Err(e) => CheckResult::new(CheckStatus::Unhealthy, format!("enforcement audit unavailable: {}", e)),
        }
    }

    // =========================================================================
    // Recovery
    // =========================================================================

    async fn recover(&self, check: CheckName) -> RecoveryAttempt {
        let mut steps = Vec::new();
        let (action, result) = match check {
            CheckName::SyncRate => ("clear_failure_counters", self.clear_failure_counters(&mut steps).await),
            CheckName::QueueBacklog => ("purge_stuck_jobs", self.purge_stuck_jobs(&mut steps).await),
            CheckName::FailedJobs => {
                self.restart_workers(check, &mut steps);
                ("restart_workers", Ok(()))
            }
            CheckName::ConflictBacklog => ("auto_resolve", self.drain_conflicts(&mut steps).await),
            CheckName::Cache => ("flush_cache", self.flush_cache(&mut steps).await),
            CheckName::Store => ("reconnect_stores", self.reconnect_stores(&mut steps).await),
            CheckName::EventBroadcast | CheckName::EnforcementIntegrity => {
                steps.push("no automatic recovery".to_string());
                ("none", Err("requires operator action".to_string()))
            }
        };

        let attempt = RecoveryAttempt {
            check,
            action: action.to_string(),
            success: result.is_ok(),
            error: result.err(),
            steps,
        };
        if attempt.success {
            info!(check = %check, action = %attempt.action, steps = ?attempt.steps, "Recovery attempted");
        } else {
            error!(
                check = %check,
                action = %attempt.action,
                steps = ?attempt.steps,
                error = attempt.error.as_deref().unwrap_or(""),
                "Recovery unresolved"
            );
        }
        attempt
    }

    fn restart_workers(&self, check: CheckName, steps: &mut Vec<String>) {
        let generation = self.workers.restart(check.as_str());
        steps.push(format!("restarted workers (generation {})", generation));
    }

    async fn clear_failure_counters(&self, steps: &mut Vec<String>) -> Result<(), String> {
        let ctx = &self.ctx;
        let mut cleared = 0;
        for hour in trailing_hours(Utc::now(), self.settings.sync_rate_window_hours) {
            let key = ctx.keys.failure_counter(hour);
            match ctx.deadlines.cache("cache.delete_counter", ctx.cache.delete(&key)).await {
                Ok(true) => cleared += 1,
                Ok(false) => {}
                Err(e) => {
                    steps.push(format!("cleared {} failure counters before error", cleared));
                    return Err(e.to_string());
                }
            }
        }
        steps.push(format!("cleared {} failure counters", cleared));
        self.restart_workers(CheckName::SyncRate, steps);
        Ok(())
    }

    async fn purge_stuck_jobs(&self, steps: &mut Vec<String>) -> Result<(), String> {
        let ctx = &self.ctx;
        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.max_job_age).unwrap_or_else(|_| chrono::Duration::zero());
        let purged = ctx
            .deadlines
            .store("mirror.purge_stuck_jobs", ctx.mirror.jobs().purge_stuck(cutoff))
            .await
            .map_err(|e| e.to_string())?;
        steps.push(format!("purged {} jobs older than {}s", purged, self.max_job_age.as_secs()));
        self.restart_workers(CheckName::QueueBacklog, steps);
        Ok(())
    }

    async fn drain_conflicts(&self, steps: &mut Vec<String>) -> Result<(), String> {
        let results = self
            .resolver
            .auto_resolve_conflicts()
            .await
            .map_err(|e| e.to_string())?;
        let resolved = results.iter().filter(|r| r.success).count();
        steps.push(format!("resolved {} of {} pending conflicts", resolved, results.len()));
        Ok(())
    }

    /// Drops the entries that are rebuilt on the next run. Counters feed the
    /// sync-rate check and run markers guard in-flight runs, so both stay.
    async fn flush_cache(&self, steps: &mut Vec<String>) -> Result<(), String> {
        let ctx = &self.ctx;
        let mut dropped = 0u64;
        for key in [ctx.keys.conflict_summary(), ctx.keys.health_report()] {
            let deleted = ctx
                .deadlines
                .cache("cache.delete", ctx.cache.delete(&key))
                .await
                .map_err(|e| e.to_string())?;
            if deleted {
                dropped += 1;
            }
        }

        let prefix = ctx.keys.sync_status_prefix();
        dropped += ctx
            .deadlines
            .cache("cache.flush_prefix", ctx.cache.flush_prefix(&prefix))
            .await
            .map_err(|e| e.to_string())?;
        steps.push(format!("dropped {} derived cache entries", dropped));
        Ok(())
    }

    async fn reconnect_stores(&self, steps: &mut Vec<String>) -> Result<(), String> {
        let mut errors = Vec::new();
        for (name, db) in [("System A", self.ctx.source.database()), ("System B", self.ctx.mirror.database())] {
            match db.reconnect().await {
                Ok(true) => steps.push(format!("{} pool replaced", name)),
                Ok(false) => steps.push(format!("{} in memory, reconnect skipped", name)),
                Err(e) => errors.push(format!("{}: {}", name, e)),
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.join("; "))
        }
    }
}
