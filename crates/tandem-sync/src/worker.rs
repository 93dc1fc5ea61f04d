//! # Lane Workers
//!
//! Drain the System B job queue through the propagator.
//!
//! ## Worker Loop
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Worker (× queue.workers)                        │
//! │                                                                         │
//! │   claim_next ──► none ──► sleep(poll_interval) ─┐                       │
//! │       │                   (woken by restart /   │                       │
//! │       │                    shutdown signals)    │                       │
//! │       ▼                                         │                       │
//! │   key task by job id (if it has no dedup id)    │                       │
//! │       │                                         │                       │
//! │   run_task ──► Ok ─────────────► complete       │                       │
//! │       │                                         │                       │
//! │       ├──► transient, attempts < max ──► reschedule(now + backoff)      │
//! │       │                                                                 │
//! │       └──► anything else ──────────────► fail + failed_sync_jobs row    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Lanes are not separate workers: every claim takes the highest-priority
//! available job, so compliance work never waits behind bulk stock syncs.
//!
//! Retries follow an [`ExponentialBackoff`] schedule: `initial_backoff_ms`,
//! doubling per attempt up to `max_backoff_secs`, with optional jitter.

use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::QueueSettings;
use crate::context::EngineContext;
use crate::error::SyncResult;
use crate::propagator::Propagator;

/// Retry schedule for queued jobs. Never gives up on its own; the attempt
/// limit lives in [`QueueSettings::max_attempts`].
fn create_backoff(settings: &QueueSettings) -> ExponentialBackoff {
    let initial = Duration::from_millis(settings.initial_backoff_ms);
    ExponentialBackoff {
        initial_interval: initial,
        current_interval: initial,
        max_interval: Duration::from_secs(settings.max_backoff_secs),
        multiplier: 2.0,
        randomization_factor: settings.backoff_randomization,
        max_elapsed_time: None,
        ..Default::default()
    }
}

/// Delay before retry number `attempt` (1-based).
pub fn backoff_delay(settings: &QueueSettings, attempt: i64) -> Duration {
    let mut backoff = create_backoff(settings);
    for _ in 1..attempt {
        // past the cap every step is the same
        if backoff.current_interval >= backoff.max_interval {
            break;
        }
        backoff.next_backoff();
    }
    backoff.next_backoff().unwrap_or(backoff.max_interval)
}

// =============================================================================
// Control
// =============================================================================

/// Restart and shutdown signals shared by every worker.
#[derive(Clone)]
pub struct WorkerControl {
    restart_tx: Arc<watch::Sender<u64>>,
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl WorkerControl {
    pub fn new() -> Self {
        let (restart_tx, _) = watch::channel(0);
        let (shutdown_tx, _) = watch::channel(false);
        WorkerControl {
            restart_tx: Arc::new(restart_tx),
            shutdown_tx: Arc::new(shutdown_tx),
        }
    }

    /// Signals every worker to drop its idle wait and start over with a
    /// fresh loop. Returns the new restart generation.
    pub fn restart(&self, reason: &str) -> u64 {
        self.restart_tx.send_modify(|generation| *generation += 1);
        let generation = *self.restart_tx.borrow();
        info!(generation, reason = %reason, "Worker restart requested");
        generation
    }

    pub fn generation(&self) -> u64 {
        *self.restart_tx.borrow()
    }

    /// Stops every worker after its current job.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    fn subscribe(&self) -> (watch::Receiver<u64>, watch::Receiver<bool>) {
        (self.restart_tx.subscribe(), self.shutdown_tx.subscribe())
    }
}

impl Default for WorkerControl {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Pool
// =============================================================================

/// What one claim attempt did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Nothing was available.
    Idle,
    Completed { job_id: String },
    Rescheduled { job_id: String, attempt: i64, delay: Duration },
    Failed { job_id: String, error: String },
}

pub struct WorkerPool {
    ctx: EngineContext,
    propagator: Arc<Propagator>,
    settings: QueueSettings,
    control: WorkerControl,
}

impl WorkerPool {
    pub fn new(
        ctx: EngineContext,
        propagator: Arc<Propagator>,
        settings: QueueSettings,
        control: WorkerControl,
    ) -> Self {
        WorkerPool {
            ctx,
            propagator,
            settings,
            control,
        }
    }

    pub fn control(&self) -> WorkerControl {
        self.control.clone()
    }

    /// Spawns `queue.workers` worker tasks.
    pub fn spawn(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        info!(workers = self.settings.workers, "Starting sync workers");
        (0..self.settings.workers)
            .map(|worker_id| tokio::spawn(Arc::clone(self).run_worker(worker_id)))
            .collect()
    }

    /// Claims and executes at most one job.
    pub async fn process_next(&self) -> SyncResult<JobOutcome> {
        let ctx = &self.ctx;
        let jobs = ctx.mirror.jobs();
        let now = Utc::now();

        let Some(job) = ctx
            .deadlines
            .store("mirror.claim_job", jobs.claim_next(now))
            .await?
        else {
            return Ok(JobOutcome::Idle);
        };

        let task = match job.task() {
            Ok(task) => task,
            Err(e) => {
                let error = format!("undecodable payload: {}", e);
                warn!(job_id = %job.id, lane = %job.lane, error = %error, "Failing job");
                ctx.deadlines
                    .store("mirror.fail_job", jobs.fail(&job, &error))
                    .await?;
                return Ok(JobOutcome::Failed { job_id: job.id, error });
            }
        };

        if !task.is_replay_safe() {
            debug!(job_id = %job.id, task = task.kind(), "Keying additive task by job id");
        }
        // A retry of the same job reuses the key, so the delta lands once.
        let task = task.with_dedup_id_from(|| job.id.clone());

        debug!(
            job_id = %job.id,
            lane = %job.lane,
            task = task.kind(),
            entity = %task.entity_key(),
            attempt = job.attempts,
            "Running sync job"
        );

        match self.propagator.run_task(&task).await {
            Ok(()) => {
                ctx.deadlines
                    .store("mirror.complete_job", jobs.complete(&job.id))
                    .await?;
                Ok(JobOutcome::Completed { job_id: job.id })
            }
            Err(e) if e.is_retryable() && job.attempts < self.settings.max_attempts => {
                let delay = backoff_delay(&self.settings, job.attempts);
                let available_at = Utc::now()
                    + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
                debug!(
                    job_id = %job.id,
                    attempt = job.attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Rescheduling sync job"
                );
                ctx.deadlines
                    .store(
                        "mirror.reschedule_job",
                        jobs.reschedule(&job.id, &e.to_string(), available_at),
                    )
                    .await?;
                Ok(JobOutcome::Rescheduled {
                    job_id: job.id,
                    attempt: job.attempts,
                    delay,
                })
            }
            Err(e) => {
                let error = e.to_string();
                warn!(
                    job_id = %job.id,
                    lane = %job.lane,
                    task = task.kind(),
                    entity = %task.entity_key(),
                    attempts = job.attempts,
                    kind = ?e.kind(),
                    error = %error,
                    "Sync job failed"
                );
                ctx.deadlines
                    .store("mirror.fail_job", jobs.fail(&job, &error))
                    .await?;
                Ok(JobOutcome::Failed { job_id: job.id, error })
            }
        }
    }

    async fn run_worker(self: Arc<Self>, worker_id: usize) {
        let (mut restart_rx, mut shutdown_rx) = self.control.subscribe();
        let poll = Duration::from_millis(self.settings.poll_interval_ms);
        info!(worker_id, "Sync worker started");

        loop {
            if *shutdown_rx.borrow() {
                break;
            }
            if restart_rx.has_changed().unwrap_or(false) {
                let generation = *restart_rx.borrow_and_update();
                info!(worker_id, generation, "Sync worker restarted");
            }

            let idle = match self.process_next().await {
                Ok(JobOutcome::Idle) => true,
                Ok(_) => false,
                Err(e) => {
                    error!(worker_id, error = %e, "Job queue unavailable");
                    true
                }
            };
            if !idle {
                continue;
            }

            tokio::select! {
                _ = tokio::time::sleep(poll) => {}
                changed = restart_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let generation = *restart_rx.borrow_and_update();
                    info!(worker_id, generation, "Sync worker restarted");
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!(worker_id, "Sync worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tandem_core::{JobStatus, Severity, SourceAgent, SyncLane, SyncTask};
    use tandem_db::{MirrorDatabase, SourceDatabase};

    use crate::enforcement::EnforcementTrigger;

    async fn pool_with(ctx: EngineContext, propagator_ctx: EngineContext) -> WorkerPool {
        let enforcement = Arc::new(EnforcementTrigger::new(propagator_ctx.clone()));
        let propagator = Arc::new(Propagator::new(
            propagator_ctx,
            enforcement,
            Duration::from_secs(900),
            24,
        ));
        WorkerPool::new(ctx, propagator, QueueSettings::default(), WorkerControl::new())
    }

    async fn context() -> EngineContext {
        let source = SourceDatabase::in_memory().await.unwrap();
        let mirror = MirrorDatabase::in_memory().await.unwrap();
        EngineContext::with_defaults(source, mirror)
    }

    async fn seed_agent(ctx: &EngineContext, id: i64) {
        ctx.source
            .agents()
            .upsert(&SourceAgent {
                id,
                name: "Emeka".into(),
                location: "Coast Road".into(),
                status: "active".into(),
                rating: 3.9,
                compliance_score: 75,
                allocation_restricted: false,
                updated_at: Utc::now(),
            })
            .await
            .unwrap();
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let settings = QueueSettings {
            initial_backoff_ms: 500,
            max_backoff_secs: 60,
            backoff_randomization: 0.0,
            ..Default::default()
        };
        assert_eq!(backoff_delay(&settings, 1), Duration::from_millis(500));
        assert_eq!(backoff_delay(&settings, 2), Duration::from_millis(1_000));
        assert_eq!(backoff_delay(&settings, 4), Duration::from_millis(4_000));
        assert_eq!(backoff_delay(&settings, 9), Duration::from_secs(60));
        assert_eq!(backoff_delay(&settings, 500), Duration::from_secs(60));
        assert_eq!(backoff_delay(&settings, 0), Duration::from_millis(500));
    }

    #[test]
    fn test_backoff_jitter_stays_in_band() {
        let settings = QueueSettings {
            initial_backoff_ms: 1_000,
            max_backoff_secs: 60,
            backoff_randomization: 0.5,
            ..Default::default()
        };
        for _ in 0..20 {
            let delay = backoff_delay(&settings, 3);
            assert!(delay >= Duration::from_millis(2_000), "{:?}", delay);
            assert!(delay <= Duration::from_millis(6_001), "{:?}", delay);
        }
    }

    #[tokio::test]
    async fn test_compliance_lane_first() {
        let ctx = context().await;
        seed_agent(&ctx, 1).await;
        let pool = pool_with(ctx.clone(), ctx.clone()).await;
        let jobs = ctx.mirror.jobs();

        let bulk = jobs
            .enqueue(
                SyncLane::Normal,
                &SyncTask::StockAllocation {
                    agent_id: 1,
                    sku: "X1".into(),
                    quantity: 5,
                    allocation_id: None,
                },
            )
            .await
            .unwrap();
        let compliance = jobs
            .enqueue(
                SyncLane::Compliance,
                &SyncTask::ComplianceAction {
                    agent_id: 1,
                    action_type: "warning".into(),
                    severity: Severity::Low,
                    reason: "late delivery".into(),
                    action_id: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(
            pool.process_next().await.unwrap(),
            JobOutcome::Completed { job_id: compliance.id }
        );
        assert_eq!(
            pool.process_next().await.unwrap(),
            JobOutcome::Completed { job_id: bulk.id }
        );
        assert_eq!(pool.process_next().await.unwrap(), JobOutcome::Idle);
    }

    #[tokio::test]
    async fn test_structural_failure_not_retried() {
        let ctx = context().await;
        let pool = pool_with(ctx.clone(), ctx.clone()).await;
        let job = ctx
            .mirror
            .jobs()
            .enqueue(SyncLane::High, &SyncTask::Agent { agent_id: 404 })
            .await
            .unwrap();

        let outcome = pool.process_next().await.unwrap();
        assert!(matches!(outcome, JobOutcome::Failed { ref job_id, .. } if *job_id == job.id));

        let stored = ctx.mirror.jobs().get(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        let failed_jobs = ctx.mirror.failed_jobs();
        let failed = failed_jobs.count_since(Utc::now() - chrono::Duration::hours(1));
        assert_eq!(failed.await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_timeout_rescheduled_with_backoff() {
        let ctx = context().await;
        seed_agent(&ctx, 2).await;

        let mut slow = ctx.clone();
        slow.deadlines.store = Duration::ZERO;
        let pool = pool_with(ctx.clone(), slow).await;

        let job = ctx
            .mirror
            .jobs()
            .enqueue(SyncLane::High, &SyncTask::Agent { agent_id: 2 })
            .await
            .unwrap();

        match pool.process_next().await.unwrap() {
            JobOutcome::Rescheduled { job_id, attempt, delay } => {
                assert_eq!(job_id, job.id);
                assert_eq!(attempt, 1);
                assert_eq!(delay, Duration::from_millis(500));
            }
            other => panic!("expected reschedule, got {:?}", other),
        }

        let stored = ctx.mirror.jobs().get(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Pending);
        assert!(stored.available_at > Utc::now());
        // Not claimable until the backoff elapses.
        assert_eq!(pool.process_next().await.unwrap(), JobOutcome::Idle);
    }

    #[tokio::test]
    async fn test_replayed_job_without_dedup_id_applies_once() {
        let ctx = context().await;
        seed_agent(&ctx, 3).await;
        let pool = pool_with(ctx.clone(), ctx.clone()).await;
        let jobs = ctx.mirror.jobs();

        let job = jobs
            .enqueue(
                SyncLane::Normal,
                &SyncTask::StockAllocation {
                    agent_id: 3,
                    sku: "X1".into(),
                    quantity: 12,
                    allocation_id: None,
                },
            )
            .await
            .unwrap();
        let compliance = jobs
            .enqueue(
                SyncLane::Compliance,
                &SyncTask::ComplianceAction {
                    agent_id: 3,
                    action_type: "warning".into(),
                    severity: Severity::Low,
                    reason: "late delivery".into(),
                    action_id: None,
                },
            )
            .await
            .unwrap();

        let due = || Utc::now() - chrono::Duration::seconds(1);
        for _ in 0..2 {
            assert!(matches!(pool.process_next().await.unwrap(), JobOutcome::Completed { .. }));
        }
        assert!(ctx.mirror.applied_allocations().contains(&job.id).await.unwrap());
        assert!(ctx.mirror.compliance_actions().get(&compliance.id).await.unwrap().is_some());

        // A worker that applied the task but died before completing it
        // leaves both jobs to run again.
        for id in [&job.id, &compliance.id] {
            sqlx::query("UPDATE sync_jobs SET status = 'pending', available_at = ?2 WHERE id = ?1")
                .bind(id)
                .bind(due())
                .execute(&ctx.mirror.database().pool())
                .await
                .unwrap();
        }
        for _ in 0..2 {
            assert!(matches!(pool.process_next().await.unwrap(), JobOutcome::Completed { .. }));
        }

        let mirror = ctx.mirror.agents().get_by_external_id(3).await.unwrap().unwrap();
        let bin = ctx.mirror.bins().find(mirror.id, "X1").await.unwrap().unwrap();
        assert_eq!(bin.current_stock, 12);
        // warning at low severity costs 5 points once
        assert_eq!(ctx.source.agents().get(3).await.unwrap().unwrap().compliance_score, 70);
        assert_eq!(mirror.compliance_score, 70);
    }

    #[tokio::test]
    async fn test_undecodable_payload_fails() {
        let ctx = context().await;
        let pool = pool_with(ctx.clone(), ctx.clone()).await;
        let job = ctx
            .mirror
            .jobs()
            .enqueue(SyncLane::Normal, &SyncTask::Agent { agent_id: 1 })
            .await
            .unwrap();
        sqlx::query("UPDATE sync_jobs SET payload = '{\"kind\":' WHERE id = ?1")
            .bind(&job.id)
            .execute(&ctx.mirror.database().pool())
            .await
            .unwrap();

        let outcome = pool.process_next().await.unwrap();
        assert!(matches!(outcome, JobOutcome::Failed { ref error, .. } if error.starts_with("undecodable")));
    }

    #[tokio::test]
    async fn test_workers_stop_on_shutdown() {
        let ctx = context().await;
        let pool = Arc::new(pool_with(ctx.clone(), ctx).await);
        let control = pool.control();

        let handles = pool.spawn();
        assert_eq!(handles.len(), QueueSettings::default().workers);
        assert_eq!(control.restart("test"), 1);

        control.shutdown();
        for handle in handles {
            tokio::time::timeout(Duration::from_secs(5), handle)
                .await
                .unwrap()
                .unwrap();
        }
    }
}
