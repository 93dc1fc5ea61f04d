//! # Reconciliation Service
//!
//! The public surface of the engine. Owns every component and wires them to
//! one [`EngineContext`].
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          ReconService                                   │
//! │                                                                         │
//! │  sync_* ─────────────► Propagator ───► EnforcementTrigger               │
//! │  trigger_enforcement ────────────────► EnforcementTrigger               │
//! │  enqueue_sync ───────► sync_jobs ────► WorkerPool ───► Propagator       │
//! │  detect_all_conflicts ► ConflictDetector ──► ConflictLedger             │
//! │  auto_resolve_conflicts ► ConflictResolver ─┘                           │
//! │  monitor_sync_health ─► HealthMonitor ──► resolver / workers / stores   │
//! │  get_dashboard_data ──► cached report + summary + queue + audit + alerts│
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use tandem_core::conflict::LedgerEntry;
use tandem_core::validation::validate_reason;
use tandem_core::{
    Alert, ConflictSummary, EnforcementAction, EnforcementActionType, HealthReport, LaneDepth,
    Severity, SyncJob, SyncLane, SyncTask,
};
use tandem_db::{MirrorDatabase, SourceDatabase};

use crate::cache::{get_json, CacheClient, CacheKeys, MemoryCache, RedisCache};
use crate::catalog::SourceCatalog;
use crate::config::ReconConfig;
use crate::context::EngineContext;
use crate::deadline::Deadlines;
use crate::detector::{ConflictDetector, DetectionReport};
use crate::enforcement::{EnforcementOutcome, EnforcementTrigger};
use crate::error::{SyncError, SyncResult};
use crate::events::{BroadcastEvents, SyncEvent};
use crate::health::HealthMonitor;
use crate::ledger::ConflictLedger;
use crate::notifier::TracingNotifier;
use crate::propagator::{AgentSyncOutcome, ComplianceSyncOutcome, Propagator, StockSyncOutcome};
use crate::resolver::{ConflictResolver, DefaultConflictResolver, ResolutionResult};
use crate::worker::{JobOutcome, WorkerControl, WorkerPool};

const RECENT_ENFORCEMENT_LIMIT: u32 = 20;
const OPEN_ALERT_LIMIT: u32 = 50;

/// Everything an operator dashboard shows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardData {
    pub health: HealthReport,
    pub conflicts: ConflictSummary,
    pub queue: Vec<LaneDepth>,
    pub recent_enforcement: Vec<EnforcementAction>,
    pub open_alerts: Vec<Alert>,
    pub generated_at: DateTime<Utc>,
}

pub struct ReconService {
    ctx: EngineContext,
    config: ReconConfig,
    ledger: Arc<ConflictLedger>,
    propagator: Arc<Propagator>,
    enforcement: Arc<EnforcementTrigger>,
    detector: ConflictDetector,
    resolver: Arc<dyn ConflictResolver>,
    monitor: HealthMonitor,
    workers: Arc<WorkerPool>,
    feed: Option<Arc<BroadcastEvents>>,
}

impl ReconService {
    /// Opens both stores and the configured cache.
    pub async fn open(config: ReconConfig) -> SyncResult<Self> {
        config.validate()?;

        let source = SourceDatabase::open(config.source_db.to_db_config()).await?;
        let mirror = MirrorDatabase::open(config.mirror_db.to_db_config()).await?;

        let cache: Arc<dyn CacheClient> = match config.cache.redis_url.as_deref() {
            Some(url) => Arc::new(RedisCache::connect(url).await?),
            None => {
                info!(capacity = config.cache.memory_capacity, "No Redis URL configured, using in-process cache");
                Arc::new(MemoryCache::new(config.cache.memory_capacity))
            }
        };

        Self::assemble(source, mirror, cache, config)
    }

    /// Engine over in-memory stores and cache.
    pub async fn in_memory(config: ReconConfig) -> SyncResult<Self> {
        config.validate()?;
        let source = SourceDatabase::in_memory().await?;
        let mirror = MirrorDatabase::in_memory().await?;
        let cache = Arc::new(MemoryCache::new(config.cache.memory_capacity));
        Self::assemble(source, mirror, cache, config)
    }

    fn assemble(
        source: SourceDatabase,
        mirror: MirrorDatabase,
        cache: Arc<dyn CacheClient>,
        config: ReconConfig,
    ) -> SyncResult<Self> {
        let feed = Arc::new(BroadcastEvents::new());
        let ctx = EngineContext {
            catalog: Arc::new(SourceCatalog::new(source.clone())),
            source,
            mirror,
            cache,
            keys: CacheKeys::new(config.cache.namespace.clone()),
            events: feed.clone(),
            notifier: Arc::new(TracingNotifier),
            zones: Arc::new(config.zone_table()?),
            deadlines: Deadlines::from_settings(&config.sync),
        };

        let mut service = Self::with_context(ctx, config);
        service.feed = Some(feed);
        Ok(service)
    }

    /// Builds the engine over caller-supplied collaborators.
    pub fn with_context(ctx: EngineContext, config: ReconConfig) -> Self {
        let ledger = Arc::new(ConflictLedger::default());
        let enforcement = Arc::new(EnforcementTrigger::new(ctx.clone()));
        let propagator = Arc::new(Propagator::new(
            ctx.clone(),
            enforcement.clone(),
            Duration::from_secs(config.cache.sync_status_ttl_secs),
            config.health.sync_rate_window_hours,
        ));
        let detector = ConflictDetector::new(ctx.clone(), ledger.clone(), config.detection.clone());
        let resolver: Arc<dyn ConflictResolver> = Arc::new(DefaultConflictResolver::new(
            ctx.clone(),
            propagator.clone(),
            enforcement.clone(),
            ledger.clone(),
        ));
        let control = WorkerControl::new();
        let monitor = HealthMonitor::new(
            ctx.clone(),
            ledger.clone(),
            resolver.clone(),
            control.clone(),
            config.health.clone(),
            &config.queue,
            Duration::from_secs(config.detection.run_marker_ttl_secs),
        );
        let workers = Arc::new(WorkerPool::new(
            ctx.clone(),
            propagator.clone(),
            config.queue.clone(),
            control,
        ));

        ReconService {
            ctx,
            config,
            ledger,
            propagator,
            enforcement,
            detector,
            resolver,
            monitor,
            workers,
            feed: None,
        }
    }

    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    pub fn config(&self) -> &ReconConfig {
        &self.config
    }

    // =========================================================================
    // Propagation
    // =========================================================================

    pub async fn sync_agent(&self, agent_id: i64) -> AgentSyncOutcome {
        self.propagator.sync_agent(agent_id).await
    }

    pub async fn sync_stock_allocation(&self, agent_id: i64, sku: &str, quantity: i64) -> StockSyncOutcome {
        self.propagator.sync_stock_allocation(agent_id, sku, quantity).await
    }

    pub async fn sync_stock_allocation_once(
        &self,
        allocation_id: &str,
        agent_id: i64,
        sku: &str,
        quantity: i64,
    ) -> StockSyncOutcome {
        self.propagator
            .sync_stock_allocation_once(allocation_id, agent_id, sku, quantity)
            .await
    }

    pub async fn sync_compliance_action(
        &self,
        agent_id: i64,
        action_type: &str,
        severity: Severity,
        reason: &str,
    ) -> ComplianceSyncOutcome {
        self.propagator
            .sync_compliance_action(agent_id, action_type, severity, reason)
            .await
    }

    pub async fn sync_compliance_action_once(
        &self,
        action_id: &str,
        agent_id: i64,
        action_type: &str,
        severity: Severity,
        reason: &str,
    ) -> ComplianceSyncOutcome {
        self.propagator
            .sync_compliance_action_once(action_id, agent_id, action_type, severity, reason)
            .await
    }

    pub async fn trigger_enforcement(
        &self,
        agent_id: i64,
        action_type: EnforcementActionType,
        reason: &str,
        severity: Severity,
    ) -> SyncResult<EnforcementOutcome> {
        self.enforcement
            .trigger(agent_id, action_type, reason, severity)
            .await
    }

    // =========================================================================
    // Job Queue
    // =========================================================================

    /// Queues a task for the workers. Without a lane the task's default
    /// lane is used.
    ///
    /// Stock and compliance tasks get a fresh dedup id when they carry none,
    /// so a worker retry never applies them twice.
    pub async fn enqueue_sync(&self, task: SyncTask, lane: Option<SyncLane>) -> SyncResult<SyncJob> {
        let task = task.with_dedup_id();
        let lane = lane.unwrap_or_else(|| task.default_lane());
        let job = self
            .ctx
            .deadlines
            .store("mirror.enqueue_job", self.ctx.mirror.jobs().enqueue(lane, &task))
            .await?;
        debug!(job_id = %job.id, lane = %lane, task = task.kind(), entity = %task.entity_key(), "Sync job queued");
        Ok(job)
    }

    /// Returns jobs a dead process left running to the queue.
    pub async fn requeue_interrupted_jobs(&self) -> SyncResult<u64> {
        let requeued = self
            .ctx
            .deadlines
            .store("mirror.requeue_running", self.ctx.mirror.jobs().requeue_running(Utc::now()))
            .await?;
        if requeued > 0 {
            warn!(requeued, "Requeued jobs interrupted by a previous shutdown");
        }
        Ok(requeued)
    }

    pub fn spawn_workers(&self) -> Vec<JoinHandle<()>> {
        self.workers.spawn()
    }

    /// Claims and runs a single job on the caller's task.
    pub async fn process_next_job(&self) -> SyncResult<JobOutcome> {
        self.workers.process_next().await
    }

    pub fn worker_control(&self) -> WorkerControl {
        self.workers.control()
    }

    // =========================================================================
    // Conflicts
    // =========================================================================

    pub async fn detect_all_conflicts(&self) -> SyncResult<DetectionReport> {
        self.detector.detect_all().await
    }

    pub async fn get_conflict_summary(&self) -> SyncResult<ConflictSummary> {
        self.detector.summary().await
    }

    pub async fn auto_resolve_conflicts(&self) -> SyncResult<Vec<ResolutionResult>> {
        self.resolver.auto_resolve_conflicts().await
    }

    /// Detection followed by auto-resolution when the schedule asks for it.
    pub async fn run_detection_cycle(&self) -> SyncResult<DetectionReport> {
        let report = self.detect_all_conflicts().await?;
        if self.config.schedule.auto_resolve_after_detection && report.summary.auto_resolvable > 0 {
            self.auto_resolve_conflicts().await?;
        }
        Ok(report)
    }

    /// Open conflicts, highest severity first.
    pub async fn open_conflicts(&self) -> Vec<LedgerEntry> {
        let mut entries = self.ledger.open_entries().await;
        entries.sort_by(|a, b| {
            b.conflict
                .severity
                .cmp(&a.conflict.severity)
                .then(a.first_seen_at.cmp(&b.first_seen_at))
        });
        entries
    }

    /// Clears an open conflict by hand.
    pub async fn dismiss_conflict(&self, conflict_id: &str, dismissed_by: &str) -> SyncResult<LedgerEntry> {
        let by = validate_reason(dismissed_by)?;
        let entry = self
            .ledger
            .dismiss(conflict_id, &by)
            .await
            .ok_or_else(|| SyncError::ConflictNotFound(conflict_id.to_string()))?;
        info!(
            conflict_id = %conflict_id,
            conflict_type = %entry.conflict.conflict_type,
            dismissed_by = %by,
            "Conflict dismissed"
        );
        Ok(entry)
    }

    // =========================================================================
    // Health & Dashboard
    // =========================================================================

    pub async fn monitor_sync_health(&self) -> SyncResult<HealthReport> {
        self.monitor.monitor().await
    }

    pub async fn get_dashboard_data(&self) -> SyncResult<DashboardData> {
        let ctx = &self.ctx;
        let d = &ctx.deadlines;

        let health = self.monitor.latest().await;
        let conflicts = self.cached_summary().await;
        let queue = d.store("mirror.lane_depths", ctx.mirror.jobs().lane_depths()).await?;
        let recent_enforcement = d
            .store(
                "mirror.recent_enforcement",
                ctx.mirror.enforcement().recent(RECENT_ENFORCEMENT_LIMIT),
            )
            .await?;
        let open_alerts = d
            .store("mirror.open_alerts", ctx.mirror.alerts().list_open(OPEN_ALERT_LIMIT))
            .await?;

        Ok(DashboardData {
            health,
            conflicts,
            queue,
            recent_enforcement,
            open_alerts,
            generated_at: Utc::now(),
        })
    }

    /// Cached summary without triggering a detection run.
    async fn cached_summary(&self) -> ConflictSummary {
        let key = self.ctx.keys.conflict_summary();
        match self
            .ctx
            .deadlines
            .cache("cache.get_summary", get_json::<ConflictSummary>(self.ctx.cache.as_ref(), &key))
            .await
        {
            Ok(Some(summary)) => summary,
            Ok(None) => self.ledger.summary().await,
            Err(e) => {
                warn!(error = %e, "Summary cache read failed, using ledger");
                self.ledger.summary().await
            }
        }
    }

    pub async fn acknowledge_alert(&self, alert_id: &str, acknowledged_by: &str) -> SyncResult<Alert> {
        let by = validate_reason(acknowledged_by)?;
        let alert = self
            .ctx
            .deadlines
            .store("mirror.acknowledge_alert", self.ctx.mirror.alerts().acknowledge(alert_id, &by))
            .await?;
        info!(alert_id = %alert_id, acknowledged_by = %by, "Alert acknowledged");
        Ok(alert)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Live event feed. `None` when the engine was built with a custom
    /// broadcaster.
    pub fn subscribe(&self) -> Option<broadcast::Receiver<SyncEvent>> {
        self.feed.as_ref().map(|feed| feed.subscribe())
    }

    /// Stops the workers and closes the event feed.
    pub fn shutdown(&self) {
        info!("Shutting down reconciliation engine");
        self.workers.control().shutdown();
        if let Some(feed) = &self.feed {
            feed.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_core::SourceAgent;

    async fn service() -> ReconService {
        ReconService::in_memory(ReconConfig::default()).await.unwrap()
    }

    #[tokio::test]
    async fn test_enqueue_uses_default_lane() {
        let svc = service().await;
        let job = svc
            .enqueue_sync(
                SyncTask::ComplianceAction {
                    agent_id: 1,
                    action_type: "warning".into(),
                    severity: Severity::Low,
                    reason: "late".into(),
                    action_id: None,
                },
                None,
            )
            .await
            .unwrap();
        assert_eq!(job.lane, SyncLane::Compliance);
        assert!(job.task().unwrap().is_replay_safe());

        let job = svc
            .enqueue_sync(SyncTask::Agent { agent_id: 1 }, Some(SyncLane::Normal))
            .await
            .unwrap();
        assert_eq!(job.lane, SyncLane::Normal);
    }

    #[tokio::test]
    async fn test_dismiss_unknown_conflict() {
        let svc = service().await;
        let result = svc.dismiss_conflict("nope", "ops").await;
        assert!(matches!(result, Err(SyncError::ConflictNotFound(_))));
    }

    #[tokio::test]
    async fn test_dashboard_on_empty_engine() {
        let svc = service().await;
        let data = svc.get_dashboard_data().await.unwrap();
        assert_eq!(data.queue.len(), 3);
        assert_eq!(data.conflicts.total, 0);
        assert!(data.open_alerts.is_empty());
        assert_eq!(data.health.checks.len(), 8);
    }

    #[tokio::test]
    async fn test_events_reach_subscribers() {
        let svc = service().await;
        let mut rx = svc.subscribe().unwrap();
        svc.context()
            .source
            .agents()
            .upsert(&SourceAgent {
                id: 4,
                name: "Kemi".into(),
                location: "Port Harcourt".into(),
                status: "active".into(),
                rating: 4.1,
                compliance_score: 95,
                allocation_restricted: false,
                updated_at: Utc::now(),
            })
            .await
            .unwrap();

        assert!(svc.sync_agent(4).await.success);
        match rx.recv().await.unwrap() {
            SyncEvent::AgentSynced { source_agent_id, .. } => assert_eq!(source_agent_id, 4),
            other => panic!("unexpected event {:?}", other),
        }

        svc.shutdown();
        assert!(svc.worker_control().is_shutdown());
    }
}
