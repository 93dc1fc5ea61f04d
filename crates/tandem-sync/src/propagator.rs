//! # Propagator
//!
//! Pushes one changed System A entity into System B.
//!
//! ## Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Propagator                                     │
//! │                                                                         │
//! │  sync_agent(id)                                                         │
//! │    source.get ──► project_agent (zone, status, score) ──► mirror upsert │
//! │                                                                         │
//! │  sync_stock_allocation(id, sku, qty)                                    │
//! │    ensure mirror agent ──► catalog lookup ──► bin += qty                │
//! │    (`_once` variant records the allocation id in the same transaction)  │
//! │                                                                         │
//! │  sync_compliance_action(id, action, severity, reason)                   │
//! │    source.get (fail closed) ──► ensure mirror agent                     │
//! │      ──► audit row (pending, previous/new score)                        │
//! │      ──► source compare-and-set ──► mirror write ──► side effect        │
//! │          (suspend / restrict via EnforcementTrigger, training flag)     │
//! │    mirror step fails after the source write ──► partially_applied      │
//! │      + alert; a replay with the same action id resumes, never re-pays  │
//! │                                                                         │
//! │  every call:                                                            │
//! │    success ──► sync-status entry, success counter, event                │
//! │    failure ──► error log, failure counter, failed sync-status entry     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! There is no retry in here. Callers that want retries go through the job
//! queue, where the worker applies backoff.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use tandem_core::compliance::{apply_penalty, ComplianceSideEffect};
use tandem_core::mapping::project_agent;
use tandem_core::validation::{
    validate_action_id, validate_agent_id, validate_allocation_id, validate_quantity_delta,
    validate_reason, validate_sku,
};
use tandem_core::{
    AlertKind, ComplianceActionType, ComplianceRecord, CoreError, EnforcementStatus, MirrorAgent,
    Severity, SourceAgent, StockBin, SyncOutcomeKind, SyncStatusEntry, SyncTask, DEFAULT_SUPPLIER,
};
use tandem_db::BinDelta;
use uuid::Uuid;

use crate::cache::{counter_ttl, set_json};
use crate::context::EngineContext;
use crate::enforcement::{EnforcementOutcome, EnforcementTrigger};
use crate::error::{SyncError, SyncResult};
use crate::events::SyncEvent;

// =============================================================================
// Outcomes
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSyncOutcome {
    pub success: bool,
    pub timestamp: DateTime<Utc>,
    pub mirror_agent_id: Option<i64>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockSyncOutcome {
    pub success: bool,
    pub bin_id: Option<i64>,
    pub current_stock: Option<i64>,
    /// The allocation id had been applied before; stock is unchanged.
    pub duplicate: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceSyncOutcome {
    pub success: bool,
    /// Audit id of the action, when one was assigned.
    pub action_id: Option<String>,
    pub new_compliance_score: Option<i64>,
    /// The action id had been executed before; scores are unchanged.
    pub duplicate: bool,
    /// Present when the action drove the enforcement trigger.
    pub enforcement: Option<EnforcementOutcome>,
    pub error: Option<String>,
}

/// Stock applied by one call.
#[derive(Debug, Clone)]
pub struct AppliedStock {
    pub bin: StockBin,
    pub duplicate: bool,
}

/// Score change applied by one compliance call.
#[derive(Debug, Clone)]
pub struct AppliedCompliance {
    pub action_id: String,
    pub new_compliance_score: i64,
    pub enforcement: Option<EnforcementOutcome>,
    pub duplicate: bool,
}

// =============================================================================
// Shared Agent Helpers
// =============================================================================

/// Reads a System A agent. A missing agent is an error.
pub(crate) async fn read_source_agent(ctx: &EngineContext, agent_id: i64) -> SyncResult<SourceAgent> {
    ctx.deadlines
        .store("source.get_agent", ctx.source.agents().get(agent_id))
        .await?
        .ok_or_else(|| CoreError::SourceAgentNotFound(agent_id).into())
}

/// Projects a source agent and upserts it into System B.
pub(crate) async fn upsert_mirror_agent(
    ctx: &EngineContext,
    source: &SourceAgent,
) -> SyncResult<MirrorAgent> {
    let (draft, notes) = project_agent(source, &ctx.zones);

    if !notes.zone_matched {
        warn!(
            agent_id = source.id,
            location = %source.location,
            "Location matched no zone keyword, using unassigned"
        );
    }
    if !notes.status_recognized {
        warn!(
            agent_id = source.id,
            status = %source.status,
            "Unrecognized source status, mapping to active"
        );
    }

    ctx.deadlines
        .store(
            "mirror.upsert_agent",
            ctx.mirror.agents().upsert_from_source(&draft, Utc::now()),
        )
        .await
}

/// Returns the mirror agent linked to `agent_id`, creating it by agent sync
/// when System B has none yet.
pub(crate) async fn ensure_mirror_agent(ctx: &EngineContext, agent_id: i64) -> SyncResult<MirrorAgent> {
    let existing = ctx
        .deadlines
        .store(
            "mirror.get_agent_by_external_id",
            ctx.mirror.agents().get_by_external_id(agent_id),
        )
        .await?;

    match existing {
        Some(agent) => Ok(agent),
        None => {
            debug!(agent_id, "Mirror agent missing, creating via agent sync");
            let source = read_source_agent(ctx, agent_id).await?;
            upsert_mirror_agent(ctx, &source).await
        }
    }
}

// =============================================================================
// Propagator
// =============================================================================

pub struct Propagator {
    ctx: EngineContext,
    enforcement: Arc<EnforcementTrigger>,
    sync_status_ttl: Duration,
    counter_ttl: Duration,
}

impl Propagator {
    /// `counter_window_hours` is the sync-rate window; hourly counters are
    /// kept one hour longer than that.
    pub fn new(
        ctx: EngineContext,
        enforcement: Arc<EnforcementTrigger>,
        sync_status_ttl: Duration,
        counter_window_hours: u32,
    ) -> Self {
        Propagator {
            ctx,
            enforcement,
            sync_status_ttl,
            counter_ttl: counter_ttl(counter_window_hours),
        }
    }

    // =========================================================================
    // Public Operations
    // =========================================================================

    pub async fn sync_agent(&self, agent_id: i64) -> AgentSyncOutcome {
        match self.apply_agent(agent_id).await {
            Ok(agent) => AgentSyncOutcome {
                success: true,
                timestamp: agent.last_synced_at.unwrap_or(agent.updated_at),
                mirror_agent_id: Some(agent.id),
                error: None,
            },
            Err(e) => AgentSyncOutcome {
                success: false,
                timestamp: Utc::now(),
                mirror_agent_id: None,
                error: Some(e.to_string()),
            },
        }
    }

    pub async fn sync_stock_allocation(&self, agent_id: i64, sku: &str, quantity: i64) -> StockSyncOutcome {
        stock_outcome(self.apply_stock(agent_id, sku, quantity, None).await)
    }

    /// Applies the delta at most once per `allocation_id`.
    pub async fn sync_stock_allocation_once(
        &self,
        allocation_id: &str,
        agent_id: i64,
        sku: &str,
        quantity: i64,
    ) -> StockSyncOutcome {
        stock_outcome(
            self.apply_stock(agent_id, sku, quantity, Some(allocation_id))
                .await,
        )
    }

    pub async fn sync_compliance_action(
        &self,
        agent_id: i64,
        action_type: &str,
        severity: Severity,
        reason: &str,
    ) -> ComplianceSyncOutcome {
        compliance_outcome(
            self.apply_compliance(agent_id, action_type, severity, reason, None)
                .await,
        )
    }

    /// Applies the penalty at most once per `action_id`. A call that stopped
    /// part way resumes from the recorded scores.
    pub async fn sync_compliance_action_once(
        &self,
        action_id: &str,
        agent_id: i64,
        action_type: &str,
        severity: Severity,
        reason: &str,
    ) -> ComplianceSyncOutcome {
        compliance_outcome(
            self.apply_compliance(agent_id, action_type, severity, reason, Some(action_id))
                .await,
        )
    }

    /// Executes a queued task. Used by the lane workers, which need the
    /// typed error to decide on retries.
    pub async fn run_task(&self, task: &SyncTask) -> SyncResult<()> {
        match task {
            SyncTask::Agent { agent_id } => self.apply_agent(*agent_id).await.map(|_| ()),
            SyncTask::StockAllocation {
                agent_id,
                sku,
                quantity,
                allocation_id,
            } => self
                .apply_stock(*agent_id, sku, *quantity, allocation_id.as_deref())
                .await
                .map(|_| ()),
            SyncTask::ComplianceAction {
                agent_id,
                action_type,
                severity,
                reason,
                action_id,
            } => {
                let applied = self
                    .apply_compliance(*agent_id, action_type, *severity, reason, action_id.as_deref())
                    .await?;
                match applied.enforcement {
                    Some(e) if !e.success => Err(SyncError::Enforcement(format!(
                        "action {} ended {}",
                        e.action_id, e.status
                    ))),
                    _ => Ok(()),
                }
            }
        }
    }

    // =========================================================================
    // Typed Operations
    // =========================================================================

    /// Agent sync returning the upserted mirror agent.
    pub async fn apply_agent(&self, agent_id: i64) -> SyncResult<MirrorAgent> {
        let entity_key = format!("agent:{}", agent_id);
        let result = async {
            validate_agent_id(agent_id)?;
            let source = read_source_agent(&self.ctx, agent_id).await?;
            upsert_mirror_agent(&self.ctx, &source).await
        }
        .await;

        match result {
            Ok(agent) => {
                info!(agent_id, mirror_agent_id = agent.id, zone = %agent.zone, status = %agent.status, "Agent synced");
                self.record_success(
                    &entity_key,
                    SyncEvent::AgentSynced {
                        source_agent_id: agent_id,
                        mirror_agent_id: agent.id,
                    },
                )
                .await;
                Ok(agent)
            }
            Err(e) => {
                self.record_failure(&entity_key, "sync_agent", &e).await;
                Err(e)
            }
        }
    }

    /// Stock sync. With an allocation id the delta is applied at most once.
    pub async fn apply_stock(
        &self,
        agent_id: i64,
        sku: &str,
        quantity: i64,
        allocation_id: Option<&str>,
    ) -> SyncResult<AppliedStock> {
        let entity_key = format!("bin:{}:{}", agent_id, sku.trim());
        let result = self
            .apply_stock_inner(agent_id, sku, quantity, allocation_id)
            .await;

        match result {
            Ok(applied) => {
                info!(
                    agent_id,
                    sku = %applied.bin.sku,
                    delta = quantity,
                    current_stock = applied.bin.current_stock,
                    duplicate = applied.duplicate,
                    "Stock synced"
                );
                self.record_success(
                    &entity_key,
                    SyncEvent::StockSynced {
                        agent_id,
                        sku: applied.bin.sku.clone(),
                        bin_id: applied.bin.id,
                        current_stock: applied.bin.current_stock,
                    },
                )
                .await;
                Ok(applied)
            }
            Err(e) => {
                self.record_failure(&entity_key, "sync_stock_allocation", &e)
                    .await;
                Err(e)
            }
        }
    }

    async fn apply_stock_inner(
        &self,
        agent_id: i64,
        sku: &str,
        quantity: i64,
        allocation_id: Option<&str>,
    ) -> SyncResult<AppliedStock> {
        let ctx = &self.ctx;

        validate_agent_id(agent_id)?;
        let sku = validate_sku(sku)?;
        validate_quantity_delta(quantity)?;
        let allocation_id = allocation_id.map(validate_allocation_id).transpose()?;

        let mirror = ensure_mirror_agent(ctx, agent_id).await?;

        if let Some(id) = &allocation_id {
            let seen = ctx
                .deadlines
                .store("mirror.allocation_applied", ctx.mirror.applied_allocations().contains(id))
                .await?;
            if seen {
                debug!(allocation_id = %id, "Allocation already applied");
                return self.existing_bin(mirror.id, &sku).await;
            }
        }

        let entry = ctx
            .deadlines
            .store("catalog.lookup", ctx.catalog.lookup(&sku))
            .await?;
        if entry.is_none() {
            warn!(
                agent_id,
                sku = %sku,
                "SKU missing from product catalog, bin gets zero price"
            );
        }

        let current = ctx
            .deadlines
            .store("mirror.find_bin", ctx.mirror.bins().find(mirror.id, &sku))
            .await?
            .map(|b| b.current_stock)
            .unwrap_or(0);
        if current + quantity < 0 {
            return Err(CoreError::NegativeStock {
                sku,
                current,
                delta: quantity,
            }
            .into());
        }

        let delta = BinDelta {
            da_id: mirror.id,
            sku: sku.clone(),
            catalog: entry.map(|e| (e.name, e.unit_price_cents)),
            supplier: DEFAULT_SUPPLIER.to_string(),
            delta: quantity,
        };

        match allocation_id {
            None => {
                let bin = ctx
                    .deadlines
                    .store("mirror.apply_delta", ctx.mirror.bins().apply_delta(&delta))
                    .await?;
                Ok(AppliedStock { bin, duplicate: false })
            }
            Some(id) => {
                let applied = ctx
                    .deadlines
                    .store(
                        "mirror.apply_delta_once",
                        ctx.mirror.bins().apply_delta_once(&id, &delta),
                    )
                    .await?;
                match applied {
                    Some(bin) => Ok(AppliedStock { bin, duplicate: false }),
                    // lost a race with a concurrent replay of the same id
                    None => self.existing_bin(mirror.id, &sku).await,
                }
            }
        }
    }

    async fn existing_bin(&self, da_id: i64, sku: &str) -> SyncResult<AppliedStock> {
        let bin = self
            .ctx
            .deadlines
            .store("mirror.find_bin", self.ctx.mirror.bins().find(da_id, sku))
            .await?
            .ok_or_else(|| {
                SyncError::Internal(format!("applied allocation without bin ({}, {})", da_id, sku))
            })?;
        Ok(AppliedStock { bin, duplicate: true })
    }

    /// Compliance sync. Fails closed: without a source read nothing is written.
    ///
    /// Without an `action_id` a fresh one is assigned, so every call is a new
    /// action.
    pub async fn apply_compliance(
        &self,
        agent_id: i64,
        action_type: &str,
        severity: Severity,
        reason: &str,
        action_id: Option<&str>,
    ) -> SyncResult<AppliedCompliance> {
        let entity_key = format!("compliance:{}", agent_id);
        let result = self
            .apply_compliance_inner(agent_id, action_type, severity, reason, action_id)
            .await;

        match result {
            Ok(applied) => {
                self.record_success(
                    &entity_key,
                    SyncEvent::ComplianceApplied {
                        agent_id,
                        action_type: action_type.trim().to_lowercase(),
                        new_compliance_score: applied.new_compliance_score,
                    },
                )
                .await;
                Ok(applied)
            }
            Err(e) => {
                self.record_failure(&entity_key, "sync_compliance_action", &e)
                    .await;
                Err(e)
            }
        }
    }

    async fn apply_compliance_inner(
        &self,
        agent_id: i64,
        action_type: &str,
        severity: Severity,
        reason: &str,
        action_id: Option<&str>,
    ) -> SyncResult<AppliedCompliance> {
        let ctx = &self.ctx;

        validate_agent_id(agent_id)?;
        let action: ComplianceActionType = action_type.parse()?;
        let reason = validate_reason(reason)?;
        let action_id = match action_id {
            Some(id) => validate_action_id(id)?,
            None => Uuid::new_v4().to_string(),
        };

        let existing = ctx
            .deadlines
            .store(
                "mirror.get_compliance_action",
                ctx.mirror.compliance_actions().get(&action_id),
            )
            .await?;

        if let Some(record) = &existing {
            if record.source_agent_id != agent_id {
                return Err(SyncError::Enforcement(format!(
                    "compliance action {} belongs to agent {}",
                    action_id, record.source_agent_id
                )));
            }
            if record.status == EnforcementStatus::Executed {
                debug!(action_id = %action_id, "Compliance action already applied");
                return Ok(AppliedCompliance {
                    action_id,
                    new_compliance_score: record.new_score,
                    enforcement: None,
                    duplicate: true,
                });
            }
        }

        // Both stores are checked before either is written.
        let source = read_source_agent(ctx, agent_id).await?;
        let mirror = ensure_mirror_agent(ctx, agent_id).await?;

        let record = match existing {
            Some(record) => {
                info!(action_id = %record.id, status = %record.status, "Resuming compliance action");
                record
            }
            None => {
                let penalty = action.penalty(severity);
                let record = ComplianceRecord {
                    id: action_id,
                    source_agent_id: agent_id,
                    mirror_agent_id: Some(mirror.id),
                    action_type: action,
                    severity,
                    reason,
                    penalty,
                    previous_score: source.compliance_score,
                    new_score: apply_penalty(source.compliance_score, penalty),
                    status: EnforcementStatus::Pending,
                    error: None,
                    created_at: Utc::now(),
                    executed_at: None,
                };
                ctx.deadlines
                    .store(
                        "mirror.insert_compliance_action",
                        ctx.mirror.compliance_actions().insert(&record),
                    )
                    .await?;
                record
            }
        };

        if let Err(e) = self
            .write_source_score(&record, source.compliance_score)
            .await
        {
            // a partially applied row already carries a System A write
            if record.status != EnforcementStatus::PartiallyApplied {
                self.finish_compliance(&record.id, EnforcementStatus::Failed, Some(&e.to_string()))
                    .await;
            }
            return Err(e);
        }

        let enforcement = match self.apply_compliance_mirror(&record, mirror.id).await {
            Ok(enforcement) => enforcement,
            Err(e) => {
                let detail = e.to_string();
                self.finish_compliance(&record.id, EnforcementStatus::PartiallyApplied, Some(&detail))
                    .await;
                ctx.raise_alert(
                    AlertKind::PartialEnforcement,
                    Severity::Critical,
                    &format!("Partial compliance action for agent {}", agent_id),
                    &format!(
                        "{} applied in System A but not in System B (action {}): {}",
                        record.action_type, record.id, detail
                    ),
                )
                .await;
                return Err(e);
            }
        };

        ctx.deadlines
            .store(
                "mirror.finalize_compliance_action",
                ctx.mirror.compliance_actions().finalize(
                    &record.id,
                    EnforcementStatus::Executed,
                    None,
                    Some(Utc::now()),
                ),
            )
            .await?;

        info!(
            agent_id,
            action_id = %record.id,
            action = %record.action_type,
            severity = %record.severity,
            penalty = record.penalty,
            old_score = record.previous_score,
            new_score = record.new_score,
            "Compliance action applied"
        );

        Ok(AppliedCompliance {
            action_id: record.id,
            new_compliance_score: record.new_score,
            enforcement,
            duplicate: false,
        })
    }

    /// System A write, guarded by the score the penalty was computed from.
    async fn write_source_score(&self, record: &ComplianceRecord, current: i64) -> SyncResult<()> {
        let ctx = &self.ctx;
        if current == record.new_score {
            debug!(action_id = %record.id, "System A score already applied");
            return Ok(());
        }
        if current != record.previous_score {
            return Err(SyncError::Enforcement(format!(
                "compliance score of agent {} is {}, action {} expected {}",
                record.source_agent_id, current, record.id, record.previous_score
            )));
        }

        let written = ctx
            .deadlines
            .store(
                "source.set_compliance_score",
                ctx.source.agents().set_compliance_score_from(
                    record.source_agent_id,
                    record.previous_score,
                    record.new_score,
                ),
            )
            .await?;

        if written {
            Ok(())
        } else {
            Err(SyncError::Enforcement(format!(
                "compliance score of agent {} changed during action {}",
                record.source_agent_id, record.id
            )))
        }
    }

    /// System B write plus the action's side effect. Every step is safe to repeat.
    async fn apply_compliance_mirror(
        &self,
        record: &ComplianceRecord,
        mirror_id: i64,
    ) -> SyncResult<Option<EnforcementOutcome>> {
        let ctx = &self.ctx;
        let agents = ctx.mirror.agents();

        let written = ctx
            .deadlines
            .store(
                "mirror.set_compliance_score",
                agents.set_compliance_score(mirror_id, record.new_score),
            )
            .await?;
        if !written {
            return Err(CoreError::MirrorAgentNotFound(record.source_agent_id).into());
        }

        match record.action_type.side_effect() {
            ComplianceSideEffect::None => Ok(None),
            ComplianceSideEffect::RequireTraining => {
                ctx.deadlines
                    .store(
                        "mirror.set_training_required",
                        agents.set_training_required(mirror_id, true),
                    )
                    .await?;
                Ok(None)
            }
            ComplianceSideEffect::Enforce(enforcement_type) => Ok(Some(
                self.enforcement
                    .trigger(
                        record.source_agent_id,
                        enforcement_type,
                        &record.reason,
                        record.severity,
                    )
                    .await?,
            )),
        }
    }

    /// Records a failed or partial attempt. The audit table lives in System B,
    /// so this write can fail too; that is logged and the original error wins.
    async fn finish_compliance(&self, id: &str, status: EnforcementStatus, error: Option<&str>) {
        let ctx = &self.ctx;
        let finished = ctx
            .deadlines
            .store(
                "mirror.finalize_compliance_action",
                ctx.mirror
                    .compliance_actions()
                    .finalize(id, status, error, Some(Utc::now())),
            )
            .await;

        match finished {
            Ok(_) if status == EnforcementStatus::PartiallyApplied => {
                warn!(action_id = %id, error = ?error, "Compliance action partially applied");
            }
            Ok(_) => {}
            Err(e) => {
                error!(action_id = %id, status = %status, error = %e, "Failed to record compliance action");
            }
        }
    }

    // =========================================================================
    // Bookkeeping
    // =========================================================================

    async fn record_success(&self, entity_key: &str, event: SyncEvent) {
        let now = Utc::now();
        let entry = SyncStatusEntry {
            entity_key: entity_key.to_string(),
            last_synced_at: now,
            outcome: SyncOutcomeKind::Success,
            error: None,
        };
        self.write_status(&entry).await;
        self.bump_counter(&self.ctx.keys.success_counter(now)).await;
        self.ctx.publish(event);
    }

    async fn record_failure(&self, entity_key: &str, operation: &str, err: &SyncError) {
        error!(
            operation = %operation,
            entity = %entity_key,
            kind = ?err.kind(),
            error = %err,
            "Sync failed"
        );

        let now = Utc::now();
        let entry = SyncStatusEntry {
            entity_key: entity_key.to_string(),
            last_synced_at: now,
            outcome: SyncOutcomeKind::Failure,
            error: Some(err.to_string()),
        };
        self.write_status(&entry).await;
        self.bump_counter(&self.ctx.keys.failure_counter(now)).await;
    }

    async fn write_status(&self, entry: &SyncStatusEntry) {
        let key = self.ctx.keys.sync_status(&entry.entity_key);
        let cache = self.ctx.cache.as_ref();
        if let Err(e) = self
            .ctx
            .deadlines
            .cache("cache.set_sync_status", set_json(cache, &key, entry, Some(self.sync_status_ttl)))
            .await
        {
            warn!(entity = %entry.entity_key, error = %e, "Failed to cache sync status");
        }
    }

    async fn bump_counter(&self, key: &str) {
        if let Err(e) = self
            .ctx
            .deadlines
            .cache("cache.incr", self.ctx.cache.incr(key, 1, Some(self.counter_ttl)))
            .await
        {
            warn!(key = %key, error = %e, "Failed to increment sync counter");
        }
    }
}

fn compliance_outcome(result: SyncResult<AppliedCompliance>) -> ComplianceSyncOutcome {
    match result {
        Ok(applied) => {
            let enforcement_error = applied
                .enforcement
                .as_ref()
                .filter(|e| !e.success)
                .map(|e| format!("enforcement {}", e.status));
            ComplianceSyncOutcome {
                success: enforcement_error.is_none(),
                action_id: Some(applied.action_id),
                new_compliance_score: Some(applied.new_compliance_score),
                duplicate: applied.duplicate,
                enforcement: applied.enforcement,
                error: enforcement_error,
            }
        }
        Err(e) => ComplianceSyncOutcome {
            success: false,
            action_id: None,
            new_compliance_score: None,
            duplicate: false,
            enforcement: None,
            error: Some(e.to_string()),
        },
    }
}

fn stock_outcome(result: SyncResult<AppliedStock>) -> StockSyncOutcome {
    match result {
        Ok(applied) => StockSyncOutcome {
            success: true,
            bin_id: Some(applied.bin.id),
            current_stock: Some(applied.bin.current_stock),
            duplicate: applied.duplicate,
            error: None,
        },
        Err(e) => StockSyncOutcome {
            success: false,
            bin_id: None,
            current_stock: None,
            duplicate: false,
            error: Some(e.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::get_json;
    use tandem_core::{AgentStatus, Zone};
    use tandem_db::{MirrorDatabase, SourceDatabase};

    async fn setup() -> (EngineContext, Propagator) {
        let source = SourceDatabase::in_memory().await.unwrap();
        let mirror = MirrorDatabase::in_memory().await.unwrap();
        let ctx = EngineContext::with_defaults(source, mirror);
        let enforcement = Arc::new(EnforcementTrigger::new(ctx.clone()));
        let propagator = Propagator::new(ctx.clone(), enforcement, Duration::from_secs(900), 24);
        (ctx, propagator)
    }

    fn agent(id: i64, location: &str, status: &str) -> SourceAgent {
        SourceAgent {
            id,
            name: format!("Agent {}", id),
            location: location.into(),
            status: status.into(),
            rating: 4.2,
            compliance_score: 82,
            allocation_restricted: false,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_sync_agent_projects_fields() {
        let (ctx, propagator) = setup().await;
        ctx.source
            .agents()
            .upsert(&agent(1, "Lekki Phase 1 coastal road", "On Break"))
            .await
            .unwrap();

        let outcome = propagator.sync_agent(1).await;
        assert!(outcome.success, "{:?}", outcome.error);

        let mirror = ctx.mirror.agents().get_by_external_id(1).await.unwrap().unwrap();
        assert_eq!(outcome.mirror_agent_id, Some(mirror.id));
        assert_eq!(mirror.zone, Zone::Coastal);
        assert_eq!(mirror.status, AgentStatus::OnBreak);
        assert_eq!(mirror.compliance_score, 82);

        let status: SyncStatusEntry = get_json(ctx.cache.as_ref(), &ctx.keys.sync_status("agent:1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(status.outcome, SyncOutcomeKind::Success);
    }

    #[tokio::test]
    async fn test_sync_missing_agent_fails_and_counts() {
        let (ctx, propagator) = setup().await;

        let outcome = propagator.sync_agent(42).await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("42"));

        let failures = ctx
            .cache
            .get(&ctx.keys.failure_counter(Utc::now()))
            .await
            .unwrap();
        assert_eq!(failures.as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_stock_creates_agent_and_rejects_negative() {
        let (ctx, propagator) = setup().await;
        ctx.source.agents().upsert(&agent(7, "Ikeja", "active")).await.unwrap();
        ctx.source.products().upsert("X1", "Water 500ml", 120).await.unwrap();

        let outcome = propagator.sync_stock_allocation(7, "X1", 40).await;
        assert!(outcome.success, "{:?}", outcome.error);
        assert_eq!(outcome.current_stock, Some(40));
        assert!(ctx.mirror.agents().get_by_external_id(7).await.unwrap().is_some());

        let outcome = propagator.sync_stock_allocation(7, "X1", -50).await;
        assert!(!outcome.success);
        let mirror = ctx.mirror.agents().get_by_external_id(7).await.unwrap().unwrap();
        let bin = ctx.mirror.bins().find(mirror.id, "X1").await.unwrap().unwrap();
        assert_eq!(bin.current_stock, 40);
        assert_eq!(bin.unit_price_cents, 120);
    }

    #[tokio::test]
    async fn test_unknown_sku_gets_zero_price() {
        let (ctx, propagator) = setup().await;
        ctx.source.agents().upsert(&agent(3, "Yaba", "active")).await.unwrap();

        let outcome = propagator.sync_stock_allocation(3, "GHOST-1", 5).await;
        assert!(outcome.success);
        let bin = ctx.mirror.bins().get(outcome.bin_id.unwrap()).await.unwrap().unwrap();
        assert_eq!(bin.unit_price_cents, 0);
        assert_eq!(bin.product_name, "GHOST-1");
    }

    #[tokio::test]
    async fn test_compliance_training_flag() {
        let (ctx, propagator) = setup().await;
        ctx.source.agents().upsert(&agent(5, "Ikeja", "active")).await.unwrap();

        let outcome = propagator
            .sync_compliance_action(5, "mandatory_training", Severity::High, "late deliveries")
            .await;
        assert!(outcome.success, "{:?}", outcome.error);
        assert_eq!(outcome.new_compliance_score, Some(67));
        assert!(outcome.enforcement.is_none());

        let source = ctx.source.agents().get(5).await.unwrap().unwrap();
        let mirror = ctx.mirror.agents().get_by_external_id(5).await.unwrap().unwrap();
        assert_eq!(source.compliance_score, 67);
        assert_eq!(mirror.compliance_score, 67);
        assert!(mirror.training_required);
    }

    #[tokio::test]
    async fn test_compliance_fails_closed_without_source() {
        let (ctx, propagator) = setup().await;

        let outcome = propagator
            .sync_compliance_action(9, "warning", Severity::Low, "test")
            .await;
        assert!(!outcome.success);
        assert!(outcome.new_compliance_score.is_none());
        assert!(ctx.mirror.agents().get_by_external_id(9).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_compliance_rejects_unknown_action() {
        let (ctx, propagator) = setup().await;
        ctx.source.agents().upsert(&agent(5, "Ikeja", "active")).await.unwrap();

        let outcome = propagator
            .sync_compliance_action(5, "flogging", Severity::Low, "test")
            .await;
        assert!(!outcome.success);
        assert_eq!(ctx.source.agents().get(5).await.unwrap().unwrap().compliance_score, 82);
    }

    #[tokio::test]
    async fn test_suspend_action_drives_enforcement() {
        let (ctx, propagator) = setup().await;
        ctx.source.agents().upsert(&agent(6, "Ikeja", "active")).await.unwrap();

        let outcome = propagator
            .sync_compliance_action(6, "suspend", Severity::Critical, "fraud")
            .await;
        assert!(outcome.success, "{:?}", outcome.error);
        assert_eq!(outcome.new_compliance_score, Some(42));
        assert!(outcome.enforcement.unwrap().success);

        let mirror = ctx.mirror.agents().get_by_external_id(6).await.unwrap().unwrap();
        assert_eq!(mirror.status, AgentStatus::Suspended);
    }

    #[tokio::test]
    async fn test_compliance_resume_refuses_moved_score() {
        let (ctx, propagator) = setup().await;
        ctx.source.agents().upsert(&agent(5, "Ikeja", "active")).await.unwrap();

        // recorded against a score of 95, but System A now says 82
        ctx.mirror
            .compliance_actions()
            .insert(&ComplianceRecord {
                id: "cmp-5".into(),
                source_agent_id: 5,
                mirror_agent_id: None,
                action_type: ComplianceActionType::Warning,
                severity: Severity::High,
                reason: "late".into(),
                penalty: 10,
                previous_score: 95,
                new_score: 85,
                status: EnforcementStatus::Failed,
                error: Some("store down".into()),
                created_at: Utc::now(),
                executed_at: None,
            })
            .await
            .unwrap();

        let outcome = propagator
            .sync_compliance_action_once("cmp-5", 5, "warning", Severity::High, "late")
            .await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("expected 95"));
        assert_eq!(ctx.source.agents().get(5).await.unwrap().unwrap().compliance_score, 82);

        let other_agent = propagator
            .sync_compliance_action_once("cmp-5", 6, "warning", Severity::High, "late")
            .await;
        assert!(!other_agent.success);
    }

    #[tokio::test]
    async fn test_compliance_records_audit_row() {
        let (ctx, propagator) = setup().await;
        ctx.source.agents().upsert(&agent(5, "Ikeja", "active")).await.unwrap();

        let outcome = propagator
            .sync_compliance_action(5, "warning", Severity::Low, "late")
            .await;
        assert!(outcome.success, "{:?}", outcome.error);

        let record = ctx
            .mirror
            .compliance_actions()
            .get(&outcome.action_id.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status, EnforcementStatus::Executed);
        assert_eq!((record.previous_score, record.new_score, record.penalty), (82, 77, 5));
        assert!(record.mirror_agent_id.is_some());
    }
}
