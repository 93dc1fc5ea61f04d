//! # Conflict Resolver
//!
//! Drains pending ledger entries and applies deterministic fixes.
//!
//! ## Default Rules
//! ```text
//! ┌───────────────────────────────────────────┬─────────────────────────────┐
//! │ conflict type                             │ fix                         │
//! ├───────────────────────────────────────────┼─────────────────────────────┤
//! │ missing_mirror_agent, name_mismatch,      │ re-run agent sync           │
//! │ performance/zone/status_mismatch,         │ (once per agent per run)    │
//! │ stale_sync_data, compliance_score_mismatch│                             │
//! ├───────────────────────────────────────────┼─────────────────────────────┤
//! │ price_mismatch                            │ bin price := catalog price  │
//! ├───────────────────────────────────────────┼─────────────────────────────┤
//! │ enforcement_not_synced                    │ re-run suspend enforcement, │
//! │                                           │ always escalated            │
//! ├───────────────────────────────────────────┼─────────────────────────────┤
//! │ everything else                           │ manual resolution           │
//! └───────────────────────────────────────────┴─────────────────────────────┘
//! ```
//!
//! A fix that keeps failing is handed to a human after
//! [`MAX_RESOLUTION_ATTEMPTS`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use tandem_core::{Conflict, ConflictType, EnforcementActionType, Severity};

use crate::context::EngineContext;
use crate::enforcement::EnforcementTrigger;
use crate::error::{SyncError, SyncResult};
use crate::ledger::ConflictLedger;
use crate::notifier::Notification;
use crate::propagator::Propagator;

/// Failed attempts before a pending conflict goes to manual resolution.
pub const MAX_RESOLUTION_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionOutcome {
    pub success: bool,
    pub action_taken: Option<String>,
    pub error: Option<String>,
}

impl ResolutionOutcome {
    fn applied(action: impl Into<String>) -> Self {
        ResolutionOutcome {
            success: true,
            action_taken: Some(action.into()),
            error: None,
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        ResolutionOutcome {
            success: false,
            action_taken: None,
            error: Some(error.into()),
        }
    }
}

/// Per-conflict result of an auto-resolution pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub conflict_id: String,
    pub conflict_type: ConflictType,
    pub success: bool,
    pub action_taken: Option<String>,
    pub error: Option<String>,
}

#[async_trait]
pub trait ConflictResolver: Send + Sync {
    /// Attempts one conflict. Does not touch the ledger.
    async fn resolve(&self, conflict: &Conflict) -> ResolutionOutcome;

    /// Attempts every pending ledger entry and records the results.
    async fn auto_resolve_conflicts(&self) -> SyncResult<Vec<ResolutionResult>>;
}

// =============================================================================
// Default Rules
// =============================================================================

pub struct DefaultConflictResolver {
    ctx: EngineContext,
    propagator: Arc<Propagator>,
    enforcement: Arc<EnforcementTrigger>,
    ledger: Arc<ConflictLedger>,
    run_lock: Mutex<()>,
}

fn resynced_by_agent_sync(ty: ConflictType) -> bool {
    matches!(
        ty,
        ConflictType::MissingMirrorAgent
            | ConflictType::NameMismatch
            | ConflictType::PerformanceMismatch
            | ConflictType::ZoneMismatch
            | ConflictType::StatusMismatch
            | ConflictType::StaleSyncData
            | ConflictType::ComplianceScoreMismatch
    )
}

impl DefaultConflictResolver {
    pub fn new(
        ctx: EngineContext,
        propagator: Arc<Propagator>,
        enforcement: Arc<EnforcementTrigger>,
        ledger: Arc<ConflictLedger>,
    ) -> Self {
        DefaultConflictResolver {
            ctx,
            propagator,
            enforcement,
            ledger,
            run_lock: Mutex::new(()),
        }
    }

    async fn resync_agent(&self, conflict: &Conflict) -> ResolutionOutcome {
        let Some(agent_id) = conflict.source_agent_id else {
            return ResolutionOutcome::failed("conflict carries no source agent id");
        };
        match self.propagator.apply_agent(agent_id).await {
            Ok(mirror) => ResolutionOutcome::applied(format!(
                "resynced agent {} into mirror agent {}",
                agent_id, mirror.id
            )),
            Err(e) => ResolutionOutcome::failed(e.to_string()),
        }
    }

    async fn fix_price(&self, conflict: &Conflict) -> ResolutionOutcome {
        let (Some(bin_id), Some(sku)) = (conflict.bin_id, conflict.sku.as_deref()) else {
            return ResolutionOutcome::failed("conflict carries no bin");
        };
        let ctx = &self.ctx;

        let entry = match ctx.deadlines.store("catalog.lookup", ctx.catalog.lookup(sku)).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return ResolutionOutcome::failed(format!("SKU {} left the catalog", sku)),
            Err(e) => return ResolutionOutcome::failed(e.to_string()),
        };

        match ctx
            .deadlines
            .store(
                "mirror.set_bin_price",
                ctx.mirror.bins().set_price(bin_id, entry.unit_price_cents),
            )
            .await
        {
            Ok(true) => ResolutionOutcome::applied(format!(
                "set bin {} price to {}",
                bin_id, entry.unit_price_cents
            )),
            Ok(false) => ResolutionOutcome::failed(format!("bin {} no longer exists", bin_id)),
            Err(e) => ResolutionOutcome::failed(e.to_string()),
        }
    }

    async fn reapply_suspension(&self, conflict: &Conflict) -> ResolutionOutcome {
        let Some(agent_id) = conflict.source_agent_id else {
            return ResolutionOutcome::failed("conflict carries no source agent id");
        };

        let outcome = match self
            .enforcement
            .trigger(
                agent_id,
                EnforcementActionType::Suspend,
                "suspension missing in System B",
                Severity::Critical,
            )
            .await
        {
            Ok(o) if o.success => ResolutionOutcome::applied(format!(
                "re-applied suspension (action {})",
                o.action_id
            )),
            Ok(o) => ResolutionOutcome::failed(format!("enforcement {} ({})", o.status, o.action_id)),
            Err(e) => ResolutionOutcome::failed(e.to_string()),
        };

        // Policy conflicts are escalated whether or not the fix worked.
        let detail = match (&outcome.action_taken, &outcome.error) {
            (Some(action), _) => format!("{}: {}", conflict.message, action),
            (_, Some(err)) => format!("{}: fix failed: {}", conflict.message, err),
            _ => conflict.message.clone(),
        };
        self.ctx
            .notify(&Notification::new(
                Severity::Critical,
                format!("Enforcement not synced for agent {}", agent_id),
                detail,
            ))
            .await;

        outcome
    }
}

#[async_trait]
impl ConflictResolver for DefaultConflictResolver {
    async fn resolve(&self, conflict: &Conflict) -> ResolutionOutcome {
        if !conflict.auto_resolvable {
            return ResolutionOutcome::failed("requires manual resolution");
        }

        match conflict.conflict_type {
            ty if resynced_by_agent_sync(ty) => self.resync_agent(conflict).await,
            ConflictType::PriceMismatch => self.fix_price(conflict).await,
            ConflictType::EnforcementNotSynced => self.reapply_suspension(conflict).await,
            ty => ResolutionOutcome::failed(format!("no automatic fix for {}", ty)),
        }
    }

    async fn auto_resolve_conflicts(&self) -> SyncResult<Vec<ResolutionResult>> {
        let _guard = self.run_lock.try_lock().map_err(|_| SyncError::RunInProgress {
            run: "auto_resolve".to_string(),
        })?;

        if let Some(reason) = self.ledger.detection_failure().await {
            warn!(reason = %reason, "Auto-resolution blocked by failed detection");
            return Err(SyncError::DetectionUnavailable(reason));
        }

        let pending = self.ledger.pending().await;
        let mut resynced: HashMap<i64, ResolutionOutcome> = HashMap::new();
        let mut results = Vec::with_capacity(pending.len());

        for entry in pending {
            let conflict = &entry.conflict;

            let outcome = match conflict.source_agent_id {
                Some(agent_id) if resynced_by_agent_sync(conflict.conflict_type) => {
                    match resynced.get(&agent_id) {
                        Some(previous) => previous.clone(),
                        None => {
                            let outcome = self.resolve(conflict).await;
                            resynced.insert(agent_id, outcome.clone());
                            outcome
                        }
                    }
                }
                _ => self.resolve(conflict).await,
            };

            if outcome.success {
                let action = outcome.action_taken.clone().unwrap_or_default();
                self.ledger.mark_resolved(&conflict.id, &action).await;
            } else {
                let error = outcome.error.clone().unwrap_or_default();
                self.ledger.mark_failed(&conflict.id, &error).await;
                if entry.attempts + 1 >= MAX_RESOLUTION_ATTEMPTS {
                    warn!(
                        conflict_id = %conflict.id,
                        conflict_type = %conflict.conflict_type,
                        attempts = entry.attempts + 1,
                        error = %error,
                        "Giving up on automatic resolution"
                    );
                    self.ledger.mark_manual(&conflict.id).await;
                }
            }

            results.push(ResolutionResult {
                conflict_id: conflict.id.clone(),
                conflict_type: conflict.conflict_type,
                success: outcome.success,
                action_taken: outcome.action_taken,
                error: outcome.error,
            });
        }

        let resolved = results.iter().filter(|r| r.success).count();
        info!(
            attempted = results.len(),
            resolved,
            failed = results.len() - resolved,
            "Auto-resolution pass complete"
        );
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chrono::Utc;
    use tandem_core::conflict::ConflictState;
    use tandem_core::{AgentStatus, SourceAgent};
    use tandem_db::{BinDelta, MirrorDatabase, SourceDatabase};

    struct Fixture {
        ctx: EngineContext,
        ledger: Arc<ConflictLedger>,
        resolver: DefaultConflictResolver,
    }

    async fn fixture() -> Fixture {
        let source = SourceDatabase::in_memory().await.unwrap();
        let mirror = MirrorDatabase::in_memory().await.unwrap();
        let ctx = EngineContext::with_defaults(source, mirror);
        let enforcement = Arc::new(EnforcementTrigger::new(ctx.clone()));
        let propagator = Arc::new(Propagator::new(
            ctx.clone(),
            enforcement.clone(),
            Duration::from_secs(900),
            24,
        ));
        let ledger = Arc::new(ConflictLedger::default());
        let resolver =
            DefaultConflictResolver::new(ctx.clone(), propagator, enforcement, ledger.clone());
        Fixture { ctx, ledger, resolver }
    }

    fn agent(id: i64, status: &str) -> SourceAgent {
        SourceAgent {
            id,
            name: "Ngozi".into(),
            location: "Harbour Street".into(),
            status: status.into(),
            rating: 4.5,
            compliance_score: 88,
            allocation_restricted: false,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_agent_conflicts_share_one_resync() {
        let f = fixture().await;
        f.ctx.source.agents().upsert(&agent(1, "active")).await.unwrap();

        let mut run = vec![
            Conflict::new(ConflictType::MissingMirrorAgent, "missing").source_agent(1),
            Conflict::new(ConflictType::NameMismatch, "name").source_agent(1).mirror_agent(5),
        ];
        f.ledger.record_run(&mut run).await;

        let results = f.resolver.auto_resolve_conflicts().await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.success));
        assert_eq!(f.ctx.mirror.agents().count().await.unwrap(), 1);
        assert_eq!(f.ledger.open_len().await, 0);
        assert_eq!(f.ledger.archived(10).await.len(), 2);
    }

    #[tokio::test]
    async fn test_price_fix() {
        let f = fixture().await;
        f.ctx.source.products().upsert("X1", "Water", 150).await.unwrap();
        let bin = f
            .ctx
            .mirror
            .bins()
            .apply_delta(&BinDelta {
                da_id: 1,
                sku: "X1".into(),
                catalog: Some(("Water".into(), 100)),
                supplier: "system_a".into(),
                delta: 10,
            })
            .await
            .unwrap();

        let conflict = Conflict::new(ConflictType::PriceMismatch, "price").bin(bin.id, "X1");
        let outcome = f.resolver.resolve(&conflict).await;
        assert!(outcome.success, "{:?}", outcome.error);

        let bin = f.ctx.mirror.bins().get(bin.id).await.unwrap().unwrap();
        assert_eq!(bin.unit_price_cents, 150);
    }

    #[tokio::test]
    async fn test_enforcement_not_synced_reapplied() {
        let f = fixture().await;
        f.ctx.source.agents().upsert(&agent(2, "active")).await.unwrap();
        let missing = Conflict::new(ConflictType::MissingMirrorAgent, "missing").source_agent(2);
        assert!(f.resolver.resolve(&missing).await.success);
        f.ctx.source.agents().set_status(2, "suspended").await.unwrap();

        let conflict =
            Conflict::new(ConflictType::EnforcementNotSynced, "not synced").source_agent(2);
        let outcome = f.resolver.resolve(&conflict).await;
        assert!(outcome.success, "{:?}", outcome.error);

        let mirror = f.ctx.mirror.agents().get_by_external_id(2).await.unwrap().unwrap();
        assert_eq!(mirror.status, AgentStatus::Suspended);
    }

    #[tokio::test]
    async fn test_manual_conflicts_untouched() {
        let f = fixture().await;
        let conflict = Conflict::new(ConflictType::StockVariance, "variance").bin(3, "X1");
        assert!(!f.resolver.resolve(&conflict).await.success);

        let mut run = vec![conflict];
        f.ledger.record_run(&mut run).await;
        let results = f.resolver.auto_resolve_conflicts().await.unwrap();
        assert!(results.is_empty());
        assert_eq!(f.ledger.open_len().await, 1);
    }

    #[tokio::test]
    async fn test_repeated_failure_goes_manual() {
        let f = fixture().await;
        // Agent 9 does not exist, so every resync fails.
        let mut run = vec![Conflict::new(ConflictType::MissingMirrorAgent, "missing").source_agent(9)];
        f.ledger.record_run(&mut run).await;

        for _ in 0..MAX_RESOLUTION_ATTEMPTS {
            let results = f.resolver.auto_resolve_conflicts().await.unwrap();
            assert!(!results[0].success);
        }

        let entry = f.ledger.get(&run[0].id).await.unwrap();
        assert_eq!(entry.state, ConflictState::ManualResolutionRequired);
        assert_eq!(entry.attempts, MAX_RESOLUTION_ATTEMPTS);
        assert!(f.resolver.auto_resolve_conflicts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_blocked_after_failed_detection() {
        let f = fixture().await;
        f.ledger.set_detection_failure("source store unreachable").await;

        let result = f.resolver.auto_resolve_conflicts().await;
        assert!(matches!(result, Err(SyncError::DetectionUnavailable(_))));
    }
}
