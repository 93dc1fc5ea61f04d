//! # Enforcement Trigger
//!
//! Applies a punitive state change to both stores in one call. There is no
//! shared transaction, so the audit row records how far the change got.
//!
//! ```text
//! insert audit row (pending)
//!      │
//!      ▼
//! System A write ── fails ──► failed              (nothing applied)
//!      │
//!      ▼
//! System B write ── fails ──► partially_applied   + persistent alert
//!      │                      (no rollback of System A)
//!      ▼
//! executed
//! ```
//!
//! `partially_applied` rows stay visible to the `enforcement_integrity`
//! health check until an operator repairs System B.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, warn};
use uuid::Uuid;

use tandem_core::validation::{validate_agent_id, validate_reason};
use tandem_core::{
    AgentStatus, AlertKind, CoreError, EnforcementAction, EnforcementActionType,
    EnforcementStatus, Severity,
};

use crate::context::EngineContext;
use crate::error::{SyncError, SyncResult};
use crate::events::SyncEvent;
use crate::propagator::ensure_mirror_agent;

/// Result of one enforcement call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnforcementOutcome {
    /// True only when both stores were updated.
    pub success: bool,
    pub action_id: String,
    pub status: EnforcementStatus,
    /// Same payload as the audit row's `result` column.
    pub result: serde_json::Value,
}

pub struct EnforcementTrigger {
    ctx: EngineContext,
}

impl EnforcementTrigger {
    pub fn new(ctx: EngineContext) -> Self {
        EnforcementTrigger { ctx }
    }

    /// Runs the workflow for one agent.
    ///
    /// Returns `Err` only when the call was rejected before any state change
    /// (invalid input, audit row not writable). Store failures after that
    /// are reported through the outcome's status.
    pub async fn trigger(
        &self,
        agent_id: i64,
        action_type: EnforcementActionType,
        reason: &str,
        severity: Severity,
    ) -> SyncResult<EnforcementOutcome> {
        validate_agent_id(agent_id)?;
        let reason = validate_reason(reason)?;
        let ctx = &self.ctx;

        let action = EnforcementAction {
            id: Uuid::new_v4().to_string(),
            source_agent_id: agent_id,
            mirror_agent_id: None,
            action_type,
            reason: reason.clone(),
            severity,
            status: EnforcementStatus::Pending,
            result: None,
            created_at: Utc::now(),
            executed_at: None,
        };

        warn!(
            action_id = %action.id,
            agent_id,
            action = %action_type,
            severity = %severity,
            reason = %reason,
            "Enforcement triggered"
        );

        ctx.deadlines
            .store("mirror.insert_enforcement", ctx.mirror.enforcement().insert(&action))
            .await?;

        // System A first: it is the system of record for agent status.
        if let Err(e) = self.apply_source(agent_id, action_type).await {
            let result = json!({ "source": "failed", "mirror": "skipped", "error": e.to_string() });
            return self
                .finish(&action, EnforcementStatus::Failed, None, result)
                .await;
        }

        match self.apply_mirror(agent_id, action_type).await {
            Ok(mirror_agent_id) => {
                let result = json!({
                    "source": "applied",
                    "mirror": "applied",
                    "mirror_agent_id": mirror_agent_id,
                });
                self.finish(&action, EnforcementStatus::Executed, Some(mirror_agent_id), result)
                    .await
            }
            Err((mirror_agent_id, e)) => {
                let result = json!({
                    "source": "applied",
                    "mirror": "failed",
                    "mirror_agent_id": mirror_agent_id,
                    "error": e.to_string(),
                });
                let outcome = self
                    .finish(&action, EnforcementStatus::PartiallyApplied, mirror_agent_id, result)
                    .await?;

                ctx.raise_alert(
                    AlertKind::PartialEnforcement,
                    Severity::Critical,
                    &format!("Partial enforcement for agent {}", agent_id),
                    &format!(
                        "{} applied in System A but not in System B (action {}): {}",
                        action_type, action.id, e
                    ),
                )
                .await;
                Ok(outcome)
            }
        }
    }

    async fn apply_source(&self, agent_id: i64, action_type: EnforcementActionType) -> SyncResult<()> {
        let ctx = &self.ctx;
        let agents = ctx.source.agents();
        let updated = match action_type {
            EnforcementActionType::Suspend => {
                ctx.deadlines
                    .store("source.set_status", agents.set_status(agent_id, AgentStatus::Suspended.as_str()))
                    .await?
            }
            EnforcementActionType::RestrictAllocation => {
                ctx.deadlines
                    .store(
                        "source.set_allocation_restricted",
                        agents.set_allocation_restricted(agent_id, true),
                    )
                    .await?
            }
        };

        if updated {
            Ok(())
        } else {
            Err(CoreError::SourceAgentNotFound(agent_id).into())
        }
    }

    /// Returns the mirror agent id, or the id known so far with the error.
    async fn apply_mirror(
        &self,
        agent_id: i64,
        action_type: EnforcementActionType,
    ) -> Result<i64, (Option<i64>, SyncError)> {
        let ctx = &self.ctx;
        let mirror = ensure_mirror_agent(ctx, agent_id)
            .await
            .map_err(|e| (None, e))?;

        let agents = ctx.mirror.agents();
        let written = match action_type {
            EnforcementActionType::Suspend => {
                ctx.deadlines
                    .store("mirror.set_status", agents.set_status(mirror.id, AgentStatus::Suspended))
                    .await
            }
            EnforcementActionType::RestrictAllocation => {
                ctx.deadlines
                    .store(
                        "mirror.set_allocation_restricted",
                        agents.set_allocation_restricted(mirror.id, true),
                    )
                    .await
            }
        };

        match written {
            Ok(true) => Ok(mirror.id),
            Ok(false) => Err((Some(mirror.id), CoreError::MirrorAgentNotFound(mirror.id).into())),
            Err(e) => Err((Some(mirror.id), e)),
        }
    }

    async fn finish(
        &self,
        action: &EnforcementAction,
        status: EnforcementStatus,
        mirror_agent_id: Option<i64>,
        result: serde_json::Value,
    ) -> SyncResult<EnforcementOutcome> {
        let ctx = &self.ctx;
        let executed_at = match status {
            EnforcementStatus::Failed => None,
            _ => Some(Utc::now()),
        };

        let finalized = ctx
            .deadlines
            .store(
                "mirror.finalize_enforcement",
                ctx.mirror.enforcement().finalize(
                    &action.id,
                    status,
                    mirror_agent_id,
                    &result.to_string(),
                    executed_at,
                ),
            )
            .await;
        if let Err(e) = &finalized {
            error!(action_id = %action.id, status = %status, error = %e, "Failed to finalise enforcement row");
        }
        finalized?;

        warn!(
            action_id = %action.id,
            agent_id = action.source_agent_id,
            action = %action.action_type,
            status = %status,
            result = %result,
            "Enforcement finished"
        );

        ctx.publish(SyncEvent::EnforcementApplied {
            action_id: action.id.clone(),
            agent_id: action.source_agent_id,
            action_type: action.action_type,
            status,
        });

        Ok(EnforcementOutcome {
            success: status == EnforcementStatus::Executed,
            action_id: action.id.clone(),
            status,
            result,
        })
    }
}
