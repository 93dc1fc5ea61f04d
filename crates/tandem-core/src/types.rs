//! # Domain Types
//!
//! Entity types for both record systems plus the operational records the
//! reconciliation engine keeps (enforcement audit, alerts, sync jobs).
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  System A (source)             System B (mirror)                        │
//! │  ┌─────────────────┐           ┌─────────────────┐                      │
//! │  │  SourceAgent    │◄ ─ ─ ─ ─ ─│  MirrorAgent    │  external_id is a    │
//! │  │  id (i64)       │  weak ref │  id (i64)       │  weak reference,     │
//! │  │  location (txt) │           │  external_id    │  never ownership     │
//! │  │  status (txt)   │           │  zone (enum)    │                      │
//! │  │  rating         │           │  status (enum)  │                      │
//! │  └─────────────────┘           └────────┬────────┘                      │
//! │  ┌─────────────────┐                    │ da_id                         │
//! │  │ Product (SKU)   │           ┌────────▼────────┐                      │
//! │  │ StockAllocation │           │    StockBin     │                      │
//! │  └─────────────────┘           │ (da_id, sku)    │                      │
//! │                                └─────────────────┘                      │
//! │                                                                         │
//! │  Operational (System B): EnforcementAction, ComplianceRecord, Alert,    │
//! │                          SyncJob, FailedSyncJob,                        │
//! │                          SyncStatusEntry (cache only)                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::compliance::ComplianceActionType;
use crate::conflict::Severity;
use crate::error::CoreError;

// =============================================================================
// Agent Status
// =============================================================================

/// Status of a MirrorAgent in System B.
///
/// System A stores status as free text; [`crate::mapping::map_status`]
/// converts it into this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    #[default]
    Active,
    Inactive,
    OnDelivery,
    OnBreak,
    Suspended,
    Training,
}

impl AgentStatus {
    /// Returns the snake_case label used in storage and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Active => "active",
            AgentStatus::Inactive => "inactive",
            AgentStatus::OnDelivery => "on_delivery",
            AgentStatus::OnBreak => "on_break",
            AgentStatus::Suspended => "suspended",
            AgentStatus::Training => "training",
        }
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Zone
// =============================================================================

/// Fixed delivery zone enumeration used by System B.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum Zone {
    Central,
    North,
    South,
    East,
    West,
    Coastal,
    /// Default when no keyword in the location matches.
    #[default]
    Unassigned,
}

impl Zone {
    /// Returns the snake_case label used in storage and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Zone::Central => "central",
            Zone::North => "north",
            Zone::South => "south",
            Zone::East => "east",
            Zone::West => "west",
            Zone::Coastal => "coastal",
            Zone::Unassigned => "unassigned",
        }
    }
}

impl std::fmt::Display for Zone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Zone {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "central" => Ok(Zone::Central),
            "north" => Ok(Zone::North),
            "south" => Ok(Zone::South),
            "east" => Ok(Zone::East),
            "west" => Ok(Zone::West),
            "coastal" => Ok(Zone::Coastal),
            "unassigned" => Ok(Zone::Unassigned),
            other => Err(CoreError::InvalidMappingTable(format!(
                "unknown zone '{}'",
                other
            ))),
        }
    }
}

// =============================================================================
// System A: Source Agent
// =============================================================================

/// A delivery agent as recorded by System A.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SourceAgent {
    pub id: i64,
    pub name: String,
    /// Free-text location, e.g. "Harbour Road, Port District".
    pub location: String,
    /// Free-text status as System A writes it ("Suspended", "busy", ...).
    pub status: String,
    /// Rating on a 0-5 scale.
    pub rating: f64,
    /// Compliance score, 0-100.
    pub compliance_score: i64,
    pub allocation_restricted: bool,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// System B: Mirror Agent
// =============================================================================

/// A delivery agent as recorded by System B.
///
/// ## Back-reference Invariant
/// `external_id` is either `None` (agent created directly in System B) or
/// resolves to exactly one [`SourceAgent`]. A dangling value is reported as
/// an `orphaned_mirror_agent` conflict, never repaired silently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct MirrorAgent {
    pub id: i64,
    pub external_id: Option<i64>,
    pub name: String,
    pub zone: Zone,
    pub status: AgentStatus,
    pub performance_score: f64,
    pub compliance_score: i64,
    pub allocation_restricted: bool,
    pub training_required: bool,
    #[ts(as = "Option<String>")]
    pub last_synced_at: Option<DateTime<Utc>>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// The System B projection of a SourceAgent, ready to be upserted.
///
/// Built by [`crate::mapping::project_agent`]; carries no timestamps so that
/// two projections of the same source record compare equal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MirrorAgentDraft {
    pub external_id: i64,
    pub name: String,
    pub zone: Zone,
    pub status: AgentStatus,
    pub performance_score: f64,
    pub compliance_score: i64,
    pub allocation_restricted: bool,
}

// =============================================================================
// Catalog & Stock
// =============================================================================

/// A catalog product in System A.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    pub id: i64,
    pub sku: String,
    pub name: String,
    pub unit_price_cents: i64,
    pub is_active: bool,
}

/// Quantity System A believes is allocated to an agent for a SKU.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockAllocation {
    pub source_agent_id: i64,
    pub sku: String,
    pub allocated_quantity: i64,
}

/// Status of a stock bin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum BinStatus {
    #[default]
    Active,
    Depleted,
    Inactive,
}

impl BinStatus {
    /// Status a bin should carry for a given stock level.
    pub fn for_stock(current_stock: i64) -> Self {
        if current_stock == 0 {
            BinStatus::Depleted
        } else {
            BinStatus::Active
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BinStatus::Active => "active",
            BinStatus::Depleted => "depleted",
            BinStatus::Inactive => "inactive",
        }
    }
}

/// Stock held by a MirrorAgent for one SKU (System B).
///
/// `current_stock >= 0` always holds; `da_id` must resolve to a MirrorAgent
/// or the bin is reported as `invalid_bin_agent`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockBin {
    pub id: i64,
    pub da_id: i64,
    pub sku: String,
    pub product_name: String,
    pub current_stock: i64,
    pub unit_price_cents: i64,
    pub supplier: String,
    pub status: BinStatus,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Enforcement
// =============================================================================

/// Punitive state change applied across both stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum EnforcementActionType {
    Suspend,
    RestrictAllocation,
}

impl EnforcementActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnforcementActionType::Suspend => "suspend",
            EnforcementActionType::RestrictAllocation => "restrict_allocation",
        }
    }
}

impl std::fmt::Display for EnforcementActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EnforcementActionType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "suspend" => Ok(EnforcementActionType::Suspend),
            "restrict_allocation" | "reduce_allocation" => {
                Ok(EnforcementActionType::RestrictAllocation)
            }
            other => Err(CoreError::UnknownEnforcementAction(other.to_string())),
        }
    }
}

/// Lifecycle of an enforcement audit row.
///
/// ```text
/// pending ──► executed             (both stores updated)
///    │
///    ├──────► partially_applied    (System A updated, System B write failed)
///    │
///    └──────► failed               (System A write failed, nothing applied)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum EnforcementStatus {
    Pending,
    Executed,
    PartiallyApplied,
    Failed,
}

impl EnforcementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnforcementStatus::Pending => "pending",
            EnforcementStatus::Executed => "executed",
            EnforcementStatus::PartiallyApplied => "partially_applied",
            EnforcementStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for EnforcementStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only audit record of a punitive action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct EnforcementAction {
    pub id: String,
    pub source_agent_id: i64,
    pub mirror_agent_id: Option<i64>,
    pub action_type: EnforcementActionType,
    pub reason: String,
    pub severity: Severity,
    pub status: EnforcementStatus,
    /// JSON result payload written when the action is finalised.
    pub result: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub executed_at: Option<DateTime<Utc>>,
}

/// Audit record of one compliance action.
///
/// `previous_score` is the System A score the penalty was computed from, so
/// a replay can tell whether the System A write already happened. Shares the
/// [`EnforcementStatus`] lifecycle, except that a non-executed row may be
/// finalised again when the action is resumed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ComplianceRecord {
    pub id: String,
    pub source_agent_id: i64,
    pub mirror_agent_id: Option<i64>,
    pub action_type: ComplianceActionType,
    pub severity: Severity,
    pub reason: String,
    pub penalty: i64,
    pub previous_score: i64,
    pub new_score: i64,
    pub status: EnforcementStatus,
    pub error: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub executed_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Alerts
// =============================================================================

/// What raised a persistent alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    CriticalHealth,
    CriticalConflict,
    PartialEnforcement,
}

/// Persistent, human-actionable alert. Stays open until acknowledged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Alert {
    pub id: String,
    pub kind: AlertKind,
    pub title: String,
    pub detail: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub acknowledged_by: Option<String>,
}

impl Alert {
    pub fn is_open(&self) -> bool {
        self.acknowledged_at.is_none()
    }
}

// =============================================================================
// Sync Jobs
// =============================================================================

/// Priority lane of the sync job queue.
///
/// Workers always drain lanes in [`SyncLane::PRIORITY_ORDER`], so compliance
/// work is never starved behind bulk stock syncs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SyncLane {
    Compliance,
    High,
    Normal,
}

impl SyncLane {
    pub const PRIORITY_ORDER: [SyncLane; 3] = [SyncLane::Compliance, SyncLane::High, SyncLane::Normal];

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncLane::Compliance => "compliance",
            SyncLane::High => "high",
            SyncLane::Normal => "normal",
        }
    }
}

impl std::fmt::Display for SyncLane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Queue status of a sync job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// A unit of propagation work carried by the job queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncTask {
    Agent {
        agent_id: i64,
    },
    StockAllocation {
        agent_id: i64,
        sku: String,
        quantity: i64,
        /// When present the allocation is applied at most once.
        allocation_id: Option<String>,
    },
    ComplianceAction {
        agent_id: i64,
        action_type: String,
        severity: Severity,
        reason: String,
        /// Keys the audit record; a replay with the same id never penalises twice.
        #[serde(default)]
        action_id: Option<String>,
    },
}

impl SyncTask {
    /// Lane a task goes to when the caller does not choose one.
    pub fn default_lane(&self) -> SyncLane {
        match self {
            SyncTask::ComplianceAction { .. } => SyncLane::Compliance,
            SyncTask::Agent { .. } => SyncLane::High,
            SyncTask::StockAllocation { .. } => SyncLane::Normal,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SyncTask::Agent { .. } => "agent",
            SyncTask::StockAllocation { .. } => "stock_allocation",
            SyncTask::ComplianceAction { .. } => "compliance_action",
        }
    }

    /// True when running the task twice leaves the stores as running it once.
    ///
    /// Agent syncs are plain upserts. Stock deltas and compliance penalties
    /// are additive and need their dedup id.
    pub fn is_replay_safe(&self) -> bool {
        match self {
            SyncTask::Agent { .. } => true,
            SyncTask::StockAllocation { allocation_id, .. } => allocation_id.is_some(),
            SyncTask::ComplianceAction { action_id, .. } => action_id.is_some(),
        }
    }

    /// Fills in a fresh dedup id for additive tasks that were built without one.
    pub fn with_dedup_id(self) -> Self {
        self.with_dedup_id_from(|| uuid::Uuid::new_v4().to_string())
    }

    /// Like [`SyncTask::with_dedup_id`], with the id supplied by the caller.
    pub fn with_dedup_id_from(mut self, id: impl FnOnce() -> String) -> Self {
        match &mut self {
            SyncTask::Agent { .. } => {}
            SyncTask::StockAllocation { allocation_id, .. } => {
                allocation_id.get_or_insert_with(id);
            }
            SyncTask::ComplianceAction { action_id, .. } => {
                action_id.get_or_insert_with(id);
            }
        }
        self
    }

    /// Stable key of the entity this task touches, e.g. `agent:7`.
    pub fn entity_key(&self) -> String {
        match self {
            SyncTask::Agent { agent_id } => format!("agent:{}", agent_id),
            SyncTask::StockAllocation { agent_id, sku, .. } => format!("bin:{}:{}", agent_id, sku),
            SyncTask::ComplianceAction { agent_id, .. } => format!("compliance:{}", agent_id),
        }
    }
}

/// A queued sync job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SyncJob {
    pub id: String,
    pub lane: SyncLane,
    /// JSON-encoded [`SyncTask`].
    pub payload: String,
    pub status: JobStatus,
    pub attempts: i64,
    pub last_error: Option<String>,
    #[ts(as = "String")]
    pub available_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub started_at: Option<DateTime<Utc>>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl SyncJob {
    /// Decodes the task payload.
    pub fn task(&self) -> Result<SyncTask, serde_json::Error> {
        serde_json::from_str(&self.payload)
    }
}

/// Queue depth of one lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LaneDepth {
    pub lane: SyncLane,
    pub pending: i64,
    pub running: i64,
}

/// Entry of the failed-job ledger, consulted by timing-conflict detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct FailedSyncJob {
    pub id: i64,
    pub job_id: String,
    pub task_kind: String,
    pub entity_key: String,
    pub error: String,
    #[ts(as = "String")]
    pub failed_at: DateTime<Utc>,
}

// =============================================================================
// Sync Status (cache only)
// =============================================================================

/// Result of the latest sync attempt for one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcomeKind {
    Success,
    Failure,
}

/// Ephemeral staleness marker kept in the cache with a TTL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SyncStatusEntry {
    pub entity_key: String,
    #[ts(as = "String")]
    pub last_synced_at: DateTime<Utc>,
    pub outcome: SyncOutcomeKind,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lane_priority_order() {
        let mut lanes = vec![SyncLane::Normal, SyncLane::Compliance, SyncLane::High];
        lanes.sort();
        assert_eq!(lanes, SyncLane::PRIORITY_ORDER.to_vec());
    }

    #[test]
    fn test_task_default_lanes() {
        let compliance = SyncTask::ComplianceAction {
            agent_id: 1,
            action_type: "suspend".into(),
            severity: Severity::High,
            reason: "fraud".into(),
            action_id: None,
        };
        assert_eq!(compliance.default_lane(), SyncLane::Compliance);
        assert_eq!(SyncTask::Agent { agent_id: 1 }.default_lane(), SyncLane::High);
    }

    #[test]
    fn test_task_payload_roundtrip_shape() {
        let task = SyncTask::StockAllocation {
            agent_id: 7,
            sku: "X1".into(),
            quantity: 15,
            allocation_id: None,
        };
        let json = serde_json::to_string(&task).unwrap();
        assert!(json.contains("\"kind\":\"stock_allocation\""));
        assert_eq!(task.entity_key(), "bin:7:X1");
    }

    #[test]
    fn test_additive_tasks_need_dedup_id_for_replay() {
        let stock = SyncTask::StockAllocation {
            agent_id: 7,
            sku: "X1".into(),
            quantity: 15,
            allocation_id: None,
        };
        assert!(!stock.is_replay_safe());
        assert!(SyncTask::Agent { agent_id: 7 }.is_replay_safe());

        let stock = stock.with_dedup_id();
        assert!(stock.is_replay_safe());
        let SyncTask::StockAllocation { allocation_id: Some(first), .. } = &stock else {
            panic!("expected an allocation id");
        };
        // an existing id is kept
        let again = stock.clone().with_dedup_id();
        assert_eq!(again, stock);
        assert!(!first.is_empty());

        let legacy: SyncTask = serde_json::from_str(
            r#"{"kind":"compliance_action","agent_id":3,"action_type":"warning","severity":"low","reason":"late"}"#,
        )
        .unwrap();
        assert!(!legacy.is_replay_safe());
        let keyed = legacy.with_dedup_id_from(|| "job-7".to_string());
        assert!(matches!(keyed, SyncTask::ComplianceAction { action_id: Some(ref id), .. } if id == "job-7"));
    }

    #[test]
    fn test_enforcement_action_parsing() {
        assert_eq!(
            "reduce_allocation".parse::<EnforcementActionType>().unwrap(),
            EnforcementActionType::RestrictAllocation
        );
        assert!("fine".parse::<EnforcementActionType>().is_err());
    }

    #[test]
    fn test_bin_status_for_stock() {
        assert_eq!(BinStatus::for_stock(0), BinStatus::Depleted);
        assert_eq!(BinStatus::for_stock(3), BinStatus::Active);
    }
}
