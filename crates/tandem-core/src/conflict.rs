//! # Conflict Taxonomy
//!
//! The closed set of divergences the detector can report, their categories,
//! default severities and whether a fix can be applied without review.
//!
//! ## Lifecycle
//! ```text
//! ┌──────────┐  detect   ┌──────────┐  resolve ok   ┌──────────┐
//! │ observed │ ────────► │ pending  │ ────────────► │ resolved │ (archived)
//! └──────────┘           └────┬─────┘               └──────────┘
//!                             │ not auto-resolvable
//!                             ▼
//!                  ┌────────────────────────────┐  dismiss  ┌───────────┐
//!                  │ manual_resolution_required │ ────────► │ dismissed │
//!                  └────────────────────────────┘           └───────────┘
//! ```
//!
//! A conflict is identified across detection runs by its fingerprint
//! (type + involved entity ids); the UUID is per observation.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::error::CoreError;

// =============================================================================
// Severity
// =============================================================================

/// Ordered severity: `low < medium < high < critical`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize, TS,
)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(CoreError::UnknownSeverity(other.to_string())),
        }
    }
}

/// Default escalation point for performance variance (rating points).
pub const DEFAULT_PERFORMANCE_HIGH_ABOVE: f64 = 1.0;

/// Default escalation point for stock variance (units).
pub const DEFAULT_STOCK_HIGH_ABOVE: i64 = 50;

/// Default escalation point for compliance score difference (points).
pub const DEFAULT_COMPLIANCE_HIGH_ABOVE: i64 = 20;

/// Severity of a numeric divergence that has already crossed its reporting
/// threshold: `medium`, or `high` strictly above `high_above`.
///
/// Monotone in `magnitude`.
pub fn escalating_severity(magnitude: f64, high_above: f64) -> Severity {
    if magnitude.abs() > high_above {
        Severity::High
    } else {
        Severity::Medium
    }
}

// =============================================================================
// Category & Type
// =============================================================================

/// Dimension along which the two stores diverge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ConflictCategory {
    Identity,
    Value,
    Stock,
    Compliance,
    Timing,
    Integrity,
}

impl ConflictCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictCategory::Identity => "identity",
            ConflictCategory::Value => "value",
            ConflictCategory::Stock => "stock",
            ConflictCategory::Compliance => "compliance",
            ConflictCategory::Timing => "timing",
            ConflictCategory::Integrity => "integrity",
        }
    }
}

impl std::fmt::Display for ConflictCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every divergence the detector knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    MissingMirrorAgent,
    NameMismatch,
    PerformanceMismatch,
    ZoneMismatch,
    StatusMismatch,
    MissingSourceProduct,
    StockVariance,
    PriceMismatch,
    ComplianceScoreMismatch,
    EnforcementNotSynced,
    StaleSyncData,
    FailedSyncJob,
    OrphanedMirrorAgent,
    InvalidBinAgent,
}

impl ConflictType {
    pub const ALL: [ConflictType; 14] = [
        ConflictType::MissingMirrorAgent,
        ConflictType::NameMismatch,
        ConflictType::PerformanceMismatch,
        ConflictType::ZoneMismatch,
        ConflictType::StatusMismatch,
        ConflictType::MissingSourceProduct,
        ConflictType::StockVariance,
        ConflictType::PriceMismatch,
        ConflictType::ComplianceScoreMismatch,
        ConflictType::EnforcementNotSynced,
        ConflictType::StaleSyncData,
        ConflictType::FailedSyncJob,
        ConflictType::OrphanedMirrorAgent,
        ConflictType::InvalidBinAgent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictType::MissingMirrorAgent => "missing_mirror_agent",
            ConflictType::NameMismatch => "name_mismatch",
            ConflictType::PerformanceMismatch => "performance_mismatch",
            ConflictType::ZoneMismatch => "zone_mismatch",
            ConflictType::StatusMismatch => "status_mismatch",
            ConflictType::MissingSourceProduct => "missing_source_product",
            ConflictType::StockVariance => "stock_variance",
            ConflictType::PriceMismatch => "price_mismatch",
            ConflictType::ComplianceScoreMismatch => "compliance_score_mismatch",
            ConflictType::EnforcementNotSynced => "enforcement_not_synced",
            ConflictType::StaleSyncData => "stale_sync_data",
            ConflictType::FailedSyncJob => "failed_sync_job",
            ConflictType::OrphanedMirrorAgent => "orphaned_mirror_agent",
            ConflictType::InvalidBinAgent => "invalid_bin_agent",
        }
    }

    pub fn category(&self) -> ConflictCategory {
        use ConflictType::*;
        match self {
            MissingMirrorAgent | NameMismatch => ConflictCategory::Identity,
            PerformanceMismatch | ZoneMismatch | StatusMismatch => ConflictCategory::Value,
            MissingSourceProduct | StockVariance | PriceMismatch => ConflictCategory::Stock,
            ComplianceScoreMismatch | EnforcementNotSynced => ConflictCategory::Compliance,
            StaleSyncData | FailedSyncJob => ConflictCategory::Timing,
            OrphanedMirrorAgent | InvalidBinAgent => ConflictCategory::Integrity,
        }
    }

    /// Severity before any magnitude-based escalation.
    pub fn base_severity(&self) -> Severity {
        use ConflictType::*;
        match self {
            PriceMismatch => Severity::Low,
            NameMismatch | PerformanceMismatch | ZoneMismatch | MissingSourceProduct
            | StockVariance | ComplianceScoreMismatch | StaleSyncData => Severity::Medium,
            MissingMirrorAgent | StatusMismatch | FailedSyncJob | OrphanedMirrorAgent
            | InvalidBinAgent => Severity::High,
            EnforcementNotSynced => Severity::Critical,
        }
    }

    /// Whether the fix is deterministic and safe without human review.
    pub fn auto_resolvable(&self) -> bool {
        use ConflictType::*;
        !matches!(
            self,
            MissingSourceProduct | StockVariance | FailedSyncJob | OrphanedMirrorAgent
                | InvalidBinAgent
        )
    }

    /// Policy-class conflicts are escalated even when auto-resolved.
    pub fn always_escalated(&self) -> bool {
        matches!(self, ConflictType::EnforcementNotSynced)
    }
}

impl std::fmt::Display for ConflictType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Conflict
// =============================================================================

/// One observed divergence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Conflict {
    pub id: String,
    pub conflict_type: ConflictType,
    pub category: ConflictCategory,
    pub severity: Severity,
    pub auto_resolvable: bool,
    pub source_agent_id: Option<i64>,
    pub mirror_agent_id: Option<i64>,
    pub bin_id: Option<i64>,
    pub sku: Option<String>,
    pub job_id: Option<String>,
    pub source_value: Option<String>,
    pub mirror_value: Option<String>,
    pub message: String,
    #[ts(as = "String")]
    pub detected_at: DateTime<Utc>,
}

impl Conflict {
    /// Creates a conflict with the type's default severity and flags.
    pub fn new(conflict_type: ConflictType, message: impl Into<String>) -> Self {
        Conflict {
            id: Uuid::new_v4().to_string(),
            conflict_type,
            category: conflict_type.category(),
            severity: conflict_type.base_severity(),
            auto_resolvable: conflict_type.auto_resolvable(),
            source_agent_id: None,
            mirror_agent_id: None,
            bin_id: None,
            sku: None,
            job_id: None,
            source_value: None,
            mirror_value: None,
            message: message.into(),
            detected_at: Utc::now(),
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn source_agent(mut self, id: i64) -> Self {
        self.source_agent_id = Some(id);
        self
    }

    pub fn mirror_agent(mut self, id: i64) -> Self {
        self.mirror_agent_id = Some(id);
        self
    }

    pub fn bin(mut self, id: i64, sku: impl Into<String>) -> Self {
        self.bin_id = Some(id);
        self.sku = Some(sku.into());
        self
    }

    pub fn job(mut self, id: impl Into<String>) -> Self {
        self.job_id = Some(id.into());
        self
    }

    /// Records the two divergent values as rendered strings.
    pub fn values(mut self, source: impl ToString, mirror: impl ToString) -> Self {
        self.source_value = Some(source.to_string());
        self.mirror_value = Some(mirror.to_string());
        self
    }

    /// Stable identity of "the same divergence" across detection runs.
    pub fn fingerprint(&self) -> String {
        fn part<T: ToString>(v: &Option<T>) -> String {
            v.as_ref().map(|v| v.to_string()).unwrap_or_default()
        }

        format!(
            "{}|{}|{}|{}|{}|{}",
            self.conflict_type,
            part(&self.source_agent_id),
            part(&self.mirror_agent_id),
            part(&self.bin_id),
            part(&self.sku),
            part(&self.job_id),
        )
    }
}

// =============================================================================
// Ledger State
// =============================================================================

/// Where a conflict is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ConflictState {
    Pending,
    ManualResolutionRequired,
    Resolved,
    Dismissed,
}

impl ConflictState {
    /// Open entries count towards the backlog.
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            ConflictState::Pending | ConflictState::ManualResolutionRequired
        )
    }
}

/// A conflict as tracked by the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LedgerEntry {
    pub conflict: Conflict,
    pub state: ConflictState,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub action_taken: Option<String>,
    #[ts(as = "String")]
    pub first_seen_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub last_seen_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl LedgerEntry {
    pub fn new(conflict: Conflict) -> Self {
        let seen = conflict.detected_at;
        let state = if conflict.auto_resolvable {
            ConflictState::Pending
        } else {
            ConflictState::ManualResolutionRequired
        };
        LedgerEntry {
            conflict,
            state,
            attempts: 0,
            last_error: None,
            action_taken: None,
            first_seen_at: seen,
            last_seen_at: seen,
            resolved_at: None,
        }
    }
}

// =============================================================================
// Summary
// =============================================================================

/// Aggregate counts over a set of conflicts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ConflictSummary {
    pub total: usize,
    pub by_severity: BTreeMap<String, usize>,
    pub by_type: BTreeMap<String, usize>,
    pub by_category: BTreeMap<String, usize>,
    pub auto_resolvable: usize,
    pub manual: usize,
    pub critical: usize,
    #[ts(as = "String")]
    pub generated_at: DateTime<Utc>,
}

impl ConflictSummary {
    pub fn from_conflicts<'a, I>(conflicts: I) -> Self
    where
        I: IntoIterator<Item = &'a Conflict>,
    {
        let mut summary = ConflictSummary {
            total: 0,
            by_severity: Severity::ALL
                .iter()
                .map(|s| (s.as_str().to_string(), 0))
                .collect(),
            by_type: BTreeMap::new(),
            by_category: BTreeMap::new(),
            auto_resolvable: 0,
            manual: 0,
            critical: 0,
            generated_at: Utc::now(),
        };

        for conflict in conflicts {
            summary.total += 1;
            *summary
                .by_severity
                .entry(conflict.severity.as_str().to_string())
                .or_default() += 1;
            *summary
                .by_type
                .entry(conflict.conflict_type.as_str().to_string())
                .or_default() += 1;
            *summary
                .by_category
                .entry(conflict.category.as_str().to_string())
                .or_default() += 1;
            if conflict.auto_resolvable {
                summary.auto_resolvable += 1;
            } else {
                summary.manual += 1;
            }
            if conflict.severity == Severity::Critical {
                summary.critical += 1;
            }
        }

        summary
    }

    pub fn count_of(&self, conflict_type: ConflictType) -> usize {
        self.by_type
            .get(conflict_type.as_str())
            .copied()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::High < Severity::Critical);
        assert_eq!("CRITICAL".parse::<Severity>().unwrap(), Severity::Critical);
    }

    #[test]
    fn test_escalation_is_monotone() {
        let mut last = Severity::Low;
        for tenth in 6..40 {
            let s = escalating_severity(tenth as f64 / 10.0, DEFAULT_PERFORMANCE_HIGH_ABOVE);
            assert!(s >= last);
            last = s;
        }
        assert_eq!(escalating_severity(0.6, DEFAULT_PERFORMANCE_HIGH_ABOVE), Severity::Medium);
        assert_eq!(escalating_severity(1.2, DEFAULT_PERFORMANCE_HIGH_ABOVE), Severity::High);
        assert_eq!(escalating_severity(-51.0, DEFAULT_STOCK_HIGH_ABOVE as f64), Severity::High);
    }

    #[test]
    fn test_type_table() {
        assert_eq!(
            ConflictType::EnforcementNotSynced.base_severity(),
            Severity::Critical
        );
        assert!(ConflictType::EnforcementNotSynced.auto_resolvable());
        assert!(!ConflictType::OrphanedMirrorAgent.auto_resolvable());
        assert_eq!(
            ConflictType::InvalidBinAgent.category(),
            ConflictCategory::Integrity
        );
        assert_eq!(ConflictType::PriceMismatch.base_severity(), Severity::Low);
    }

    #[test]
    fn test_fingerprint_ignores_observation() {
        let a = Conflict::new(ConflictType::NameMismatch, "a").source_agent(3).mirror_agent(9);
        let b = Conflict::new(ConflictType::NameMismatch, "b").source_agent(3).mirror_agent(9);
        assert_ne!(a.id, b.id);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint(), "name_mismatch|3|9|||");
    }

    #[test]
    fn test_manual_conflicts_start_manual() {
        let entry = LedgerEntry::new(Conflict::new(ConflictType::StockVariance, "x"));
        assert_eq!(entry.state, ConflictState::ManualResolutionRequired);
        assert!(entry.state.is_open());
    }

    #[test]
    fn test_summary_counts() {
        let conflicts = vec![
            Conflict::new(ConflictType::EnforcementNotSynced, "x"),
            Conflict::new(ConflictType::StockVariance, "y"),
            Conflict::new(ConflictType::StockVariance, "z").with_severity(Severity::High),
        ];
        let summary = ConflictSummary::from_conflicts(&conflicts);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.critical, 1);
        assert_eq!(summary.manual, 2);
        assert_eq!(summary.count_of(ConflictType::StockVariance), 2);
        assert_eq!(summary.by_severity["low"], 0);
        assert_eq!(summary.by_category["stock"], 2);
    }
}
