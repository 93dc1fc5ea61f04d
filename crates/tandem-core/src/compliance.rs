//! # Compliance Penalties
//!
//! Deterministic `(action_type, severity) → penalty` table used by the
//! propagator when a compliance action is synced.
//!
//! ```text
//!                      low   medium   high   critical
//! warning               5       5      10       15
//! mandatory_training    5      10      15       20
//! reduce_allocation    10      15      20       30
//! suspend              20      25      30       40
//! ```
//!
//! Scores never go below zero.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::conflict::Severity;
use crate::error::CoreError;
use crate::types::EnforcementActionType;

/// Lowest penalty in the table.
pub const MIN_PENALTY: i64 = 5;

/// Highest penalty in the table.
pub const MAX_PENALTY: i64 = 40;

/// Compliance action types accepted from System A.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceActionType {
    Warning,
    MandatoryTraining,
    ReduceAllocation,
    Suspend,
}

impl ComplianceActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplianceActionType::Warning => "warning",
            ComplianceActionType::MandatoryTraining => "mandatory_training",
            ComplianceActionType::ReduceAllocation => "reduce_allocation",
            ComplianceActionType::Suspend => "suspend",
        }
    }

    /// Penalty in compliance points for this action at the given severity.
    pub fn penalty(&self, severity: Severity) -> i64 {
        use ComplianceActionType::*;
        use Severity::*;

        match (self, severity) {
            (Warning, Low) => 5,
            (Warning, Medium) => 5,
            (Warning, High) => 10,
            (Warning, Critical) => 15,
            (MandatoryTraining, Low) => 5,
            (MandatoryTraining, Medium) => 10,
            (MandatoryTraining, High) => 15,
            (MandatoryTraining, Critical) => 20,
            (ReduceAllocation, Low) => 10,
            (ReduceAllocation, Medium) => 15,
            (ReduceAllocation, High) => 20,
            (ReduceAllocation, Critical) => 30,
            (Suspend, Low) => 20,
            (Suspend, Medium) => 25,
            (Suspend, High) => 30,
            (Suspend, Critical) => 40,
        }
    }

    /// Side effect this action has beyond the score change.
    pub fn side_effect(&self) -> ComplianceSideEffect {
        match self {
            ComplianceActionType::Warning => ComplianceSideEffect::None,
            ComplianceActionType::MandatoryTraining => ComplianceSideEffect::RequireTraining,
            ComplianceActionType::ReduceAllocation => {
                ComplianceSideEffect::Enforce(EnforcementActionType::RestrictAllocation)
            }
            ComplianceActionType::Suspend => {
                ComplianceSideEffect::Enforce(EnforcementActionType::Suspend)
            }
        }
    }
}

impl std::fmt::Display for ComplianceActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ComplianceActionType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace([' ', '-'], "_").as_str() {
            "warning" | "warn" => Ok(ComplianceActionType::Warning),
            "mandatory_training" | "training" => Ok(ComplianceActionType::MandatoryTraining),
            "reduce_allocation" | "restrict_allocation" => Ok(ComplianceActionType::ReduceAllocation),
            "suspend" | "suspension" => Ok(ComplianceActionType::Suspend),
            other => Err(CoreError::UnknownComplianceAction(other.to_string())),
        }
    }
}

/// State change driven by a compliance action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComplianceSideEffect {
    None,
    /// Set `training_required` on the MirrorAgent.
    RequireTraining,
    /// Run the enforcement trigger.
    Enforce(EnforcementActionType),
}

/// Applies a penalty to a score, flooring at zero.
pub fn apply_penalty(score: i64, penalty: i64) -> i64 {
    (score - penalty).max(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_ACTIONS: [ComplianceActionType; 4] = [
        ComplianceActionType::Warning,
        ComplianceActionType::MandatoryTraining,
        ComplianceActionType::ReduceAllocation,
        ComplianceActionType::Suspend,
    ];

    const ALL_SEVERITIES: [Severity; 4] =
        [Severity::Low, Severity::Medium, Severity::High, Severity::Critical];

    #[test]
    fn test_penalties_within_bounds() {
        for action in ALL_ACTIONS {
            for severity in ALL_SEVERITIES {
                let p = action.penalty(severity);
                assert!((MIN_PENALTY..=MAX_PENALTY).contains(&p), "{action} {severity:?} = {p}");
            }
        }
    }

    #[test]
    fn test_penalty_grows_with_severity() {
        for action in ALL_ACTIONS {
            let penalties: Vec<i64> = ALL_SEVERITIES.iter().map(|s| action.penalty(*s)).collect();
            assert!(penalties.windows(2).all(|w| w[0] <= w[1]));
        }
    }

    #[test]
    fn test_score_floor() {
        assert_eq!(apply_penalty(12, 40), 0);
        assert_eq!(apply_penalty(80, 25), 55);
    }

    #[test]
    fn test_side_effects() {
        assert_eq!(
            ComplianceActionType::Suspend.side_effect(),
            ComplianceSideEffect::Enforce(EnforcementActionType::Suspend)
        );
        assert_eq!(
            "mandatory training".parse::<ComplianceActionType>().unwrap().side_effect(),
            ComplianceSideEffect::RequireTraining
        );
        assert!("demote".parse::<ComplianceActionType>().is_err());
    }
}
