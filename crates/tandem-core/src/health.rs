//! # Health Scoring
//!
//! Check results, report types and the score arithmetic used by the sync
//! health monitor. Collecting the metrics is I/O and lives in tandem-sync;
//! turning metrics into statuses and a score is pure and lives here.
//!
//! ```text
//! score   = healthy_checks * 100 / total_checks   (rounded down)
//!
//! score >= 90  → healthy
//! score >= 70  → warning
//! score >= 50  → unhealthy
//! otherwise    → critical
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

// =============================================================================
// Checks
// =============================================================================

/// Named health checks, in reporting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum CheckName {
    SyncRate,
    QueueBacklog,
    FailedJobs,
    ConflictBacklog,
    Cache,
    Store,
    EventBroadcast,
    EnforcementIntegrity,
}

impl CheckName {
    pub const ALL: [CheckName; 8] = [
        CheckName::SyncRate,
        CheckName::QueueBacklog,
        CheckName::FailedJobs,
        CheckName::ConflictBacklog,
        CheckName::Cache,
        CheckName::Store,
        CheckName::EventBroadcast,
        CheckName::EnforcementIntegrity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckName::SyncRate => "sync_rate",
            CheckName::QueueBacklog => "queue_backlog",
            CheckName::FailedJobs => "failed_jobs",
            CheckName::ConflictBacklog => "conflict_backlog",
            CheckName::Cache => "cache",
            CheckName::Store => "store",
            CheckName::EventBroadcast => "event_broadcast",
            CheckName::EnforcementIntegrity => "enforcement_integrity",
        }
    }
}

impl std::fmt::Display for CheckName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Healthy,
    Unhealthy,
    Critical,
}

impl CheckStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, CheckStatus::Healthy)
    }
}

/// Outcome of one check with the raw metrics it looked at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CheckResult {
    pub status: CheckStatus,
    pub message: String,
    pub metrics: BTreeMap<String, f64>,
}

impl CheckResult {
    pub fn new(status: CheckStatus, message: impl Into<String>) -> Self {
        CheckResult {
            status,
            message: message.into(),
            metrics: BTreeMap::new(),
        }
    }

    pub fn metric(mut self, key: &str, value: f64) -> Self {
        self.metrics.insert(key.to_string(), value);
        self
    }
}

// =============================================================================
// Threshold Evaluation
// =============================================================================

/// Success rate in percent. No traffic counts as fully healthy.
pub fn success_rate(successes: u64, failures: u64) -> f64 {
    let total = successes + failures;
    if total == 0 {
        100.0
    } else {
        successes as f64 * 100.0 / total as f64
    }
}

/// Evaluates a rate where higher is better.
pub fn evaluate_rate(rate: f64, healthy_at_least: f64, critical_below: f64) -> CheckStatus {
    if rate >= healthy_at_least {
        CheckStatus::Healthy
    } else if rate < critical_below {
        CheckStatus::Critical
    } else {
        CheckStatus::Unhealthy
    }
}

/// Evaluates a count where lower is better: above the threshold is
/// unhealthy, above twice the threshold is critical.
pub fn evaluate_count(value: u64, threshold: u64) -> CheckStatus {
    if value <= threshold {
        CheckStatus::Healthy
    } else if value > threshold.saturating_mul(2) {
        CheckStatus::Critical
    } else {
        CheckStatus::Unhealthy
    }
}

// =============================================================================
// Overall
// =============================================================================

/// Overall status derived from the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Healthy,
    Warning,
    Unhealthy,
    Critical,
}

impl OverallStatus {
    pub fn from_score(score: u8) -> Self {
        match score {
            90..=u8::MAX => OverallStatus::Healthy,
            70..=89 => OverallStatus::Warning,
            50..=69 => OverallStatus::Unhealthy,
            _ => OverallStatus::Critical,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OverallStatus::Healthy => "healthy",
            OverallStatus::Warning => "warning",
            OverallStatus::Unhealthy => "unhealthy",
            OverallStatus::Critical => "critical",
        }
    }
}

impl std::fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Percentage of healthy checks, rounded down. An empty set scores 100.
pub fn health_score<'a, I>(statuses: I) -> u8
where
    I: IntoIterator<Item = &'a CheckStatus>,
{
    let (healthy, total) = statuses
        .into_iter()
        .fold((0usize, 0usize), |(h, t), s| (h + usize::from(s.is_healthy()), t + 1));

    if total == 0 {
        return 100;
    }
    (healthy * 100 / total) as u8
}

// =============================================================================
// Recovery & Report
// =============================================================================

/// One auto-recovery attempt for a failing check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RecoveryAttempt {
    pub check: CheckName,
    /// Short action name, e.g. `restart_workers`.
    pub action: String,
    pub steps: Vec<String>,
    pub success: bool,
    pub error: Option<String>,
}

/// Composite health snapshot, regenerated every monitoring cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct HealthReport {
    pub checks: BTreeMap<CheckName, CheckResult>,
    pub score: u8,
    pub overall: OverallStatus,
    pub recoveries: Vec<RecoveryAttempt>,
    #[ts(as = "String")]
    pub generated_at: DateTime<Utc>,
}

impl HealthReport {
    /// Builds a report, deriving score and overall status from the checks.
    pub fn from_checks(checks: BTreeMap<CheckName, CheckResult>) -> Self {
        let score = health_score(checks.values().map(|c| &c.status));
        HealthReport {
            overall: OverallStatus::from_score(score),
            score,
            checks,
            recoveries: Vec::new(),
            generated_at: Utc::now(),
        }
    }

    /// Checks that are not healthy, in reporting order.
    pub fn failing(&self) -> Vec<CheckName> {
        self.checks
            .iter()
            .filter(|(_, c)| !c.status.is_healthy())
            .map(|(name, _)| *name)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_rounds_down() {
        let statuses = [
            CheckStatus::Healthy,
            CheckStatus::Healthy,
            CheckStatus::Unhealthy,
        ];
        assert_eq!(health_score(&statuses), 66);
        assert_eq!(health_score(&[] as &[CheckStatus]), 100);
    }

    #[test]
    fn test_overall_boundaries() {
        assert_eq!(OverallStatus::from_score(100), OverallStatus::Healthy);
        assert_eq!(OverallStatus::from_score(90), OverallStatus::Healthy);
        assert_eq!(OverallStatus::from_score(89), OverallStatus::Warning);
        assert_eq!(OverallStatus::from_score(70), OverallStatus::Warning);
        assert_eq!(OverallStatus::from_score(50), OverallStatus::Unhealthy);
        assert_eq!(OverallStatus::from_score(49), OverallStatus::Critical);
    }

    #[test]
    fn test_rate_evaluation() {
        assert_eq!(success_rate(0, 0), 100.0);
        assert_eq!(evaluate_rate(96.0, 95.0, 80.0), CheckStatus::Healthy);
        assert_eq!(evaluate_rate(90.0, 95.0, 80.0), CheckStatus::Unhealthy);
        assert_eq!(evaluate_rate(79.9, 95.0, 80.0), CheckStatus::Critical);
    }

    #[test]
    fn test_count_evaluation() {
        assert_eq!(evaluate_count(1000, 1000), CheckStatus::Healthy);
        assert_eq!(evaluate_count(1500, 1000), CheckStatus::Unhealthy);
        assert_eq!(evaluate_count(2001, 1000), CheckStatus::Critical);
    }

    #[test]
    fn test_report_from_checks() {
        let mut checks = BTreeMap::new();
        for name in CheckName::ALL {
            checks.insert(name, CheckResult::new(CheckStatus::Healthy, "ok"));
        }
        checks.insert(
            CheckName::Cache,
            CheckResult::new(CheckStatus::Critical, "unreachable"),
        );

        let report = HealthReport::from_checks(checks);
        assert_eq!(report.score, 87);
        assert_eq!(report.overall, OverallStatus::Warning);
        assert_eq!(report.failing(), vec![CheckName::Cache]);
    }
}
