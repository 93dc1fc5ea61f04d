//! # Conflict Detector
//!
//! Batch scan of both stores producing typed, severity-ranked divergences.
//!
//! ## Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  per SourceAgent (projected with the propagator's mapping)              │
//! │    no mirror ─────────────────────────────► missing_mirror_agent        │
//! │    name / zone differ ────────────────────► name_ / zone_mismatch       │
//! │    |rating − performance| > threshold ────► performance_mismatch        │
//! │    source suspended, mirror not ──────────► enforcement_not_synced      │
//! │    other status difference ───────────────► status_mismatch             │
//! │    |score diff| > threshold ──────────────► compliance_score_mismatch   │
//! │                                                                         │
//! │  per linked MirrorAgent                                                 │
//! │    never synced / older than window ──────► stale_sync_data             │
//! │    external id resolves to nothing ───────► orphaned_mirror_agent       │
//! │                                                                         │
//! │  per StockBin                                                           │
//! │    da_id resolves to nothing ─────────────► invalid_bin_agent           │
//! │    SKU not in catalog ────────────────────► missing_source_product      │
//! │    price ≠ catalog price ─────────────────► price_mismatch              │
//! │    |stock − allocation| > threshold ──────► stock_variance              │
//! │                                                                         │
//! │  failed-job ledger within lookback ───────► failed_sync_job             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The rules are pure functions over a [`DetectionSnapshot`]; the
//! [`ConflictDetector`] loads the snapshot, guards against overlapping runs
//! and feeds the ledger.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use tandem_core::conflict::escalating_severity;
use tandem_core::mapping::{is_source_suspended, project_agent};
use tandem_core::{
    AgentStatus, AlertKind, Conflict, ConflictCategory, ConflictSummary, ConflictType,
    FailedSyncJob, MirrorAgent, Severity, SourceAgent, StockAllocation, StockBin, ZoneTable,
};

use crate::cache::{get_json, set_json};
use crate::catalog::CatalogEntry;
use crate::config::DetectionSettings;
use crate::context::EngineContext;
use crate::error::{SyncError, SyncResult};
use crate::events::SyncEvent;
use crate::ledger::ConflictLedger;

const RUN_NAME: &str = "detection";

// =============================================================================
// Snapshot & Report
// =============================================================================

/// Everything one detection run reads, loaded up front.
#[derive(Debug, Clone, Default)]
pub struct DetectionSnapshot {
    pub source_agents: Vec<SourceAgent>,
    pub mirror_agents: Vec<MirrorAgent>,
    pub catalog: HashMap<String, CatalogEntry>,
    pub allocations: Vec<StockAllocation>,
    pub bins: Vec<StockBin>,
    pub failed_jobs: Vec<FailedSyncJob>,
}

/// Conflicts of one run, grouped the way dashboards show them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionReport {
    /// Identity and value conflicts.
    pub agent_conflicts: Vec<Conflict>,
    pub stock_conflicts: Vec<Conflict>,
    pub compliance_conflicts: Vec<Conflict>,
    pub timing_conflicts: Vec<Conflict>,
    pub integrity_conflicts: Vec<Conflict>,
    pub summary: ConflictSummary,
}

impl DetectionReport {
    pub fn from_conflicts(conflicts: Vec<Conflict>) -> Self {
        let summary = ConflictSummary::from_conflicts(&conflicts);
        let mut report = DetectionReport {
            agent_conflicts: Vec::new(),
            stock_conflicts: Vec::new(),
            compliance_conflicts: Vec::new(),
            timing_conflicts: Vec::new(),
            integrity_conflicts: Vec::new(),
            summary,
        };

        for conflict in conflicts {
            let bucket = match conflict.category {
                ConflictCategory::Identity | ConflictCategory::Value => &mut report.agent_conflicts,
                ConflictCategory::Stock => &mut report.stock_conflicts,
                ConflictCategory::Compliance => &mut report.compliance_conflicts,
                ConflictCategory::Timing => &mut report.timing_conflicts,
                ConflictCategory::Integrity => &mut report.integrity_conflicts,
            };
            bucket.push(conflict);
        }

        for bucket in [
            &mut report.agent_conflicts,
            &mut report.stock_conflicts,
            &mut report.compliance_conflicts,
            &mut report.timing_conflicts,
            &mut report.integrity_conflicts,
        ] {
            bucket.sort_by(|a, b| b.severity.cmp(&a.severity));
        }

        report
    }

    pub fn all(&self) -> impl Iterator<Item = &Conflict> {
        self.agent_conflicts
            .iter()
            .chain(&self.stock_conflicts)
            .chain(&self.compliance_conflicts)
            .chain(&self.timing_conflicts)
            .chain(&self.integrity_conflicts)
    }

    pub fn total(&self) -> usize {
        self.summary.total
    }
}

// =============================================================================
// Rules
// =============================================================================

/// Runs every rule over the snapshot.
pub fn detect(
    snapshot: &DetectionSnapshot,
    settings: &DetectionSettings,
    zones: &ZoneTable,
    now: DateTime<Utc>,
) -> Vec<Conflict> {
    let mirror_by_external: HashMap<i64, &MirrorAgent> = snapshot
        .mirror_agents
        .iter()
        .filter_map(|m| m.external_id.map(|ext| (ext, m)))
        .collect();

    let mut conflicts = Vec::new();
    conflicts.extend(agent_conflicts(snapshot, &mirror_by_external, settings, zones));
    conflicts.extend(stock_conflicts(snapshot, settings));
    conflicts.extend(timing_conflicts(snapshot, settings, now));
    conflicts.extend(integrity_conflicts(snapshot));
    conflicts
}

/// Identity, value and compliance rules per source agent.
pub fn agent_conflicts(
    snapshot: &DetectionSnapshot,
    mirror_by_external: &HashMap<i64, &MirrorAgent>,
    settings: &DetectionSettings,
    zones: &ZoneTable,
) -> Vec<Conflict> {
    let mut out = Vec::new();

    for source in &snapshot.source_agents {
        let Some(mirror) = mirror_by_external.get(&source.id) else {
            out.push(
                Conflict::new(
                    ConflictType::MissingMirrorAgent,
                    format!("Source agent {} has no mirror agent", source.id),
                )
                .source_agent(source.id),
            );
            continue;
        };

        let (draft, _) = project_agent(source, zones);
        let pair = |ty: ConflictType, message: String| {
            Conflict::new(ty, message)
                .source_agent(source.id)
                .mirror_agent(mirror.id)
        };

        if draft.name != mirror.name {
            out.push(
                pair(ConflictType::NameMismatch, format!("Name differs for agent {}", source.id))
                    .values(&draft.name, &mirror.name),
            );
        }

        let variance = (draft.performance_score - mirror.performance_score).abs();
        if variance > settings.performance_variance_threshold {
            out.push(
                pair(
                    ConflictType::PerformanceMismatch,
                    format!("Performance differs by {:.2} for agent {}", variance, source.id),
                )
                .with_severity(escalating_severity(variance, settings.performance_high_above))
                .values(draft.performance_score, mirror.performance_score),
            );
        }

        if draft.zone != mirror.zone {
            out.push(
                pair(ConflictType::ZoneMismatch, format!("Zone differs for agent {}", source.id))
                    .values(draft.zone, mirror.zone),
            );
        }

        if is_source_suspended(&source.status) && mirror.status != AgentStatus::Suspended {
            out.push(
                pair(
                    ConflictType::EnforcementNotSynced,
                    format!("Agent {} is suspended in System A but not in System B", source.id),
                )
                .values(&source.status, mirror.status),
            );
        } else if draft.status != mirror.status {
            out.push(
                pair(ConflictType::StatusMismatch, format!("Status differs for agent {}", source.id))
                    .values(draft.status, mirror.status),
            );
        }

        let diff = (draft.compliance_score - mirror.compliance_score).abs();
        if diff > settings.compliance_diff_threshold {
            out.push(
                pair(
                    ConflictType::ComplianceScoreMismatch,
                    format!("Compliance score differs by {} for agent {}", diff, source.id),
                )
                .with_severity(escalating_severity(diff as f64, settings.compliance_high_above as f64))
                .values(draft.compliance_score, mirror.compliance_score),
            );
        }
    }

    out
}

/// Catalog, price and allocation rules per bin with a valid owner.
pub fn stock_conflicts(snapshot: &DetectionSnapshot, settings: &DetectionSettings) -> Vec<Conflict> {
    let owners: HashMap<i64, &MirrorAgent> =
        snapshot.mirror_agents.iter().map(|m| (m.id, m)).collect();
    let allocations: HashMap<(i64, &str), i64> = snapshot
        .allocations
        .iter()
        .map(|a| ((a.source_agent_id, a.sku.as_str()), a.allocated_quantity))
        .collect();

    let mut out = Vec::new();
    for bin in &snapshot.bins {
        let Some(owner) = owners.get(&bin.da_id) else {
            continue;
        };

        match snapshot.catalog.get(&bin.sku) {
            None => out.push(
                Conflict::new(
                    ConflictType::MissingSourceProduct,
                    format!("SKU {} in bin {} is not in the product catalog", bin.sku, bin.id),
                )
                .bin(bin.id, &bin.sku)
                .mirror_agent(owner.id),
            ),
            Some(entry) if entry.unit_price_cents != bin.unit_price_cents => out.push(
                Conflict::new(
                    ConflictType::PriceMismatch,
                    format!("Price of {} in bin {} differs from catalog", bin.sku, bin.id),
                )
                .bin(bin.id, &bin.sku)
                .mirror_agent(owner.id)
                .values(entry.unit_price_cents, bin.unit_price_cents),
            ),
            Some(_) => {}
        }

        // Bins without an allocation record in System A have nothing to compare.
        let expected = owner
            .external_id
            .and_then(|ext| allocations.get(&(ext, bin.sku.as_str())).copied());
        if let Some(expected) = expected {
            let variance = (bin.current_stock - expected).abs();
            if variance > settings.stock_variance_threshold {
                let mut conflict = Conflict::new(
                    ConflictType::StockVariance,
                    format!(
                        "Bin {} holds {} of {}, allocation is {}",
                        bin.id, bin.current_stock, bin.sku, expected
                    ),
                )
                .with_severity(escalating_severity(variance as f64, settings.stock_high_above as f64))
                .bin(bin.id, &bin.sku)
                .mirror_agent(owner.id)
                .values(expected, bin.current_stock);
                if let Some(ext) = owner.external_id {
                    conflict = conflict.source_agent(ext);
                }
                out.push(conflict);
            }
        }
    }

    out
}

/// Staleness of linked mirror agents and recent failed jobs.
pub fn timing_conflicts(
    snapshot: &DetectionSnapshot,
    settings: &DetectionSettings,
    now: DateTime<Utc>,
) -> Vec<Conflict> {
    let sources: HashSet<i64> = snapshot.source_agents.iter().map(|s| s.id).collect();
    let window = chrono::Duration::seconds(settings.staleness_window_secs as i64);
    let mut out = Vec::new();

    for mirror in &snapshot.mirror_agents {
        let Some(ext) = mirror.external_id.filter(|ext| sources.contains(ext)) else {
            continue;
        };

        let stale = match mirror.last_synced_at {
            None => true,
            Some(at) => now - at > window,
        };
        if stale {
            let last = mirror
                .last_synced_at
                .map(|at| at.to_rfc3339())
                .unwrap_or_else(|| "never".to_string());
            out.push(
                Conflict::new(
                    ConflictType::StaleSyncData,
                    format!("Mirror agent {} last synced {}", mirror.id, last),
                )
                .source_agent(ext)
                .mirror_agent(mirror.id)
                .values(now.to_rfc3339(), last),
            );
        }
    }

    for job in &snapshot.failed_jobs {
        out.push(
            Conflict::new(
                ConflictType::FailedSyncJob,
                format!("{} job for {} failed: {}", job.task_kind, job.entity_key, job.error),
            )
            .job(&job.job_id),
        );
    }

    out
}

/// Dangling references between the stores.
pub fn integrity_conflicts(snapshot: &DetectionSnapshot) -> Vec<Conflict> {
    let sources: HashSet<i64> = snapshot.source_agents.iter().map(|s| s.id).collect();
    let mirrors: HashSet<i64> = snapshot.mirror_agents.iter().map(|m| m.id).collect();
    let mut out = Vec::new();

    for mirror in &snapshot.mirror_agents {
        if let Some(ext) = mirror.external_id.filter(|ext| !sources.contains(ext)) {
            out.push(
                Conflict::new(
                    ConflictType::OrphanedMirrorAgent,
                    format!("Mirror agent {} points at missing source agent {}", mirror.id, ext),
                )
                .mirror_agent(mirror.id)
                .values(ext, mirror.id),
            );
        }
    }

    for bin in snapshot.bins.iter().filter(|b| !mirrors.contains(&b.da_id)) {
        out.push(
            Conflict::new(
                ConflictType::InvalidBinAgent,
                format!("Bin {} belongs to missing mirror agent {}", bin.id, bin.da_id),
            )
            .bin(bin.id, &bin.sku)
            .values("none", bin.da_id),
        );
    }

    out
}

// =============================================================================
// Detector
// =============================================================================

pub struct ConflictDetector {
    ctx: EngineContext,
    ledger: Arc<ConflictLedger>,
    settings: DetectionSettings,
}

impl ConflictDetector {
    pub fn new(ctx: EngineContext, ledger: Arc<ConflictLedger>, settings: DetectionSettings) -> Self {
        ConflictDetector { ctx, ledger, settings }
    }

    /// Runs every rule, records the result in the ledger and caches the
    /// summary.
    ///
    /// Returns `RunInProgress` when another run holds the marker. Any other
    /// failure blocks auto-resolution until the next successful run.
    pub async fn detect_all(&self) -> SyncResult<DetectionReport> {
        let marker_ttl = Duration::from_secs(self.settings.run_marker_ttl_secs);
        let guarded = match self.ctx.begin_run(RUN_NAME, marker_ttl).await {
            Ok(()) => true,
            Err(e @ SyncError::RunInProgress { .. }) => {
                info!("Detection skipped, previous run still in progress");
                return Err(e);
            }
            Err(e) => {
                warn!(error = %e, "Run marker unavailable, detecting without it");
                false
            }
        };

        let result = self.run().await;
        if guarded {
            self.ctx.end_run(RUN_NAME).await;
        }

        if let Err(e) = &result {
            error!(error = %e, "Conflict detection failed, auto-resolution blocked");
            self.ledger.set_detection_failure(e.to_string()).await;
        }
        result
    }

    /// Cached summary, else a fresh run, else the ledger's view.
    pub async fn summary(&self) -> SyncResult<ConflictSummary> {
        let key = self.ctx.keys.conflict_summary();
        let cached = self
            .ctx
            .deadlines
            .cache("cache.get_summary", get_json::<ConflictSummary>(self.ctx.cache.as_ref(), &key))
            .await;
        match cached {
            Ok(Some(summary)) => return Ok(summary),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Summary cache read failed"),
        }

        match self.detect_all().await {
            Ok(report) => Ok(report.summary),
            Err(SyncError::RunInProgress { .. }) => Ok(self.ledger.summary().await),
            Err(e) => Err(e),
        }
    }

    async fn run(&self) -> SyncResult<DetectionReport> {
        let started = std::time::Instant::now();
        let now = Utc::now();
        let snapshot = self.snapshot(now).await?;

        let mut conflicts = detect(&snapshot, &self.settings, &self.ctx.zones, now);
        let delta = self.ledger.record_run(&mut conflicts).await;
        let report = DetectionReport::from_conflicts(conflicts);

        let key = self.ctx.keys.conflict_summary();
        let ttl = Duration::from_secs(self.settings.summary_ttl_secs);
        if let Err(e) = self
            .ctx
            .deadlines
            .cache(
                "cache.set_summary",
                set_json(self.ctx.cache.as_ref(), &key, &report.summary, Some(ttl)),
            )
            .await
        {
            warn!(error = %e, "Failed to cache conflict summary");
        }

        for conflict in report.all().filter(|c| c.severity == Severity::Critical) {
            self.ctx
                .raise_alert(
                    AlertKind::CriticalConflict,
                    Severity::Critical,
                    &format!("Critical conflict: {}", conflict.fingerprint()),
                    &conflict.message,
                )
                .await;
        }

        self.ctx.publish(SyncEvent::ConflictsDetected {
            total: report.summary.total,
            critical: report.summary.critical,
        });

        info!(
            total = report.summary.total,
            critical = report.summary.critical,
            auto_resolvable = report.summary.auto_resolvable,
            new = delta.inserted,
            cleared = delta.pruned,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Conflict detection complete"
        );
        Ok(report)
    }

    async fn snapshot(&self, now: DateTime<Utc>) -> SyncResult<DetectionSnapshot> {
        let ctx = &self.ctx;
        let d = &ctx.deadlines;
        let lookback = chrono::Duration::seconds(self.settings.failed_job_lookback_secs as i64);

        Ok(DetectionSnapshot {
            source_agents: d.store("source.list_agents", ctx.source.agents().list_all()).await?,
            mirror_agents: d.store("mirror.list_agents", ctx.mirror.agents().list_all()).await?,
            catalog: d.store("catalog.snapshot", ctx.catalog.snapshot()).await?,
            allocations: d
                .store("source.list_allocations", ctx.source.allocations().list_all())
                .await?,
            bins: d.store("mirror.list_bins", ctx.mirror.bins().list_all()).await?,
            failed_jobs: d
                .store("mirror.failed_jobs_since", ctx.mirror.failed_jobs().list_since(now - lookback))
                .await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_core::{BinStatus, Zone};

    fn source(id: i64) -> SourceAgent {
        SourceAgent {
            id,
            name: "Bola".into(),
            location: "Airport Road".into(),
            status: "active".into(),
            rating: 4.0,
            compliance_score: 80,
            allocation_restricted: false,
            updated_at: Utc::now(),
        }
    }

    fn mirror(id: i64, external_id: Option<i64>) -> MirrorAgent {
        let now = Utc::now();
        MirrorAgent {
            id,
            external_id,
            name: "Bola".into(),
            zone: Zone::East,
            status: AgentStatus::Active,
            performance_score: 4.0,
            compliance_score: 80,
            allocation_restricted: false,
            training_required: false,
            last_synced_at: Some(now),
            created_at: now,
            updated_at: now,
        }
    }

    fn bin(id: i64, da_id: i64, sku: &str, stock: i64, price: i64) -> StockBin {
        StockBin {
            id,
            da_id,
            sku: sku.into(),
            product_name: sku.into(),
            current_stock: stock,
            unit_price_cents: price,
            supplier: "system_a".into(),
            status: BinStatus::for_stock(stock),
            updated_at: Utc::now(),
        }
    }

    fn catalog(entries: &[(&str, i64)]) -> HashMap<String, CatalogEntry> {
        entries
            .iter()
            .map(|(sku, price)| {
                (
                    sku.to_string(),
                    CatalogEntry {
                        sku: sku.to_string(),
                        name: sku.to_string(),
                        unit_price_cents: *price,
                    },
                )
            })
            .collect()
    }

    fn run(snapshot: &DetectionSnapshot) -> Vec<Conflict> {
        detect(snapshot, &DetectionSettings::default(), &ZoneTable::builtin(), Utc::now())
    }

    fn types(conflicts: &[Conflict]) -> Vec<ConflictType> {
        conflicts.iter().map(|c| c.conflict_type).collect()
    }

    #[test]
    fn test_consistent_pair_is_clean() {
        let snapshot = DetectionSnapshot {
            source_agents: vec![source(1)],
            mirror_agents: vec![mirror(10, Some(1))],
            ..Default::default()
        };
        assert!(run(&snapshot).is_empty());
    }

    #[test]
    fn test_suspension_suppresses_status_mismatch() {
        let mut s = source(1);
        s.status = "Suspended".into();
        let snapshot = DetectionSnapshot {
            source_agents: vec![s],
            mirror_agents: vec![mirror(10, Some(1))],
            ..Default::default()
        };
        let conflicts = run(&snapshot);
        assert_eq!(types(&conflicts), vec![ConflictType::EnforcementNotSynced]);
        assert_eq!(conflicts[0].severity, Severity::Critical);
        assert!(conflicts[0].auto_resolvable);
    }

    #[test]
    fn test_value_rules() {
        let mut s = source(1);
        s.name = "Bola Ade".into();
        s.rating = 2.5;
        s.compliance_score = 50;
        s.status = "offline".into();
        let snapshot = DetectionSnapshot {
            source_agents: vec![s],
            mirror_agents: vec![mirror(10, Some(1))],
            ..Default::default()
        };
        let conflicts = run(&snapshot);
        let found = types(&conflicts);
        assert!(found.contains(&ConflictType::NameMismatch));
        assert!(found.contains(&ConflictType::StatusMismatch));

        let perf = conflicts
            .iter()
            .find(|c| c.conflict_type == ConflictType::PerformanceMismatch)
            .unwrap();
        assert_eq!(perf.severity, Severity::High);
        let compliance = conflicts
            .iter()
            .find(|c| c.conflict_type == ConflictType::ComplianceScoreMismatch)
            .unwrap();
        assert_eq!(compliance.severity, Severity::High);
    }

    #[test]
    fn test_thresholds_are_exclusive() {
        let mut s = source(1);
        s.rating = 3.5;
        s.compliance_score = 75;
        let snapshot = DetectionSnapshot {
            source_agents: vec![s],
            mirror_agents: vec![mirror(10, Some(1))],
            ..Default::default()
        };
        // 0.5 rating points and 5 compliance points sit exactly on the thresholds.
        assert!(run(&snapshot).is_empty());
    }

    #[test]
    fn test_configured_cutoffs_drive_severity() {
        let mut s = source(1);
        s.compliance_score = 68;
        let snapshot = DetectionSnapshot {
            source_agents: vec![s],
            mirror_agents: vec![mirror(10, Some(1))],
            catalog: catalog(&[("X1", 120)]),
            allocations: vec![StockAllocation {
                source_agent_id: 1,
                sku: "X1".into(),
                allocated_quantity: 40,
            }],
            bins: vec![bin(1, 10, "X1", 70, 120)],
            failed_jobs: vec![],
        };
        let severity_of = |conflicts: &[Conflict], kind: ConflictType| {
            conflicts
                .iter()
                .find(|c| c.conflict_type == kind)
                .map(|c| c.severity)
        };

        // 12 compliance points and 30 units stay medium under the defaults
        let conflicts = run(&snapshot);
        assert_eq!(severity_of(&conflicts, ConflictType::ComplianceScoreMismatch), Some(Severity::Medium));
        assert_eq!(severity_of(&conflicts, ConflictType::StockVariance), Some(Severity::Medium));

        let settings = DetectionSettings {
            compliance_high_above: 10,
            stock_high_above: 25,
            ..Default::default()
        };
        let conflicts = detect(&snapshot, &settings, &ZoneTable::builtin(), Utc::now());
        assert_eq!(severity_of(&conflicts, ConflictType::ComplianceScoreMismatch), Some(Severity::High));
        assert_eq!(severity_of(&conflicts, ConflictType::StockVariance), Some(Severity::High));
    }

    #[test]
    fn test_stock_rules() {
        let snapshot = DetectionSnapshot {
            source_agents: vec![source(1)],
            mirror_agents: vec![mirror(10, Some(1))],
            catalog: catalog(&[("X1", 120), ("X2", 300)]),
            allocations: vec![StockAllocation {
                source_agent_id: 1,
                sku: "X1".into(),
                allocated_quantity: 40,
            }],
            bins: vec![
                bin(1, 10, "X1", 100, 120),
                bin(2, 10, "X2", 5, 250),
                bin(3, 10, "X9", 5, 0),
                bin(4, 99, "X1", 5, 120),
            ],
            failed_jobs: vec![],
        };
        let conflicts = run(&snapshot);

        let variance = conflicts
            .iter()
            .find(|c| c.conflict_type == ConflictType::StockVariance)
            .unwrap();
        assert_eq!(variance.bin_id, Some(1));
        assert_eq!(variance.severity, Severity::High);

        let price = conflicts
            .iter()
            .find(|c| c.conflict_type == ConflictType::PriceMismatch)
            .unwrap();
        assert_eq!(price.bin_id, Some(2));

        let missing = conflicts
            .iter()
            .find(|c| c.conflict_type == ConflictType::MissingSourceProduct)
            .unwrap();
        assert_eq!(missing.bin_id, Some(3));

        let invalid = conflicts
            .iter()
            .find(|c| c.conflict_type == ConflictType::InvalidBinAgent)
            .unwrap();
        assert_eq!(invalid.bin_id, Some(4));
        // The invalid bin is not checked for price or stock.
        assert_eq!(conflicts.iter().filter(|c| c.bin_id == Some(4)).count(), 1);
    }

    #[test]
    fn test_timing_and_integrity() {
        let mut stale = mirror(10, Some(1));
        stale.last_synced_at = Some(Utc::now() - chrono::Duration::hours(2));
        let mut never = mirror(11, Some(2));
        never.last_synced_at = None;
        let unlinked = mirror(12, None);
        let orphan = mirror(13, Some(404));

        let snapshot = DetectionSnapshot {
            source_agents: vec![source(1), source(2)],
            mirror_agents: vec![stale, never, unlinked, orphan],
            failed_jobs: vec![FailedSyncJob {
                id: 1,
                job_id: "job-1".into(),
                task_kind: "agent".into(),
                entity_key: "agent:3".into(),
                error: "timeout".into(),
                failed_at: Utc::now(),
            }],
            ..Default::default()
        };
        let conflicts = run(&snapshot);
        let count = |ty| conflicts.iter().filter(|c| c.conflict_type == ty).count();

        assert_eq!(count(ConflictType::StaleSyncData), 2);
        assert_eq!(count(ConflictType::FailedSyncJob), 1);
        assert_eq!(count(ConflictType::OrphanedMirrorAgent), 1);
        assert_eq!(conflicts.len(), 4);
    }

    #[test]
    fn test_report_groups_and_ranks() {
        let mut s = source(1);
        s.status = "suspended".into();
        s.compliance_score = 60;
        let snapshot = DetectionSnapshot {
            source_agents: vec![s, source(2)],
            mirror_agents: vec![mirror(10, Some(1))],
            ..Default::default()
        };
        let report = DetectionReport::from_conflicts(run(&snapshot));

        assert_eq!(report.agent_conflicts.len(), 1);
        assert_eq!(report.compliance_conflicts.len(), 2);
        assert_eq!(
            report.compliance_conflicts[0].conflict_type,
            ConflictType::EnforcementNotSynced
        );
        assert_eq!(report.summary.total, 3);
        assert_eq!(report.summary.critical, 1);
    }
}
