//! # Conflict Ledger
//!
//! In-process record of open conflicts, shared by the detector (writer), the
//! resolver (consumer) and the health monitor (reader).
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  detect_all()                                                           │
//! │     │  record_run(conflicts)                                            │
//! │     ▼                                                                   │
//! │  open (keyed by fingerprint)                                            │
//! │     ├── pending ─────────── resolver ──► resolved ──┐                   │
//! │     │     └── failure: attempts + 1, last_error     │                   │
//! │     ├── manual_resolution_required                  ├──► archive        │
//! │     │     └── dismiss_conflict ──► dismissed ───────┤   (bounded)       │
//! │     └── not observed in the next run ──► resolved ──┘                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A divergence seen again in a later run keeps the id it was first given,
//! so ids handed out by one detection run stay valid for `dismiss_conflict`.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;

use tandem_core::conflict::{ConflictState, LedgerEntry};
use tandem_core::{Conflict, ConflictSummary};

/// Resolved and dismissed entries kept for inspection.
pub const DEFAULT_ARCHIVE_CAPACITY: usize = 500;

/// Counts from one detection run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordOutcome {
    pub inserted: usize,
    pub refreshed: usize,
    pub pruned: usize,
}

#[derive(Default)]
struct LedgerState {
    open: HashMap<String, LedgerEntry>,
    archive: VecDeque<LedgerEntry>,
    detection_failure: Option<String>,
}

pub struct ConflictLedger {
    state: RwLock<LedgerState>,
    archive_capacity: usize,
}

impl Default for ConflictLedger {
    fn default() -> Self {
        Self::new(DEFAULT_ARCHIVE_CAPACITY)
    }
}

impl ConflictLedger {
    pub fn new(archive_capacity: usize) -> Self {
        ConflictLedger {
            state: RwLock::new(LedgerState::default()),
            archive_capacity,
        }
    }

    /// Merges one detection run into the ledger.
    ///
    /// Conflicts already open keep their ledger id (written back into
    /// `conflicts`); open entries not observed in this run are pruned.
    /// A successful run also clears any recorded detection failure.
    pub async fn record_run(&self, conflicts: &mut [Conflict]) -> RecordOutcome {
        let now = Utc::now();
        let mut state = self.state.write().await;
        let mut outcome = RecordOutcome::default();
        let mut seen = HashSet::with_capacity(conflicts.len());

        for conflict in conflicts.iter_mut() {
            let fingerprint = conflict.fingerprint();
            match state.open.get_mut(&fingerprint) {
                Some(entry) => {
                    conflict.id = entry.conflict.id.clone();
                    entry.conflict = conflict.clone();
                    entry.last_seen_at = conflict.detected_at;
                    outcome.refreshed += 1;
                }
                None => {
                    state
                        .open
                        .insert(fingerprint.clone(), LedgerEntry::new(conflict.clone()));
                    outcome.inserted += 1;
                }
            }
            seen.insert(fingerprint);
        }

        let gone: Vec<String> = state
            .open
            .keys()
            .filter(|fp| !seen.contains(*fp))
            .cloned()
            .collect();
        for fingerprint in gone {
            if let Some(mut entry) = state.open.remove(&fingerprint) {
                entry.state = ConflictState::Resolved;
                entry.action_taken = Some("no longer observed".into());
                entry.resolved_at = Some(now);
                self.push_archive(&mut state, entry);
                outcome.pruned += 1;
            }
        }

        state.detection_failure = None;
        debug!(
            inserted = outcome.inserted,
            refreshed = outcome.refreshed,
            pruned = outcome.pruned,
            open = state.open.len(),
            "Conflict ledger updated"
        );
        outcome
    }

    /// Entries waiting for the automatic resolver.
    pub async fn pending(&self) -> Vec<LedgerEntry> {
        let state = self.state.read().await;
        let mut entries: Vec<LedgerEntry> = state
            .open
            .values()
            .filter(|e| e.state == ConflictState::Pending)
            .cloned()
            .collect();
        // most severe first, then oldest
        entries.sort_by(|a, b| {
            b.conflict
                .severity
                .cmp(&a.conflict.severity)
                .then(a.first_seen_at.cmp(&b.first_seen_at))
        });
        entries
    }

    pub async fn open_entries(&self) -> Vec<LedgerEntry> {
        self.state.read().await.open.values().cloned().collect()
    }

    pub async fn open_len(&self) -> usize {
        self.state.read().await.open.len()
    }

    /// Summary over every open conflict.
    pub async fn summary(&self) -> ConflictSummary {
        let state = self.state.read().await;
        ConflictSummary::from_conflicts(state.open.values().map(|e| &e.conflict))
    }

    /// Looks an entry up by conflict id, open entries first.
    pub async fn get(&self, id: &str) -> Option<LedgerEntry> {
        let state = self.state.read().await;
        state
            .open
            .values()
            .chain(state.archive.iter())
            .find(|e| e.conflict.id == id)
            .cloned()
    }

    pub async fn mark_resolved(&self, id: &str, action: &str) -> bool {
        let mut state = self.state.write().await;
        match take_open(&mut state, id) {
            Some(mut entry) => {
                entry.state = ConflictState::Resolved;
                entry.attempts += 1;
                entry.action_taken = Some(action.to_string());
                entry.last_error = None;
                entry.resolved_at = Some(Utc::now());
                self.push_archive(&mut state, entry);
                true
            }
            None => false,
        }
    }

    pub async fn mark_failed(&self, id: &str, error: &str) -> bool {
        let mut state = self.state.write().await;
        match state.open.values_mut().find(|e| e.conflict.id == id) {
            Some(entry) => {
                entry.attempts += 1;
                entry.last_error = Some(error.to_string());
                true
            }
            None => false,
        }
    }

    pub async fn mark_manual(&self, id: &str) -> bool {
        let mut state = self.state.write().await;
        match state.open.values_mut().find(|e| e.conflict.id == id) {
            Some(entry) => {
                entry.state = ConflictState::ManualResolutionRequired;
                true
            }
            None => false,
        }
    }

    /// Clears an open conflict by hand. Returns the archived entry.
    pub async fn dismiss(&self, id: &str, by: &str) -> Option<LedgerEntry> {
        let mut state = self.state.write().await;
        let mut entry = take_open(&mut state, id)?;
        entry.state = ConflictState::Dismissed;
        entry.action_taken = Some(format!("dismissed by {}", by));
        entry.resolved_at = Some(Utc::now());
        self.push_archive(&mut state, entry.clone());
        Some(entry)
    }

    /// Archived entries, newest first.
    pub async fn archived(&self, limit: usize) -> Vec<LedgerEntry> {
        let state = self.state.read().await;
        state.archive.iter().rev().take(limit).cloned().collect()
    }

    pub async fn set_detection_failure(&self, error: impl Into<String>) {
        self.state.write().await.detection_failure = Some(error.into());
    }

    /// Set while the most recent detection run failed.
    pub async fn detection_failure(&self) -> Option<String> {
        self.state.read().await.detection_failure.clone()
    }

    fn push_archive(&self, state: &mut LedgerState, entry: LedgerEntry) {
        state.archive.push_back(entry);
        while state.archive.len() > self.archive_capacity {
            state.archive.pop_front();
        }
    }
}

fn take_open(state: &mut LedgerState, id: &str) -> Option<LedgerEntry> {
    let fingerprint = state
        .open
        .iter()
        .find(|(_, e)| e.conflict.id == id)
        .map(|(fp, _)| fp.clone())?;
    state.open.remove(&fingerprint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_core::{ConflictType, Severity};

    fn name_mismatch(agent: i64) -> Conflict {
        Conflict::new(ConflictType::NameMismatch, "names differ")
            .source_agent(agent)
            .mirror_agent(agent + 100)
            .values("Amina", "Amina Y.")
    }

    #[tokio::test]
    async fn test_same_divergence_keeps_id() {
        let ledger = ConflictLedger::default();

        let mut first = vec![name_mismatch(1)];
        let outcome = ledger.record_run(&mut first).await;
        assert_eq!(outcome.inserted, 1);

        let mut second = vec![name_mismatch(1)];
        let outcome = ledger.record_run(&mut second).await;
        assert_eq!(outcome.refreshed, 1);
        assert_eq!(second[0].id, first[0].id);
        assert_eq!(ledger.open_len().await, 1);
    }

    #[tokio::test]
    async fn test_prune_unobserved() {
        let ledger = ConflictLedger::default();
        let mut run = vec![name_mismatch(1), name_mismatch(2)];
        ledger.record_run(&mut run).await;

        let mut next = vec![name_mismatch(2)];
        let outcome = ledger.record_run(&mut next).await;
        assert_eq!(outcome.pruned, 1);

        let archived = ledger.get(&run[0].id).await.unwrap();
        assert_eq!(archived.state, ConflictState::Resolved);
    }

    #[tokio::test]
    async fn test_resolve_fail_dismiss() {
        let ledger = ConflictLedger::default();
        let stock = Conflict::new(ConflictType::StockVariance, "variance")
            .bin(5, "X1")
            .with_severity(Severity::High);
        let mut run = vec![name_mismatch(1), stock];
        ledger.record_run(&mut run).await;

        // Only the auto-resolvable one is pending.
        let pending = ledger.pending().await;
        assert_eq!(pending.len(), 1);

        assert!(ledger.mark_failed(&run[0].id, "store timeout").await);
        assert_eq!(ledger.get(&run[0].id).await.unwrap().attempts, 1);
        assert!(ledger.mark_resolved(&run[0].id, "resynced agent 1").await);
        assert!(!ledger.mark_resolved(&run[0].id, "again").await);

        let dismissed = ledger.dismiss(&run[1].id, "ops").await.unwrap();
        assert_eq!(dismissed.state, ConflictState::Dismissed);
        assert_eq!(ledger.summary().await.total, 0);
        assert_eq!(ledger.archived(10).await.len(), 2);
    }

    #[tokio::test]
    async fn test_archive_is_bounded() {
        let ledger = ConflictLedger::new(2);
        for agent in 0..5 {
            let mut run = vec![name_mismatch(agent)];
            ledger.record_run(&mut run).await;
            ledger.mark_resolved(&run[0].id, "resynced").await;
        }
        assert_eq!(ledger.archived(10).await.len(), 2);
    }

    #[tokio::test]
    async fn test_detection_failure_cleared_by_run() {
        let ledger = ConflictLedger::default();
        ledger.set_detection_failure("source unreachable").await;
        assert!(ledger.detection_failure().await.is_some());
        ledger.record_run(&mut []).await;
        assert!(ledger.detection_failure().await.is_none());
    }
}
