//! # Event Broadcasting
//!
//! Real-time domain events for dashboards and other listeners. Publishing is
//! best effort: a failed publish is logged by the caller and never fails the
//! operation that produced the event.
//!
//! ```text
//! Propagator / Enforcement / Detector / Monitor
//!        │ publish(SyncEvent)
//!        ▼
//! broadcast::Sender ──► subscriber 1 (dashboard feed)
//!                   └─► subscriber 2 ...
//! ```

use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use tandem_core::{EnforcementActionType, EnforcementStatus, OverallStatus};

use crate::error::{SyncError, SyncResult};

/// Buffered events per subscriber before the slowest one starts lagging.
const EVENT_BUFFER: usize = 256;

/// Domain events published by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    AgentSynced {
        source_agent_id: i64,
        mirror_agent_id: i64,
    },
    StockSynced {
        agent_id: i64,
        sku: String,
        bin_id: i64,
        current_stock: i64,
    },
    ComplianceApplied {
        agent_id: i64,
        action_type: String,
        new_compliance_score: i64,
    },
    EnforcementApplied {
        action_id: String,
        agent_id: i64,
        action_type: EnforcementActionType,
        status: EnforcementStatus,
    },
    ConflictsDetected {
        total: usize,
        critical: usize,
    },
    HealthEvaluated {
        score: u8,
        overall: OverallStatus,
    },
}

/// Real-time event sink.
pub trait EventBroadcaster: Send + Sync {
    fn publish(&self, event: SyncEvent) -> SyncResult<()>;

    /// Whether publishing currently works. Checked by the health monitor.
    fn is_reachable(&self) -> bool;
}

/// In-process broadcaster over `tokio::sync::broadcast`.
pub struct BroadcastEvents {
    tx: broadcast::Sender<SyncEvent>,
    open: AtomicBool,
}

impl BroadcastEvents {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_BUFFER);
        BroadcastEvents {
            tx,
            open: AtomicBool::new(true),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    /// Stops accepting events. Used at shutdown.
    pub fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }
}

impl Default for BroadcastEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBroadcaster for BroadcastEvents {
    fn publish(&self, event: SyncEvent) -> SyncResult<()> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(SyncError::ChannelError("event broadcaster closed".into()));
        }
        // No subscribers is not an error: nobody is listening right now.
        let _ = self.tx.send(event);
        Ok(())
    }

    fn is_reachable(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}
