//! # Engine Context
//!
//! Collaborators shared by every engine component. Cloned into each one;
//! every field is a cheap handle.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          EngineContext                                  │
//! │                                                                         │
//! │  source ─── System A pool        cache ──── CacheClient + CacheKeys    │
//! │  mirror ─── System B pool        events ─── EventBroadcaster           │
//! │  catalog ── ProductCatalog       notifier ─ AlertNotifier              │
//! │  zones ──── ZoneTable            deadlines  store / cache timeouts     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, warn};

use tandem_core::{Alert, AlertKind, Severity, ZoneTable};
use tandem_db::{MirrorDatabase, SourceDatabase};

use crate::cache::{CacheClient, CacheKeys, MemoryCache};
use crate::catalog::{ProductCatalog, SourceCatalog};
use crate::deadline::Deadlines;
use crate::error::{SyncError, SyncResult};
use crate::events::{BroadcastEvents, EventBroadcaster, SyncEvent};
use crate::notifier::{AlertNotifier, Notification, TracingNotifier};

#[derive(Clone)]
pub struct EngineContext {
    pub source: SourceDatabase,
    pub mirror: MirrorDatabase,
    pub cache: Arc<dyn CacheClient>,
    pub keys: CacheKeys,
    pub catalog: Arc<dyn ProductCatalog>,
    pub events: Arc<dyn EventBroadcaster>,
    pub notifier: Arc<dyn AlertNotifier>,
    pub zones: Arc<ZoneTable>,
    pub deadlines: Deadlines,
}

impl EngineContext {
    /// Context with the default collaborators: in-memory cache, System A
    /// catalog, broadcast events, log notifier and the built-in zone table.
    pub fn with_defaults(source: SourceDatabase, mirror: MirrorDatabase) -> Self {
        EngineContext {
            catalog: Arc::new(SourceCatalog::new(source.clone())),
            source,
            mirror,
            cache: Arc::new(MemoryCache::default()),
            keys: CacheKeys::new("tandem"),
            events: Arc::new(BroadcastEvents::new()),
            notifier: Arc::new(TracingNotifier),
            zones: Arc::new(ZoneTable::builtin()),
            deadlines: Deadlines::default(),
        }
    }

    /// Publishes an event. Failures are logged and dropped.
    pub fn publish(&self, event: SyncEvent) {
        if let Err(e) = self.events.publish(event) {
            debug!(error = %e, "Event publish failed");
        }
    }

    /// Raises a persistent alert and notifies when it is newly opened.
    ///
    /// An alert of the same kind and title that is still open is reused and
    /// not notified again. Store failures are logged; the notification is
    /// still sent so the escalation is not lost.
    pub async fn raise_alert(
        &self,
        kind: AlertKind,
        severity: Severity,
        title: &str,
        detail: &str,
    ) -> Option<Alert> {
        let raised = self
            .deadlines
            .store("mirror.raise_alert", self.mirror.alerts().raise(kind, title, detail))
            .await;

        match raised {
            Ok((alert, true)) => {
                self.notify(&Notification::for_alert(severity, &alert)).await;
                Some(alert)
            }
            Ok((alert, false)) => {
                debug!(alert_id = %alert.id, title = %title, "Alert already open");
                Some(alert)
            }
            Err(e) => {
                error!(error = %e, title = %title, "Failed to persist alert");
                self.notify(&Notification::new(severity, title, detail)).await;
                None
            }
        }
    }

    /// Sends a notification, logging failures.
    pub async fn notify(&self, notification: &Notification) {
        if let Err(e) = self.notifier.notify(notification).await {
            warn!(error = %e, title = %notification.title, "Notification failed");
        }
    }

    /// Takes the run-in-progress marker for `run`.
    pub async fn begin_run(&self, run: &str, ttl: Duration) -> SyncResult<()> {
        let key = self.keys.run_marker(run);
        let taken = self
            .deadlines
            .cache("cache.set_nx", self.cache.set_nx(&key, "1", ttl))
            .await?;
        if taken {
            Ok(())
        } else {
            Err(SyncError::RunInProgress { run: run.to_string() })
        }
    }

    /// Releases the marker. A failed release leaves it to expire by TTL.
    pub async fn end_run(&self, run: &str) {
        let key = self.keys.run_marker(run);
        if let Err(e) = self
            .deadlines
            .cache("cache.delete", self.cache.delete(&key))
            .await
        {
            warn!(run = %run, error = %e, "Failed to release run marker");
        }
    }
}
