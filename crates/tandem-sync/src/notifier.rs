//! # Alert Notifier
//!
//! Escalation sender. Persistent alerts live in System B; the notifier is the
//! push side (pager, chat, mail in a real deployment). The default writes a
//! structured log line.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use tandem_core::{Alert, Severity};

use crate::error::SyncResult;

/// One escalation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub severity: Severity,
    pub title: String,
    pub detail: String,
    /// Persistent alert backing this notification, if one was raised.
    pub alert_id: Option<String>,
}

impl Notification {
    pub fn new(severity: Severity, title: impl Into<String>, detail: impl Into<String>) -> Self {
        Notification {
            severity,
            title: title.into(),
            detail: detail.into(),
            alert_id: None,
        }
    }

    pub fn for_alert(severity: Severity, alert: &Alert) -> Self {
        Notification {
            severity,
            title: alert.title.clone(),
            detail: alert.detail.clone(),
            alert_id: Some(alert.id.clone()),
        }
    }
}

#[async_trait]
pub trait AlertNotifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> SyncResult<()>;
}

/// Logs escalations through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait]
impl AlertNotifier for TracingNotifier {
    async fn notify(&self, n: &Notification) -> SyncResult<()> {
        match n.severity {
            Severity::Critical | Severity::High => error!(
                severity = %n.severity,
                title = %n.title,
                detail = %n.detail,
                alert_id = ?n.alert_id,
                "ALERT"
            ),
            _ => warn!(
                severity = %n.severity,
                title = %n.title,
                detail = %n.detail,
                alert_id = ?n.alert_id,
                "ALERT"
            ),
        }
        Ok(())
    }
}
