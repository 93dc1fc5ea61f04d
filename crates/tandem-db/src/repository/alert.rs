//! # Alert Repository
//!
//! Persistent alerts stay open until someone acknowledges them. Raising an
//! alert whose kind and title match an open one returns the open one, so a
//! condition observed every cycle yields a single alert.

use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use tandem_core::{Alert, AlertKind};

const COLUMNS: &str = "id, kind, title, detail, created_at, acknowledged_at, acknowledged_by";

#[derive(Debug, Clone)]
pub struct AlertRepository {
    pool: SqlitePool,
}

impl AlertRepository {
    pub fn new(pool: SqlitePool) -> Self {
        AlertRepository { pool }
    }

    /// Opens an alert unless an identical one is already open.
    ///
    /// Returns the alert and whether it was newly created.
    pub async fn raise(&self, kind: AlertKind, title: &str, detail: &str) -> DbResult<(Alert, bool)> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query_as::<_, Alert>(&format!(
            r#"
            SELECT {COLUMNS} FROM alerts
            WHERE kind = ?1 AND title = ?2 AND acknowledged_at IS NULL
            LIMIT 1
            "#
        ))
        .bind(kind)
        .bind(title)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(alert) = existing {
            tx.commit().await?;
            return Ok((alert, false));
        }

        let alert = Alert {
            id: Uuid::new_v4().to_string(),
            kind,
            title: title.to_string(),
            detail: detail.to_string(),
            created_at: Utc::now(),
            acknowledged_at: None,
            acknowledged_by: None,
        };

        sqlx::query(
            "INSERT INTO alerts (id, kind, title, detail, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&alert.id)
        .bind(alert.kind)
        .bind(&alert.title)
        .bind(&alert.detail)
        .bind(alert.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((alert, true))
    }

    /// Acknowledges an alert. Acknowledging twice keeps the first stamp.
    pub async fn acknowledge(&self, id: &str, by: &str) -> DbResult<Alert> {
        sqlx::query(
            r#"
            UPDATE alerts SET acknowledged_at = ?2, acknowledged_by = ?3
            WHERE id = ?1 AND acknowledged_at IS NULL
            "#,
        )
        .bind(id)
        .bind(Utc::now())
        .bind(by)
        .execute(&self.pool)
        .await?;

        self.get(id)
            .await?
            .ok_or_else(|| DbError::not_found("Alert", id))
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<Alert>> {
        let alert = sqlx::query_as::<_, Alert>(&format!("SELECT {COLUMNS} FROM alerts WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(alert)
    }

    /// Unacknowledged alerts, newest first.
    pub async fn list_open(&self, limit: u32) -> DbResult<Vec<Alert>> {
        let alerts = sqlx::query_as::<_, Alert>(&format!(
            r#"
            SELECT {COLUMNS} FROM alerts
            WHERE acknowledged_at IS NULL
            ORDER BY created_at DESC
            LIMIT ?1
            "#
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(alerts)
    }

    pub async fn count_open(&self) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM alerts WHERE acknowledged_at IS NULL")
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::MirrorDatabase;

    #[tokio::test]
    async fn test_raise_deduplicates_open_alerts() {
        let db = MirrorDatabase::in_memory().await.unwrap();
        let repo = db.alerts();

        let (first, created) = repo
            .raise(AlertKind::CriticalHealth, "Sync health critical", "score 37")
            .await
            .unwrap();
        assert!(created);

        let (second, created) = repo
            .raise(AlertKind::CriticalHealth, "Sync health critical", "score 25")
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);
        assert_eq!(repo.count_open().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_acknowledge_reopens_slot() {
        let db = MirrorDatabase::in_memory().await.unwrap();
        let repo = db.alerts();

        let (alert, _) = repo
            .raise(AlertKind::PartialEnforcement, "Partial enforcement", "agent 4")
            .await
            .unwrap();
        let acked = repo.acknowledge(&alert.id, "ops@tandem").await.unwrap();
        assert!(!acked.is_open());
        assert_eq!(acked.acknowledged_by.as_deref(), Some("ops@tandem"));

        let again = repo.acknowledge(&alert.id, "someone-else").await.unwrap();
        assert_eq!(again.acknowledged_by.as_deref(), Some("ops@tandem"));

        let (_, created) = repo
            .raise(AlertKind::PartialEnforcement, "Partial enforcement", "agent 4")
            .await
            .unwrap();
        assert!(created);
        assert_eq!(repo.list_open(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_acknowledge_unknown() {
        let db = MirrorDatabase::in_memory().await.unwrap();
        let err = db.alerts().acknowledge("missing", "ops").await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }
}
