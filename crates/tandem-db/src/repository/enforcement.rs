//! # Enforcement Repository
//!
//! Append-only audit of punitive actions. A row is inserted as `pending`
//! and finalised exactly once; rows are never deleted.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::error::{DbError, DbResult};
use tandem_core::{EnforcementAction, EnforcementStatus};

const COLUMNS: &str = r#"
    id, source_agent_id, mirror_agent_id, action_type, reason, severity,
    status, result, created_at, executed_at
"#;

#[derive(Debug, Clone)]
pub struct EnforcementRepository {
    pool: SqlitePool,
}

impl EnforcementRepository {
    pub fn new(pool: SqlitePool) -> Self {
        EnforcementRepository { pool }
    }

    pub async fn insert(&self, action: &EnforcementAction) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO enforcement_actions (
                id, source_agent_id, mirror_agent_id, action_type, reason, severity,
                status, result, created_at, executed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&action.id)
        .bind(action.source_agent_id)
        .bind(action.mirror_agent_id)
        .bind(action.action_type)
        .bind(&action.reason)
        .bind(action.severity)
        .bind(action.status)
        .bind(&action.result)
        .bind(action.created_at)
        .bind(action.executed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Moves a pending row to its final status.
    ///
    /// Only `pending` rows are finalised; finalising twice is a `NotFound`.
    pub async fn finalize(
        &self,
        id: &str,
        status: EnforcementStatus,
        mirror_agent_id: Option<i64>,
        result: &str,
        executed_at: Option<DateTime<Utc>>,
    ) -> DbResult<EnforcementAction> {
        let action = sqlx::query_as::<_, EnforcementAction>(&format!(
            r#"
            UPDATE enforcement_actions SET
                status = ?2,
                mirror_agent_id = COALESCE(?3, mirror_agent_id),
                result = ?4,
                executed_at = ?5
            WHERE id = ?1 AND status = 'pending'
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id)
        .bind(status)
        .bind(mirror_agent_id)
        .bind(result)
        .bind(executed_at)
        .fetch_optional(&self.pool)
        .await?;

        action.ok_or_else(|| DbError::not_found("Pending enforcement action", id))
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<EnforcementAction>> {
        let action = sqlx::query_as::<_, EnforcementAction>(&format!(
            "SELECT {COLUMNS} FROM enforcement_actions WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(action)
    }

    /// Most recent actions first.
    pub async fn recent(&self, limit: u32) -> DbResult<Vec<EnforcementAction>> {
        let actions = sqlx::query_as::<_, EnforcementAction>(&format!(
            "SELECT {COLUMNS} FROM enforcement_actions ORDER BY created_at DESC LIMIT ?1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(actions)
    }

    pub async fn list_by_status(&self, status: EnforcementStatus) -> DbResult<Vec<EnforcementAction>> {
        let actions = sqlx::query_as::<_, EnforcementAction>(&format!(
            "SELECT {COLUMNS} FROM enforcement_actions WHERE status = ?1 ORDER BY created_at"
        ))
        .bind(status)
        .fetch_all(&self.pool)
        .await?;
        Ok(actions)
    }

    pub async fn count_by_status(&self, status: EnforcementStatus) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM enforcement_actions WHERE status = ?1")
                .bind(status)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::MirrorDatabase;
    use tandem_core::{EnforcementActionType, Severity};

    fn pending(id: &str) -> EnforcementAction {
        EnforcementAction {
            id: id.to_string(),
            source_agent_id: 4,
            mirror_agent_id: None,
            action_type: EnforcementActionType::Suspend,
            reason: "repeated no-shows".into(),
            severity: Severity::High,
            status: EnforcementStatus::Pending,
            result: None,
            created_at: Utc::now(),
            executed_at: None,
        }
    }

    #[tokio::test]
    async fn test_finalize_once() {
        let db = MirrorDatabase::in_memory().await.unwrap();
        let repo = db.enforcement();
        repo.insert(&pending("e1")).await.unwrap();

        let done = repo
            .finalize("e1", EnforcementStatus::Executed, Some(9), "{}", Some(Utc::now()))
            .await
            .unwrap();
        assert_eq!(done.status, EnforcementStatus::Executed);
        assert_eq!(done.mirror_agent_id, Some(9));

        let again = repo
            .finalize("e1", EnforcementStatus::Failed, None, "{}", None)
            .await;
        assert!(matches!(again, Err(DbError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_counts_and_recent() {
        let db = MirrorDatabase::in_memory().await.unwrap();
        let repo = db.enforcement();
        repo.insert(&pending("a")).await.unwrap();
        repo.insert(&pending("b")).await.unwrap();
        repo.finalize("b", EnforcementStatus::PartiallyApplied, None, "{}", Some(Utc::now()))
            .await
            .unwrap();

        assert_eq!(repo.count_by_status(EnforcementStatus::PartiallyApplied).await.unwrap(), 1);
        assert_eq!(repo.list_by_status(EnforcementStatus::Pending).await.unwrap().len(), 1);
        assert_eq!(repo.recent(10).await.unwrap().len(), 2);
        assert_eq!(repo.get("a").await.unwrap().unwrap().reason, "repeated no-shows");
    }
}
