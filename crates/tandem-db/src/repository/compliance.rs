//! # Compliance Action Repository
//!
//! Audit of compliance penalties, keyed by action id. Unlike enforcement
//! rows, a row that has not reached `executed` may be finalised again: a
//! replayed action resumes from where the previous attempt stopped.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::error::{DbError, DbResult};
use tandem_core::{ComplianceRecord, EnforcementStatus};

const COLUMNS: &str = r#"
    id, source_agent_id, mirror_agent_id, action_type, severity, reason,
    penalty, previous_score, new_score, status, error, created_at, executed_at
"#;

#[derive(Debug, Clone)]
pub struct ComplianceActionRepository {
    pool: SqlitePool,
}

impl ComplianceActionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ComplianceActionRepository { pool }
    }

    pub async fn insert(&self, record: &ComplianceRecord) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO compliance_actions (
                id, source_agent_id, mirror_agent_id, action_type, severity, reason,
                penalty, previous_score, new_score, status, error, created_at, executed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(&record.id)
        .bind(record.source_agent_id)
        .bind(record.mirror_agent_id)
        .bind(record.action_type)
        .bind(record.severity)
        .bind(&record.reason)
        .bind(record.penalty)
        .bind(record.previous_score)
        .bind(record.new_score)
        .bind(record.status)
        .bind(&record.error)
        .bind(record.created_at)
        .bind(record.executed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Records the outcome of an attempt.
    ///
    /// Executed rows are final; finalising one again is a `NotFound`.
    pub async fn finalize(
        &self,
        id: &str,
        status: EnforcementStatus,
        error: Option<&str>,
        executed_at: Option<DateTime<Utc>>,
    ) -> DbResult<ComplianceRecord> {
        let record = sqlx::query_as::<_, ComplianceRecord>(&format!(
            r#"
            UPDATE compliance_actions SET
                status = ?2,
                error = ?3,
                executed_at = COALESCE(?4, executed_at)
            WHERE id = ?1 AND status != 'executed'
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id)
        .bind(status)
        .bind(error)
        .bind(executed_at)
        .fetch_optional(&self.pool)
        .await?;

        record.ok_or_else(|| DbError::not_found("Open compliance action", id))
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<ComplianceRecord>> {
        let record = sqlx::query_as::<_, ComplianceRecord>(&format!(
            "SELECT {COLUMNS} FROM compliance_actions WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    pub async fn list_by_status(&self, status: EnforcementStatus) -> DbResult<Vec<ComplianceRecord>> {
        let records = sqlx::query_as::<_, ComplianceRecord>(&format!(
            "SELECT {COLUMNS} FROM compliance_actions WHERE status = ?1 ORDER BY created_at"
        ))
        .bind(status)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    pub async fn count_by_status(&self, status: EnforcementStatus) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM compliance_actions WHERE status = ?1")
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
    use tandem_core::{ComplianceActionType, Severity};

    fn pending(id: &str) -> ComplianceRecord {
        ComplianceRecord {
            id: id.to_string(),
            source_agent_id: 4,
            mirror_agent_id: Some(2),
            action_type: ComplianceActionType::MandatoryTraining,
            severity: Severity::Medium,
            reason: "late deliveries".into(),
            penalty: 10,
            previous_score: 82,
            new_score: 72,
            status: EnforcementStatus::Pending,
            error: None,
            created_at: Utc::now(),
            executed_at: None,
        }
    }

    #[tokio::test]
    async fn test_partial_row_can_be_resumed_once() {
        let db = MirrorDatabase::in_memory().await.unwrap();
        let repo = db.compliance_actions();
        repo.insert(&pending("c1")).await.unwrap();

        let partial = repo
            .finalize("c1", EnforcementStatus::PartiallyApplied, Some("mirror down"), Some(Utc::now()))
            .await
            .unwrap();
        assert_eq!(partial.status, EnforcementStatus::PartiallyApplied);
        assert_eq!(partial.error.as_deref(), Some("mirror down"));
        assert_eq!(repo.count_by_status(EnforcementStatus::PartiallyApplied).await.unwrap(), 1);

        let done = repo
            .finalize("c1", EnforcementStatus::Executed, None, Some(Utc::now()))
            .await
            .unwrap();
        assert_eq!(done.status, EnforcementStatus::Executed);
        assert!(done.error.is_none());
        assert_eq!(repo.count_by_status(EnforcementStatus::PartiallyApplied).await.unwrap(), 0);

        let again = repo
            .finalize("c1", EnforcementStatus::Failed, Some("late"), None)
            .await;
        assert!(matches!(again, Err(DbError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_roundtrips_scores_and_type() {
        let db = MirrorDatabase::in_memory().await.unwrap();
        let repo = db.compliance_actions();
        repo.insert(&pending("c2")).await.unwrap();

        let stored = repo.get("c2").await.unwrap().unwrap();
        assert_eq!(stored.action_type, ComplianceActionType::MandatoryTraining);
        assert_eq!((stored.previous_score, stored.new_score), (82, 72));
        assert_eq!(repo.list_by_status(EnforcementStatus::Pending).await.unwrap().len(), 1);
        assert!(repo.get("missing").await.unwrap().is_none());
        // duplicate ids are rejected
        assert!(repo.insert(&pending("c2")).await.is_err());
    }
}
