//! # Mirror Agent Repository
//!
//! System B agents. Agent sync is a single upsert keyed by `external_id`:
//!
//! ```text
//! INSERT INTO mirror_agents (...) VALUES (...)
//! ON CONFLICT (external_id) DO UPDATE SET ...   ← same input twice changes
//!                                                 only the timestamps
//! ```
//!
//! `training_required` is never touched by the upsert; only compliance
//! actions set it.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use tandem_core::{AgentStatus, MirrorAgent, MirrorAgentDraft, Zone};

const COLUMNS: &str = r#"
    id, external_id, name, zone, status, performance_score, compliance_score,
    allocation_restricted, training_required, last_synced_at, created_at, updated_at
"#;

#[derive(Debug, Clone)]
pub struct MirrorAgentRepository {
    pool: SqlitePool,
}

impl MirrorAgentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        MirrorAgentRepository { pool }
    }

    /// Upserts the projection of a source agent and stamps `last_synced_at`.
    pub async fn upsert_from_source(
        &self,
        draft: &MirrorAgentDraft,
        synced_at: DateTime<Utc>,
    ) -> DbResult<MirrorAgent> {
        debug!(external_id = draft.external_id, zone = %draft.zone, status = %draft.status, "Upserting mirror agent");

        let agent = sqlx::query_as::<_, MirrorAgent>(&format!(
            r#"
            INSERT INTO mirror_agents (
                external_id, name, zone, status, performance_score, compliance_score,
                allocation_restricted, training_required, last_synced_at, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8, ?8, ?8)
            ON CONFLICT (external_id) DO UPDATE SET
                name = excluded.name,
                zone = excluded.zone,
                status = excluded.status,
                performance_score = excluded.performance_score,
                compliance_score = excluded.compliance_score,
                allocation_restricted = excluded.allocation_restricted,
                last_synced_at = excluded.last_synced_at,
                updated_at = excluded.updated_at
            RETURNING {COLUMNS}
            "#
        ))
        .bind(draft.external_id)
        .bind(&draft.name)
        .bind(draft.zone)
        .bind(draft.status)
        .bind(draft.performance_score)
        .bind(draft.compliance_score)
        .bind(draft.allocation_restricted)
        .bind(synced_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(agent)
    }

    /// Creates an agent that exists only in System B (no back-reference).
    pub async fn insert_unlinked(&self, name: &str, zone: Zone) -> DbResult<MirrorAgent> {
        let now = Utc::now();
        let agent = sqlx::query_as::<_, MirrorAgent>(&format!(
            r#"
            INSERT INTO mirror_agents (
                external_id, name, zone, status, performance_score, compliance_score,
                allocation_restricted, training_required, last_synced_at, created_at, updated_at
            ) VALUES (NULL, ?1, ?2, 'active', 0, 100, 0, 0, NULL, ?3, ?3)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(name)
        .bind(zone)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(agent)
    }

    pub async fn get(&self, id: i64) -> DbResult<Option<MirrorAgent>> {
        let agent = sqlx::query_as::<_, MirrorAgent>(&format!(
            "SELECT {COLUMNS} FROM mirror_agents WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(agent)
    }

    pub async fn get_by_external_id(&self, external_id: i64) -> DbResult<Option<MirrorAgent>> {
        let agent = sqlx::query_as::<_, MirrorAgent>(&format!(
            "SELECT {COLUMNS} FROM mirror_agents WHERE external_id = ?1"
        ))
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(agent)
    }

    pub async fn list_all(&self) -> DbResult<Vec<MirrorAgent>> {
        let agents = sqlx::query_as::<_, MirrorAgent>(&format!(
            "SELECT {COLUMNS} FROM mirror_agents ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(agents)
    }

    pub async fn set_status(&self, id: i64, status: AgentStatus) -> DbResult<bool> {
        let result = sqlx::query("UPDATE mirror_agents SET status = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(id)
            .bind(status)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_allocation_restricted(&self, id: i64, restricted: bool) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE mirror_agents SET allocation_restricted = ?2, updated_at = ?3 WHERE id = ?1",
        )
        .bind(id)
        .bind(restricted)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_compliance_score(&self, id: i64, score: i64) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE mirror_agents SET compliance_score = ?2, updated_at = ?3 WHERE id = ?1",
        )
        .bind(id)
        .bind(score)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_training_required(&self, id: i64, required: bool) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE mirror_agents SET training_required = ?2, updated_at = ?3 WHERE id = ?1",
        )
        .bind(id)
        .bind(required)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Overwrites `last_synced_at`. Used to age records in tests and tools.
    pub async fn set_last_synced_at(&self, id: i64, at: Option<DateTime<Utc>>) -> DbResult<bool> {
        let result = sqlx::query("UPDATE mirror_agents SET last_synced_at = ?2 WHERE id = ?1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Renames an agent directly in System B.
    pub async fn rename(&self, id: i64, name: &str) -> DbResult<bool> {
        let result = sqlx::query("UPDATE mirror_agents SET name = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(id)
            .bind(name)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM mirror_agents")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::MirrorDatabase;

    fn draft(external_id: i64) -> MirrorAgentDraft {
        MirrorAgentDraft {
            external_id,
            name: "Amina Yusuf".into(),
            zone: Zone::Coastal,
            status: AgentStatus::Active,
            performance_score: 4.8,
            compliance_score: 90,
            allocation_restricted: false,
        }
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let db = MirrorDatabase::in_memory().await.unwrap();
        let repo = db.agents();

        let first = repo.upsert_from_source(&draft(3), Utc::now()).await.unwrap();
        let second = repo.upsert_from_source(&draft(3), Utc::now()).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.name, second.name);
        assert_eq!(first.zone, second.zone);
        assert_eq!(first.created_at, second.created_at);
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_upsert_keeps_training_flag() {
        let db = MirrorDatabase::in_memory().await.unwrap();
        let repo = db.agents();

        let agent = repo.upsert_from_source(&draft(3), Utc::now()).await.unwrap();
        repo.set_training_required(agent.id, true).await.unwrap();
        let again = repo.upsert_from_source(&draft(3), Utc::now()).await.unwrap();

        assert!(again.training_required);
    }

    #[tokio::test]
    async fn test_unlinked_agents_coexist() {
        let db = MirrorDatabase::in_memory().await.unwrap();
        let repo = db.agents();

        let a = repo.insert_unlinked("Walk-in A", Zone::North).await.unwrap();
        let b = repo.insert_unlinked("Walk-in B", Zone::North).await.unwrap();

        assert_ne!(a.id, b.id);
        assert_eq!(a.external_id, None);
        assert!(repo.get_by_external_id(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_status_and_flags() {
        let db = MirrorDatabase::in_memory().await.unwrap();
        let repo = db.agents();
        let agent = repo.upsert_from_source(&draft(5), Utc::now()).await.unwrap();

        repo.set_status(agent.id, AgentStatus::Suspended).await.unwrap();
        repo.set_allocation_restricted(agent.id, true).await.unwrap();
        repo.set_compliance_score(agent.id, 12).await.unwrap();

        let stored = repo.get(agent.id).await.unwrap().unwrap();
        assert_eq!(stored.status, AgentStatus::Suspended);
        assert!(stored.allocation_restricted);
        assert_eq!(stored.compliance_score, 12);
    }
}
