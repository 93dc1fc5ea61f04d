//! # Source Agent Repository
//!
//! System A agents. The engine mostly reads them; the enforcement trigger
//! writes status, restriction and compliance score back.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use tandem_core::SourceAgent;

const SELECT_COLUMNS: &str = r#"
    SELECT id, name, location, status, rating, compliance_score,
           allocation_restricted, updated_at
    FROM source_agents
"#;

#[derive(Debug, Clone)]
pub struct SourceAgentRepository {
    pool: SqlitePool,
}

impl SourceAgentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SourceAgentRepository { pool }
    }

    pub async fn get(&self, id: i64) -> DbResult<Option<SourceAgent>> {
        let agent = sqlx::query_as::<_, SourceAgent>(&format!("{SELECT_COLUMNS} WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(agent)
    }

    pub async fn list_all(&self) -> DbResult<Vec<SourceAgent>> {
        let agents = sqlx::query_as::<_, SourceAgent>(&format!("{SELECT_COLUMNS} ORDER BY id"))
            .fetch_all(&self.pool)
            .await?;
        Ok(agents)
    }

    /// Inserts or replaces an agent by id.
    pub async fn upsert(&self, agent: &SourceAgent) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO source_agents (
                id, name, location, status, rating, compliance_score,
                allocation_restricted, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT (id) DO UPDATE SET
                name = excluded.name,
                location = excluded.location,
                status = excluded.status,
                rating = excluded.rating,
                compliance_score = excluded.compliance_score,
                allocation_restricted = excluded.allocation_restricted,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(agent.id)
        .bind(&agent.name)
        .bind(&agent.location)
        .bind(&agent.status)
        .bind(agent.rating)
        .bind(agent.compliance_score)
        .bind(agent.allocation_restricted)
        .bind(agent.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Overwrites the free-text status. Returns false when the agent is missing.
    pub async fn set_status(&self, id: i64, status: &str) -> DbResult<bool> {
        debug!(agent_id = id, status = %status, "Updating source agent status");
        let result = sqlx::query("UPDATE source_agents SET status = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(id)
            .bind(status)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_allocation_restricted(&self, id: i64, restricted: bool) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE source_agents SET allocation_restricted = ?2, updated_at = ?3 WHERE id = ?1",
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
            "UPDATE source_agents SET compliance_score = ?2, updated_at = ?3 WHERE id = ?1",
        )
        .bind(id)
        .bind(score)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Compare-and-set on the compliance score.
    ///
    /// Writes only while the stored score still equals `expected`; returns
    /// false when the row is missing or the score has moved.
    pub async fn set_compliance_score_from(&self, id: i64, expected: i64, score: i64) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE source_agents SET compliance_score = ?3, updated_at = ?4
            WHERE id = ?1 AND compliance_score = ?2
            "#,
        )
        .bind(id)
        .bind(expected)
        .bind(score)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM source_agents")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::SourceDatabase;

    fn agent(id: i64) -> SourceAgent {
        SourceAgent {
            id,
            name: "Juma Otieno".into(),
            location: "Airport Road".into(),
            status: "Active".into(),
            rating: 4.2,
            compliance_score: 88,
            allocation_restricted: false,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_upsert_and_get() {
        let db = SourceDatabase::in_memory().await.unwrap();
        let repo = db.agents();

        repo.upsert(&agent(7)).await.unwrap();
        let mut changed = agent(7);
        changed.rating = 3.1;
        repo.upsert(&changed).await.unwrap();

        let stored = repo.get(7).await.unwrap().unwrap();
        assert_eq!(stored.rating, 3.1);
        assert_eq!(repo.count().await.unwrap(), 1);
        assert!(repo.get(8).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_enforcement_writes() {
        let db = SourceDatabase::in_memory().await.unwrap();
        let repo = db.agents();
        repo.upsert(&agent(1)).await.unwrap();

        assert!(repo.set_status(1, "suspended").await.unwrap());
        assert!(repo.set_allocation_restricted(1, true).await.unwrap());
        assert!(repo.set_compliance_score(1, 40).await.unwrap());
        assert!(!repo.set_status(99, "suspended").await.unwrap());

        let stored = repo.get(1).await.unwrap().unwrap();
        assert_eq!(stored.status, "suspended");
        assert!(stored.allocation_restricted);
        assert_eq!(stored.compliance_score, 40);
    }

    #[tokio::test]
    async fn test_compliance_score_compare_and_set() {
        let db = SourceDatabase::in_memory().await.unwrap();
        let repo = db.agents();
        repo.upsert(&agent(1)).await.unwrap();
        let start = repo.get(1).await.unwrap().unwrap().compliance_score;

        assert!(repo.set_compliance_score_from(1, start, start - 10).await.unwrap());
        // the second write sees the moved score and does nothing
        assert!(!repo.set_compliance_score_from(1, start, start - 10).await.unwrap());
        assert!(!repo.set_compliance_score_from(99, start, 0).await.unwrap());
        assert_eq!(repo.get(1).await.unwrap().unwrap().compliance_score, start - 10);
    }

    #[tokio::test]
    async fn test_compliance_score_check_constraint() {
        let db = SourceDatabase::in_memory().await.unwrap();
        let repo = db.agents();
        repo.upsert(&agent(1)).await.unwrap();

        let err = repo.set_compliance_score(1, 140).await.unwrap_err();
        assert!(matches!(err, crate::DbError::ConstraintViolation { .. }));
    }
}
