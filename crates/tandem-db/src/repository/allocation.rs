//! # Allocation Repositories
//!
//! Two ledgers that look alike but live in different stores:
//!
//! ```text
//! System A  stock_allocations     (agent, sku) → quantity A expects the agent
//!                                 to hold; the baseline for stock_variance
//! System B  applied_allocations   allocation_id → bin it was applied to;
//!                                 makes additive deltas apply at most once
//! ```

use sqlx::SqlitePool;

use crate::error::DbResult;
use tandem_core::StockAllocation;

// =============================================================================
// System A: expected allocations
// =============================================================================

#[derive(Debug, Clone)]
pub struct AllocationRepository {
    pool: SqlitePool,
}

impl AllocationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        AllocationRepository { pool }
    }

    pub async fn get(&self, source_agent_id: i64, sku: &str) -> DbResult<Option<StockAllocation>> {
        let allocation = sqlx::query_as::<_, StockAllocation>(
            r#"
            SELECT source_agent_id, sku, allocated_quantity
            FROM stock_allocations
            WHERE source_agent_id = ?1 AND sku = ?2
            "#,
        )
        .bind(source_agent_id)
        .bind(sku)
        .fetch_optional(&self.pool)
        .await?;
        Ok(allocation)
    }

    pub async fn list_all(&self) -> DbResult<Vec<StockAllocation>> {
        let allocations = sqlx::query_as::<_, StockAllocation>(
            r#"
            SELECT source_agent_id, sku, allocated_quantity
            FROM stock_allocations
            ORDER BY source_agent_id, sku
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(allocations)
    }

    /// Sets the expected quantity for `(agent, sku)`.
    pub async fn set(&self, source_agent_id: i64, sku: &str, quantity: i64) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO stock_allocations (source_agent_id, sku, allocated_quantity)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (source_agent_id, sku) DO UPDATE SET
                allocated_quantity = excluded.allocated_quantity
            "#,
        )
        .bind(source_agent_id)
        .bind(sku)
        .bind(quantity)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

// =============================================================================
// System B: applied allocation ids
// =============================================================================

#[derive(Debug, Clone)]
pub struct AppliedAllocationRepository {
    pool: SqlitePool,
}

impl AppliedAllocationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        AppliedAllocationRepository { pool }
    }

    pub async fn contains(&self, allocation_id: &str) -> DbResult<bool> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM applied_allocations WHERE allocation_id = ?1")
                .bind(allocation_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(found.is_some())
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM applied_allocations")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use tandem_core::SourceAgent;

    use crate::pool::SourceDatabase;

    #[tokio::test]
    async fn test_set_and_get_expected_allocation() {
        let db = SourceDatabase::in_memory().await.unwrap();
        db.agents()
            .upsert(&SourceAgent {
                id: 7,
                name: "Agent 7".into(),
                location: "".into(),
                status: "active".into(),
                rating: 4.0,
                compliance_score: 100,
                allocation_restricted: false,
                updated_at: Utc::now(),
            })
            .await
            .unwrap();

        let repo = db.allocations();
        repo.set(7, "X1", 40).await.unwrap();
        repo.set(7, "X1", 55).await.unwrap();

        assert_eq!(repo.get(7, "X1").await.unwrap().unwrap().allocated_quantity, 55);
        assert!(repo.get(7, "X2").await.unwrap().is_none());
        assert_eq!(repo.list_all().await.unwrap().len(), 1);
    }
}
