//! # Stock Bin Repository
//!
//! System B stock, one row per `(da_id, sku)`. Stock sync is additive:
//!
//! ```text
//! bin(7, "X1") = 40
//!      │  apply_delta(+15)
//!      ▼
//! INSERT ... ON CONFLICT (da_id, sku) DO UPDATE
//!     SET current_stock = current_stock + 15      → 55
//!      │  apply_delta(+15)                        → 70
//!      ▼
//! CHECK (current_stock >= 0) rejects any delta that would go negative
//! ```
//!
//! [`StockBinRepository::apply_delta_once`] wraps the same upsert in a
//! transaction with an `applied_allocations` insert, so a replayed
//! allocation id leaves the stock untouched.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use tandem_core::StockBin;

const COLUMNS: &str = r#"
    id, da_id, sku, product_name, current_stock, unit_price_cents, supplier, status, updated_at
"#;

/// A stock delta to apply to a bin.
#[derive(Debug, Clone, PartialEq)]
pub struct BinDelta {
    pub da_id: i64,
    pub sku: String,
    /// Catalog name and unit price. `None` when the SKU is unknown to the
    /// catalog: a new bin then gets the SKU as name and a zero price, an
    /// existing bin keeps what it has.
    pub catalog: Option<(String, i64)>,
    pub supplier: String,
    pub delta: i64,
}

#[derive(Debug, Clone)]
pub struct StockBinRepository {
    pool: SqlitePool,
}

impl StockBinRepository {
    pub fn new(pool: SqlitePool) -> Self {
        StockBinRepository { pool }
    }

    pub async fn find(&self, da_id: i64, sku: &str) -> DbResult<Option<StockBin>> {
        let bin = sqlx::query_as::<_, StockBin>(&format!(
            "SELECT {COLUMNS} FROM stock_bins WHERE da_id = ?1 AND sku = ?2"
        ))
        .bind(da_id)
        .bind(sku)
        .fetch_optional(&self.pool)
        .await?;
        Ok(bin)
    }

    pub async fn get(&self, id: i64) -> DbResult<Option<StockBin>> {
        let bin = sqlx::query_as::<_, StockBin>(&format!("SELECT {COLUMNS} FROM stock_bins WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(bin)
    }

    pub async fn list_all(&self) -> DbResult<Vec<StockBin>> {
        let bins = sqlx::query_as::<_, StockBin>(&format!(
            "SELECT {COLUMNS} FROM stock_bins ORDER BY da_id, sku"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(bins)
    }

    /// Adds `delta` to the bin, creating it if needed.
    pub async fn apply_delta(&self, delta: &BinDelta) -> DbResult<StockBin> {
        let mut conn = self.pool.acquire().await?;
        upsert_delta(&mut *conn, delta).await
    }

    /// Adds `delta` unless `allocation_id` was applied before.
    ///
    /// Returns `None` for a duplicate allocation id.
    pub async fn apply_delta_once(
        &self,
        allocation_id: &str,
        delta: &BinDelta,
    ) -> DbResult<Option<StockBin>> {
        let mut tx = self.pool.begin().await?;

        let seen: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM applied_allocations WHERE allocation_id = ?1")
                .bind(allocation_id)
                .fetch_optional(&mut *tx)
                .await?;
        if seen.is_some() {
            debug!(allocation_id = %allocation_id, "Allocation already applied");
            tx.rollback().await?;
            return Ok(None);
        }

        let bin = upsert_delta(&mut *tx, delta).await?;

        sqlx::query(
            r#"
            INSERT INTO applied_allocations (allocation_id, bin_id, quantity, applied_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(allocation_id)
        .bind(bin.id)
        .bind(delta.delta)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(bin))
    }

    /// Sets the unit price. Returns false when the bin is missing.
    pub async fn set_price(&self, id: i64, unit_price_cents: i64) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE stock_bins SET unit_price_cents = ?2, updated_at = ?3 WHERE id = ?1",
        )
        .bind(id)
        .bind(unit_price_cents)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM stock_bins")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

async fn upsert_delta(conn: &mut SqliteConnection, delta: &BinDelta) -> DbResult<StockBin> {
    let (name, price, known) = match &delta.catalog {
        Some((name, price)) => (name.clone(), *price, true),
        None => (delta.sku.clone(), 0, false),
    };

    debug!(da_id = delta.da_id, sku = %delta.sku, delta = delta.delta, "Applying stock delta");

    let bin = sqlx::query_as::<_, StockBin>(&format!(
        r#"
        INSERT INTO stock_bins (
            da_id, sku, product_name, current_stock, unit_price_cents, supplier, status, updated_at
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6,
            CASE WHEN ?4 = 0 THEN 'depleted' ELSE 'active' END,
            ?7
        )
        ON CONFLICT (da_id, sku) DO UPDATE SET
            current_stock = stock_bins.current_stock + excluded.current_stock,
            product_name = CASE WHEN ?8 THEN excluded.product_name ELSE stock_bins.product_name END,
            unit_price_cents = CASE WHEN ?8 THEN excluded.unit_price_cents ELSE stock_bins.unit_price_cents END,
            status = CASE
                WHEN stock_bins.current_stock + excluded.current_stock = 0 THEN 'depleted'
                ELSE 'active'
            END,
            updated_at = excluded.updated_at
        RETURNING {COLUMNS}
        "#
    ))
    .bind(delta.da_id)
    .bind(&delta.sku)
    .bind(name)
    .bind(delta.delta)
    .bind(price)
    .bind(&delta.supplier)
    .bind(Utc::now())
    .bind(known)
    .fetch_one(&mut *conn)
    .await?;

    Ok(bin)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::MirrorDatabase;
    use crate::DbError;
    use tandem_core::BinStatus;

    fn delta(qty: i64) -> BinDelta {
        BinDelta {
            da_id: 7,
            sku: "X1".into(),
            catalog: Some(("Water 500ml".into(), 120)),
            supplier: "system_a".into(),
            delta: qty,
        }
    }

    #[tokio::test]
    async fn test_deltas_accumulate() {
        let db = MirrorDatabase::in_memory().await.unwrap();
        let repo = db.bins();

        repo.apply_delta(&delta(40)).await.unwrap();
        let bin = repo.apply_delta(&delta(15)).await.unwrap();
        assert_eq!(bin.current_stock, 55);

        let bin = repo.apply_delta(&delta(15)).await.unwrap();
        assert_eq!(bin.current_stock, 70);
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_negative_stock_rejected() {
        let db = MirrorDatabase::in_memory().await.unwrap();
        let repo = db.bins();

        repo.apply_delta(&delta(4)).await.unwrap();
        let err = repo.apply_delta(&delta(-10)).await.unwrap_err();
        assert!(matches!(err, DbError::ConstraintViolation { .. }));
        assert_eq!(repo.find(7, "X1").await.unwrap().unwrap().current_stock, 4);
    }

    #[tokio::test]
    async fn test_depleted_status() {
        let db = MirrorDatabase::in_memory().await.unwrap();
        let repo = db.bins();

        repo.apply_delta(&delta(5)).await.unwrap();
        let bin = repo.apply_delta(&delta(-5)).await.unwrap();
        assert_eq!(bin.status, BinStatus::Depleted);
    }

    #[tokio::test]
    async fn test_unknown_product_keeps_existing_price() {
        let db = MirrorDatabase::in_memory().await.unwrap();
        let repo = db.bins();

        repo.apply_delta(&delta(5)).await.unwrap();
        let mut unknown = delta(5);
        unknown.catalog = None;
        let bin = repo.apply_delta(&unknown).await.unwrap();

        assert_eq!(bin.unit_price_cents, 120);
        assert_eq!(bin.product_name, "Water 500ml");

        let mut fresh = delta(3);
        fresh.sku = "Z9".into();
        fresh.catalog = None;
        let bin = repo.apply_delta(&fresh).await.unwrap();
        assert_eq!(bin.unit_price_cents, 0);
        assert_eq!(bin.product_name, "Z9");
    }

    #[tokio::test]
    async fn test_apply_once_deduplicates() {
        let db = MirrorDatabase::in_memory().await.unwrap();
        let repo = db.bins();

        let first = repo.apply_delta_once("alloc-1", &delta(15)).await.unwrap();
        let replay = repo.apply_delta_once("alloc-1", &delta(15)).await.unwrap();
        let second = repo.apply_delta_once("alloc-2", &delta(15)).await.unwrap();

        assert_eq!(first.unwrap().current_stock, 15);
        assert!(replay.is_none());
        assert_eq!(second.unwrap().current_stock, 30);
        assert_eq!(db.applied_allocations().count().await.unwrap(), 2);
        assert!(db.applied_allocations().contains("alloc-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_set_price() {
        let db = MirrorDatabase::in_memory().await.unwrap();
        let repo = db.bins();
        let bin = repo.apply_delta(&delta(1)).await.unwrap();

        assert!(repo.set_price(bin.id, 150).await.unwrap());
        assert_eq!(repo.get(bin.id).await.unwrap().unwrap().unit_price_cents, 150);
    }
}
