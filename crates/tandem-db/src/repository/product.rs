//! # Product Repository
//!
//! System A catalog, keyed by SKU. Backs the default product catalog the
//! propagator and detector consult.

use sqlx::SqlitePool;

use crate::error::DbResult;
use tandem_core::Product;

#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    pub async fn get_by_sku(&self, sku: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(
            "SELECT id, sku, name, unit_price_cents, is_active FROM products WHERE sku = ?1",
        )
        .bind(sku)
        .fetch_optional(&self.pool)
        .await?;
        Ok(product)
    }

    pub async fn list_all(&self) -> DbResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(
            "SELECT id, sku, name, unit_price_cents, is_active FROM products ORDER BY sku",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(products)
    }

    /// Inserts or updates a product by SKU.
    pub async fn upsert(&self, sku: &str, name: &str, unit_price_cents: i64) -> DbResult<Product> {
        let product = sqlx::query_as::<_, Product>(
            r#"
            INSERT INTO products (sku, name, unit_price_cents, is_active)
            VALUES (?1, ?2, ?3, 1)
            ON CONFLICT (sku) DO UPDATE SET
                name = excluded.name,
                unit_price_cents = excluded.unit_price_cents,
                is_active = 1
            RETURNING id, sku, name, unit_price_cents, is_active
            "#,
        )
        .bind(sku)
        .bind(name)
        .bind(unit_price_cents)
        .fetch_one(&self.pool)
        .await?;
        Ok(product)
    }

    /// Soft-deletes a product. Inactive products still resolve by SKU.
    pub async fn deactivate(&self, sku: &str) -> DbResult<bool> {
        let result = sqlx::query("UPDATE products SET is_active = 0 WHERE sku = ?1")
            .bind(sku)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
