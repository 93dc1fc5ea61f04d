//! # Product Catalog
//!
//! SKU → name and unit price. The default reads System A's products table.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use tandem_db::SourceDatabase;

use crate::error::SyncResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub sku: String,
    pub name: String,
    pub unit_price_cents: i64,
}

#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn lookup(&self, sku: &str) -> SyncResult<Option<CatalogEntry>>;

    /// The full catalog keyed by SKU, for batch detection.
    async fn snapshot(&self) -> SyncResult<HashMap<String, CatalogEntry>>;
}

/// Catalog backed by System A.
#[derive(Clone)]
pub struct SourceCatalog {
    source: SourceDatabase,
}

impl SourceCatalog {
    pub fn new(source: SourceDatabase) -> Self {
        SourceCatalog { source }
    }
}

#[async_trait]
impl ProductCatalog for SourceCatalog {
    async fn lookup(&self, sku: &str) -> SyncResult<Option<CatalogEntry>> {
        let product = self.source.products().get_by_sku(sku).await?;
        Ok(product.map(|p| CatalogEntry {
            sku: p.sku,
            name: p.name,
            unit_price_cents: p.unit_price_cents,
        }))
    }

    async fn snapshot(&self) -> SyncResult<HashMap<String, CatalogEntry>> {
        let products = self.source.products().list_all().await?;
        Ok(products
            .into_iter()
            .map(|p| {
                (
                    p.sku.clone(),
                    CatalogEntry {
                        sku: p.sku,
                        name: p.name,
                        unit_price_cents: p.unit_price_cents,
                    },
                )
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_source_catalog() {
        let source = SourceDatabase::in_memory().await.unwrap();
        source.products().upsert("X1", "Water 500ml", 120).await.unwrap();

        let catalog = SourceCatalog::new(source);
        let entry = catalog.lookup("X1").await.unwrap().unwrap();
        assert_eq!(entry.unit_price_cents, 120);
        assert!(catalog.lookup("nope").await.unwrap().is_none());
        assert_eq!(catalog.snapshot().await.unwrap().len(), 1);
    }
}
