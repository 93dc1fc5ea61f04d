//! # Store Migrations
//!
//! Each record system has its own embedded migration set.
//!
//! ```text
//! migrations/
//! ├── source/   System A: source_agents, products, stock_allocations
//! └── mirror/   System B: mirror_agents, stock_bins, applied_allocations,
//!               enforcement_actions, compliance_actions, alerts,
//!               sync_jobs, failed_sync_jobs
//! ```
//!
//! Never edit an applied migration; add the next numbered file instead.

use sqlx::migrate::Migrator;
use sqlx::SqlitePool;
use tracing::info;

use crate::error::DbResult;
use crate::pool::StoreKind;

static SOURCE_MIGRATOR: Migrator = sqlx::migrate!("../../migrations/source");

static MIRROR_MIGRATOR: Migrator = sqlx::migrate!("../../migrations/mirror");

fn migrator(kind: StoreKind) -> &'static Migrator {
    match kind {
        StoreKind::Source => &SOURCE_MIGRATOR,
        StoreKind::Mirror => &MIRROR_MIGRATOR,
    }
}

/// Runs all pending migrations for one store.
pub async fn run_migrations(pool: &SqlitePool, kind: StoreKind) -> DbResult<()> {
    info!(store = %kind, "Checking for pending migrations");
    migrator(kind).run(pool).await?;
    info!(store = %kind, "All migrations applied");
    Ok(())
}

/// Returns `(embedded, applied)` migration counts for diagnostics.
pub async fn migration_status(pool: &SqlitePool, kind: StoreKind) -> DbResult<(usize, usize)> {
    let total = migrator(kind).migrations.len();
    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await?;
    Ok((total, applied as usize))
}
