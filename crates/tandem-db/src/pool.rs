//! # Store Pools
//!
//! Connection pool creation for the two record systems.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Store Connection Pools                             │
//! │                                                                         │
//! │  DbConfig::new(path)                 DbConfig::new(path)                │
//! │       │                                   │                             │
//! │       ▼                                   ▼                             │
//! │  SourceDatabase::open ──┐           MirrorDatabase::open ──┐            │
//! │                         ▼                                  ▼            │
//! │                ┌─────────────────┐                ┌─────────────────┐   │
//! │                │ Database        │                │ Database        │   │
//! │                │ Arc<RwLock<     │                │ Arc<RwLock<     │   │
//! │                │   SqlitePool>>  │                │   SqlitePool>>  │   │
//! │                └────────┬────────┘                └────────┬────────┘   │
//! │                         │ reconnect() swaps the pool      │            │
//! │                         ▼                                  ▼            │
//! │                  repositories (take a pool clone per call site)         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## WAL Mode
//! Both stores run in WAL mode so the detector's batch reads do not block
//! the propagator's writes.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::alert::AlertRepository;
use crate::repository::allocation::{AllocationRepository, AppliedAllocationRepository};
use crate::repository::compliance::ComplianceActionRepository;
use crate::repository::enforcement::EnforcementRepository;
use crate::repository::failed_job::FailedJobRepository;
use crate::repository::mirror_agent::MirrorAgentRepository;
use crate::repository::product::ProductRepository;
use crate::repository::source_agent::SourceAgentRepository;
use crate::repository::stock_bin::StockBinRepository;
use crate::repository::sync_job::SyncJobRepository;

const IN_MEMORY_PATH: &str = ":memory:";

// =============================================================================
// Configuration
// =============================================================================

/// Store configuration.
///
/// ```rust,ignore
/// let config = DbConfig::new("/var/lib/tandem/mirror.db")
///     .max_connections(8)
///     .min_connections(1);
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Path to the SQLite file, or `:memory:`.
    pub database_path: PathBuf,

    /// Default: 5
    pub max_connections: u32,

    /// Default: 1
    pub min_connections: u32,

    /// Pool acquire timeout. Default: 30 seconds
    pub connect_timeout: Duration,

    /// Idle timeout before a connection is closed. Default: 10 minutes
    pub idle_timeout: Duration,

    /// Whether to run migrations on connect. Default: true
    pub run_migrations: bool,
}

impl DbConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            run_migrations: true,
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    /// In-memory store for tests. Each call yields an isolated database.
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(IN_MEMORY_PATH),
            // One connection keeps the shared in-memory database alive
            max_connections: 1,
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(60),
            run_migrations: true,
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.database_path.as_os_str() == IN_MEMORY_PATH
    }
}

// =============================================================================
// Store Kind
// =============================================================================

/// Which record system a pool belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// System A
    Source,
    /// System B
    Mirror,
}

impl std::fmt::Display for StoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            StoreKind::Source => "source",
            StoreKind::Mirror => "mirror",
        })
    }
}

// =============================================================================
// Database
// =============================================================================

/// A pool for one store that can be replaced in place.
#[derive(Debug, Clone)]
pub struct Database {
    kind: StoreKind,
    config: DbConfig,
    pool: Arc<RwLock<SqlitePool>>,
}

impl Database {
    /// Opens the pool and runs migrations (if enabled).
    pub async fn new(config: DbConfig, kind: StoreKind) -> DbResult<Self> {
        info!(
            store = %kind,
            path = %config.database_path.display(),
            "Initializing store connection"
        );

        let pool = connect(&config).await?;
        info!(store = %kind, max_connections = config.max_connections, "Store pool created");

        let db = Database {
            kind,
            config,
            pool: Arc::new(RwLock::new(pool)),
        };

        if db.config.run_migrations {
            db.run_migrations().await?;
        }

        Ok(db)
    }

    pub async fn run_migrations(&self) -> DbResult<()> {
        migrations::run_migrations(&self.pool(), self.kind).await
    }

    pub fn kind(&self) -> StoreKind {
        self.kind
    }

    /// Returns a handle to the current pool.
    pub fn pool(&self) -> SqlitePool {
        self.pool
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Replaces the pool with a freshly connected one.
    ///
    /// Returns `Ok(false)` for in-memory stores, whose contents live only as
    /// long as their single connection.
    pub async fn reconnect(&self) -> DbResult<bool> {
        if self.config.is_in_memory() {
            debug!(store = %self.kind, "In-memory store, reconnect skipped");
            return Ok(false);
        }

        warn!(store = %self.kind, "Reconnecting store pool");
        let fresh = connect(&self.config).await?;
        let old = {
            let mut guard = self
                .pool
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            std::mem::replace(&mut *guard, fresh)
        };
        old.close().await;
        info!(store = %self.kind, "Store pool replaced");
        Ok(true)
    }

    /// Executes a trivial query and returns the round-trip time.
    pub async fn ping(&self) -> DbResult<Duration> {
        let started = Instant::now();
        sqlx::query("SELECT 1").execute(&self.pool()).await?;
        Ok(started.elapsed())
    }

    pub async fn health_check(&self) -> bool {
        self.ping().await.is_ok()
    }

    pub async fn close(&self) {
        info!(store = %self.kind, "Closing store pool");
        self.pool().close().await;
    }
}

async fn connect(config: &DbConfig) -> DbResult<SqlitePool> {
    // sqlite://path creates the file if missing; ":memory:" yields a
    // uniquely named shared in-memory database
    let connect_url = format!("sqlite://{}?mode=rwc", config.database_path.display());

    let connect_options = SqliteConnectOptions::from_str(&connect_url)
        .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .create_if_missing(true);

    SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.connect_timeout)
        .idle_timeout(Some(config.idle_timeout))
        .connect_with(connect_options)
        .await
        .map_err(|e| DbError::ConnectionFailed(e.to_string()))
}

// =============================================================================
// System A
// =============================================================================

/// System A store.
#[derive(Debug, Clone)]
pub struct SourceDatabase {
    db: Database,
}

impl SourceDatabase {
    pub async fn open(config: DbConfig) -> DbResult<Self> {
        Ok(SourceDatabase {
            db: Database::new(config, StoreKind::Source).await?,
        })
    }

    pub async fn in_memory() -> DbResult<Self> {
        Self::open(DbConfig::in_memory()).await
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn agents(&self) -> SourceAgentRepository {
        SourceAgentRepository::new(self.db.pool())
    }

    pub fn products(&self) -> ProductRepository {
        ProductRepository::new(self.db.pool())
    }

    pub fn allocations(&self) -> AllocationRepository {
        AllocationRepository::new(self.db.pool())
    }
}

// =============================================================================
// System B
// =============================================================================

/// System B store. Also holds the engine's operational tables.
#[derive(Debug, Clone)]
pub struct MirrorDatabase {
    db: Database,
}

impl MirrorDatabase {
    pub async fn open(config: DbConfig) -> DbResult<Self> {
        Ok(MirrorDatabase {
            db: Database::new(config, StoreKind::Mirror).await?,
        })
    }

    pub async fn in_memory() -> DbResult<Self> {
        Self::open(DbConfig::in_memory()).await
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn agents(&self) -> MirrorAgentRepository {
        MirrorAgentRepository::new(self.db.pool())
    }

    pub fn bins(&self) -> StockBinRepository {
        StockBinRepository::new(self.db.pool())
    }

    pub fn applied_allocations(&self) -> AppliedAllocationRepository {
        AppliedAllocationRepository::new(self.db.pool())
    }

    pub fn enforcement(&self) -> EnforcementRepository {
        EnforcementRepository::new(self.db.pool())
    }

    pub fn compliance_actions(&self) -> ComplianceActionRepository {
        ComplianceActionRepository::new(self.db.pool())
    }

    pub fn alerts(&self) -> AlertRepository {
        AlertRepository::new(self.db.pool())
    }

    pub fn jobs(&self) -> SyncJobRepository {
        SyncJobRepository::new(self.db.pool())
    }

    pub fn failed_jobs(&self) -> FailedJobRepository {
        FailedJobRepository::new(self.db.pool())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_stores_are_isolated() {
        let a = MirrorDatabase::in_memory().await.unwrap();
        let b = MirrorDatabase::in_memory().await.unwrap();

        sqlx::query("INSERT INTO alerts (id, kind, title, detail, created_at) VALUES ('x', 'critical_health', 't', 'd', '2026-01-01T00:00:00+00:00')")
            .execute(&a.database().pool())
            .await
            .unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM alerts")
            .fetch_one(&b.database().pool())
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_ping_and_reconnect_in_memory() {
        let source = SourceDatabase::in_memory().await.unwrap();
        assert!(source.database().ping().await.is_ok());
        assert!(!source.database().reconnect().await.unwrap());
        assert!(source.database().health_check().await);
    }

    #[tokio::test]
    async fn test_reconnect_file_store() {
        let path = std::env::temp_dir().join(format!("tandem-{}.db", uuid::Uuid::new_v4()));
        let mirror = MirrorDatabase::open(DbConfig::new(&path)).await.unwrap();

        assert!(mirror.database().reconnect().await.unwrap());
        assert!(mirror.database().health_check().await);

        mirror.database().close().await;
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_config_builder() {
        let config = DbConfig::new("/tmp/test.db")
            .max_connections(10)
            .min_connections(2)
            .run_migrations(false);

        assert_eq!(config.max_connections, 10);
        assert_eq!(config.min_connections, 2);
        assert!(!config.run_migrations);
        assert!(DbConfig::in_memory().is_in_memory());
    }
}
