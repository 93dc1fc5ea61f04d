//! # tandem-db: Store Access for Tandem
//!
//! SQLite access for both sides of the reconciliation: System A (the
//! source of truth) and System B (the mirror, which also holds the engine's
//! queue, enforcement audit and alerts).
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tandem Data Flow                                 │
//! │                                                                         │
//! │  tandem-sync (propagator, detector, workers)                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     tandem-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌────────────────┐   ┌────────────────┐   ┌───────────────┐  │   │
//! │  │   │ SourceDatabase │   │ MirrorDatabase │   │  Migrations   │  │   │
//! │  │   │                │   │                │   │  source/      │  │   │
//! │  │   │ agents         │   │ agents, bins   │   │  mirror/      │  │   │
//! │  │   │ products       │   │ jobs, alerts   │   │  (embedded)   │  │   │
//! │  │   │ allocations    │   │ enforcement    │   │               │  │   │
//! │  │   └────────────────┘   └────────────────┘   └───────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tandem_db::{DbConfig, MirrorDatabase};
//!
//! let mirror = MirrorDatabase::open(DbConfig::new("mirror.db")).await?;
//! let bin = mirror.bins().find(7, "X1").await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig, MirrorDatabase, SourceDatabase, StoreKind};

pub use repository::alert::AlertRepository;
pub use repository::allocation::{AllocationRepository, AppliedAllocationRepository};
pub use repository::compliance::ComplianceActionRepository;
pub use repository::enforcement::EnforcementRepository;
pub use repository::failed_job::FailedJobRepository;
pub use repository::mirror_agent::MirrorAgentRepository;
pub use repository::product::ProductRepository;
pub use repository::source_agent::SourceAgentRepository;
pub use repository::stock_bin::{BinDelta, StockBinRepository};
pub use repository::sync_job::SyncJobRepository;
