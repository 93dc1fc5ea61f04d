//! # tandem-sync: Reconciliation Engine for Tandem
//!
//! Keeps System B consistent with System A: pushes changes across,
//! detects and resolves divergence, applies enforcement to both stores,
//! and watches its own health.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Reconciliation Engine                             │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                ReconService (public surface)                     │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │  Propagator    │  │   Detector     │  │  Resolver              │    │
//! │  │                │  │                │  │                        │    │
//! │  │ agent, stock,  │  │ 14 conflict    │  │ drains the ledger,     │    │
//! │  │ compliance     │  │ types, ledger  │  │ deterministic fixes    │    │
//! │  │ A ──► B        │  │ + summary      │  │ only                   │    │
//! │  └───────┬────────┘  └────────────────┘  └────────────────────────┘    │
//! │          │                                                              │
//! │  ┌───────▼────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ Enforcement    │  │ Lane workers   │  │ Health monitor         │    │
//! │  │ A then B,      │  │ compliance >   │  │ 8 checks, score,       │    │
//! │  │ audit row      │  │ high > normal  │  │ auto-recovery          │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! │                                                                         │
//! │  SEAMS: CacheClient · ProductCatalog · EventBroadcaster · AlertNotifier │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! ### Engine
//! - [`service`] - `ReconService`, the public surface
//! - [`propagator`] - System A → System B propagation
//! - [`enforcement`] - Cross-store enforcement with audit trail
//! - [`detector`] - Conflict rules and detection runs
//! - [`ledger`] - In-process conflict ledger
//! - [`resolver`] - `ConflictResolver` trait and default rules
//! - [`health`] - Health checks and auto-recovery
//! - [`worker`] - Lane workers over the job queue
//!
//! ### Plumbing
//! - [`context`] - Shared collaborators
//! - [`cache`] - `CacheClient` with memory and Redis backends
//! - [`catalog`] - `ProductCatalog`
//! - [`events`] - `EventBroadcaster`
//! - [`notifier`] - `AlertNotifier`
//! - [`deadline`] - Per-call timeouts
//! - [`config`] - Engine configuration
//! - [`error`] - Error types and taxonomy
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tandem_sync::{ReconConfig, ReconService};
//!
//! let config = ReconConfig::load(None)?;
//! let service = ReconService::open(config).await?;
//! service.requeue_interrupted_jobs().await?;
//! let _workers = service.spawn_workers();
//!
//! let outcome = service.sync_agent(7).await;
//! let report = service.detect_all_conflicts().await?;
//! println!("{} conflicts, {} critical", report.summary.total, report.summary.critical);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

// Engine
pub mod detector;
pub mod enforcement;
pub mod health;
pub mod ledger;
pub mod propagator;
pub mod resolver;
pub mod service;
pub mod worker;

// Plumbing
pub mod cache;
pub mod catalog;
pub mod config;
pub mod context;
pub mod deadline;
pub mod error;
pub mod events;
pub mod notifier;

// =============================================================================
// Re-exports
// =============================================================================

pub use cache::{CacheClient, CacheKeys, MemoryCache, RedisCache};
pub use catalog::{CatalogEntry, ProductCatalog, SourceCatalog};
pub use config::ReconConfig;
pub use context::EngineContext;
pub use detector::{ConflictDetector, DetectionReport};
pub use enforcement::{EnforcementOutcome, EnforcementTrigger};
pub use error::{ErrorKind, SyncError, SyncResult};
pub use events::{BroadcastEvents, EventBroadcaster, SyncEvent};
pub use health::HealthMonitor;
pub use ledger::ConflictLedger;
pub use notifier::{AlertNotifier, Notification, TracingNotifier};
pub use propagator::{AgentSyncOutcome, ComplianceSyncOutcome, Propagator, StockSyncOutcome};
pub use resolver::{ConflictResolver, DefaultConflictResolver, ResolutionOutcome, ResolutionResult};
pub use service::{DashboardData, ReconService};
pub use worker::{JobOutcome, WorkerControl, WorkerPool};
