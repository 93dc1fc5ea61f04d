//! # tandem-core: Pure Reconciliation Rules
//!
//! Domain types and deterministic rules shared by every other crate. Nothing
//! in here performs I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tandem Architecture                              │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    tandem-daemon (binary)                       │   │
//! │  │      config ──► logging ──► stores ──► workers ──► schedule     │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    tandem-sync (engine)                         │   │
//! │  │   propagator · detector · resolver · enforcement · health       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    tandem-db (stores)                           │   │
//! │  │        SourceDatabase (System A) · MirrorDatabase (System B)    │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ tandem-core (THIS CRATE) ★                      │   │
//! │  │   types · mapping · compliance · conflict · health · validation │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Entities of both stores plus operational records
//! - [`mapping`] - Location → zone and status label → status tables
//! - [`compliance`] - Penalty table for compliance actions
//! - [`conflict`] - Conflict taxonomy, severities, ledger state, summary
//! - [`health`] - Health check results and score arithmetic
//! - [`validation`] - Input validation
//! - [`error`] - Domain error types
//!
//! ## Example
//!
//! ```rust
//! use tandem_core::compliance::{apply_penalty, ComplianceActionType};
//! use tandem_core::conflict::Severity;
//!
//! let penalty = ComplianceActionType::Suspend.penalty(Severity::High);
//! assert_eq!(apply_penalty(82, penalty), 52);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod compliance;
pub mod conflict;
pub mod error;
pub mod health;
pub mod mapping;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use compliance::ComplianceActionType;
pub use conflict::{Conflict, ConflictCategory, ConflictSummary, ConflictType, Severity};
pub use error::{CoreError, CoreResult, ValidationError};
pub use health::{CheckName, CheckStatus, HealthReport, OverallStatus};
pub use mapping::ZoneTable;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum SKU length accepted from System A.
pub const MAX_SKU_LEN: usize = 64;

/// Maximum length of a compliance or enforcement reason.
pub const MAX_REASON_LEN: usize = 500;

/// Largest single stock delta accepted in one allocation.
///
/// Guards against fat-fingered allocations (10000 instead of 100) which are
/// additive and cannot be undone by re-syncing.
pub const MAX_ALLOCATION_DELTA: i64 = 100_000;

/// Supplier label written on bins created by the propagator.
pub const DEFAULT_SUPPLIER: &str = "system_a";
