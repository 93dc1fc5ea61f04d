//! # Error Types
//!
//! Domain-specific error types for tandem-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  tandem-core errors (this file)                                        │
//! │  ├── CoreError        - Domain rule violations                         │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  tandem-db errors (separate crate)                                     │
//! │  └── DbError          - Store operation failures                       │
//! │                                                                         │
//! │  tandem-sync errors (separate crate)                                   │
//! │  └── SyncError        - Engine failures, classified by ErrorKind       │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → SyncError → outcome.error         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Domain rule violations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A SourceAgent with this id does not exist in System A.
    #[error("Source agent not found: {0}")]
    SourceAgentNotFound(i64),

    /// A MirrorAgent with this id does not exist in System B.
    #[error("Mirror agent not found: {0}")]
    MirrorAgentNotFound(i64),

    /// Applying a stock delta would drive a bin below zero.
    ///
    /// ## When This Occurs
    /// ```text
    /// bin(agent=7, sku=X1).current_stock = 4
    ///      │
    ///      ▼
    /// sync_stock_allocation(7, "X1", -10)
    ///      │
    ///      ▼
    /// NegativeStock { sku: "X1", current: 4, delta: -10 }
    /// ```
    #[error("Stock for {sku} would become negative: current {current}, delta {delta}")]
    NegativeStock { sku: String, current: i64, delta: i64 },

    /// Compliance action type is not part of the penalty table.
    #[error("Unknown compliance action: {0}")]
    UnknownComplianceAction(String),

    /// Severity label could not be parsed.
    #[error("Unknown severity: {0}")]
    UnknownSeverity(String),

    /// Enforcement action type could not be parsed.
    #[error("Unknown enforcement action: {0}")]
    UnknownEnforcementAction(String),

    /// A zone or status mapping table failed startup validation.
    #[error("Invalid mapping table: {0}")]
    InvalidMappingTable(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before any store is touched, so a rejected call never leaves a
/// half-applied change behind.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must not be zero.
    #[error("{field} must not be zero")]
    MustBeNonZero { field: String },

    /// Invalid format (e.g., invalid characters in a SKU).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;
