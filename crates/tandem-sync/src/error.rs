//! # Sync Error Types
//!
//! Error types for reconciliation operations.
//!
//! ## Error Taxonomy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Reconciliation Error Kinds                         │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │   TRANSIENT     │  │     DATA        │  │     STRUCTURAL          │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  Timeout        │  │  Validation     │  │  Agent not found        │ │
//! │  │  Cache          │  │  Negative stock │  │  Constraint violation   │ │
//! │  │  Pool / conn    │  │  Unknown action │  │  (surfaced as integrity │ │
//! │  │  (worker retry) │  │  (never retry)  │  │   conflicts)            │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────────────────────────────────┐  │
//! │  │    POLICY       │  │              SYSTEMIC                       │  │
//! │  │                 │  │                                             │  │
//! │  │  Enforcement    │  │  Config, detection unavailable, channels.   │  │
//! │  │  (escalated)    │  │  Fail closed: dependent work is blocked.    │  │
//! │  └─────────────────┘  └─────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use tandem_core::{CoreError, ValidationError};
use tandem_db::DbError;
use thiserror::Error;

/// Result type alias for reconciliation operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Classification used by the worker retry policy and by escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Retried by the worker layer with backoff.
    Transient,
    /// Bad or unmapped input. Never retried.
    Data,
    /// Broken references between the stores.
    Structural,
    /// Enforcement or compliance divergence. Always escalated.
    Policy,
    /// The engine itself is unhealthy.
    Systemic,
}

/// Error type covering every reconciliation failure.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid engine configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load the config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    // =========================================================================
    // Store & Cache Errors
    // =========================================================================
    /// A System A or System B call failed.
    #[error("Store error: {0}")]
    Store(DbError),

    /// A cache call failed.
    #[error("Cache error: {0}")]
    Cache(String),

    /// A store or cache call exceeded its timeout.
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    // =========================================================================
    // Domain Errors
    // =========================================================================
    /// Domain rule violation (unknown agent, negative stock, ...).
    #[error(transparent)]
    Domain(CoreError),

    /// Input rejected before any store was touched.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// No open conflict with this id.
    #[error("Conflict not found: {0}")]
    ConflictNotFound(String),

    /// Enforcement could not be applied to both stores.
    #[error("Enforcement failed: {0}")]
    Enforcement(String),

    // =========================================================================
    // Run Coordination
    // =========================================================================
    /// Another run of the same periodic job holds the marker.
    #[error("{run} run already in progress")]
    RunInProgress { run: String },

    /// The last detection run failed; auto-resolution is blocked.
    #[error("Detection unavailable: {0}")]
    DetectionUnavailable(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// JSON encoding or decoding failed.
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Channel send/receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),

    /// Workers are shutting down.
    #[error("Workers are shutting down")]
    ShuttingDown,

    #[error("Internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<DbError> for SyncError {
    fn from(err: DbError) -> Self {
        SyncError::Store(err)
    }
}

impl From<CoreError> for SyncError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(v) => SyncError::Validation(v),
            other => SyncError::Domain(other),
        }
    }
}

impl From<redis::RedisError> for SyncError {
    fn from(err: redis::RedisError) -> Self {
        SyncError::Cache(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl SyncError {
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        SyncError::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Timeout { .. } | SyncError::Cache(_) | SyncError::RunInProgress { .. } => {
                ErrorKind::Transient
            }
            SyncError::Store(db) => match db {
                e if e.is_transient() => ErrorKind::Transient,
                DbError::ConstraintViolation { .. } => ErrorKind::Structural,
                _ => ErrorKind::Data,
            },
            SyncError::Domain(CoreError::SourceAgentNotFound(_))
            | SyncError::Domain(CoreError::MirrorAgentNotFound(_)) => ErrorKind::Structural,
            SyncError::Domain(CoreError::InvalidMappingTable(_)) => ErrorKind::Systemic,
            SyncError::Domain(_)
            | SyncError::Validation(_)
            | SyncError::Serialization(_)
            | SyncError::ConflictNotFound(_) => ErrorKind::Data,
            SyncError::Enforcement(_) => ErrorKind::Policy,
            SyncError::InvalidConfig(_)
            | SyncError::ConfigLoadFailed(_)
            | SyncError::DetectionUnavailable(_)
            | SyncError::ChannelError(_)
            | SyncError::ShuttingDown
            | SyncError::Internal(_) => ErrorKind::Systemic,
        }
    }

    /// Returns true if the worker layer should retry the job.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::Domain(CoreError::InvalidMappingTable(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(SyncError::timeout("mirror.upsert_agent", 2000).is_retryable());
        assert!(SyncError::Cache("connection refused".into()).is_retryable());
        assert!(SyncError::Store(DbError::PoolExhausted).is_retryable());

        assert!(!SyncError::from(CoreError::SourceAgentNotFound(4)).is_retryable());
        assert!(!SyncError::InvalidConfig("bad".into()).is_retryable());
        assert!(!SyncError::Enforcement("mirror write failed".into()).is_retryable());
    }

    #[test]
    fn test_kinds() {
        let negative = CoreError::NegativeStock {
            sku: "X1".into(),
            current: 4,
            delta: -10,
        };
        assert_eq!(SyncError::from(negative).kind(), ErrorKind::Data);
        assert_eq!(
            SyncError::from(CoreError::MirrorAgentNotFound(9)).kind(),
            ErrorKind::Structural
        );
        assert_eq!(
            SyncError::DetectionUnavailable("store down".into()).kind(),
            ErrorKind::Systemic
        );
        assert_eq!(SyncError::Enforcement("x".into()).kind(), ErrorKind::Policy);
    }

    #[test]
    fn test_validation_unwrapped_from_core() {
        let err = SyncError::from(CoreError::Validation(ValidationError::Required {
            field: "sku".into(),
        }));
        assert!(matches!(err, SyncError::Validation(_)));
        assert!(err.to_string().contains("sku is required"));
    }
}
