//! # Validation
//!
//! Input checks applied before any store is touched.
//!
//! ```text
//! caller ──► validation (this module) ──► propagator ──► SQLite constraints
//!              rejects bad input           applies        CHECK / UNIQUE
//!              with no side effects        the change     catch the rest
//! ```

use crate::error::ValidationError;
use crate::{MAX_ALLOCATION_DELTA, MAX_REASON_LEN, MAX_SKU_LEN};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Identifiers
// =============================================================================

/// Validates a System A agent id.
pub fn validate_agent_id(agent_id: i64) -> ValidationResult<()> {
    if agent_id <= 0 {
        return Err(ValidationError::OutOfRange {
            field: "agent_id".to_string(),
            min: 1,
            max: i64::MAX,
        });
    }
    Ok(())
}

/// Validates a product code and returns it trimmed.
///
/// ```rust
/// use tandem_core::validation::validate_sku;
///
/// assert_eq!(validate_sku(" X1 ").unwrap(), "X1");
/// assert!(validate_sku("").is_err());
/// assert!(validate_sku("X 1").is_err());
/// ```
pub fn validate_sku(sku: &str) -> ValidationResult<String> {
    let sku = sku.trim();

    if sku.is_empty() {
        return Err(ValidationError::Required {
            field: "sku".to_string(),
        });
    }

    if sku.len() > MAX_SKU_LEN {
        return Err(ValidationError::TooLong {
            field: "sku".to_string(),
            max: MAX_SKU_LEN,
        });
    }

    if !sku
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(ValidationError::InvalidFormat {
            field: "sku".to_string(),
            reason: "only letters, digits, '-', '_' and '.' are allowed".to_string(),
        });
    }

    Ok(sku.to_string())
}

/// Validates an upstream allocation id used for de-duplication.
pub fn validate_allocation_id(allocation_id: &str) -> ValidationResult<String> {
    validate_dedup_id("allocation_id", allocation_id)
}

/// Validates the id a compliance action is audited and de-duplicated under.
pub fn validate_action_id(action_id: &str) -> ValidationResult<String> {
    validate_dedup_id("action_id", action_id)
}

fn validate_dedup_id(field: &str, value: &str) -> ValidationResult<String> {
    let id = value.trim();
    if id.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    if id.len() > 128 {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: 128,
        });
    }
    Ok(id.to_string())
}

// =============================================================================
// Quantities & Scores
// =============================================================================

/// Validates a stock delta: non-zero and bounded in magnitude.
pub fn validate_quantity_delta(delta: i64) -> ValidationResult<()> {
    if delta == 0 {
        return Err(ValidationError::MustBeNonZero {
            field: "quantity".to_string(),
        });
    }

    if !(-MAX_ALLOCATION_DELTA..=MAX_ALLOCATION_DELTA).contains(&delta) {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: -MAX_ALLOCATION_DELTA,
            max: MAX_ALLOCATION_DELTA,
        });
    }

    Ok(())
}

/// Validates a compliance score (0-100).
pub fn validate_compliance_score(score: i64) -> ValidationResult<()> {
    if !(0..=100).contains(&score) {
        return Err(ValidationError::OutOfRange {
            field: "compliance_score".to_string(),
            min: 0,
            max: 100,
        });
    }
    Ok(())
}

// =============================================================================
// Free Text
// =============================================================================

/// Validates a compliance or enforcement reason and returns it trimmed.
pub fn validate_reason(reason: &str) -> ValidationResult<String> {
    let reason = reason.trim();

    if reason.is_empty() {
        return Err(ValidationError::Required {
            field: "reason".to_string(),
        });
    }

    if reason.chars().count() > MAX_REASON_LEN {
        return Err(ValidationError::TooLong {
            field: "reason".to_string(),
            max: MAX_REASON_LEN,
        });
    }

    Ok(reason.to_string())
}
