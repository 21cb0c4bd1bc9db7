//! # Validation Module
//!
//! Checks applied to configuration values before they reach SQL.
//!
//! Queue table names cannot be bound as statement parameters, so the
//! configured prefix is the one value that is formatted into SQL text.
//! It must therefore be a plain identifier.
//!
//! ## Usage
//! ```rust
//! use mirror_core::validation::validate_table_prefix;
//!
//! assert!(validate_table_prefix("HUBSQL").is_ok());
//! assert!(validate_table_prefix("QF; DROP TABLE x").is_err());
//! ```

use crate::error::ValidationError;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Longest prefix accepted, leaving room for the `_TX`/`_RX` suffix.
pub const MAX_TABLE_PREFIX_LEN: usize = 60;

/// Validates a queue table prefix.
///
/// ## Rules
/// - Must not be empty
/// - At most [`MAX_TABLE_PREFIX_LEN`] characters
/// - ASCII letters, digits and underscores only, not starting with a digit
pub fn validate_table_prefix(prefix: &str) -> ValidationResult<()> {
    if prefix.is_empty() {
        return Err(ValidationError::Required {
            field: "table_prefix".to_string(),
        });
    }

    if prefix.len() > MAX_TABLE_PREFIX_LEN {
        return Err(ValidationError::TooLong {
            field: "table_prefix".to_string(),
            max: MAX_TABLE_PREFIX_LEN,
        });
    }

    if prefix.starts_with(|c: char| c.is_ascii_digit()) {
        return Err(ValidationError::InvalidFormat {
            field: "table_prefix".to_string(),
            reason: "must not start with a digit".to_string(),
        });
    }

    if !prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ValidationError::InvalidFormat {
            field: "table_prefix".to_string(),
            reason: "only letters, digits and underscores are allowed".to_string(),
        });
    }

    Ok(())
}

/// Validates that a required text setting is present.
pub fn validate_required(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    Ok(())
}
