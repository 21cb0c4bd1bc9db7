//! # Error Types
//!
//! Domain-specific error types for mirror-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  mirror-core errors (this file)                                        │
//! │  ├── CoreError        - Row/queue model errors                         │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  mirror-db errors (separate crate)                                     │
//! │  └── DbError          - Queue table failures                           │
//! │                                                                         │
//! │  mirror-sync errors (separate crate)                                   │
//! │  └── SyncError        - Hub, config, checkpoint failures               │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → SyncError → log line    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Row model errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A status code outside the Q/P/D/E alphabet.
    ///
    /// ## When This Occurs
    /// - The hub answers a queue request with a code this agent does not know
    /// - A queue table row was edited by hand
    #[error("Unknown row status code: '{0}'")]
    UnknownStatus(String),

    /// A transition out of a terminal state was requested.
    #[error("Row {id} is {status} and cannot move to {requested}")]
    TerminalStatus {
        id: i64,
        status: String,
        requested: String,
    },

    /// Unknown queue direction name.
    #[error("Unknown queue '{0}', expected 'tx' or 'rx'")]
    UnknownQueue(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Invalid format (e.g., not an SQL identifier).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
