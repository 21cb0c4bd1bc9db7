//! # Sync Error Types
//!
//! Error types for sync operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │  Connectivity   │  │     Protocol            │ │
//! │  │  (fatal)        │  │  (retry next    │  │  (per row / per batch)  │ │
//! │  │                 │  │   tick)         │  │                         │ │
//! │  │  InvalidConfig  │  │  NotConnected   │  │  InvalidMessage         │ │
//! │  │  MissingSetting │  │  Unauthorized   │  │  UnknownStatus          │ │
//! │  │  InvalidUrl     │  │  Transport      │  │  HubRejected            │ │
//! │  │  ConfigLoad     │  │  Database       │  │  MixedBatch             │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐                              │
//! │  │   Checkpoint    │  │    Internal     │                              │
//! │  │                 │  │                 │                              │
//! │  │  CheckpointIo   │  │  TickPanicked   │                              │
//! │  │  CheckpointCorrupt│ │  Internal       │                              │
//! │  └─────────────────┘  └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering all possible sync failures.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A required setting is absent.
    #[error("Missing required setting: {0}")]
    MissingSetting(String),

    /// Invalid hub URL.
    #[error("Invalid hub URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    // =========================================================================
    // Connectivity Errors
    // =========================================================================
    /// A dependency is not connected; the operation was not attempted.
    #[error("{0} is not connected")]
    NotConnected(&'static str),

    /// The hub answered 401; the token has been dropped.
    #[error("Hub rejected the bearer token")]
    Unauthorized,

    /// Request never got an HTTP answer (DNS, refused, timeout, TLS).
    #[error("Hub transport error: {0}")]
    Transport(String),

    /// Table store statement failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    // =========================================================================
    // Protocol Errors
    // =========================================================================
    /// The hub answered with a non-success status other than 401.
    #[error("Hub returned HTTP {status} for {method}: {body}")]
    HubRejected {
        method: String,
        status: u16,
        body: String,
    },

    /// Unparseable or incomplete hub message.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Status code outside the known alphabet.
    #[error("Unknown status code from hub: {0}")]
    UnknownStatus(String),

    /// A dequeue response mixed new rows and status updates.
    #[error("Dequeue batch mixes {rows} new rows with {updates} status updates")]
    MixedBatch { rows: usize, updates: usize },

    /// Failed to serialize message.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    // =========================================================================
    // Checkpoint Errors
    // =========================================================================
    /// Reading or writing the checkpoint file failed.
    #[error("Checkpoint I/O failed: {0}")]
    CheckpointIo(String),

    /// The checkpoint file exists but is not `{"lastTick": <ms>}`.
    #[error("Checkpoint file is corrupt: {0}")]
    CheckpointCorrupt(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// A tick panicked; the timer keeps running.
    #[error("Tick panicked: {0}")]
    TickPanicked(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<mirror_db::DbError> for SyncError {
    fn from(err: mirror_db::DbError) -> Self {
        SyncError::DatabaseError(err.to_string())
    }
}

impl From<mirror_core::CoreError> for SyncError {
    fn from(err: mirror_core::CoreError) -> Self {
        match err {
            mirror_core::CoreError::UnknownStatus(code) => SyncError::UnknownStatus(code),
            other => SyncError::InvalidMessage(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::SerializationFailed(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SyncError::InvalidMessage(err.to_string())
        } else {
            SyncError::Transport(err.to_string())
        }
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::CheckpointIo(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl SyncError {
    /// Returns true if the next tick may succeed without operator action.
    ///
    /// ## Retryable Errors
    /// - Connectivity faults (store or hub down, token rejected)
    /// - Hub answering non-success for one request
    ///
    /// ## Non-Retryable Errors
    /// - Configuration errors
    /// - Corrupt checkpoint file
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::NotConnected(_)
                | SyncError::Unauthorized
                | SyncError::Transport(_)
                | SyncError::DatabaseError(_)
                | SyncError::HubRejected { .. }
                | SyncError::CheckpointIo(_)
        )
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::MissingSetting(_)
                | SyncError::InvalidUrl(_)
                | SyncError::ConfigLoadFailed(_)
        )
    }

    /// Returns true if the hub token should be dropped after this error.
    pub fn invalidates_token(&self) -> bool {
        matches!(self, SyncError::Unauthorized | SyncError::Transport(_))
    }
}
