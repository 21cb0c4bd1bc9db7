//! # mirror-core: Pure Queue Model for HubSQL Mirror
//!
//! This crate holds the row, status and cursor types shared by every other
//! crate in the workspace. It has zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      HubSQL Mirror Architecture                         │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 hubsql-mirror (apps/mirror-agent)               │   │
//! │  │          CLI flags, one-shot tasks, scheduler startup           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    mirror-sync (engine)                         │   │
//! │  │   hub client, connection manager, uploader, downloader         │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                  mirror-db (queue tables)                       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ mirror-core (THIS CRATE) ★                      │   │
//! │  │   QueueRow • RowStatus • Queue • Cursor • validation           │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK                             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Queue rows, status codes, cursor
//! - [`error`] - Domain error types
//! - [`validation`] - Identifier and settings validation
//!
//! ## Example Usage
//!
//! ```rust
//! use mirror_core::{Cursor, RowStatus};
//!
//! let status = RowStatus::from_code("D").unwrap();
//! assert!(status.is_terminal());
//!
//! let saved = Cursor::from_millis(1_000);
//! assert_eq!(saved.advance_to(Cursor::from_millis(500)), saved);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Default queue table prefix, giving `HUBSQL_TX` and `HUBSQL_RX`.
pub const DEFAULT_TABLE_PREFIX: &str = "HUBSQL";
