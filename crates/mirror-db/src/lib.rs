//! # mirror-db: Queue Table Layer for HubSQL Mirror
//!
//! This crate owns every SQL statement the agent runs. It uses SQLite with
//! sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        HubSQL Mirror Data Flow                          │
//! │                                                                         │
//! │  Uploader / Downloader (mirror-sync)      CLI one-shot tasks           │
//! │       │                                        │                        │
//! │       ▼                                        ▼                        │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     mirror-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │ QueueRepo     │    │  schema      │  │   │
//! │  │   │   (pool.rs)   │    │ (queue.rs)    │    │  seed        │  │   │
//! │  │   │               │    │               │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│ TX / RX rows  │    │ create/drop  │  │   │
//! │  │   │ health check  │    │ status moves  │    │ test rows    │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │          SQLite database: <prefix>_TX, <prefix>_RX              │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`schema`] - Queue table DDL
//! - [`error`] - Database error types
//! - [`repository`] - Queue table repository
//! - [`seed`] - Test rows for the `--insert-*-rows` tasks
//!
//! ## Usage
//!
//! ```rust,ignore
//! use mirror_core::{Queue, RowStatus};
//! use mirror_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("queue.db")).await?;
//! db.create_tables().await?;
//!
//! let queued = db.queue(Queue::Tx).rows_with_status(RowStatus::Queued).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod pool;
pub mod repository;
pub mod schema;
pub mod seed;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use repository::queue::QueueRepository;
