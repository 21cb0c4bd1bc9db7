//! # mirror-sync: Sync Engine for HubSQL Mirror
//!
//! This crate mirrors rows between the local queue tables and the hub, in
//! both directions, on fixed polling timers. Either side may be unreachable
//! at any time; work resumes once it comes back.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Sync Engine Architecture                         │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                 SyncScheduler (three timers)                     │  │
//! │  └───────┬──────────────────────┬──────────────────────┬────────────┘  │
//! │          ▼                      ▼                      ▼               │
//! │  ┌────────────────┐   ┌────────────────┐   ┌────────────────────────┐  │
//! │  │ Connection     │   │ Uploader       │   │ Downloader             │  │
//! │  │ Manager        │   │                │   │                        │  │
//! │  │ connect/auth   │   │ TX 'Q' rows    │   │ dequeue since cursor   │  │
//! │  │ keepalive      │   │ ──► hub queue  │   │ ──► RX rows / statuses │  │
//! │  └───────┬────────┘   └───────┬────────┘   └──────┬──────────┬──────┘  │
//! │          │                    │                   │          │         │
//! │          ▼                    ▼                   ▼          ▼         │
//! │  ┌─────────────────────────────────────────────────────┐ ┌──────────┐  │
//! │  │   TableStore (SQLite)          HubApi (reqwest)     │ │Checkpoint│  │
//! │  └─────────────────────────────────────────────────────┘ │ lastTick │  │
//! │                                                          └──────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`scheduler`] - `SyncScheduler` timers and handle
//! - [`connection`] - Connection Manager and read-only monitor
//! - [`uploader`] - TX upload pass
//! - [`downloader`] - RX download pass and cursor commit
//! - [`checkpoint`] - Cursor persistence
//! - [`store`] - `TableStore` trait and SQLite implementation
//! - [`hub_client`] - `HubApi` trait and HTTP implementation
//! - [`hub_auth`] - Bearer token cache
//! - [`protocol`] - Hub JSON messages
//! - [`config`] - Agent configuration
//! - [`error`] - Sync error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use mirror_sync::{FileCheckpointStore, HubClient, MirrorConfig, SqlTableStore, SyncScheduler};
//!
//! let config = MirrorConfig::load(None)?;
//!
//! let scheduler = SyncScheduler::builder(config.sync.clone())
//!     .with_store(Arc::new(SqlTableStore::new(config.sql.db_config())))
//!     .with_hub(Arc::new(HubClient::new(config.hub.clone())?))
//!     .with_checkpoint(Arc::new(FileCheckpointStore::new(config.sync.checkpoint_path())))
//!     .build()?;
//!
//! let handle = scheduler.start();
//! // ...
//! handle.shutdown().await;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod checkpoint;
pub mod config;
pub mod connection;
pub mod downloader;
pub mod error;
pub mod hub_auth;
pub mod hub_client;
pub mod protocol;
pub mod scheduler;
pub mod store;
pub mod uploader;

// =============================================================================
// Re-exports
// =============================================================================

pub use checkpoint::{CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};
pub use config::{CursorPolicy, HubSettings, MirrorConfig, SqlSettings, SyncSettings};
pub use connection::{ConnectionManager, ConnectionMonitor, ConnectionSnapshot, LinkState};
pub use downloader::{DownloadOutcome, Downloader};
pub use error::{SyncError, SyncResult};
pub use hub_client::{HubApi, HubClient};
pub use scheduler::{SchedulerHandle, SchedulerStatus, SyncScheduler, SyncSchedulerBuilder};
pub use store::{SqlTableStore, TableStore};
pub use uploader::{UploadReport, Uploader};
