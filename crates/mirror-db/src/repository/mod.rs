//! # Repository Module
//!
//! Database repository implementations for HubSQL Mirror.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern                                   │
//! │                                                                         │
//! │  Table store / CLI task                                                │
//! │       │                                                                 │
//! │       │  db.queue(Queue::Tx).rows_with_status(RowStatus::Queued)       │
//! │       ▼                                                                 │
//! │  QueueRepository (one per table)                                       │
//! │  ├── rows_with_status / list_rows / get                                │
//! │  ├── insert_row / insert_rows                                          │
//! │  └── set_row_status / apply_status_update                              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite <prefix>_TX / <prefix>_RX                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`queue::QueueRepository`] - TX/RX queue table access

pub mod queue;
