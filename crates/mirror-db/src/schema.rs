//! # Queue Table Schema
//!
//! DDL for the two queue tables, one per direction.
//!
//! ## Table Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    <prefix>_TX  /  <prefix>_RX                          │
//! │                                                                         │
//! │  ID           INTEGER  PK, AUTOINCREMENT (never reused)                 │
//! │  SOURCE       TEXT     routing: producing system                        │
//! │  DESTINATION  TEXT     routing: consuming system                        │
//! │  TYPE         TEXT     payload schema tag (MATERIAL$POST ...)           │
//! │  VERSION      TEXT     payload schema version                           │
//! │  DATA         TEXT     opaque document, nullable                        │
//! │  STATUS       TEXT     Q | P | D | E                                    │
//! │  ERROR        TEXT     diagnostic, nullable                             │
//! │  QUEUEDAT     DATETIME set once                                         │
//! │  PROCESSEDAT  DATETIME last transition, NULL while queued               │
//! │  DELETEDAT    DATETIME soft delete, unused by the loops                 │
//! │  REMOTEID     TEXT     hub id of downloaded rows, UNIQUE when set       │
//! │                                                                         │
//! │  INDEX (STATUS, ID)       ← uploader scan                              │
//! │  UNIQUE INDEX (REMOTEID)  ← idempotent download apply                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! There is no migration history: the tables are created and dropped as a
//! whole by the `--create-sql-tables` / `--drop-sql-tables` tasks.

use sqlx::SqlitePool;
use tracing::info;

use mirror_core::Queue;

use crate::error::{DbError, DbResult};

const QUEUES: [Queue; 2] = [Queue::Rx, Queue::Tx];

fn create_statements(table: &str) -> [String; 3] {
    [
        format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                ID          INTEGER PRIMARY KEY AUTOINCREMENT,
                SOURCE      TEXT NOT NULL,
                DESTINATION TEXT NOT NULL,
                TYPE        TEXT NOT NULL,
                VERSION     TEXT NOT NULL,
                DATA        TEXT,
                STATUS      TEXT NOT NULL DEFAULT 'Q' CHECK (STATUS IN ('Q', 'P', 'D', 'E')),
                ERROR       TEXT,
                QUEUEDAT    DATETIME NOT NULL,
                PROCESSEDAT DATETIME,
                DELETEDAT   DATETIME,
                REMOTEID    TEXT
            )"
        ),
        format!("CREATE INDEX IF NOT EXISTS {table}_STATUS_IDX ON {table} (STATUS, ID)"),
        format!("CREATE UNIQUE INDEX IF NOT EXISTS {table}_REMOTEID_IDX ON {table} (REMOTEID)"),
    ]
}

/// Creates both queue tables with their indexes.
///
/// Every statement is `IF NOT EXISTS`, so running it twice is harmless.
pub async fn create_tables(pool: &SqlitePool, prefix: &str) -> DbResult<()> {
    for queue in QUEUES {
        let table = queue.table_name(prefix);
        for stmt in create_statements(&table) {
            sqlx::query(&stmt)
                .execute(pool)
                .await
                .map_err(|e| DbError::SchemaFailed(format!("{table}: {e}")))?;
        }
        info!(table = %table, "Queue table created");
    }
    Ok(())
}

/// Drops both queue tables.
pub async fn drop_tables(pool: &SqlitePool, prefix: &str) -> DbResult<()> {
    for queue in QUEUES {
        let table = queue.table_name(prefix);
        let stmt = format!("DROP TABLE IF EXISTS {table}");
        sqlx::query(&stmt)
            .execute(pool)
            .await
            .map_err(|e| DbError::SchemaFailed(format!("{table}: {e}")))?;
        info!(table = %table, "Queue table dropped");
    }
    Ok(())
}

/// Returns true if the queue table exists.
pub async fn table_exists(pool: &SqlitePool, prefix: &str, queue: Queue) -> DbResult<bool> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1")
            .bind(queue.table_name(prefix))
            .fetch_one(pool)
            .await?;

    Ok(count == 1)
}
