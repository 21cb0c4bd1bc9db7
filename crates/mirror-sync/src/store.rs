//! # Table Store
//!
//! The sync engine's view of the local queue tables.
//!
//! ## Connection Handling
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SqlTableStore                                    │
//! │                                                                         │
//! │   connect() ──► Database::new ──► Some(db)   (no-op when connected)    │
//! │                                                                         │
//! │   rows_with_status / insert_rows / set_row_status / ...                │
//! │        │                                                                │
//! │        ├── Ok  ──► result to caller                                    │
//! │        ├── Err (bad row) ──► error to caller, connection kept          │
//! │        └── Err ──► pool closed, state = None, error to caller          │
//! │                    (next connection tick reconnects)                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The store never retries internally; an empty result always means the
//! query ran and matched nothing.

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use mirror_core::{NewRow, Queue, QueueRow, RowStatus, StatusUpdate};
use mirror_db::{schema, seed, Database, DbConfig, DbResult};

use crate::error::{SyncError, SyncResult};

/// Name used for the store in logs and errors.
pub const STORE_NAME: &str = "table store";

/// Queue table operations the Uploader, Downloader and Connection Manager need.
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Returns true while a working connection is held.
    async fn is_connected(&self) -> bool;

    /// Opens the connection. A no-op when already connected.
    async fn connect(&self) -> SyncResult<()>;

    /// Keepalive. A failure leaves the store disconnected.
    async fn ping(&self) -> SyncResult<()>;

    /// Rows of `queue` with `status`, ordered by id ascending.
    async fn rows_with_status(&self, queue: Queue, status: RowStatus) -> SyncResult<Vec<QueueRow>>;

    /// Inserts a batch in one transaction. Rows whose remote id is already
    /// present are skipped. Returns the number of rows inserted.
    async fn insert_rows(&self, queue: Queue, rows: &[NewRow]) -> SyncResult<u64>;

    /// Moves a row from `expected` to `status`. Returns true iff exactly one
    /// row was still in `expected` and changed.
    async fn set_row_status(
        &self,
        queue: Queue,
        id: i64,
        expected: RowStatus,
        status: RowStatus,
        error: Option<&str>,
    ) -> SyncResult<bool>;

    /// Moves a non-terminal row to the reported status. Returns true iff a
    /// row changed.
    async fn apply_status_update(&self, queue: Queue, update: &StatusUpdate) -> SyncResult<bool>;
}

// =============================================================================
// SQL Table Store
// =============================================================================

/// [`TableStore`] backed by the SQLite queue tables of `mirror-db`.
pub struct SqlTableStore {
    config: DbConfig,
    db: RwLock<Option<Database>>,
}

impl SqlTableStore {
    /// Creates a disconnected store.
    pub fn new(config: DbConfig) -> Self {
        SqlTableStore {
            config,
            db: RwLock::new(None),
        }
    }

    pub fn table_prefix(&self) -> &str {
        &self.config.table_prefix
    }

    /// Closes the pool, if any.
    pub async fn disconnect(&self) {
        if let Some(db) = self.db.write().await.take() {
            db.close().await;
        }
    }

    async fn database(&self) -> SyncResult<Database> {
        self.db
            .read()
            .await
            .clone()
            .ok_or(SyncError::NotConnected(STORE_NAME))
    }

    /// Passes `result` through. Execution and connection faults drop the
    /// connection; a bad row does not.
    async fn track<T>(&self, operation: &str, result: DbResult<T>) -> SyncResult<T> {
        match result {
            Ok(value) => Ok(value),
            Err(e) if e.is_row_error() => {
                warn!(operation, error = %e, "Table store rejected a row");
                Err(e.into())
            }
            Err(e) => {
                warn!(
                    operation,
                    connection = e.is_connection_error(),
                    error = %e,
                    "Table store fault, marking disconnected"
                );
                self.disconnect().await;
                Err(e.into())
            }
        }
    }

    // =========================================================================
    // One-shot Tasks
    // =========================================================================

    /// Creates both queue tables.
    pub async fn create_tables(&self) -> SyncResult<()> {
        let db = self.database().await?;
        let result = db.create_tables().await;
        self.track("create_tables", result).await
    }

    /// Drops both queue tables.
    pub async fn drop_tables(&self) -> SyncResult<()> {
        let db = self.database().await?;
        let result = db.drop_tables().await;
        self.track("drop_tables", result).await
    }

    /// Inserts the fixed test rows of `queue` and returns their ids.
    pub async fn insert_test_rows(&self, queue: Queue) -> SyncResult<Vec<i64>> {
        let db = self.database().await?;
        let result = seed::insert_test_rows(&db, queue).await;
        self.track("insert_test_rows", result).await
    }

    /// Every row of `queue`, ordered by id.
    pub async fn list_rows(&self, queue: Queue) -> SyncResult<Vec<QueueRow>> {
        let db = self.database().await?;
        let result = db.queue(queue).list_rows().await;
        self.track("list_rows", result).await
    }
}

#[async_trait]
impl TableStore for SqlTableStore {
    async fn is_connected(&self) -> bool {
        self.db.read().await.is_some()
    }

    async fn connect(&self) -> SyncResult<()> {
        let mut guard = self.db.write().await;
        if guard.is_some() {
            return Ok(());
        }

        let db = Database::new(self.config.clone()).await?;
        info!(prefix = %db.table_prefix(), "Table store connected");

        for queue in [Queue::Tx, Queue::Rx] {
            if !schema::table_exists(db.pool(), db.table_prefix(), queue).await? {
                warn!(
                    table = %queue.table_name(db.table_prefix()),
                    "Queue table missing, run --create-sql-tables"
                );
            }
        }

        *guard = Some(db);
        Ok(())
    }

    async fn ping(&self) -> SyncResult<()> {
        let db = self.database().await?;
        if db.health_check().await {
            debug!("Table store keepalive ok");
            Ok(())
        } else {
            self.disconnect().await;
            Err(SyncError::DatabaseError("keepalive failed".into()))
        }
    }

    async fn rows_with_status(&self, queue: Queue, status: RowStatus) -> SyncResult<Vec<QueueRow>> {
        let db = self.database().await?;
        let result = db.queue(queue).rows_with_status(status).await;
        self.track("rows_with_status", result).await
    }

    async fn insert_rows(&self, queue: Queue, rows: &[NewRow]) -> SyncResult<u64> {
        let db = self.database().await?;
        let result = db.queue(queue).insert_rows(rows).await;
        self.track("insert_rows", result).await
    }

    async fn set_row_status(
        &self,
        queue: Queue,
        id: i64,
        expected: RowStatus,
        status: RowStatus,
        error: Option<&str>,
    ) -> SyncResult<bool> {
        let db = self.database().await?;
        let result = db
            .queue(queue)
            .set_row_status(id, expected, status, error)
            .await;
        self.track("set_row_status", result).await
    }

    async fn apply_status_update(&self, queue: Queue, update: &StatusUpdate) -> SyncResult<bool> {
        let db = self.database().await?;
        let result = db.queue(queue).apply_status_update(update).await;
        self.track("apply_status_update", result).await
    }
}
