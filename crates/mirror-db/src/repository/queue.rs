//! # Queue Repository
//!
//! Reads and writes one queue table (`<prefix>_TX` or `<prefix>_RX`).
//!
//! ## Who Calls What
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Queue Table Access                                   │
//! │                                                                         │
//! │  UPLOADER (TX)                                                         │
//! │  1. SELECT ... WHERE STATUS = 'Q' ORDER BY ID        rows_with_status  │
//! │  2. hub.queue(row)                                                     │
//! │  3. UPDATE ... SET STATUS, ERROR, PROCESSEDAT        set_row_status    │
//! │     WHERE STATUS = 'Q'   (compare-and-set)                             │
//! │                                                                         │
//! │  DOWNLOADER                                                            │
//! │  a. new rows    → INSERT OR IGNORE INTO RX (one txn)  insert_rows      │
//! │  b. hub results → UPDATE TX ... WHERE STATUS NOT IN   apply_status_    │
//! │                   ('D', 'E')                          update           │
//! │                                                                         │
//! │  All values are bound parameters. The table name is the only text      │
//! │  formatted into SQL and comes from a validated prefix.                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use mirror_core::{NewRow, Queue, QueueRow, RowStatus, StatusUpdate};

use crate::error::{DbError, DbResult};

const SELECT_COLUMNS: &str = "ID AS id, SOURCE AS source, DESTINATION AS destination, \
     TYPE AS row_type, VERSION AS version, DATA AS data, STATUS AS status, ERROR AS error, \
     QUEUEDAT AS queued_at, PROCESSEDAT AS processed_at, DELETEDAT AS deleted_at, \
     REMOTEID AS remote_id";

/// Raw table row before the status code is checked.
#[derive(Debug, sqlx::FromRow)]
struct QueueRecord {
    id: i64,
    source: String,
    destination: String,
    row_type: String,
    version: String,
    data: Option<String>,
    status: String,
    error: Option<String>,
    queued_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
    deleted_at: Option<DateTime<Utc>>,
    remote_id: Option<String>,
}

impl TryFrom<QueueRecord> for QueueRow {
    type Error = DbError;

    fn try_from(record: QueueRecord) -> Result<Self, Self::Error> {
        let status = RowStatus::from_code(&record.status).map_err(|e| DbError::InvalidRow {
            id: record.id,
            reason: e.to_string(),
        })?;

        Ok(QueueRow {
            id: record.id,
            source: record.source,
            destination: record.destination,
            row_type: record.row_type,
            version: record.version,
            data: record.data,
            status,
            error: record.error,
            queued_at: record.queued_at,
            processed_at: record.processed_at,
            deleted_at: record.deleted_at,
            remote_id: record.remote_id,
        })
    }
}

/// Repository for one queue table.
#[derive(Debug, Clone)]
pub struct QueueRepository {
    pool: SqlitePool,
    queue: Queue,
    table: String,
}

impl QueueRepository {
    /// Creates a repository for `queue` under an already validated prefix.
    pub fn new(pool: SqlitePool, queue: Queue, prefix: &str) -> Self {
        QueueRepository {
            pool,
            queue,
            table: queue.table_name(prefix),
        }
    }

    /// Returns the table name this repository works on.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Returns all rows with `status`, oldest id first.
    ///
    /// No pagination: the queue depth is bounded by how fast the hub drains it.
    pub async fn rows_with_status(&self, status: RowStatus) -> DbResult<Vec<QueueRow>> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM {} WHERE STATUS = ?1 AND DELETEDAT IS NULL ORDER BY ID ASC",
            self.table
        );

        let records: Vec<QueueRecord> = sqlx::query_as(&sql)
            .bind(status.code())
            .fetch_all(&self.pool)
            .await?;

        debug!(
            table = %self.table,
            status = %status,
            count = records.len(),
            "Rows selected"
        );

        records.into_iter().map(QueueRow::try_from).collect()
    }

    /// Returns every row of the table, oldest id first.
    pub async fn list_rows(&self) -> DbResult<Vec<QueueRow>> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM {} ORDER BY ID ASC", self.table);

        let records: Vec<QueueRecord> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;

        records.into_iter().map(QueueRow::try_from).collect()
    }

    /// Fetches one row by id.
    pub async fn get(&self, id: i64) -> DbResult<QueueRow> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM {} WHERE ID = ?1", self.table);

        let record: Option<QueueRecord> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        record
            .ok_or_else(|| DbError::not_found(self.table.clone(), id.to_string()))?
            .try_into()
    }

    /// Inserts one queued row and returns its id.
    pub async fn insert_row(&self, row: &NewRow) -> DbResult<i64> {
        let sql = format!(
            "INSERT INTO {} (SOURCE, DESTINATION, TYPE, VERSION, DATA, STATUS, ERROR, QUEUEDAT, REMOTEID) \
             VALUES (?1, ?2, ?3, ?4, ?5, 'Q', NULL, ?6, ?7)",
            self.table
        );

        let result = sqlx::query(&sql)
            .bind(&row.source)
            .bind(&row.destination)
            .bind(&row.row_type)
            .bind(&row.version)
            .bind(&row.data)
            .bind(Utc::now())
            .bind(&row.remote_id)
            .execute(&self.pool)
            .await?;

        Ok(result.last_insert_rowid())
    }

    /// Inserts a batch of queued rows in one transaction.
    ///
    /// Either every row is written or none is. Rows whose `remote_id` is
    /// already stored are skipped, so applying the same batch twice leaves
    /// the table unchanged.
    ///
    /// ## Returns
    /// Number of rows actually inserted.
    pub async fn insert_rows(&self, rows: &[NewRow]) -> DbResult<u64> {
        let sql = format!(
            "INSERT OR IGNORE INTO {} (SOURCE, DESTINATION, TYPE, VERSION, DATA, STATUS, ERROR, QUEUEDAT, REMOTEID) \
             VALUES (?1, ?2, ?3, ?4, ?5, 'Q', NULL, ?6, ?7)",
            self.table
        );

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        let now = Utc::now();
        let mut inserted = 0;
        for row in rows {
            let result = sqlx::query(&sql)
                .bind(&row.source)
                .bind(&row.destination)
                .bind(&row.row_type)
                .bind(&row.version)
                .bind(&row.data)
                .bind(now)
                .bind(&row.remote_id)
                .execute(&mut *tx)
                .await?;
            inserted += result.rows_affected();
        }

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        debug!(
            table = %self.table,
            received = rows.len(),
            inserted,
            "Rows inserted"
        );

        Ok(inserted)
    }

    /// Moves a row from `expected` to `status`, setting its error and
    /// stamping `PROCESSEDAT`.
    ///
    /// Moving a row back to `Queued` clears `PROCESSEDAT` instead.
    ///
    /// ## Returns
    /// `true` iff exactly one live row was still in `expected` and was updated.
    /// A missing, soft-deleted or concurrently changed row gives `false`, so a
    /// late write can never overwrite a terminal status.
    pub async fn set_row_status(
        &self,
        id: i64,
        expected: RowStatus,
        status: RowStatus,
        error: Option<&str>,
    ) -> DbResult<bool> {
        let sql = format!(
            "UPDATE {} SET STATUS = ?1, ERROR = ?2, PROCESSEDAT = ?3 \
             WHERE ID = ?4 AND STATUS = ?5 AND DELETEDAT IS NULL",
            self.table
        );

        let affected = sqlx::query(&sql)
            .bind(status.code())
            .bind(error)
            .bind(processed_at(status))
            .bind(id)
            .bind(expected.code())
            .execute(&self.pool)
            .await?
            .rows_affected();

        debug!(
            table = %self.table,
            row_id = id,
            from = %expected,
            status = %status,
            affected,
            "Row status set"
        );

        Ok(affected == 1)
    }

    /// Applies a hub-reported outcome to a row that is not yet terminal.
    ///
    /// ## Returns
    /// `true` if the row changed; `false` if it is missing, soft-deleted or
    /// already `D`/`E`.
    pub async fn apply_status_update(&self, update: &StatusUpdate) -> DbResult<bool> {
        let sql = format!(
            "UPDATE {} SET STATUS = ?1, ERROR = ?2, PROCESSEDAT = ?3 \
             WHERE ID = ?4 AND DELETEDAT IS NULL AND STATUS NOT IN ('D', 'E')",
            self.table
        );

        let affected = sqlx::query(&sql)
            .bind(update.status.code())
            .bind(&update.error)
            .bind(processed_at(update.status))
            .bind(update.local_id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(affected == 1)
    }

    /// The direction of this table.
    pub fn queue(&self) -> Queue {
        self.queue
    }
}

fn processed_at(status: RowStatus) -> Option<DateTime<Utc>> {
    (status != RowStatus::Queued).then(Utc::now)
}

// =============================================================================
// Unit Tests
// =============================================================================
