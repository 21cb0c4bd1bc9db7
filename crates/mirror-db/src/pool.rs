//! # Database Pool Management
//!
//! Connection pool creation and configuration for the SQLite queue database.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Database Connection Pool                           │
//! │                                                                         │
//! │  Table store connect() / one-shot CLI task                             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbConfig::new(path) ← Configure pool settings + table prefix          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Database::new(config).await ← Create pool (+ queue tables if asked)   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────┐                           │
//! │  │            SqlitePool                    │                           │
//! │  │  ┌─────┐ ┌─────┐ ┌─────┐ ┌─────┐       │                           │
//! │  │  │Conn1│ │Conn2│ │Conn3│ │Conn4│ ...   │  (max_connections)        │
//! │  │  └─────┘ └─────┘ └─────┘ └─────┘       │                           │
//! │  └─────────────────────────────────────────┘                           │
//! │       │                                                                 │
//! │       ├──► db.queue(Queue::Tx)  ← uploader reads, sets status          │
//! │       └──► db.queue(Queue::Rx)  ← downloader inserts                   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## WAL Mode
//! SQLite WAL mode is enabled so an external producer can keep inserting
//! TX rows while the agent reads and updates them.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use mirror_core::validation::validate_table_prefix;
use mirror_core::{Queue, DEFAULT_TABLE_PREFIX};

use crate::error::{DbError, DbResult};
use crate::repository::queue::QueueRepository;
use crate::schema;

// =============================================================================
// Configuration
// =============================================================================

/// Database configuration.
///
/// ## Example
/// ```rust,ignore
/// let config = DbConfig::new("/var/lib/hubsql/queue.db")
///     .table_prefix("QF")
///     .max_connections(5);
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Path to the SQLite database file.
    pub database_path: PathBuf,

    /// Prefix of the queue tables (`<prefix>_TX`, `<prefix>_RX`).
    pub table_prefix: String,

    /// Maximum number of connections in the pool.
    /// Default: 5
    pub max_connections: u32,

    /// Minimum number of connections to keep alive.
    /// Default: 1
    pub min_connections: u32,

    /// Connection acquire timeout.
    /// Default: 10 seconds
    pub connect_timeout: Duration,

    /// How long a statement waits on a locked database.
    /// Default: 5 seconds
    pub busy_timeout: Duration,

    /// Idle timeout before closing a connection.
    /// Default: 10 minutes
    pub idle_timeout: Duration,

    /// Whether to create the queue tables on connect.
    /// Default: false (tables are created with `--create-sql-tables`)
    pub create_tables: bool,
}

impl DbConfig {
    /// Creates a new database configuration with the given path.
    ///
    /// ## Arguments
    /// * `path` - Path to the SQLite database file. Will be created if it doesn't exist.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            table_prefix: DEFAULT_TABLE_PREFIX.to_string(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(10),
            busy_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(600),
            create_tables: false,
        }
    }

    /// Sets the queue table prefix.
    pub fn table_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.table_prefix = prefix.into();
        self
    }

    /// Sets the maximum number of connections.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the minimum number of connections.
    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    /// Sets the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the busy timeout.
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Sets whether to create the queue tables on connect.
    pub fn create_tables(mut self, create: bool) -> Self {
        self.create_tables = create;
        self
    }

    /// Creates an in-memory database configuration (for testing).
    ///
    /// Queue tables are created on connect.
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(":memory:"),
            table_prefix: DEFAULT_TABLE_PREFIX.to_string(),
            max_connections: 1, // In-memory requires single connection
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            busy_timeout: Duration::from_secs(1),
            idle_timeout: Duration::from_secs(600),
            create_tables: true,
        }
    }
}

// =============================================================================
// Database
// =============================================================================

/// Queue database handle providing repository access.
#[derive(Debug, Clone)]
pub struct Database {
    /// The SQLite connection pool.
    pool: SqlitePool,

    /// Validated queue table prefix.
    table_prefix: String,
}

impl Database {
    /// Creates a new database connection pool.
    ///
    /// ## What This Does
    /// 1. Validates the table prefix (it is formatted into SQL)
    /// 2. Creates the database file if it doesn't exist
    /// 3. Configures SQLite: WAL, NORMAL synchronous, busy timeout
    /// 4. Creates the pool and checks it answers `SELECT 1`
    /// 5. Creates the queue tables (if enabled)
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        validate_table_prefix(&config.table_prefix)
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        info!(
            path = %config.database_path.display(),
            prefix = %config.table_prefix,
            "Initializing database connection"
        );

        // sqlite://path creates file if not exists
        let connect_url = format!("sqlite://{}?mode=rwc", config.database_path.display());

        let connect_options = SqliteConnectOptions::from_str(&connect_url)
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(config.busy_timeout)
            .create_if_missing(true);

        debug!("Connection options configured");

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(Some(config.idle_timeout))
            .connect_with(connect_options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        info!(
            max_connections = config.max_connections,
            "Database pool created"
        );

        let db = Database {
            pool,
            table_prefix: config.table_prefix,
        };

        if !db.health_check().await {
            db.close().await;
            return Err(DbError::ConnectionFailed(
                "database did not answer SELECT 1".to_string(),
            ));
        }

        if config.create_tables {
            db.create_tables().await?;
        }

        Ok(db)
    }

    /// Creates both queue tables and their indexes. Idempotent.
    pub async fn create_tables(&self) -> DbResult<()> {
        schema::create_tables(&self.pool, &self.table_prefix).await
    }

    /// Drops both queue tables. Idempotent.
    pub async fn drop_tables(&self) -> DbResult<()> {
        schema::drop_tables(&self.pool, &self.table_prefix).await
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Returns the configured table prefix.
    pub fn table_prefix(&self) -> &str {
        &self.table_prefix
    }

    /// Returns the repository for one queue table.
    ///
    /// ## Example
    /// ```rust,ignore
    /// let queued = db.queue(Queue::Tx).rows_with_status(RowStatus::Queued).await?;
    /// ```
    pub fn queue(&self, queue: Queue) -> QueueRepository {
        QueueRepository::new(self.pool.clone(), queue, &self.table_prefix)
    }

    /// Closes the database connection pool.
    ///
    /// After calling close, all repository operations will fail.
    pub async fn close(&self) {
        info!("Closing database connection pool");
        self.pool.close().await;
    }

    /// Checks if the database is healthy (can execute queries).
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
