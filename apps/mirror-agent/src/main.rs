//! # HubSQL Mirror Agent
//!
//! Mirrors the local TX/RX queue tables with the hub until stopped, or runs
//! a single table maintenance task and exits.
//!
//! ## Startup
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          hubsql-mirror                                  │
//! │                                                                         │
//! │  flags ──► tracing ──► MirrorConfig::load                              │
//! │                              │                                          │
//! │             task flag? ──────┼──────── no task flag                    │
//! │                 │                            │                          │
//! │                 ▼                            ▼                          │
//! │     SqlTableStore one-shot          SyncScheduler::start               │
//! │     (create/drop/insert/list)       wait for Ctrl+C / SIGTERM          │
//! │     exit                            handle.shutdown()                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{ArgGroup, Parser};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use mirror_core::Queue;
use mirror_sync::{
    FileCheckpointStore, HubClient, MirrorConfig, SqlTableStore, SyncScheduler, TableStore,
};

#[derive(Debug, Parser)]
#[command(name = "hubsql-mirror", version, about = "Mirror SQL queue tables with the hub")]
#[command(group(
    ArgGroup::new("task")
        .args([
            "create_sql_tables",
            "drop_sql_tables",
            "insert_tx_rows",
            "insert_rx_rows",
            "list_tx_rows",
            "list_rx_rows",
        ])
        .multiple(false)
))]
struct Cli {
    /// Configuration file (TOML).
    #[arg(long, env = "HUBSQL_CONFIG")]
    config: Option<PathBuf>,

    /// Debug logging.
    #[arg(short, long)]
    verbose: bool,

    /// Create the TX and RX tables, then exit.
    #[arg(long)]
    create_sql_tables: bool,

    /// Drop the TX and RX tables, then exit.
    #[arg(long)]
    drop_sql_tables: bool,

    /// Insert sample outbound rows, then exit.
    #[arg(long)]
    insert_tx_rows: bool,

    /// Insert sample inbound rows, then exit.
    #[arg(long)]
    insert_rx_rows: bool,

    /// Print every TX row as JSON, then exit.
    #[arg(long)]
    list_tx_rows: bool,

    /// Print every RX row as JSON, then exit.
    #[arg(long)]
    list_rx_rows: bool,
}

/// One-shot table maintenance tasks.
#[derive(Debug, Clone, Copy)]
enum Task {
    CreateTables,
    DropTables,
    InsertRows(Queue),
    ListRows(Queue),
}

impl Cli {
    fn task(&self) -> Option<Task> {
        if self.create_sql_tables {
            Some(Task::CreateTables)
        } else if self.drop_sql_tables {
            Some(Task::DropTables)
        } else if self.insert_tx_rows {
            Some(Task::InsertRows(Queue::Tx))
        } else if self.insert_rx_rows {
            Some(Task::InsertRows(Queue::Rx))
        } else if self.list_tx_rows {
            Some(Task::ListRows(Queue::Tx))
        } else if self.list_rx_rows {
            Some(Task::ListRows(Queue::Rx))
        } else {
            None
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match MirrorConfig::load(cli.config.clone()) {
        Ok(config) => config,
        Err(e) if e.is_config_error() => bail!("Invalid configuration: {}", e),
        Err(e) => return Err(e).context("Failed to load configuration"),
    };
    info!(
        database = %config.sql.database,
        hub = %config.hub.url,
        service = %config.hub.service,
        "Configuration loaded"
    );

    match cli.task() {
        Some(task) => run_task(&config, task).await,
        None => run_agent(config).await,
    }
}

// =============================================================================
// One-shot Tasks
// =============================================================================

async fn run_task(config: &MirrorConfig, task: Task) -> anyhow::Result<()> {
    let store = SqlTableStore::new(config.sql.db_config());
    store
        .connect()
        .await
        .context("Failed to connect to the table store")?;

    match task {
        Task::CreateTables => {
            store.create_tables().await.context("Failed to create tables")?;
            info!(prefix = store.table_prefix(), "Tables created");
        }
        Task::DropTables => {
            store.drop_tables().await.context("Failed to drop tables")?;
            info!(prefix = store.table_prefix(), "Tables dropped");
        }
        Task::InsertRows(queue) => {
            let ids = store
                .insert_test_rows(queue)
                .await
                .with_context(|| format!("Failed to insert {} test rows", queue))?;
            info!(%queue, ?ids, "Test rows inserted");
        }
        Task::ListRows(queue) => {
            let rows = store
                .list_rows(queue)
                .await
                .with_context(|| format!("Failed to list {} rows", queue))?;
            for row in &rows {
                println!("{}", serde_json::to_string(row)?);
            }
            info!(%queue, count = rows.len(), "Rows listed");
        }
    }

    store.disconnect().await;
    Ok(())
}

// =============================================================================
// Agent
// =============================================================================

async fn run_agent(config: MirrorConfig) -> anyhow::Result<()> {
    let checkpoint_path = config.sync.checkpoint_path();
    info!(checkpoint = %checkpoint_path.display(), "Starting mirror agent");

    let store = Arc::new(SqlTableStore::new(config.sql.db_config()));
    let hub = Arc::new(HubClient::new(config.hub.clone()).context("Failed to build hub client")?);

    let handle = SyncScheduler::builder(config.sync.clone())
        .with_store(store.clone())
        .with_hub(hub)
        .with_checkpoint(Arc::new(FileCheckpointStore::new(checkpoint_path)))
        .build()?
        .start();

    shutdown_signal().await;

    handle.shutdown().await;
    store.disconnect().await;
    info!("Mirror agent stopped");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(?e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(?e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
