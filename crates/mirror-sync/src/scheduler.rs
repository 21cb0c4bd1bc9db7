//! # Sync Scheduler
//!
//! Drives the Connection Manager, Uploader and Downloader on three
//! independent timers.
//!
//! ## Timer Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         SyncScheduler                                   │
//! │                                                                         │
//! │  ┌───────────────────┐ ┌───────────────────┐ ┌───────────────────┐     │
//! │  │  connect timer    │ │  upload timer     │ │  download timer   │     │
//! │  │  (10s)            │ │  (5s)             │ │  (5s)             │     │
//! │  │                   │ │                   │ │                   │     │
//! │  │ ConnectionManager │ │ Uploader::run     │ │ Downloader::run   │     │
//! │  │ ::tick            │ │                   │ │                   │     │
//! │  └───────────────────┘ └───────────────────┘ └───────────────────┘     │
//! │                                                                         │
//! │  Each timer:  tick ──► sleep(interval) ──► tick ──► ...                │
//! │  • the next tick starts only after the previous one finished           │
//! │  • errors and panics are logged at the tick boundary, never fatal      │
//! │  • the three timers run concurrently with each other                   │
//! │  • shutdown() stops every timer after its current tick                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use futures_util::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::checkpoint::CheckpointStore;
use crate::config::SyncSettings;
use crate::connection::{ConnectionManager, ConnectionMonitor, ConnectionSnapshot};
use crate::downloader::{DownloadOutcome, Downloader};
use crate::error::{SyncError, SyncResult};
use crate::hub_client::HubApi;
use crate::store::TableStore;
use crate::uploader::{UploadReport, Uploader};

// =============================================================================
// Scheduler Status
// =============================================================================

/// Latest result of each timer, for external queries.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStatus {
    pub connections: ConnectionSnapshot,
    pub last_upload: Option<UploadReport>,
    pub last_download: Option<DownloadOutcome>,
    pub last_error: Option<String>,
}

// =============================================================================
// Sync Scheduler
// =============================================================================

pub struct SyncScheduler {
    settings: SyncSettings,
    connections: Arc<ConnectionManager>,
    uploader: Arc<Uploader>,
    downloader: Arc<Downloader>,
    status: Arc<RwLock<SchedulerStatus>>,
}

impl SyncScheduler {
    pub fn builder(settings: SyncSettings) -> SyncSchedulerBuilder {
        SyncSchedulerBuilder::new(settings)
    }

    pub fn monitor(&self) -> ConnectionMonitor {
        self.connections.monitor()
    }

    /// Spawns the timers and returns a handle to stop them.
    pub fn start(self) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let monitor = self.connections.monitor();
        let mut tasks = Vec::with_capacity(3);

        info!(
            connect_ms = self.settings.connect_interval_ms,
            upload_ms = self.settings.upload_interval_ms,
            download_ms = self.settings.download_interval_ms,
            "Starting sync scheduler"
        );

        let connections = self.connections.clone();
        let status = self.status.clone();
        tasks.push(tokio::spawn(run_timer(
            "connect",
            self.settings.connect_interval(),
            shutdown_rx.clone(),
            move || {
                let connections = connections.clone();
                let status = status.clone();
                async move {
                    let snapshot = connections.tick().await;
                    status.write().await.connections = snapshot;
                    Ok(())
                }
            },
        )));

        if self.settings.upload_enabled {
            let uploader = self.uploader.clone();
            let status = self.status.clone();
            tasks.push(tokio::spawn(run_timer(
                "upload",
                self.settings.upload_interval(),
                shutdown_rx.clone(),
                move || {
                    let uploader = uploader.clone();
                    let status = status.clone();
                    async move {
                        let result = uploader.run().await;
                        record(&status, result, |s, report| s.last_upload = Some(report)).await
                    }
                },
            )));
        } else {
            info!("Upload timer disabled");
        }

        if self.settings.download_enabled {
            let downloader = self.downloader.clone();
            let status = self.status.clone();
            tasks.push(tokio::spawn(run_timer(
                "download",
                self.settings.download_interval(),
                shutdown_rx,
                move || {
                    let downloader = downloader.clone();
                    let status = status.clone();
                    async move {
                        let result = downloader.run().await;
                        record(&status, result, |s, outcome| s.last_download = Some(outcome)).await
                    }
                },
            )));
        } else {
            info!("Download timer disabled");
        }

        SchedulerHandle {
            shutdown_tx,
            tasks,
            monitor,
            status: self.status,
        }
    }
}

async fn record<T>(
    status: &RwLock<SchedulerStatus>,
    result: SyncResult<T>,
    apply: impl FnOnce(&mut SchedulerStatus, T),
) -> SyncResult<()> {
    let mut guard = status.write().await;
    match result {
        Ok(value) => {
            apply(&mut *guard, value);
            Ok(())
        }
        Err(e) => {
            guard.last_error = Some(e.to_string());
            Err(e)
        }
    }
}

/// Runs `tick` forever, sleeping `every` after each completed tick.
pub(crate) async fn run_timer<F, Fut>(
    name: &'static str,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut tick: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = SyncResult<()>>,
{
    debug!(timer = name, interval_ms = every.as_millis() as u64, "Timer started");

    loop {
        if *shutdown.borrow() {
            break;
        }

        match AssertUnwindSafe(tick()).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) if e.is_retryable() => warn!(timer = name, ?e, "Tick failed, retrying"),
            Ok(Err(e)) => error!(timer = name, ?e, "Tick failed"),
            Err(panic) => {
                let e = SyncError::TickPanicked(panic_message(panic.as_ref()));
                error!(timer = name, ?e, "Tick panicked");
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(every) => {}
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    debug!(timer = name, "Timer stopped");
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// =============================================================================
// Scheduler Handle
// =============================================================================

/// Handle for a running scheduler.
pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    monitor: ConnectionMonitor,
    status: Arc<RwLock<SchedulerStatus>>,
}

impl SchedulerHandle {
    pub fn monitor(&self) -> &ConnectionMonitor {
        &self.monitor
    }

    pub async fn status(&self) -> SchedulerStatus {
        self.status.read().await.clone()
    }

    /// Stops every timer once its current tick is done and waits for them.
    pub async fn shutdown(self) {
        info!("Shutting down sync scheduler");
        let _ = self.shutdown_tx.send(true);

        for task in self.tasks {
            if let Err(e) = task.await {
                error!(?e, "Timer task ended abnormally");
            }
        }

        info!("Sync scheduler stopped");
    }
}

// =============================================================================
// Builder
// =============================================================================

pub struct SyncSchedulerBuilder {
    settings: SyncSettings,
    store: Option<Arc<dyn TableStore>>,
    hub: Option<Arc<dyn HubApi>>,
    checkpoint: Option<Arc<dyn CheckpointStore>>,
}

impl SyncSchedulerBuilder {
    pub fn new(settings: SyncSettings) -> Self {
        SyncSchedulerBuilder {
            settings,
            store: None,
            hub: None,
            checkpoint: None,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn TableStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_hub(mut self, hub: Arc<dyn HubApi>) -> Self {
        self.hub = Some(hub);
        self
    }

    pub fn with_checkpoint(mut self, checkpoint: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoint = Some(checkpoint);
        self
    }

    pub fn build(self) -> SyncResult<SyncScheduler> {
        let store = self
            .store
            .ok_or_else(|| SyncError::Internal("scheduler needs a table store".into()))?;
        let hub = self
            .hub
            .ok_or_else(|| SyncError::Internal("scheduler needs a hub client".into()))?;
        let checkpoint = self
            .checkpoint
            .ok_or_else(|| SyncError::Internal("scheduler needs a checkpoint store".into()))?;

        let policy = self.settings.cursor_policy;

        Ok(SyncScheduler {
            connections: Arc::new(ConnectionManager::new(store.clone(), hub.clone())),
            uploader: Arc::new(Uploader::new(store.clone(), hub.clone())),
            downloader: Arc::new(Downloader::new(store, hub, checkpoint, policy)),
            status: Arc::new(RwLock::new(SchedulerStatus::default())),
            settings: self.settings,
        })
    }
}
