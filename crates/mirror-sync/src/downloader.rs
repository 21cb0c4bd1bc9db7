//! # Downloader
//!
//! Pulls hub changes since the checkpoint and applies them to the local
//! queue tables.
//!
//! ## Download Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Downloader::run                                 │
//! │                                                                         │
//! │  1. load cursor ── none ──► save(now), return Initialized              │
//! │  2. links up? ──── no ────► return Skipped                             │
//! │  3. request_time = now                                                 │
//! │     hub.dequeue(cursor) ── err ──► return FetchFailed   (cursor kept)  │
//! │  4. classify ───── err ──► return FetchFailed           (cursor kept)  │
//! │     empty ─────────────────► return Empty               (cursor kept)  │
//! │  5. apply                                                              │
//! │       rows    ──► insert_rows(RX) in one transaction                   │
//! │       updates ──► apply_status_update(TX) per item                     │
//! │     any error ──► return ApplyFailed                    (cursor kept)  │
//! │  6. save(max(cursor, candidate)) ──► return Applied                    │
//! │                                                                         │
//! │  candidate = request_time          (CursorPolicy::RequestTime)         │
//! │            | newest row timestamp  (CursorPolicy::NewestObserved)      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Redelivered batches are harmless: RX inserts are keyed by remote id and
//! status updates never leave a terminal state.

use std::sync::Arc;
use tracing::{debug, info, warn};

use mirror_core::{Cursor, Queue};

use crate::checkpoint::CheckpointStore;
use crate::config::CursorPolicy;
use crate::error::SyncResult;
use crate::hub_client::HubApi;
use crate::protocol::{BatchContent, DequeueBatch};
use crate::store::TableStore;

/// Result of one download tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// First run: the cursor was set to now, nothing was fetched.
    Initialized(Cursor),
    /// A link was down.
    Skipped,
    /// The dequeue call failed or returned an unusable batch.
    FetchFailed,
    /// Nothing changed on the hub.
    Empty,
    /// The batch was not fully applied; it will be fetched again.
    ApplyFailed,
    /// The batch was applied and the cursor committed.
    Applied { items: usize, cursor: Cursor },
}

pub struct Downloader {
    store: Arc<dyn TableStore>,
    hub: Arc<dyn HubApi>,
    checkpoint: Arc<dyn CheckpointStore>,
    policy: CursorPolicy,
}

impl Downloader {
    pub fn new(
        store: Arc<dyn TableStore>,
        hub: Arc<dyn HubApi>,
        checkpoint: Arc<dyn CheckpointStore>,
        policy: CursorPolicy,
    ) -> Self {
        Downloader {
            store,
            hub,
            checkpoint,
            policy,
        }
    }

    /// Runs one download pass.
    ///
    /// Only checkpoint I/O failures are returned as errors; everything else
    /// is reported through the outcome.
    pub async fn run(&self) -> SyncResult<DownloadOutcome> {
        let Some(cursor) = self.checkpoint.load().await? else {
            let initial = Cursor::now();
            self.checkpoint.save(initial).await?;
            info!(cursor = %initial, "No checkpoint, starting from now");
            return Ok(DownloadOutcome::Initialized(initial));
        };

        if !(self.store.is_connected().await && self.hub.is_authenticated().await) {
            debug!("Download skipped, waiting for connections");
            return Ok(DownloadOutcome::Skipped);
        }

        let request_time = Cursor::now();
        let items = match self.hub.dequeue(cursor).await {
            Ok(items) => items,
            Err(e) => {
                warn!(cursor = %cursor, error = %e, "Dequeue failed, cursor kept");
                return Ok(DownloadOutcome::FetchFailed);
            }
        };

        let batch = match DequeueBatch::classify(items) {
            Ok(batch) => batch,
            Err(e) => {
                warn!(cursor = %cursor, error = %e, "Dequeue batch rejected, cursor kept");
                return Ok(DownloadOutcome::FetchFailed);
            }
        };

        if batch.is_empty() {
            debug!(cursor = %cursor, "Nothing to download");
            return Ok(DownloadOutcome::Empty);
        }

        let items = batch.len();
        if let Err(e) = self.apply(&batch).await {
            warn!(cursor = %cursor, items, error = %e, "Batch apply failed, cursor kept");
            return Ok(DownloadOutcome::ApplyFailed);
        }

        let candidate = match self.policy {
            CursorPolicy::RequestTime => request_time,
            CursorPolicy::NewestObserved => batch.newest_observed.unwrap_or(request_time),
        };
        let next = cursor.advance_to(candidate);
        if next != cursor {
            self.checkpoint.save(next).await?;
        }

        info!(items, from = %cursor, to = %next, "Download batch applied");
        Ok(DownloadOutcome::Applied {
            items,
            cursor: next,
        })
    }

    async fn apply(&self, batch: &DequeueBatch) -> SyncResult<()> {
        match &batch.content {
            BatchContent::Empty => Ok(()),
            BatchContent::Rows(rows) => {
                let inserted = self.store.insert_rows(Queue::Rx, rows).await?;
                if (inserted as usize) < rows.len() {
                    debug!(
                        received = rows.len(),
                        inserted, "Some rows were already present"
                    );
                }
                Ok(())
            }
            BatchContent::StatusUpdates(updates) => {
                for update in updates {
                    let changed = self.store.apply_status_update(Queue::Tx, update).await?;
                    if changed {
                        debug!(row_id = update.local_id, status = %update.status, "Remote status applied");
                    } else {
                        info!(
                            row_id = update.local_id,
                            status = %update.status,
                            "Status update skipped, row missing or already final"
                        );
                    }
                }
                Ok(())
            }
        }
    }
}
