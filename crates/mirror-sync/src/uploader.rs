//! # Uploader
//!
//! Pushes queued TX rows to the hub, one row at a time.
//!
//! ## Upload Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Uploader::run                                  │
//! │                                                                         │
//! │  store connected && hub authenticated?  ── no ──► skip tick            │
//! │        │ yes                                                            │
//! │        ▼                                                                │
//! │  SELECT <prefix>_TX WHERE STATUS = 'Q' ORDER BY ID                     │
//! │        │                                                                │
//! │        ▼  for each row                                                  │
//! │  hub.queue(row)                                                        │
//! │   ├── Ok {status, error} ──► set_row_status(id, Q → status, error)     │
//! │   │                          (the hub decides D / E / Q; a row that    │
//! │   │                           left Q meanwhile is not touched)         │
//! │   └── Err ─────────────────► row stays 'Q', retried next tick          │
//! │                                                                         │
//! │  A failing row never stops the rows after it. Losing a link mid-batch  │
//! │  ends the batch; the remaining rows simply wait for the next tick.     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use mirror_core::{Queue, QueueRow, RowStatus};

use crate::error::SyncResult;
use crate::hub_client::HubApi;
use crate::store::TableStore;

/// What one upload tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadReport {
    /// True if the tick did nothing because a link was down.
    pub skipped: bool,
    /// Queued rows read from the store.
    pub fetched: usize,
    /// Rows whose hub disposition was written back.
    pub updated: usize,
    /// Rows left queued because of a failure.
    pub failed: usize,
    /// Rows that left `Q` while their upload was in flight, e.g. because a
    /// downloaded status update already finished them.
    pub superseded: usize,
}

/// Outcome of one row upload.
enum RowOutcome {
    Updated,
    Superseded,
}

pub struct Uploader {
    store: Arc<dyn TableStore>,
    hub: Arc<dyn HubApi>,
}

impl Uploader {
    pub fn new(store: Arc<dyn TableStore>, hub: Arc<dyn HubApi>) -> Self {
        Uploader { store, hub }
    }

    /// Runs one upload pass.
    ///
    /// Only a failure to read the queue is returned as an error; per-row
    /// failures are logged and counted in the report.
    pub async fn run(&self) -> SyncResult<UploadReport> {
        if !self.links_up().await {
            debug!("Upload skipped, waiting for connections");
            return Ok(UploadReport {
                skipped: true,
                ..UploadReport::default()
            });
        }

        let rows = self
            .store
            .rows_with_status(Queue::Tx, RowStatus::Queued)
            .await?;
        let mut report = UploadReport {
            fetched: rows.len(),
            ..UploadReport::default()
        };
        if rows.is_empty() {
            return Ok(report);
        }

        debug!(count = rows.len(), "Uploading queued rows");

        for row in &rows {
            match self.upload_row(row).await {
                Ok(RowOutcome::Updated) => report.updated += 1,
                Ok(RowOutcome::Superseded) => report.superseded += 1,
                Err(e) => {
                    report.failed += 1;
                    error!(row_id = row.id, row_type = %row.row_type, error = %e, "Row upload failed");

                    if !self.links_up().await {
                        warn!(
                            remaining = rows.len() - report.updated - report.superseded - report.failed,
                            "Link lost during upload, stopping batch"
                        );
                        break;
                    }
                }
            }
        }

        info!(
            fetched = report.fetched,
            updated = report.updated,
            failed = report.failed,
            superseded = report.superseded,
            "Upload tick finished"
        );
        Ok(report)
    }

    async fn upload_row(&self, row: &QueueRow) -> SyncResult<RowOutcome> {
        let response = self.hub.queue(row).await?;
        let (status, error) = response.disposition()?;

        let changed = self
            .store
            .set_row_status(Queue::Tx, row.id, row.status, status, error.as_deref())
            .await?;
        if !changed {
            warn!(
                row_id = row.id,
                status = %status,
                "Row left the queue during upload, hub answer not written"
            );
            return Ok(RowOutcome::Superseded);
        }

        debug!(row_id = row.id, status = %status, "Row uploaded");
        Ok(RowOutcome::Updated)
    }

    async fn links_up(&self) -> bool {
        self.store.is_connected().await && self.hub.is_authenticated().await
    }
}
