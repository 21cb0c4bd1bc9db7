//! In-memory fakes of the table store and the hub.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use mirror_core::{Cursor, NewRow, Queue, QueueRow, RowStatus, StatusUpdate};
use mirror_sync::protocol::{QueueResponse, RemoteItem};
use mirror_sync::{HubApi, SyncError, SyncResult, TableStore};

// =============================================================================
// Fake Table Store
// =============================================================================

#[derive(Default)]
struct StoreState {
    connected: bool,
    unreachable: bool,
    tx: Vec<QueueRow>,
    rx: Vec<QueueRow>,
    next_id: i64,
    fail_inserts: bool,
    fail_status_update_for: Option<i64>,
    finish_after_read: Option<(i64, RowStatus)>,
    connect_calls: usize,
}

#[derive(Default)]
pub struct FakeStore {
    state: Mutex<StoreState>,
}

impl FakeStore {
    pub fn connected() -> Self {
        let store = FakeStore::default();
        store.state.lock().unwrap().connected = true;
        store
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        let mut state = self.state.lock().unwrap();
        state.unreachable = unreachable;
        if unreachable {
            state.connected = false;
        }
    }

    pub fn fail_inserts(&self, fail: bool) {
        self.state.lock().unwrap().fail_inserts = fail;
    }

    pub fn fail_status_update_for(&self, id: Option<i64>) {
        self.state.lock().unwrap().fail_status_update_for = id;
    }

    /// Moves TX row `id` to `status` right after the next queue read, as a
    /// download applied while the upload is in flight would.
    pub fn finish_after_read(&self, id: i64, status: RowStatus) {
        self.state.lock().unwrap().finish_after_read = Some((id, status));
    }

    pub fn connect_calls(&self) -> usize {
        self.state.lock().unwrap().connect_calls
    }

    /// Adds a queued TX row and returns its id.
    pub fn push_tx(&self, row_type: &str) -> i64 {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = state.next_id;
        state.tx.push(QueueRow {
            id,
            source: "ERP".into(),
            destination: "HUB".into(),
            row_type: row_type.into(),
            version: "1".into(),
            data: Some("<root/>".into()),
            status: RowStatus::Queued,
            error: None,
            queued_at: Utc::now(),
            processed_at: None,
            deleted_at: None,
            remote_id: None,
        });
        id
    }

    pub fn tx_row(&self, id: i64) -> QueueRow {
        self.state
            .lock()
            .unwrap()
            .tx
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .unwrap()
    }

    pub fn rx_rows(&self) -> Vec<QueueRow> {
        self.state.lock().unwrap().rx.clone()
    }

    fn fault(state: &mut StoreState, what: &str) -> SyncError {
        state.connected = false;
        SyncError::DatabaseError(what.to_string())
    }
}

fn table(state: &mut StoreState, queue: Queue) -> &mut Vec<QueueRow> {
    match queue {
        Queue::Tx => &mut state.tx,
        Queue::Rx => &mut state.rx,
    }
}

fn set_status(row: &mut QueueRow, status: RowStatus, error: Option<String>) {
    row.status = status;
    row.error = error;
    row.processed_at = match status {
        RowStatus::Queued => None,
        _ => Some(Utc::now()),
    };
}

#[async_trait]
impl TableStore for FakeStore {
    async fn is_connected(&self) -> bool {
        self.state.lock().unwrap().connected
    }

    async fn connect(&self) -> SyncResult<()> {
        let mut state = self.state.lock().unwrap();
        state.connect_calls += 1;
        if state.unreachable {
            return Err(SyncError::DatabaseError("database unreachable".into()));
        }
        state.connected = true;
        Ok(())
    }

    async fn ping(&self) -> SyncResult<()> {
        let mut state = self.state.lock().unwrap();
        if !state.connected || state.unreachable {
            return Err(Self::fault(&mut state, "keepalive failed"));
        }
        Ok(())
    }

    async fn rows_with_status(&self, queue: Queue, status: RowStatus) -> SyncResult<Vec<QueueRow>> {
        let mut state = self.state.lock().unwrap();
        if !state.connected {
            return Err(SyncError::NotConnected("table store"));
        }
        let mut rows: Vec<QueueRow> = table(&mut state, queue)
            .iter()
            .filter(|r| r.status == status && r.deleted_at.is_none())
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.id);

        if let Some((id, status)) = state.finish_after_read.take() {
            if let Some(row) = state.tx.iter_mut().find(|r| r.id == id) {
                set_status(row, status, None);
            }
        }
        Ok(rows)
    }

    async fn insert_rows(&self, queue: Queue, rows: &[NewRow]) -> SyncResult<u64> {
        let mut state = self.state.lock().unwrap();
        if !state.connected {
            return Err(SyncError::NotConnected("table store"));
        }
        if state.fail_inserts {
            return Err(Self::fault(&mut state, "insert failed"));
        }

        let mut inserted = 0;
        for row in rows {
            let duplicate = row.remote_id.is_some()
                && table(&mut state, queue)
                    .iter()
                    .any(|r| r.remote_id == row.remote_id);
            if duplicate {
                continue;
            }
            state.next_id += 1;
            let id = state.next_id;
            table(&mut state, queue).push(QueueRow {
                id,
                source: row.source.clone(),
                destination: row.destination.clone(),
                row_type: row.row_type.clone(),
                version: row.version.clone(),
                data: row.data.clone(),
                status: RowStatus::Queued,
                error: None,
                queued_at: Utc::now(),
                processed_at: None,
                deleted_at: None,
                remote_id: row.remote_id.clone(),
            });
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn set_row_status(
        &self,
        queue: Queue,
        id: i64,
        expected: RowStatus,
        status: RowStatus,
        error: Option<&str>,
    ) -> SyncResult<bool> {
        let mut state = self.state.lock().unwrap();
        if !state.connected {
            return Err(SyncError::NotConnected("table store"));
        }
        match table(&mut state, queue)
            .iter_mut()
            .find(|r| r.id == id && r.status == expected && r.deleted_at.is_none())
        {
            Some(row) => {
                set_status(row, status, error.map(str::to_string));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn apply_status_update(&self, queue: Queue, update: &StatusUpdate) -> SyncResult<bool> {
        let mut state = self.state.lock().unwrap();
        if !state.connected {
            return Err(SyncError::NotConnected("table store"));
        }
        if state.fail_status_update_for == Some(update.local_id) {
            return Err(Self::fault(&mut state, "status update failed"));
        }
        match table(&mut state, queue).iter_mut().find(|r| {
            r.id == update.local_id && r.deleted_at.is_none() && !r.status.is_terminal()
        }) {
            Some(row) => {
                set_status(row, update.status, update.error.clone());
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

// =============================================================================
// Fake Hub
// =============================================================================

/// Scripted answer to one `queue` call.
#[derive(Debug, Clone)]
pub enum QueueReply {
    Disposition(&'static str, Option<&'static str>),
    Unauthorized,
    ServerError,
    Unreachable,
}

/// Scripted answer to one `dequeue` call.
#[derive(Debug, Clone)]
pub enum DequeueReply {
    Items(Value),
    ServerError,
}

struct HubState {
    token: bool,
    unreachable: bool,
    queue_script: VecDeque<QueueReply>,
    default_reply: QueueReply,
    uploaded: Vec<i64>,
    dequeue_script: VecDeque<DequeueReply>,
    dequeue_cursors: Vec<Cursor>,
    auth_calls: usize,
}

pub struct FakeHub {
    state: Mutex<HubState>,
}

impl FakeHub {
    /// An authenticated hub that accepts every row as done.
    pub fn authenticated() -> Self {
        let hub = FakeHub::logged_out();
        hub.state.lock().unwrap().token = true;
        hub
    }

    pub fn logged_out() -> Self {
        FakeHub {
            state: Mutex::new(HubState {
                token: false,
                unreachable: false,
                queue_script: VecDeque::new(),
                default_reply: QueueReply::Disposition("D", None),
                uploaded: Vec::new(),
                dequeue_script: VecDeque::new(),
                dequeue_cursors: Vec::new(),
                auth_calls: 0,
            }),
        }
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        let mut state = self.state.lock().unwrap();
        state.unreachable = unreachable;
        if unreachable {
            state.token = false;
        }
    }

    pub fn script_queue(&self, replies: impl IntoIterator<Item = QueueReply>) {
        self.state.lock().unwrap().queue_script.extend(replies);
    }

    pub fn script_dequeue(&self, replies: impl IntoIterator<Item = DequeueReply>) {
        self.state.lock().unwrap().dequeue_script.extend(replies);
    }

    /// Row ids passed to `queue`, in call order.
    pub fn uploaded(&self) -> Vec<i64> {
        self.state.lock().unwrap().uploaded.clone()
    }

    /// Cursors passed to `dequeue`, in call order.
    pub fn dequeue_cursors(&self) -> Vec<Cursor> {
        self.state.lock().unwrap().dequeue_cursors.clone()
    }

    /// Token state without going through the async trait.
    pub fn is_authenticated_now(&self) -> bool {
        self.state.lock().unwrap().token
    }

    pub fn auth_calls(&self) -> usize {
        self.state.lock().unwrap().auth_calls
    }
}

#[async_trait]
impl HubApi for FakeHub {
    async fn is_authenticated(&self) -> bool {
        self.state.lock().unwrap().token
    }

    async fn authenticate(&self) -> SyncResult<()> {
        let mut state = self.state.lock().unwrap();
        state.auth_calls += 1;
        if state.unreachable {
            return Err(SyncError::Transport("connection refused".into()));
        }
        state.token = true;
        Ok(())
    }

    async fn queue(&self, row: &QueueRow) -> SyncResult<QueueResponse> {
        let mut state = self.state.lock().unwrap();
        if !state.token {
            return Err(SyncError::NotConnected("hub"));
        }
        state.uploaded.push(row.id);

        let reply = state
            .queue_script
            .pop_front()
            .unwrap_or_else(|| state.default_reply.clone());
        match reply {
            QueueReply::Disposition(status, error) => Ok(QueueResponse {
                status: status.to_string(),
                error: error.map(str::to_string),
            }),
            QueueReply::Unauthorized => {
                state.token = false;
                Err(SyncError::Unauthorized)
            }
            QueueReply::ServerError => Err(SyncError::HubRejected {
                method: "queue".into(),
                status: 500,
                body: String::new(),
            }),
            QueueReply::Unreachable => {
                state.token = false;
                Err(SyncError::Transport("connection reset".into()))
            }
        }
    }

    async fn dequeue(&self, cursor: Cursor) -> SyncResult<Vec<RemoteItem>> {
        let mut state = self.state.lock().unwrap();
        if !state.token {
            return Err(SyncError::NotConnected("hub"));
        }
        state.dequeue_cursors.push(cursor);

        match state.dequeue_script.pop_front() {
            None => Ok(Vec::new()),
            Some(DequeueReply::Items(value)) => Ok(serde_json::from_value(value).unwrap()),
            Some(DequeueReply::ServerError) => Err(SyncError::HubRejected {
                method: "dequeue".into(),
                status: 503,
                body: String::new(),
            }),
        }
    }
}
