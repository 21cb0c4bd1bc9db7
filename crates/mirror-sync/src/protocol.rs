//! # Hub Wire Protocol
//!
//! JSON shapes exchanged with the hub and the mapping to queue types.
//!
//! ## Messages
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Hub Messages                                   │
//! │                                                                         │
//! │  GET  {token_path}?login=..&key=..       ──► TokenResponse             │
//! │                                              {"jwtToken": ".."}        │
//! │                                                                         │
//! │  PUT  {api}/{service}/queue              ──► QueueResponse             │
//! │       body: QueueRequest                     {"status": "D",           │
//! │       {id, source, destination, type,         "error": null}           │
//! │        version, data, status, error}                                   │
//! │                                                                         │
//! │  GET  {api}/{service}/dequeue            ──► [RemoteItem, ...]         │
//! │       ?fromDateTime=<cursor ms>              or {"data": [...]}         │
//! │                                                                         │
//! │  A dequeue batch is either all new rows or all status updates          │
//! │  (items carrying `sourceId`), never both.                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use mirror_core::{Cursor, NewRow, QueueRow, RowStatus, StatusUpdate};

use crate::error::{SyncError, SyncResult};

/// Method name of the upload endpoint.
pub const QUEUE_METHOD: &str = "queue";

/// Method name of the download endpoint.
pub const DEQUEUE_METHOD: &str = "dequeue";

/// Query parameter carrying the cursor on dequeue.
pub const CURSOR_PARAM: &str = "fromDateTime";

/// Version assumed for downloaded rows that carry none.
const DEFAULT_VERSION: &str = "1";

// =============================================================================
// Token
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    #[serde(rename = "jwtToken", alias = "token")]
    pub jwt_token: String,
}

// =============================================================================
// Queue (upload)
// =============================================================================

/// Body of the upload call: the business fields of one TX row.
#[derive(Debug, Clone, Serialize)]
pub struct QueueRequest<'a> {
    pub id: i64,
    pub source: &'a str,
    pub destination: &'a str,
    #[serde(rename = "type")]
    pub row_type: &'a str,
    pub version: &'a str,
    pub data: Option<&'a str>,
    pub status: &'static str,
    pub error: Option<&'a str>,
}

impl<'a> From<&'a QueueRow> for QueueRequest<'a> {
    fn from(row: &'a QueueRow) -> Self {
        QueueRequest {
            id: row.id,
            source: &row.source,
            destination: &row.destination,
            row_type: &row.row_type,
            version: &row.version,
            data: row.data.as_deref(),
            status: row.status.code(),
            error: row.error.as_deref(),
        }
    }
}

/// The hub's disposition of an uploaded row.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueResponse {
    #[serde(alias = "STATUS")]
    pub status: String,
    #[serde(default, alias = "ERROR")]
    pub error: Option<String>,
}

impl QueueResponse {
    /// The status and error to write back to the local row.
    pub fn disposition(&self) -> SyncResult<(RowStatus, Option<String>)> {
        let status = RowStatus::from_code(&self.status)?;
        let error = self.error.clone().filter(|e| !e.is_empty());
        Ok((status, error))
    }
}

// =============================================================================
// Dequeue (download)
// =============================================================================

/// One element of a dequeue response. Accepts camelCase and upper-case
/// column keys.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteItem {
    #[serde(default, alias = "ID", alias = "Id")]
    pub id: Option<Value>,
    #[serde(default, alias = "SOURCE")]
    pub source: Option<String>,
    #[serde(default, alias = "DESTINATION")]
    pub destination: Option<String>,
    #[serde(default, rename = "type", alias = "TYPE")]
    pub row_type: Option<String>,
    #[serde(default, alias = "VERSION")]
    pub version: Option<Value>,
    #[serde(default, alias = "DATA")]
    pub data: Option<Value>,
    #[serde(default, alias = "STATUS")]
    pub status: Option<String>,
    #[serde(default, alias = "ERROR")]
    pub error: Option<String>,
    /// Local id of the row this item reports on; present only on status updates.
    #[serde(default, alias = "SOURCEID", alias = "SOURCE_ID")]
    pub source_id: Option<Value>,
    #[serde(default, alias = "QUEUEDAT")]
    pub queued_at: Option<Value>,
    #[serde(default, alias = "PROCESSEDAT")]
    pub processed_at: Option<Value>,
}

impl RemoteItem {
    pub fn is_status_update(&self) -> bool {
        matches!(&self.source_id, Some(v) if !v.is_null())
    }

    /// Newest timestamp the item carries.
    pub fn observed_at(&self) -> Option<DateTime<Utc>> {
        let processed = self.processed_at.as_ref().and_then(parse_instant);
        let queued = self.queued_at.as_ref().and_then(parse_instant);
        processed.max(queued)
    }

    fn into_new_row(self) -> SyncResult<NewRow> {
        let remote_id = self.id.as_ref().and_then(scalar_to_string);
        let missing = |field: &str| {
            SyncError::InvalidMessage(format!(
                "downloaded row {} has no {}",
                remote_id.as_deref().unwrap_or("?"),
                field
            ))
        };

        Ok(NewRow {
            source: self.source.clone().ok_or_else(|| missing("source"))?,
            destination: self.destination.clone().ok_or_else(|| missing("destination"))?,
            row_type: self.row_type.clone().ok_or_else(|| missing("type"))?,
            version: self
                .version
                .as_ref()
                .and_then(scalar_to_string)
                .unwrap_or_else(|| DEFAULT_VERSION.to_string()),
            data: self.data.as_ref().and_then(payload_to_string),
            remote_id,
        })
    }

    fn into_status_update(self) -> SyncResult<StatusUpdate> {
        let local_id = self
            .source_id
            .as_ref()
            .and_then(scalar_to_string)
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or_else(|| {
                SyncError::InvalidMessage(format!("sourceId is not a row id: {:?}", self.source_id))
            })?;

        let code = self.status.as_deref().ok_or_else(|| {
            SyncError::InvalidMessage(format!("status update for row {} has no status", local_id))
        })?;

        let status = RowStatus::from_code(code)?;
        if !status.is_terminal() {
            return Err(SyncError::InvalidMessage(format!(
                "status update for row {} is not final: {}",
                local_id, status
            )));
        }

        Ok(StatusUpdate {
            local_id,
            status,
            error: self.error.filter(|e| !e.is_empty()),
        })
    }
}

/// Top-level dequeue response: a bare array or an object wrapping one.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum DequeuePayload {
    Items(Vec<RemoteItem>),
    Wrapped {
        #[serde(alias = "rows", alias = "items")]
        data: Vec<RemoteItem>,
    },
}

impl DequeuePayload {
    pub fn into_items(self) -> Vec<RemoteItem> {
        match self {
            DequeuePayload::Items(items) => items,
            DequeuePayload::Wrapped { data } => data,
        }
    }
}

/// What a dequeue batch asks the Downloader to apply.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchContent {
    Empty,
    /// New RX rows.
    Rows(Vec<NewRow>),
    /// Final status of TX rows uploaded earlier.
    StatusUpdates(Vec<StatusUpdate>),
}

/// A classified dequeue batch.
#[derive(Debug, Clone, PartialEq)]
pub struct DequeueBatch {
    pub content: BatchContent,
    /// Newest row timestamp seen in the batch.
    pub newest_observed: Option<Cursor>,
}

impl DequeueBatch {
    pub fn len(&self) -> usize {
        match &self.content {
            BatchContent::Empty => 0,
            BatchContent::Rows(rows) => rows.len(),
            BatchContent::StatusUpdates(updates) => updates.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Splits raw items into one of the two batch shapes.
    ///
    /// Any of these rejects the whole batch: mixed rows and updates, a row
    /// missing its routing fields, an unknown status code, or an update
    /// whose status is not `D`/`E`.
    pub fn classify(items: Vec<RemoteItem>) -> SyncResult<Self> {
        let newest_observed = items
            .iter()
            .filter_map(RemoteItem::observed_at)
            .max()
            .map(Cursor::at);

        if items.is_empty() {
            return Ok(DequeueBatch {
                content: BatchContent::Empty,
                newest_observed,
            });
        }

        let updates = items.iter().filter(|i| i.is_status_update()).count();
        let rows = items.len() - updates;
        if updates > 0 && rows > 0 {
            return Err(SyncError::MixedBatch { rows, updates });
        }

        let content = if updates > 0 {
            BatchContent::StatusUpdates(
                items
                    .into_iter()
                    .map(RemoteItem::into_status_update)
                    .collect::<SyncResult<_>>()?,
            )
        } else {
            BatchContent::Rows(
                items
                    .into_iter()
                    .map(RemoteItem::into_new_row)
                    .collect::<SyncResult<_>>()?,
            )
        };

        Ok(DequeueBatch {
            content,
            newest_observed,
        })
    }
}

// =============================================================================
// Value Helpers
// =============================================================================

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn payload_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Epoch milliseconds, RFC 3339, or a naive `YYYY-MM-DD HH:MM:SS[.fff]` taken as UTC.
fn parse_instant(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|t| t.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
                    .iter()
                    .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                    .map(|naive| Utc.from_utc_datetime(&naive))
            }),
        _ => None,
    }
}
