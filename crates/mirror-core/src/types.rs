//! # Domain Types
//!
//! Row and queue types shared by the table store, the hub client and the
//! sync loops.
//!
//! ## Type Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Queue Types                                     │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    QueueRow     │   │     NewRow      │   │  StatusUpdate   │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (PK)        │   │  source         │   │  local_id       │       │
//! │  │  source/dest    │   │  destination    │   │  status (D|E)   │       │
//! │  │  type/version   │   │  type/version   │   │  error          │       │
//! │  │  data, status   │   │  data           │   └─────────────────┘       │
//! │  │  queued_at ...  │   │  remote_id      │                             │
//! │  └─────────────────┘   └─────────────────┘                             │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │     Queue       │   │   RowStatus     │   │     Cursor      │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  Tx (to hub)    │   │  Q Queued       │   │  lastTick (ms)  │       │
//! │  │  Rx (from hub)  │   │  P Processing   │   │  monotonic      │       │
//! │  └─────────────────┘   │  D Done         │   └─────────────────┘       │
//! │                        │  E Error        │                             │
//! │                        └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Row Status State Machine
//! ```text
//!   Queued ──► Processing ──► Done
//!     │                  └──► Error
//!     └──────────────────────► Done | Error   (hub answers directly)
//! ```
//! `Done` and `Error` are terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

// =============================================================================
// Queue Direction
// =============================================================================

/// Direction of a queue table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Queue {
    /// Local rows waiting to be pushed to the hub.
    Tx,
    /// Rows received from the hub.
    Rx,
}

impl Queue {
    /// Table suffix appended to the configured prefix.
    pub const fn suffix(&self) -> &'static str {
        match self {
            Queue::Tx => "TX",
            Queue::Rx => "RX",
        }
    }

    /// Full table name for a validated prefix, e.g. `HUBSQL_TX`.
    pub fn table_name(&self, prefix: &str) -> String {
        format!("{}_{}", prefix, self.suffix())
    }
}

impl fmt::Display for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Queue::Tx => write!(f, "tx"),
            Queue::Rx => write!(f, "rx"),
        }
    }
}

impl FromStr for Queue {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tx" => Ok(Queue::Tx),
            "rx" => Ok(Queue::Rx),
            _ => Err(CoreError::UnknownQueue(s.to_string())),
        }
    }
}

// =============================================================================
// Row Status
// =============================================================================

/// Single-character status stored in the `STATUS` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RowStatus {
    /// Waiting for the uploader (`Q`).
    #[default]
    Queued,
    /// Accepted by the hub, result pending (`P`).
    Processing,
    /// Processed successfully (`D`).
    Done,
    /// Processed with an error (`E`).
    Error,
}

impl RowStatus {
    /// The one-letter code written to the database and the wire.
    pub const fn code(&self) -> &'static str {
        match self {
            RowStatus::Queued => "Q",
            RowStatus::Processing => "P",
            RowStatus::Done => "D",
            RowStatus::Error => "E",
        }
    }

    /// Parses a status code. Surrounding whitespace and case are ignored.
    pub fn from_code(code: &str) -> Result<Self, CoreError> {
        match code.trim().to_ascii_uppercase().as_str() {
            "Q" => Ok(RowStatus::Queued),
            "P" => Ok(RowStatus::Processing),
            "D" => Ok(RowStatus::Done),
            "E" => Ok(RowStatus::Error),
            _ => Err(CoreError::UnknownStatus(code.to_string())),
        }
    }

    /// Done and Error are never left once reached.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, RowStatus::Done | RowStatus::Error)
    }
}

impl fmt::Display for RowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for RowStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RowStatus::from_code(s)
    }
}

impl TryFrom<String> for RowStatus {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, CoreError> {
        RowStatus::from_code(&value)
    }
}

impl From<RowStatus> for String {
    fn from(status: RowStatus) -> Self {
        status.code().to_string()
    }
}

// =============================================================================
// Queue Row
// =============================================================================

/// One row of a TX or RX queue table.
///
/// `processed_at` is `None` exactly when `status` is `Queued`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueRow {
    /// Store-assigned, strictly increasing primary key.
    pub id: i64,
    pub source: String,
    pub destination: String,
    /// Payload schema tag, e.g. `MATERIAL$POST`.
    #[serde(rename = "type")]
    pub row_type: String,
    pub version: String,
    /// Opaque business document.
    pub data: Option<String>,
    pub status: RowStatus,
    /// Diagnostic text, set only on failure.
    pub error: Option<String>,
    pub queued_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    /// Hub-assigned id for rows that came from the hub.
    pub remote_id: Option<String>,
}

// =============================================================================
// New Row
// =============================================================================

/// A row about to be inserted. Inserted rows always start as `Queued`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRow {
    pub source: String,
    pub destination: String,
    #[serde(rename = "type")]
    pub row_type: String,
    pub version: String,
    pub data: Option<String>,
    /// Hub id used to make repeated inserts of the same remote row a no-op.
    pub remote_id: Option<String>,
}

// =============================================================================
// Status Update
// =============================================================================

/// The hub reporting the final outcome of a row this agent uploaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    /// `ID` of the local TX row.
    pub local_id: i64,
    pub status: RowStatus,
    pub error: Option<String>,
}

// =============================================================================
// Cursor
// =============================================================================

/// Download progress marker, persisted as `{"lastTick": <epoch ms>}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Cursor {
    #[serde(rename = "lastTick")]
    pub last_tick: i64,
}

impl Cursor {
    /// Creates a cursor from epoch milliseconds.
    pub const fn from_millis(last_tick: i64) -> Self {
        Cursor { last_tick }
    }

    /// Cursor at the given instant.
    pub fn at(instant: DateTime<Utc>) -> Self {
        Cursor {
            last_tick: instant.timestamp_millis(),
        }
    }

    /// Cursor at the current wall-clock time.
    pub fn now() -> Self {
        Self::at(Utc::now())
    }

    /// Returns the later of `self` and `candidate`.
    ///
    /// Every cursor save goes through this so the stored value never moves back.
    pub fn advance_to(self, candidate: Cursor) -> Cursor {
        self.max(candidate)
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.last_tick)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(RowStatus::from_code("Q").unwrap(), RowStatus::Queued);
        assert_eq!(RowStatus::from_code(" d ").unwrap(), RowStatus::Done);
        assert_eq!(RowStatus::Error.code(), "E");
        assert!(RowStatus::from_code("X").is_err());
        assert!(RowStatus::from_code("").is_err());
    }

    #[test]
    fn test_terminal_states_are_never_left() {
        assert!(RowStatus::Done.is_terminal());
        assert!(RowStatus::Error.is_terminal());
        assert!(!RowStatus::Queued.is_terminal());
        assert!(!RowStatus::Processing.is_terminal());
    }

    #[test]
    fn test_status_deserializes_through_try_from() {
        let status = RowStatus::try_from("e".to_string()).unwrap();
        assert_eq!(status, RowStatus::Error);
        assert!(matches!(
            RowStatus::try_from("Z".to_string()),
            Err(CoreError::UnknownStatus(_))
        ));
    }

    #[test]
    fn test_status_serializes_as_code() {
        let json = serde_json::to_string(&RowStatus::Done).unwrap();
        assert_eq!(json, "\"D\"");
        let parsed: RowStatus = serde_json::from_str("\"Q\"").unwrap();
        assert_eq!(parsed, RowStatus::Queued);
        assert!(serde_json::from_str::<RowStatus>("\"Z\"").is_err());
    }

    #[test]
    fn test_queue_table_names() {
        assert_eq!(Queue::Tx.table_name("HUBSQL"), "HUBSQL_TX");
        assert_eq!(Queue::Rx.table_name("QF"), "QF_RX");
        assert_eq!("RX".parse::<Queue>().unwrap(), Queue::Rx);
        assert!("both".parse::<Queue>().is_err());
    }

    #[test]
    fn test_cursor_checkpoint_format() {
        let cursor = Cursor::from_millis(1_700_000_000_000);
        let json = serde_json::to_string(&cursor).unwrap();
        assert_eq!(json, r#"{"lastTick":1700000000000}"#);

        let back: Cursor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cursor);
    }

    #[test]
    fn test_cursor_never_moves_back() {
        let cursor = Cursor::from_millis(2_000);
        assert_eq!(cursor.advance_to(Cursor::from_millis(1_000)), cursor);
        assert_eq!(
            cursor.advance_to(Cursor::from_millis(3_000)),
            Cursor::from_millis(3_000)
        );
    }

    #[test]
    fn test_row_wire_field_names() {
        let row = NewRow {
            source: "ERP".into(),
            destination: "HUB".into(),
            row_type: "MATERIAL$POST".into(),
            version: "1".into(),
            data: None,
            remote_id: Some("42".into()),
        };
        let value = serde_json::to_value(&row).unwrap();
        assert_eq!(value["type"], "MATERIAL$POST");
        assert_eq!(value["remoteId"], "42");
    }
}
