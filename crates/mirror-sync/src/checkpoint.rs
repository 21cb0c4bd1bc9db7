//! # Checkpoint Store
//!
//! Persists the Downloader cursor (`{"lastTick": <epoch ms>}`) outside the
//! queue tables.
//!
//! ## Durability
//! ```text
//! save(cursor)
//!   │
//!   ├── write  <path>.tmp
//!   ├── fsync  <path>.tmp
//!   ├── rename <path>.tmp → <path>
//!   ├── fsync  <dir>         (unix)
//!   └── return Ok            ◄── commit point for the downloaded batch
//! ```
//!
//! A missing file means "first run" and loads as `None`.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use mirror_core::Cursor;

use crate::error::{SyncError, SyncResult};

/// Load/save contract for the single cursor value.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Returns the stored cursor, or `None` if none was ever saved.
    async fn load(&self) -> SyncResult<Option<Cursor>>;

    /// Durably stores `cursor` before returning.
    async fn save(&self, cursor: Cursor) -> SyncResult<()>;
}

// =============================================================================
// File Checkpoint
// =============================================================================

/// Checkpoint kept in a small JSON file.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    path: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileCheckpointStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }

    /// Flushes the directory entry so the rename survives a crash.
    #[cfg(unix)]
    async fn sync_dir(&self) -> SyncResult<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        tokio::fs::File::open(dir).await?.sync_all().await?;
        Ok(())
    }

    #[cfg(not(unix))]
    async fn sync_dir(&self) -> SyncResult<()> {
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn load(&self) -> SyncResult<Option<Cursor>> {
        let contents = match tokio::fs::read(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = ?self.path, "No checkpoint yet");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        parse_checkpoint(&contents)
            .map(Some)
            .map_err(|reason| {
                SyncError::CheckpointCorrupt(format!("{}: {}", self.path.display(), reason))
            })
    }

    async fn save(&self, cursor: Cursor) -> SyncResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let body = serde_json::to_vec(&cursor)?;
        let tmp = self.tmp_path();

        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&body).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path).await?;
        self.sync_dir().await?;
        debug!(path = ?self.path, cursor = %cursor, "Checkpoint saved");
        Ok(())
    }
}

/// Accepts `lastTick` as epoch milliseconds or as an RFC 3339 timestamp.
fn parse_checkpoint(contents: &[u8]) -> Result<Cursor, String> {
    let value: serde_json::Value = serde_json::from_slice(contents).map_err(|e| e.to_string())?;

    match value.get("lastTick") {
        Some(serde_json::Value::Number(n)) => n
            .as_i64()
            .map(Cursor::from_millis)
            .ok_or_else(|| format!("lastTick out of range: {}", n)),
        Some(serde_json::Value::String(s)) => chrono::DateTime::parse_from_rfc3339(s)
            .map(|t| Cursor::at(t.with_timezone(&chrono::Utc)))
            .map_err(|e| format!("lastTick '{}': {}", s, e)),
        Some(other) => Err(format!("lastTick has unexpected type: {}", other)),
        None => Err("lastTick missing".to_string()),
    }
}

// =============================================================================
// In-Memory Checkpoint
// =============================================================================

/// Process-local checkpoint, for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    cursor: Mutex<Option<Cursor>>,
    saves: Mutex<Vec<Cursor>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cursor(cursor: Cursor) -> Self {
        MemoryCheckpointStore {
            cursor: Mutex::new(Some(cursor)),
            saves: Mutex::new(Vec::new()),
        }
    }

    /// Every cursor passed to `save`, oldest first.
    pub async fn saves(&self) -> Vec<Cursor> {
        self.saves.lock().await.clone()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self) -> SyncResult<Option<Cursor>> {
        Ok(*self.cursor.lock().await)
    }

    async fn save(&self, cursor: Cursor) -> SyncResult<()> {
        *self.cursor.lock().await = Some(cursor);
        self.saves.lock().await.push(cursor);
        Ok(())
    }
}
