//! # Mirror Configuration
//!
//! Configuration management for the mirror agent.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     HUBSQL_HUB_URL=http://hub.local:8080                               │
//! │     HUBSQL_DATABASE=/var/lib/hubsql/queue.db                           │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     --config <path>, or                                                │
//! │     ~/.config/hubsql-mirror/hubsql-mirror.toml (Linux)                 │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │                                                                         │
//! │  Missing required settings stop the process before any timer starts.  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # hubsql-mirror.toml
//! [sql]
//! database = "/var/lib/hubsql/queue.db"
//! table_prefix = "HUBSQL"
//!
//! [hub]
//! url = "http://hub.local:8080"
//! login = "erp"
//! key = "secret"
//! service = "sql"
//!
//! [sync]
//! connect_interval_ms = 10000
//! upload_interval_ms = 5000
//! download_interval_ms = 5000
//! cursor_policy = "request_time"  # request_time | newest_observed
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use mirror_core::validation::{validate_required, validate_table_prefix};
use mirror_core::DEFAULT_TABLE_PREFIX;
use mirror_db::DbConfig;

use crate::error::{SyncError, SyncResult};

/// File name of the config file inside the platform config directory.
pub const CONFIG_FILE_NAME: &str = "hubsql-mirror.toml";

/// File name of the checkpoint inside the platform data directory.
pub const CHECKPOINT_FILE_NAME: &str = "hubsql.dat";

// =============================================================================
// Cursor Policy
// =============================================================================

/// Which value the Downloader commits as the new cursor after a batch.
///
/// ```text
/// REQUEST_TIME (Default)               NEWEST_OBSERVED
/// ──────────────────────               ───────────────
/// wall clock captured just before      newest processedAt / queuedAt
/// the dequeue call                     carried by the batch
/// (hub windows by request time)        (hub windows by row time)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorPolicy {
    #[default]
    RequestTime,
    NewestObserved,
}

impl std::fmt::Display for CursorPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CursorPolicy::RequestTime => write!(f, "request_time"),
            CursorPolicy::NewestObserved => write!(f, "newest_observed"),
        }
    }
}

impl std::str::FromStr for CursorPolicy {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "request_time" | "request" => Ok(CursorPolicy::RequestTime),
            "newest_observed" | "newest" => Ok(CursorPolicy::NewestObserved),
            other => Err(SyncError::InvalidConfig(format!(
                "Unknown cursor policy: '{}'. Valid options: request_time, newest_observed",
                other
            ))),
        }
    }
}

// =============================================================================
// SQL Settings
// =============================================================================

/// Table store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqlSettings {
    /// SQLite database file. Required.
    #[serde(default)]
    pub database: String,

    /// Prefix of the queue tables (`<prefix>_TX`, `<prefix>_RX`).
    #[serde(default = "default_table_prefix")]
    pub table_prefix: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// How long SQLite waits on a locked database (seconds).
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_secs: u64,
}

fn default_table_prefix() -> String {
    DEFAULT_TABLE_PREFIX.to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_busy_timeout() -> u64 {
    5
}

impl Default for SqlSettings {
    fn default() -> Self {
        SqlSettings {
            database: String::new(),
            table_prefix: default_table_prefix(),
            max_connections: default_max_connections(),
            connect_timeout_secs: default_connect_timeout(),
            busy_timeout_secs: default_busy_timeout(),
        }
    }
}

impl SqlSettings {
    /// Builds the pool configuration for [`mirror_db::Database::new`].
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.database)
            .table_prefix(&self.table_prefix)
            .max_connections(self.max_connections)
            .connect_timeout(Duration::from_secs(self.connect_timeout_secs))
            .busy_timeout(Duration::from_secs(self.busy_timeout_secs))
    }
}

// =============================================================================
// Hub Settings
// =============================================================================

/// Hub endpoint and credentials.
///
/// ```text
/// token:  {url}{token_path}?login=..&key=..          → {"jwtToken": ".."}
/// data:   {url}{api_path}/{service}/{method}?..      (Bearer token)
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubSettings {
    /// Base URL, e.g. `http://hub.local:8080`. Required.
    #[serde(default)]
    pub url: String,

    /// Long-lived login exchanged for a bearer token. Required.
    #[serde(default)]
    pub login: String,

    /// Key paired with `login`. Required.
    #[serde(default)]
    pub key: String,

    /// Service segment of the data endpoints.
    #[serde(default = "default_service")]
    pub service: String,

    #[serde(default = "default_token_path")]
    pub token_path: String,

    #[serde(default = "default_api_path")]
    pub api_path: String,

    /// Upper bound for one hub request (seconds).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_service() -> String {
    "sql".to_string()
}

fn default_token_path() -> String {
    "/api/v1.0/token".to_string()
}

fn default_api_path() -> String {
    "/api/tablemessages/v1.0".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for HubSettings {
    fn default() -> Self {
        HubSettings {
            url: String::new(),
            login: String::new(),
            key: String::new(),
            service: default_service(),
            token_path: default_token_path(),
            api_path: default_api_path(),
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl HubSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

// =============================================================================
// Sync Settings
// =============================================================================

/// Timer cadence and Downloader checkpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Connection Manager timer (milliseconds).
    #[serde(default = "default_connect_interval")]
    pub connect_interval_ms: u64,

    /// Uploader timer (milliseconds).
    #[serde(default = "default_data_interval")]
    pub upload_interval_ms: u64,

    /// Downloader timer (milliseconds).
    #[serde(default = "default_data_interval")]
    pub download_interval_ms: u64,

    /// Checkpoint file. Defaults to `hubsql.dat` in the platform data dir.
    #[serde(default)]
    pub checkpoint_path: Option<PathBuf>,

    #[serde(default)]
    pub cursor_policy: CursorPolicy,

    #[serde(default = "default_true")]
    pub upload_enabled: bool,

    #[serde(default = "default_true")]
    pub download_enabled: bool,
}

fn default_connect_interval() -> u64 {
    10_000
}

fn default_data_interval() -> u64 {
    5_000
}

fn default_true() -> bool {
    true
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            connect_interval_ms: default_connect_interval(),
            upload_interval_ms: default_data_interval(),
            download_interval_ms: default_data_interval(),
            checkpoint_path: None,
            cursor_policy: CursorPolicy::default(),
            upload_enabled: true,
            download_enabled: true,
        }
    }
}

impl SyncSettings {
    pub fn connect_interval(&self) -> Duration {
        Duration::from_millis(self.connect_interval_ms)
    }

    pub fn upload_interval(&self) -> Duration {
        Duration::from_millis(self.upload_interval_ms)
    }

    pub fn download_interval(&self) -> Duration {
        Duration::from_millis(self.download_interval_ms)
    }

    /// Resolves the checkpoint file location.
    pub fn checkpoint_path(&self) -> PathBuf {
        self.checkpoint_path.clone().unwrap_or_else(|| {
            project_dirs()
                .map(|dirs| dirs.data_dir().join(CHECKPOINT_FILE_NAME))
                .unwrap_or_else(|| PathBuf::from(CHECKPOINT_FILE_NAME))
        })
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete agent configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MirrorConfig {
    #[serde(default)]
    pub sql: SqlSettings,

    #[serde(default)]
    pub hub: HubSettings,

    #[serde(default)]
    pub sync: SyncSettings,
}

impl MirrorConfig {
    /// Loads configuration from file, environment and defaults, then validates it.
    ///
    /// An explicit `config_path` that does not exist is an error; the default
    /// location is optional.
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        match config_path {
            Some(path) => {
                if !path.exists() {
                    return Err(SyncError::ConfigLoadFailed(format!(
                        "config file not found: {}",
                        path.display()
                    )));
                }
                config = Self::from_file(&path)?;
            }
            None => match Self::default_config_path() {
                Some(path) if path.exists() => config = Self::from_file(&path)?,
                Some(path) => debug!(?path, "Config file not found, using defaults"),
                None => warn!("No home directory; skipping default config file"),
            },
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    fn from_file(path: &std::path::Path) -> SyncResult<Self> {
        info!(?path, "Loading mirror config from file");
        let contents = std::fs::read_to_string(path)
            .map_err(|e| SyncError::ConfigLoadFailed(format!("{}: {}", path.display(), e)))?;
        Ok(toml::from_str(&contents)?)
    }

    /// Checks that every required setting is present and well formed.
    pub fn validate(&self) -> SyncResult<()> {
        required("sql.database", &self.sql.database)?;

        validate_table_prefix(&self.sql.table_prefix)
            .map_err(|e| SyncError::InvalidConfig(format!("sql.table_prefix: {}", e)))?;

        if self.hub.url.trim().is_empty() {
            return Err(SyncError::MissingSetting("hub.url".into()));
        }
        let url = url::Url::parse(&self.hub.url)?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(SyncError::InvalidUrl(format!(
                "Hub URL must start with http:// or https://, got: {}",
                self.hub.url
            )));
        }

        required("hub.login", &self.hub.login)?;
        required("hub.key", &self.hub.key)?;
        required("hub.service", &self.hub.service)?;

        if self.sync.connect_interval_ms == 0
            || self.sync.upload_interval_ms == 0
            || self.sync.download_interval_ms == 0
        {
            return Err(SyncError::InvalidConfig(
                "timer intervals must be greater than 0".into(),
            ));
        }

        if self.hub.request_timeout_secs == 0 || self.hub.connect_timeout_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "hub timeouts must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies `HUBSQL_*` overrides read through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(database) = lookup("HUBSQL_DATABASE") {
            debug!(database = %database, "Overriding database from environment");
            self.sql.database = database;
        }

        if let Some(prefix) = lookup("HUBSQL_TABLE_PREFIX") {
            self.sql.table_prefix = prefix;
        }

        if let Some(url) = lookup("HUBSQL_HUB_URL") {
            debug!(url = %url, "Overriding hub URL from environment");
            self.hub.url = url;
        }

        if let Some(login) = lookup("HUBSQL_HUB_LOGIN") {
            self.hub.login = login;
        }

        if let Some(key) = lookup("HUBSQL_HUB_KEY") {
            self.hub.key = key;
        }

        if let Some(service) = lookup("HUBSQL_HUB_SERVICE") {
            self.hub.service = service;
        }

        if let Some(path) = lookup("HUBSQL_CHECKPOINT_PATH") {
            self.sync.checkpoint_path = Some(PathBuf::from(path));
        }

        if let Some(policy) = lookup("HUBSQL_CURSOR_POLICY") {
            match policy.parse() {
                Ok(parsed) => self.sync.cursor_policy = parsed,
                Err(_) => warn!(policy = %policy, "Unknown cursor policy in environment"),
            }
        }
    }

    /// Returns the default config file path for this platform.
    pub fn default_config_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("com", "hubsql", "mirror")
}

fn required(field: &str, value: &str) -> SyncResult<()> {
    validate_required(field, value).map_err(|_| SyncError::MissingSetting(field.to_string()))
}
