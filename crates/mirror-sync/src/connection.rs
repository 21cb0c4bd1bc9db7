//! # Connection Manager
//!
//! Keeps the table store connected and the hub authenticated, one attempt
//! per tick, independently of the data loops.
//!
//! ## Link State Machine (per dependency)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   ┌──────────────┐   tick: attempt    ┌────────────┐                   │
//! │   │ Disconnected │───────────────────►│ Connecting │                   │
//! │   └──────────────┘                    └─────┬──────┘                   │
//! │          ▲                       ok         │        failed            │
//! │          │              ┌───────────────────┴───────────────┐          │
//! │          │              ▼                                   ▼          │
//! │          │        ┌───────────┐                      Disconnected      │
//! │          └────────│ Connected │  (logged, retried next tick)           │
//! │   fault from a    └───────────┘                                        │
//! │   data loop, or                                                        │
//! │   failed keepalive                                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! No backoff: the timer interval is the retry delay. The manager is the only
//! writer of the published states; everything else reads them through a
//! [`ConnectionMonitor`].

use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::hub_client::HubApi;
use crate::store::TableStore;

// =============================================================================
// Link State
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl LinkState {
    pub fn is_connected(&self) -> bool {
        matches!(self, LinkState::Connected)
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkState::Disconnected => write!(f, "disconnected"),
            LinkState::Connecting => write!(f, "connecting"),
            LinkState::Connected => write!(f, "connected"),
        }
    }
}

/// Both link states at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionSnapshot {
    pub sql: LinkState,
    pub hub: LinkState,
}

impl ConnectionSnapshot {
    pub fn is_ready(&self) -> bool {
        self.sql.is_connected() && self.hub.is_connected()
    }
}

impl fmt::Display for ConnectionSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sql={} hub={}", self.sql, self.hub)
    }
}

// =============================================================================
// Connection Monitor
// =============================================================================

/// Read-only view of the link states.
#[derive(Debug, Clone)]
pub struct ConnectionMonitor {
    sql: watch::Receiver<LinkState>,
    hub: watch::Receiver<LinkState>,
}

impl ConnectionMonitor {
    pub fn sql(&self) -> LinkState {
        *self.sql.borrow()
    }

    pub fn hub(&self) -> LinkState {
        *self.hub.borrow()
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        ConnectionSnapshot {
            sql: self.sql(),
            hub: self.hub(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.snapshot().is_ready()
    }
}

// =============================================================================
// Connection Manager
// =============================================================================

pub struct ConnectionManager {
    store: Arc<dyn TableStore>,
    hub: Arc<dyn HubApi>,
    sql_state: watch::Sender<LinkState>,
    hub_state: watch::Sender<LinkState>,
}

impl ConnectionManager {
    pub fn new(store: Arc<dyn TableStore>, hub: Arc<dyn HubApi>) -> Self {
        let (sql_state, _) = watch::channel(LinkState::Disconnected);
        let (hub_state, _) = watch::channel(LinkState::Disconnected);
        ConnectionManager {
            store,
            hub,
            sql_state,
            hub_state,
        }
    }

    pub fn monitor(&self) -> ConnectionMonitor {
        ConnectionMonitor {
            sql: self.sql_state.subscribe(),
            hub: self.hub_state.subscribe(),
        }
    }

    /// One connection check for both dependencies, run side by side so a
    /// slow hub cannot hold up the table store.
    pub async fn tick(&self) -> ConnectionSnapshot {
        let (sql, hub) = tokio::join!(self.check_store(), self.check_hub());
        let snapshot = ConnectionSnapshot { sql, hub };
        debug!(%snapshot, "Connection tick done");
        snapshot
    }

    async fn check_store(&self) -> LinkState {
        if self.store.is_connected().await {
            return match self.store.ping().await {
                Ok(()) => publish(&self.sql_state, "sql", LinkState::Connected),
                Err(e) => {
                    warn!(error = %e, "Table store keepalive failed");
                    publish(&self.sql_state, "sql", LinkState::Disconnected)
                }
            };
        }

        publish(&self.sql_state, "sql", LinkState::Connecting);
        match self.store.connect().await {
            Ok(()) => publish(&self.sql_state, "sql", LinkState::Connected),
            Err(e) => {
                warn!(error = %e, "Table store connect failed, retrying next tick");
                publish(&self.sql_state, "sql", LinkState::Disconnected)
            }
        }
    }

    async fn check_hub(&self) -> LinkState {
        if self.hub.is_authenticated().await {
            return publish(&self.hub_state, "hub", LinkState::Connected);
        }

        publish(&self.hub_state, "hub", LinkState::Connecting);
        match self.hub.authenticate().await {
            Ok(()) => publish(&self.hub_state, "hub", LinkState::Connected),
            Err(e) => {
                warn!(error = %e, "Hub authentication failed, retrying next tick");
                publish(&self.hub_state, "hub", LinkState::Disconnected)
            }
        }
    }
}

fn publish(state: &watch::Sender<LinkState>, link: &str, next: LinkState) -> LinkState {
    let previous = state.send_replace(next);
    if previous != next {
        match (previous, next) {
            (_, LinkState::Connected) => info!(link, "Link connected"),
            (LinkState::Connected, LinkState::Disconnected) => warn!(link, "Link lost"),
            _ => debug!(link, from = %previous, to = %next, "Link state changed"),
        }
    }
    next
}
