//! # Hub Client
//!
//! Authenticated REST access to the hub.
//!
//! ## Failure Handling
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Hub Call Outcomes                                 │
//! │                                                                         │
//! │   2xx ─────────────────► Ok(body)                                      │
//! │   401 ─────────────────► Err(Unauthorized)      token dropped          │
//! │   other non-2xx ───────► Err(HubRejected)       token kept             │
//! │   no HTTP answer ──────► Err(Transport)         token dropped          │
//! │   (refused, DNS, timeout)                                              │
//! │                                                                         │
//! │   Without a token the call is not attempted: Err(NotConnected).        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use mirror_core::{Cursor, QueueRow};

use crate::config::HubSettings;
use crate::error::{SyncError, SyncResult};
use crate::hub_auth::TokenCache;
use crate::protocol::{
    DequeuePayload, QueueRequest, QueueResponse, RemoteItem, TokenResponse, CURSOR_PARAM,
    DEQUEUE_METHOD, QUEUE_METHOD,
};

/// Name used for the hub in logs and errors.
pub const HUB_NAME: &str = "hub";

/// Hub operations the sync engine needs.
#[async_trait]
pub trait HubApi: Send + Sync {
    /// True while a non-expired token is held.
    async fn is_authenticated(&self) -> bool;

    /// Exchanges login/key for a bearer token. On failure the client stays
    /// unauthenticated.
    async fn authenticate(&self) -> SyncResult<()>;

    /// Uploads one row and returns the hub's disposition of it.
    async fn queue(&self, row: &QueueRow) -> SyncResult<QueueResponse>;

    /// Fetches items changed since `cursor`. An empty list is a success.
    async fn dequeue(&self, cursor: Cursor) -> SyncResult<Vec<RemoteItem>>;
}

// =============================================================================
// HTTP Hub Client
// =============================================================================

/// [`HubApi`] over HTTP with `reqwest`.
pub struct HubClient {
    http: reqwest::Client,
    settings: HubSettings,
    base: Url,
    token: TokenCache,
}

impl HubClient {
    /// Builds the client. No request is sent until [`HubApi::authenticate`].
    pub fn new(settings: HubSettings) -> SyncResult<Self> {
        let base = Url::parse(settings.url.trim_end_matches('/'))?;

        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout())
            .connect_timeout(settings.connect_timeout())
            .build()
            .map_err(|e| SyncError::InvalidConfig(format!("HTTP client: {}", e)))?;

        Ok(HubClient {
            http,
            settings,
            base,
            token: TokenCache::new(),
        })
    }

    fn join(&self, path: &str) -> SyncResult<Url> {
        let base = self.base.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{}{}", base, path))?)
    }

    fn endpoint(&self, method: &str, query: &[(&str, String)]) -> SyncResult<Url> {
        let mut url = self.join(&format!(
            "{}/{}/{}",
            self.settings.api_path.trim_end_matches('/'),
            self.settings.service,
            method
        ))?;
        if !query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
        }
        Ok(url)
    }

    // =========================================================================
    // Verbs
    // =========================================================================

    /// Authenticated GET.
    pub async fn get(&self, method: &str, query: &[(&str, String)]) -> SyncResult<Value> {
        self.send(Method::GET, method, query, None).await
    }

    /// Authenticated PUT with a JSON body.
    pub async fn put<B: Serialize + ?Sized>(
        &self,
        method: &str,
        query: &[(&str, String)],
        body: &B,
    ) -> SyncResult<Value> {
        let body = serde_json::to_value(body)?;
        self.send(Method::PUT, method, query, Some(body)).await
    }

    /// Authenticated POST with a JSON body.
    pub async fn post<B: Serialize + ?Sized>(
        &self,
        method: &str,
        query: &[(&str, String)],
        body: &B,
    ) -> SyncResult<Value> {
        let body = serde_json::to_value(body)?;
        self.send(Method::POST, method, query, Some(body)).await
    }

    async fn send(
        &self,
        verb: Method,
        method: &str,
        query: &[(&str, String)],
        body: Option<Value>,
    ) -> SyncResult<Value> {
        let result = self.exchange(verb, method, query, body).await;
        if let Err(e) = &result {
            if e.invalidates_token() {
                warn!(method, error = %e, "Dropping hub token");
                self.token.invalidate().await;
            }
        }
        result
    }

    async fn exchange(
        &self,
        verb: Method,
        method: &str,
        query: &[(&str, String)],
        body: Option<Value>,
    ) -> SyncResult<Value> {
        let token = self
            .token
            .bearer()
            .await
            .ok_or(SyncError::NotConnected(HUB_NAME))?;
        let url = self.endpoint(method, query)?;
        debug!(%verb, %url, "Hub request");

        let mut request = self.http.request(verb, url).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.map_err(transport)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(SyncError::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::HubRejected {
                method: method.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await.map_err(transport)?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes)
            .map_err(|e| SyncError::InvalidMessage(format!("{} response: {}", method, e)))
    }

    async fn request_token(&self) -> SyncResult<String> {
        let mut url = self.join(&self.settings.token_path)?;
        url.query_pairs_mut()
            .append_pair("login", &self.settings.login)
            .append_pair("key", &self.settings.key);

        let response = self.http.get(url).send().await.map_err(transport)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(SyncError::Unauthorized);
        }
        if !status.is_success() {
            return Err(SyncError::HubRejected {
                method: "token".to_string(),
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| SyncError::InvalidMessage(format!("token response: {}", e)))?;
        if token.jwt_token.is_empty() {
            return Err(SyncError::InvalidMessage("token response: empty jwtToken".into()));
        }
        Ok(token.jwt_token)
    }
}

/// No HTTP answer at all: refused, DNS, timeout or a dropped body.
fn transport(err: reqwest::Error) -> SyncError {
    SyncError::Transport(err.to_string())
}

#[async_trait]
impl HubApi for HubClient {
    async fn is_authenticated(&self) -> bool {
        self.token.is_valid().await
    }

    async fn authenticate(&self) -> SyncResult<()> {
        match self.request_token().await {
            Ok(token) => {
                self.token.store(token).await;
                info!(
                    path = %self.settings.token_path,
                    login = %self.settings.login,
                    "Authenticated with hub"
                );
                Ok(())
            }
            Err(e) => {
                self.token.invalidate().await;
                Err(e)
            }
        }
    }

    async fn queue(&self, row: &QueueRow) -> SyncResult<QueueResponse> {
        let body = self.put(QUEUE_METHOD, &[], &QueueRequest::from(row)).await?;
        serde_json::from_value(body)
            .map_err(|e| SyncError::InvalidMessage(format!("queue response: {}", e)))
    }

    async fn dequeue(&self, cursor: Cursor) -> SyncResult<Vec<RemoteItem>> {
        let body = self
            .get(DEQUEUE_METHOD, &[(CURSOR_PARAM, cursor.to_string())])
            .await?;
        if body.is_null() {
            return Ok(Vec::new());
        }
        let payload: DequeuePayload = serde_json::from_value(body)
            .map_err(|e| SyncError::InvalidMessage(format!("dequeue response: {}", e)))?;
        Ok(payload.into_items())
    }
}
