//! # Hub Token Cache
//!
//! Holds the bearer token obtained from the hub token endpoint.
//!
//! ## Token Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Token Lifecycle                                 │
//! │                                                                         │
//! │   None ──authenticate()──► Some(token, exp)                            │
//! │    ▲                           │                                        │
//! │    │                           ├── exp - margin reached ──► expired    │
//! │    │                           │   (is_authenticated() == false)       │
//! │    │                           │                                        │
//! │    └───── invalidate() ◄───────┴── HTTP 401 / transport failure        │
//! │                                                                         │
//! │   The Connection Manager re-authenticates whenever the cache is not    │
//! │   valid; data loops never authenticate on their own.                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `exp` claim is read without verifying the signature: the agent only
//! needs to know when to ask for a new token, the hub does the verifying.

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// A token is treated as expired this long before its `exp`.
const EXPIRY_MARGIN_SECS: i64 = 30;

/// Token information stored after authentication.
#[derive(Debug, Clone)]
pub struct TokenInfo {
    /// The bearer token as returned by the hub.
    pub access_token: String,
    /// `exp` claim, if the token carried a readable one.
    pub expires_at: Option<DateTime<Utc>>,
}

impl TokenInfo {
    /// Wraps a raw token, reading its `exp` claim when possible.
    pub fn new(access_token: impl Into<String>) -> Self {
        let access_token = access_token.into();
        let expires_at = read_expiry(&access_token);
        TokenInfo {
            access_token,
            expires_at,
        }
    }

    /// True once the token is within the expiry margin. Tokens without a
    /// readable `exp` never expire locally.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(exp) => now + Duration::seconds(EXPIRY_MARGIN_SECS) >= exp,
            None => false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ExpiryClaim {
    exp: Option<f64>,
}

fn read_expiry(token: &str) -> Option<DateTime<Utc>> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    match decode::<ExpiryClaim>(token, &DecodingKey::from_secret(&[]), &validation) {
        Ok(data) => data
            .claims
            .exp
            .and_then(|exp| Utc.timestamp_opt(exp as i64, 0).single()),
        Err(e) => {
            debug!(error = %e, "Token has no readable exp claim");
            None
        }
    }
}

// =============================================================================
// Token Cache
// =============================================================================

/// Shared slot for the current token.
#[derive(Debug, Default)]
pub struct TokenCache {
    token: RwLock<Option<TokenInfo>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a freshly issued token.
    pub async fn store(&self, access_token: impl Into<String>) {
        let info = TokenInfo::new(access_token);
        match info.expires_at {
            Some(exp) => info!(expires_at = %exp, "Hub token stored"),
            None => info!("Hub token stored (no expiry)"),
        }
        *self.token.write().await = Some(info);
    }

    /// Returns the token if present and not expired.
    pub async fn bearer(&self) -> Option<String> {
        self.token
            .read()
            .await
            .as_ref()
            .filter(|t| !t.is_expired())
            .map(|t| t.access_token.clone())
    }

    pub async fn is_valid(&self) -> bool {
        self.bearer().await.is_some()
    }

    /// Drops the token so the next connection tick authenticates again.
    pub async fn invalidate(&self) {
        if self.token.write().await.take().is_some() {
            info!("Hub token invalidated");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde::Serialize;

    #[derive(Serialize)]
    struct Claims {
        sub: String,
        exp: i64,
    }

    fn jwt_expiring_at(exp: DateTime<Utc>) -> String {
        let claims = Claims {
            sub: "erp".into(),
            exp: exp.timestamp(),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"hub-secret"),
        )
        .unwrap()
    }

    #[test]
    fn test_reads_exp_without_key() {
        let exp = Utc.timestamp_opt(2_000_000_000, 0).unwrap();
        let info = TokenInfo::new(jwt_expiring_at(exp));
        assert_eq!(info.expires_at, Some(exp));
        assert!(!info.is_expired_at(exp - Duration::minutes(5)));
        assert!(info.is_expired_at(exp - Duration::seconds(10)));
    }

    #[test]
    fn test_opaque_token_never_expires() {
        let info = TokenInfo::new("not-a-jwt");
        assert_eq!(info.expires_at, None);
        assert!(!info.is_expired());
    }

    #[tokio::test]
    async fn test_cache_lifecycle() {
        let cache = TokenCache::new();
        assert!(!cache.is_valid().await);

        cache.store("opaque").await;
        assert_eq!(cache.bearer().await.as_deref(), Some("opaque"));

        cache.invalidate().await;
        assert!(!cache.is_valid().await);
    }

    #[tokio::test]
    async fn test_expired_token_is_not_served() {
        let cache = TokenCache::new();
        cache
            .store(jwt_expiring_at(Utc::now() - Duration::hours(1)))
            .await;
        assert_eq!(cache.bearer().await, None);
    }
}
