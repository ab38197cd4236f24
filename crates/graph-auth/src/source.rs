//! Bearer token source with request-time refresh
//!
//! A `TokenSource` is either a fixed token handed in by the operator (for
//! example from `az account get-access-token`) or a client-credentials
//! registration whose token is cached and re-acquired shortly before expiry.
//! A tokio Mutex serializes acquisition so concurrent callers never issue
//! duplicate token requests.

use common::Secret;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::constants::REFRESH_MARGIN;
use crate::error::Result;
use crate::token::{AppCredentials, acquire_token};

struct CachedToken {
    access: Secret<String>,
    expires_at: Instant,
}

enum Inner {
    Fixed(Secret<String>),
    ClientCredentials {
        credentials: AppCredentials,
        cache: Mutex<Option<CachedToken>>,
    },
}

/// Supplies bearer tokens for Graph requests.
pub struct TokenSource {
    inner: Inner,
}

impl TokenSource {
    /// Use a pre-acquired access token as-is. It is never refreshed.
    pub fn fixed(token: Secret<String>) -> Self {
        Self {
            inner: Inner::Fixed(token),
        }
    }

    /// Acquire and cache app-only tokens for the given registration.
    pub fn client_credentials(credentials: AppCredentials) -> Self {
        Self {
            inner: Inner::ClientCredentials {
                credentials,
                cache: Mutex::new(None),
            },
        }
    }

    /// Label for logging.
    pub fn kind(&self) -> &'static str {
        match self.inner {
            Inner::Fixed(_) => "fixed",
            Inner::ClientCredentials { .. } => "client_credentials",
        }
    }

    /// Return a bearer token valid for at least `REFRESH_MARGIN`, acquiring a
    /// new one when the cache is empty or about to expire.
    pub async fn bearer(&self, client: &reqwest::Client) -> Result<Secret<String>> {
        let (credentials, cache) = match &self.inner {
            Inner::Fixed(token) => return Ok(token.clone()),
            Inner::ClientCredentials { credentials, cache } => (credentials, cache),
        };

        let mut cached = cache.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() + REFRESH_MARGIN {
                return Ok(token.access.clone());
            }
            debug!(client_id = %credentials.client_id, "cached token expiring, re-acquiring");
        }

        let response = acquire_token(client, credentials).await?;
        let expires_at = Instant::now() + std::time::Duration::from_secs(response.expires_in);
        info!(
            client_id = %credentials.client_id,
            expires_in_secs = response.expires_in,
            "acquired graph access token"
        );
        let access = Secret::new(response.access_token);
        *cached = Some(CachedToken {
            access: access.clone(),
            expires_at,
        });
        Ok(access)
    }
}
