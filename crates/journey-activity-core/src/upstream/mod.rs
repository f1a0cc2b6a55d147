//! Upstream platform authentication.
//!
//! Every write to the upstream data API needs a bearer token from the
//! client-credentials grant. [`ClientCredentialsAuthenticator`] performs one
//! exchange per call; [`CachedTokenProvider`] wraps any provider and reuses
//! the token until it is close to expiry.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::fmt;

use crate::error::AuthError;

mod client_credentials;
mod token_cache;

pub use client_credentials::ClientCredentialsAuthenticator;
pub use token_cache::CachedTokenProvider;

/// Bearer token plus the REST base URL it is valid for.
#[derive(Clone, PartialEq, Eq)]
pub struct UpstreamCredential {
    access_token: String,
    rest_base_url: String,
    expires_at: Option<DateTime<Utc>>,
}

impl UpstreamCredential {
    pub fn new(
        access_token: impl Into<String>,
        rest_base_url: impl Into<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        let rest_base_url: String = rest_base_url.into();
        Self {
            access_token: access_token.into(),
            rest_base_url: rest_base_url.trim_end_matches('/').to_string(),
            expires_at,
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// REST base URL without a trailing slash.
    pub fn rest_base_url(&self) -> &str {
        &self.rest_base_url
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Tokens without a declared expiry are never considered expired.
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Utc::now() >= at)
    }

    /// True if the token expires within `margin`, or has no declared expiry.
    pub fn expires_soon(&self, margin: Duration) -> bool {
        match self.expires_at {
            Some(at) => Utc::now()
                .checked_add_signed(margin)
                .map_or(true, |horizon| horizon >= at),
            None => true,
        }
    }
}

impl fmt::Debug for UpstreamCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamCredential")
            .field("access_token", &"<REDACTED>")
            .field("rest_base_url", &self.rest_base_url)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Source of upstream credentials.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn authenticate(&self) -> Result<UpstreamCredential, AuthError>;

    /// Forget `rejected` if it is still cached. Called when the upstream
    /// refuses a token.
    async fn invalidate(&self, _rejected: &UpstreamCredential) {}
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
