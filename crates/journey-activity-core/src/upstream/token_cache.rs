//! Credential reuse across upserts.
//!
//! A single async mutex guards the cached credential and is held across the
//! refresh, so concurrent callers queue behind one in-flight exchange and then
//! read the fresh value.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{TokenProvider, UpstreamCredential};
use crate::error::AuthError;

/// Wraps a [`TokenProvider`] and reuses its credential until it nears expiry.
///
/// Credentials that declare no expiry are passed through without caching.
pub struct CachedTokenProvider {
    inner: Arc<dyn TokenProvider>,
    refresh_margin: chrono::Duration,
    cached: Mutex<Option<UpstreamCredential>>,
}

impl CachedTokenProvider {
    pub fn new(inner: Arc<dyn TokenProvider>, refresh_margin: std::time::Duration) -> Self {
        let refresh_margin = chrono::Duration::from_std(refresh_margin)
            .unwrap_or_else(|_| chrono::Duration::zero());
        Self {
            inner,
            refresh_margin,
            cached: Mutex::new(None),
        }
    }
}

#[async_trait]
impl TokenProvider for CachedTokenProvider {
    async fn authenticate(&self) -> Result<UpstreamCredential, AuthError> {
        let mut cached = self.cached.lock().await;

        if let Some(credential) = cached.as_ref() {
            if !credential.expires_soon(self.refresh_margin) {
                debug!("Reusing cached upstream credential");
                return Ok(credential.clone());
            }
            debug!("Cached upstream credential is about to expire; refreshing");
        }

        let fresh = self.inner.authenticate().await?;
        *cached = fresh.expires_at().map(|_| fresh.clone());

        Ok(fresh)
    }

    /// A newer credential cached by another caller is kept.
    async fn invalidate(&self, rejected: &UpstreamCredential) {
        let mut cached = self.cached.lock().await;
        if cached
            .as_ref()
            .is_some_and(|c| c.access_token() == rejected.access_token())
        {
            *cached = None;
            info!("Invalidated cached upstream credential");
        } else {
            debug!("Rejected credential is no longer cached; keeping the current one");
        }
        drop(cached);
        self.inner.invalidate(rejected).await;
    }
}

#[cfg(test)]
#[path = "token_cache_tests.rs"]
mod tests;
