//! Client-credentials token exchange.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::{TokenProvider, UpstreamCredential};
use crate::config::UpstreamConfig;
use crate::error::AuthError;

#[derive(Serialize)]
struct TokenRequest<'a> {
    grant_type: &'static str,
    client_id: &'a str,
    client_secret: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    account_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    scope: Option<&'a str>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    rest_instance_url: Option<String>,
    expires_in: Option<i64>,
}

/// Exchanges the configured client credentials for a fresh token on every call.
pub struct ClientCredentialsAuthenticator {
    http: reqwest::Client,
    config: UpstreamConfig,
}

impl ClientCredentialsAuthenticator {
    pub fn new(http: reqwest::Client, config: UpstreamConfig) -> Self {
        Self { http, config }
    }
}

#[async_trait]
impl TokenProvider for ClientCredentialsAuthenticator {
    #[instrument(skip(self))]
    async fn authenticate(&self) -> Result<UpstreamCredential, AuthError> {
        let (client_id, client_secret) = match (
            present(&self.config.client_id),
            present(&self.config.client_secret),
        ) {
            (Some(id), Some(secret)) => (id, secret),
            _ => return Err(AuthError::MissingCredentials),
        };

        let endpoint = self
            .config
            .token_endpoint()
            .ok_or(AuthError::MissingAuthority)?;

        let request = TokenRequest {
            grant_type: "client_credentials",
            client_id,
            client_secret,
            account_id: present(&self.config.account_id),
            scope: present(&self.config.scope),
        };

        debug!(endpoint = %endpoint, "Requesting upstream access token");

        let response = self
            .http
            .post(&endpoint)
            .json(&request)
            .timeout(self.config.auth_timeout())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AuthError::Timeout {
                        seconds: self.config.auth_timeout_seconds,
                    }
                } else {
                    AuthError::NetworkError(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Token endpoint rejected the request");
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let body: TokenResponse =
            response
                .json()
                .await
                .map_err(|e| AuthError::InvalidResponse {
                    message: e.to_string(),
                })?;

        let access_token = body
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingToken)?;

        let rest_base_url = body
            .rest_instance_url
            .filter(|u| !u.trim().is_empty())
            .or_else(|| self.config.rest_base_url())
            .ok_or_else(|| AuthError::InvalidResponse {
                message: "no rest_instance_url returned and no REST base URL configured"
                    .to_string(),
            })?;

        let expires_at = body.expires_in.and_then(expiry_from_lifetime);

        info!(
            rest_base_url = %rest_base_url,
            expires_at = ?expires_at,
            "Obtained upstream access token"
        );

        Ok(UpstreamCredential::new(
            access_token,
            rest_base_url,
            expires_at,
        ))
    }
}

/// `None` for non-positive lifetimes and for ones too large to represent.
fn expiry_from_lifetime(seconds: i64) -> Option<DateTime<Utc>> {
    if seconds <= 0 {
        return None;
    }
    let expires_at = Duration::try_seconds(seconds).and_then(|d| Utc::now().checked_add_signed(d));
    if expires_at.is_none() {
        warn!(expires_in = seconds, "Token lifetime is out of range; treating it as undeclared");
    }
    expires_at
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
#[path = "client_credentials_tests.rs"]
mod tests;
