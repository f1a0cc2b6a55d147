//! Configuration types consumed by the pipeline components.
//!
//! Every struct carries serde defaults so a partially specified file, or no
//! file at all, deserializes into a usable value. Components receive these
//! values at construction and never re-read the environment.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::upsert::UpsertCandidate;

/// Raised by `validate()` when a configuration value cannot work.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid configuration for '{field}': {message}")]
pub struct InvalidConfig {
    pub field: String,
    pub message: String,
}

impl InvalidConfig {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

// ============================================================================
// Upstream
// ============================================================================

/// Upstream platform credentials and endpoints.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// OAuth client ID for the client-credentials grant.
    pub client_id: Option<String>,

    /// OAuth client secret. Never logged.
    pub client_secret: Option<String>,

    /// Business unit the token is scoped to.
    pub account_id: Option<String>,

    /// Optional space-separated scope list sent with the grant.
    pub scope: Option<String>,

    /// Tenant subdomain. Used to derive the auth and REST URLs when they are not set.
    pub subdomain: Option<String>,

    /// Authority base URL, or the full token endpoint ending in `/v2/token`.
    pub auth_url: Option<String>,

    /// REST base URL used when the token response carries no instance URL.
    pub rest_base_url: Option<String>,

    /// Timeout for the token exchange.
    pub auth_timeout_seconds: u64,

    /// Reuse access tokens until they are about to expire.
    pub cache_tokens: bool,

    /// How long before expiry a cached token is refreshed.
    pub refresh_margin_seconds: u64,
}

const TOKEN_PATH: &str = "/v2/token";

impl UpstreamConfig {
    /// True when both halves of the client credentials are present.
    pub fn has_credentials(&self) -> bool {
        non_empty(&self.client_id).is_some() && non_empty(&self.client_secret).is_some()
    }

    /// Full token endpoint URL, if one can be resolved.
    pub fn token_endpoint(&self) -> Option<String> {
        if let Some(url) = non_empty(&self.auth_url) {
            let url = url.trim_end_matches('/');
            if url.ends_with(TOKEN_PATH) {
                return Some(url.to_string());
            }
            return Some(format!("{}{}", url, TOKEN_PATH));
        }

        non_empty(&self.subdomain).map(|subdomain| {
            format!(
                "https://{}.auth.marketingcloudapis.com{}",
                subdomain, TOKEN_PATH
            )
        })
    }

    /// Static REST base URL, without a trailing slash.
    pub fn rest_base_url(&self) -> Option<String> {
        if let Some(url) = non_empty(&self.rest_base_url) {
            return Some(url.trim_end_matches('/').to_string());
        }

        non_empty(&self.subdomain)
            .map(|subdomain| format!("https://{}.rest.marketingcloudapis.com", subdomain))
    }

    pub fn auth_timeout(&self) -> Duration {
        Duration::from_secs(self.auth_timeout_seconds)
    }

    pub fn refresh_margin(&self) -> Duration {
        Duration::from_secs(self.refresh_margin_seconds)
    }

    pub fn validate(&self) -> Result<(), InvalidConfig> {
        if self.auth_timeout_seconds == 0 {
            return Err(InvalidConfig::new(
                "upstream.auth_timeout_seconds",
                "must be greater than zero",
            ));
        }

        if !self.has_credentials() {
            return Ok(());
        }

        if self.token_endpoint().is_none() {
            return Err(InvalidConfig::new(
                "upstream.auth_url",
                "credentials are configured but neither auth_url nor subdomain is set",
            ));
        }

        if self.rest_base_url().is_none() {
            return Err(InvalidConfig::new(
                "upstream.rest_base_url",
                "credentials are configured but neither rest_base_url nor subdomain is set",
            ));
        }

        Ok(())
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            account_id: None,
            scope: None,
            subdomain: None,
            auth_url: None,
            rest_base_url: None,
            auth_timeout_seconds: 10,
            cache_tokens: false,
            refresh_margin_seconds: 60,
        }
    }
}

impl fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "<REDACTED>"),
            )
            .field("account_id", &self.account_id)
            .field("scope", &self.scope)
            .field("subdomain", &self.subdomain)
            .field("auth_url", &self.auth_url)
            .field("rest_base_url", &self.rest_base_url)
            .field("auth_timeout_seconds", &self.auth_timeout_seconds)
            .field("cache_tokens", &self.cache_tokens)
            .field("refresh_margin_seconds", &self.refresh_margin_seconds)
            .finish()
    }
}

// ============================================================================
// Collections
// ============================================================================

/// Upstream data collections written by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionConfig {
    /// External key of the collection receiving upserts.
    pub target_key: String,

    /// Display name of the target collection, for logs only.
    pub target_name: Option<String>,

    /// External key of the audit collection.
    pub audit_key: String,

    /// Display name of the audit collection, for logs only.
    pub audit_name: Option<String>,

    /// Write an audit record for every execution.
    pub audit_enabled: bool,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            target_key: String::new(),
            target_name: Some("Master_Subscriber".to_string()),
            audit_key: "CustomActivity_Log".to_string(),
            audit_name: Some("Custom_Activity_Execution_Log".to_string()),
            audit_enabled: true,
        }
    }
}

impl CollectionConfig {
    pub fn validate(&self, upstream: &UpstreamConfig) -> Result<(), InvalidConfig> {
        if upstream.has_credentials() && self.target_key.trim().is_empty() {
            return Err(InvalidConfig::new(
                "collections.target_key",
                "credentials are configured but no target collection key is set",
            ));
        }

        if self.audit_enabled && self.audit_key.trim().is_empty() {
            return Err(InvalidConfig::new(
                "collections.audit_key",
                "auditing is enabled but no audit collection key is set",
            ));
        }

        Ok(())
    }
}

// ============================================================================
// Upsert
// ============================================================================

/// Settings for the upsert fallback loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpsertConfig {
    /// Timeout for each candidate write.
    pub write_timeout_seconds: u64,

    /// Candidates tried after the built-in ones, in order.
    pub additional_candidates: Vec<UpsertCandidate>,
}

impl Default for UpsertConfig {
    fn default() -> Self {
        Self {
            write_timeout_seconds: 15,
            additional_candidates: Vec::new(),
        }
    }
}

impl UpsertConfig {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_seconds)
    }

    /// Built-in candidates followed by the configured extras.
    pub fn candidates(&self) -> Vec<UpsertCandidate> {
        let mut candidates = UpsertCandidate::defaults();
        candidates.extend(self.additional_candidates.iter().cloned());
        candidates
    }

    pub fn validate(&self) -> Result<(), InvalidConfig> {
        if self.write_timeout_seconds == 0 {
            return Err(InvalidConfig::new(
                "upsert.write_timeout_seconds",
                "must be greater than zero",
            ));
        }

        for candidate in &self.additional_candidates {
            if !candidate.path_template.contains(UpsertCandidate::COLLECTION_PLACEHOLDER) {
                return Err(InvalidConfig::new(
                    "upsert.additional_candidates",
                    format!(
                        "candidate '{}' path must contain {}",
                        candidate.name,
                        UpsertCandidate::COLLECTION_PLACEHOLDER
                    ),
                ));
            }
        }

        Ok(())
    }
}

// ============================================================================
// Field names
// ============================================================================

/// Inbound argument names, tried in order. Mirrors the activity descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InboundFieldNames {
    pub record_key: Vec<String>,
    pub message: Vec<String>,
    pub correlation_id: Vec<String>,
}

impl Default for InboundFieldNames {
    fn default() -> Self {
        Self {
            record_key: vec!["contactKey".to_string(), "subscriberKey".to_string()],
            message: vec!["customMessage".to_string()],
            correlation_id: vec!["uuid".to_string()],
        }
    }
}

impl InboundFieldNames {
    pub fn validate(&self) -> Result<(), InvalidConfig> {
        let lists = [
            ("fields.inbound.record_key", &self.record_key),
            ("fields.inbound.message", &self.message),
            ("fields.inbound.correlation_id", &self.correlation_id),
        ];

        for (field, names) in lists {
            if names.is_empty() || names.iter().any(|n| n.trim().is_empty()) {
                return Err(InvalidConfig::new(
                    field,
                    "must list at least one non-empty field name",
                ));
            }
        }

        Ok(())
    }
}

/// Column names in the target collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordFieldNames {
    pub key: String,
    pub message: String,
}

impl Default for RecordFieldNames {
    fn default() -> Self {
        Self {
            key: "SubscriberKey".to_string(),
            message: "CustomText".to_string(),
        }
    }
}

/// Column names in the audit collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditFieldNames {
    pub record_key: String,
    pub correlation_id: String,
    pub executed_at: String,
    pub status: String,
    pub message: String,
    pub error_detail: String,
}

impl Default for AuditFieldNames {
    fn default() -> Self {
        Self {
            record_key: "SubscriberKey".to_string(),
            correlation_id: "ActivityUUID".to_string(),
            executed_at: "ExecutionDate".to_string(),
            status: "Status".to_string(),
            message: "CustomMessage".to_string(),
            error_detail: "ErrorLog".to_string(),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
