//! Record upsert with ordered endpoint fallback.
//!
//! The upstream platform exposes more than one write API for the same data
//! collection, and which of them accepts a given collection depends on how it
//! was provisioned. The engine therefore walks an ordered list of
//! [`UpsertCandidate`]s, each pairing an endpoint path with a payload shape,
//! and stops at the first 2xx. A candidate failing for any reason (transport
//! error, timeout, non-2xx) only moves the loop to the next candidate.
//!
//! Built-in candidates, in order:
//!
//! 1. **Rowset** (synchronous data events):
//!    `POST /hub/v1/dataevents/key:{collection_key}/rowset` with
//!    `[{"keys": {..}, "values": {..}}]`
//! 2. **Async rows**:
//!    `POST /data/v1/async/dataextensions/key:{collection_key}/rows` with
//!    `{"items": [{..}]}`
//!
//! Extra candidates from configuration are tried after these.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::config::{RecordFieldNames, UpsertConfig};
use crate::error::UpsertError;
use crate::upstream::TokenProvider;

pub const ROWSET_PATH: &str = "/hub/v1/dataevents/key:{collection_key}/rowset";
pub const ASYNC_ROWS_PATH: &str = "/data/v1/async/dataextensions/key:{collection_key}/rows";

// ============================================================================
// Candidates
// ============================================================================

/// Body layout expected by an upsert endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadShape {
    /// `[{"keys": {key}, "values": {key, message}}]`
    KeysValuesList,

    /// `{"items": [{key, message}]}`
    FlatItems,
}

impl PayloadShape {
    pub fn build(&self, fields: &RecordFieldNames, record_key: &str, message: &str) -> Value {
        let mut values = Map::new();
        values.insert(fields.key.clone(), Value::String(record_key.to_string()));
        values.insert(fields.message.clone(), Value::String(message.to_string()));

        match self {
            Self::KeysValuesList => {
                let mut keys = Map::new();
                keys.insert(fields.key.clone(), Value::String(record_key.to_string()));
                json!([{ "keys": keys, "values": values }])
            }
            Self::FlatItems => json!({ "items": [values] }),
        }
    }
}

/// One endpoint and payload shape to try.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertCandidate {
    /// Name used in logs and results.
    pub name: String,

    /// Path below the REST base URL; must contain `{collection_key}`.
    pub path_template: String,

    pub shape: PayloadShape,
}

impl UpsertCandidate {
    pub const COLLECTION_PLACEHOLDER: &'static str = "{collection_key}";

    pub fn rowset() -> Self {
        Self {
            name: "Synchronous Data Events API".to_string(),
            path_template: ROWSET_PATH.to_string(),
            shape: PayloadShape::KeysValuesList,
        }
    }

    pub fn async_rows() -> Self {
        Self {
            name: "Async Data Extensions API".to_string(),
            path_template: ASYNC_ROWS_PATH.to_string(),
            shape: PayloadShape::FlatItems,
        }
    }

    /// The built-in candidates in priority order.
    pub fn defaults() -> Vec<Self> {
        vec![Self::rowset(), Self::async_rows()]
    }

    pub fn url(&self, rest_base_url: &str, collection_key: &str) -> String {
        format!(
            "{}{}",
            rest_base_url.trim_end_matches('/'),
            self.path_template
                .replace(Self::COLLECTION_PLACEHOLDER, collection_key)
        )
    }
}

// ============================================================================
// Results
// ============================================================================

/// The first candidate that accepted the write.
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertSuccess {
    pub candidate: String,
    pub status: u16,

    /// Parsed JSON body, or the raw text as a JSON string.
    pub body: Value,
}

/// Why one candidate failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptFailure {
    Status { status: u16, body: String },
    Timeout,
    Transport(String),
}

impl AttemptFailure {
    fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    fn describe(&self, candidate: &str) -> String {
        match self {
            Self::Status { status, body } => format!("{}: HTTP {} {}", candidate, status, body),
            Self::Timeout => format!("{}: timed out", candidate),
            Self::Transport(message) => format!("{}: {}", candidate, message),
        }
    }
}

/// Classify an exhausted attempt list.
///
/// Any 401 wins; then every candidate answering 400; then a final 404.
/// Everything else is an upstream error carrying the last failure.
pub fn classify_failures(attempts: &[(String, AttemptFailure)], collection_key: &str) -> UpsertError {
    let (last_name, last_failure) = match attempts.last() {
        Some(last) => last,
        None => return UpsertError::NoCandidates,
    };
    let count = attempts.len();
    let message = last_failure.describe(last_name);

    if let Some((name, failure)) = attempts.iter().find(|(_, f)| f.status() == Some(401)) {
        return UpsertError::AuthFailure {
            attempts: count,
            message: failure.describe(name),
        };
    }

    if attempts.iter().all(|(_, f)| f.status() == Some(400)) {
        return UpsertError::BadRequest {
            attempts: count,
            message,
        };
    }

    if last_failure.status() == Some(404) {
        return UpsertError::NotFound {
            collection_key: collection_key.to_string(),
            attempts: count,
            message,
        };
    }

    UpsertError::Upstream {
        status: last_failure.status(),
        attempts: count,
        message,
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Writes one record to the target collection.
#[async_trait]
pub trait RecordUpserter: Send + Sync {
    async fn upsert(&self, record_key: &str, message: &str) -> Result<UpsertSuccess, UpsertError>;
}

/// Upserts through the candidate list against the upstream REST API.
pub struct UpsertEngine {
    http: reqwest::Client,
    tokens: Arc<dyn TokenProvider>,
    collection_key: String,
    fields: RecordFieldNames,
    candidates: Vec<UpsertCandidate>,
    write_timeout: Duration,
}

impl UpsertEngine {
    pub fn new(
        http: reqwest::Client,
        tokens: Arc<dyn TokenProvider>,
        collection_key: impl Into<String>,
        fields: RecordFieldNames,
        config: &UpsertConfig,
    ) -> Self {
        Self {
            http,
            tokens,
            collection_key: collection_key.into(),
            fields,
            candidates: config.candidates(),
            write_timeout: config.write_timeout(),
        }
    }

    pub fn candidates(&self) -> &[UpsertCandidate] {
        &self.candidates
    }

    async fn attempt(
        &self,
        candidate: &UpsertCandidate,
        url: &str,
        access_token: &str,
        body: &Value,
    ) -> Result<UpsertSuccess, AttemptFailure> {
        let response = self
            .http
            .post(url)
            .bearer_auth(access_token)
            .json(body)
            .timeout(self.write_timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AttemptFailure::Timeout
                } else {
                    AttemptFailure::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AttemptFailure::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(AttemptFailure::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
        Ok(UpsertSuccess {
            candidate: candidate.name.clone(),
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl RecordUpserter for UpsertEngine {
    #[instrument(skip(self, message), fields(collection = %self.collection_key))]
    async fn upsert(&self, record_key: &str, message: &str) -> Result<UpsertSuccess, UpsertError> {
        if self.candidates.is_empty() {
            return Err(UpsertError::NoCandidates);
        }

        let credential = self.tokens.authenticate().await?;
        let mut failures: Vec<(String, AttemptFailure)> = Vec::with_capacity(self.candidates.len());

        for candidate in &self.candidates {
            let url = candidate.url(credential.rest_base_url(), &self.collection_key);
            let body = candidate.shape.build(&self.fields, record_key, message);

            info!(candidate = %candidate.name, url = %url, "Attempting upsert");

            match self
                .attempt(candidate, &url, credential.access_token(), &body)
                .await
            {
                Ok(success) => {
                    info!(
                        candidate = %success.candidate,
                        status = success.status,
                        "Upsert succeeded"
                    );
                    return Ok(success);
                }
                Err(failure) => {
                    warn!(
                        candidate = %candidate.name,
                        status = ?failure.status(),
                        failure = %failure.describe(&candidate.name),
                        "Upsert candidate failed; trying next"
                    );
                    failures.push((candidate.name.clone(), failure));
                }
            }
        }

        let error = classify_failures(&failures, &self.collection_key);
        if matches!(error, UpsertError::AuthFailure { .. }) {
            self.tokens.invalidate(&credential).await;
        }

        warn!(error = %error, "All API endpoints failed");
        Err(error)
    }
}

#[cfg(test)]
#[path = "upsert_tests.rs"]
mod tests;
