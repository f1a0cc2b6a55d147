//! Best-effort execution audit trail.
//!
//! After each upsert attempt one row is written to the audit collection
//! through the async-rows API. Audit failures never affect the execute
//! response; they are logged and dropped.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::config::AuditFieldNames;
use crate::error::{AuditError, UpsertError};
use crate::payload::NormalizedPayload;
use crate::upsert::UpsertCandidate;
use crate::upstream::TokenProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditOutcome {
    Success,
    Error,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::Error => "Error",
        }
    }
}

/// One execution, as written to the audit collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRecord {
    pub record_key: String,
    pub correlation_id: String,
    pub executed_at: DateTime<Utc>,
    pub outcome: AuditOutcome,
    pub message: String,
    pub error_detail: Option<String>,
}

impl AuditRecord {
    pub fn success(payload: &NormalizedPayload) -> Self {
        Self::from_payload(payload, AuditOutcome::Success, None)
    }

    pub fn failure(payload: &NormalizedPayload, error: &UpsertError) -> Self {
        Self::from_payload(payload, AuditOutcome::Error, Some(error.to_string()))
    }

    fn from_payload(
        payload: &NormalizedPayload,
        outcome: AuditOutcome,
        error_detail: Option<String>,
    ) -> Self {
        Self {
            record_key: payload.record_key.clone(),
            correlation_id: payload.correlation_id.clone(),
            executed_at: Utc::now(),
            outcome,
            message: payload.message.clone(),
            error_detail,
        }
    }

    /// Row body for the async-rows API using the given column names.
    pub fn to_row(&self, fields: &AuditFieldNames) -> Value {
        let mut row = Map::new();
        row.insert(fields.record_key.clone(), json!(self.record_key));
        row.insert(fields.correlation_id.clone(), json!(self.correlation_id));
        row.insert(
            fields.executed_at.clone(),
            json!(self
                .executed_at
                .to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        row.insert(fields.status.clone(), json!(self.outcome.as_str()));
        row.insert(fields.message.clone(), json!(self.message));
        row.insert(fields.error_detail.clone(), json!(self.error_detail));

        json!({ "items": [row] })
    }
}

/// Records execution outcomes. Implementations must not fail.
#[async_trait]
pub trait ExecutionAuditor: Send + Sync {
    async fn record_execution(&self, record: &AuditRecord);
}

/// Auditor used when auditing is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAuditor;

#[async_trait]
impl ExecutionAuditor for NoopAuditor {
    async fn record_execution(&self, record: &AuditRecord) {
        debug!(
            record_key = %record.record_key,
            outcome = record.outcome.as_str(),
            "Auditing disabled; execution not recorded"
        );
    }
}

/// Writes audit rows to an upstream collection.
pub struct UpstreamAuditor {
    http: reqwest::Client,
    tokens: Arc<dyn TokenProvider>,
    collection_key: String,
    fields: AuditFieldNames,
    timeout: Duration,
}

impl UpstreamAuditor {
    pub fn new(
        http: reqwest::Client,
        tokens: Arc<dyn TokenProvider>,
        collection_key: impl Into<String>,
        fields: AuditFieldNames,
        timeout: Duration,
    ) -> Self {
        Self {
            http,
            tokens,
            collection_key: collection_key.into(),
            fields,
            timeout,
        }
    }

    async fn write(&self, record: &AuditRecord) -> Result<(), AuditError> {
        let credential = self.tokens.authenticate().await?;
        let url = UpsertCandidate::async_rows().url(credential.rest_base_url(), &self.collection_key);

        let response = self
            .http
            .post(&url)
            .bearer_auth(credential.access_token())
            .json(&record.to_row(&self.fields))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| AuditError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AuditError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        Ok(())
    }
}

#[async_trait]
impl ExecutionAuditor for UpstreamAuditor {
    #[instrument(skip(self, record), fields(collection = %self.collection_key, outcome = record.outcome.as_str()))]
    async fn record_execution(&self, record: &AuditRecord) {
        match self.write(record).await {
            Ok(()) => debug!(record_key = %record.record_key, "Execution recorded"),
            Err(e) => warn!(
                record_key = %record.record_key,
                error = %e,
                "Failed to record execution; continuing"
            ),
        }
    }
}

#[cfg(test)]
#[path = "audit_tests.rs"]
mod tests;
