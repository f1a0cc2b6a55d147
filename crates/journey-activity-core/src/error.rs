//! Error types for the execution pipeline.
//!
//! None of these ever reach the webhook caller. They drive fallback decisions
//! inside the pipeline and end up in logs and audit records.

use thiserror::Error;

/// Failures of the client-credentials token exchange.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Client ID or secret is not configured; no exchange was attempted.
    #[error("Upstream credentials are not configured")]
    MissingCredentials,

    /// Neither a token endpoint nor a tenant subdomain is configured.
    #[error("Upstream authority URL is not configured")]
    MissingAuthority,

    /// The token endpoint answered with a non-success status.
    #[error("Token endpoint rejected the request: {status} - {message}")]
    Rejected { status: u16, message: String },

    /// The token endpoint answered 2xx but carried no access token.
    #[error("Token response did not contain an access token")]
    MissingToken,

    /// The token response body could not be decoded.
    #[error("Invalid token response: {message}")]
    InvalidResponse { message: String },

    /// The exchange did not complete within the configured timeout.
    #[error("Token request timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// Network connectivity or transport error.
    #[error("Network error: {0}")]
    NetworkError(String),
}

impl AuthError {
    /// Check if this error represents a transient condition that may succeed if retried.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::MissingCredentials => false,
            Self::MissingAuthority => false,
            Self::Rejected { status, .. } => *status >= 500 || *status == 429,
            Self::MissingToken => false,
            Self::InvalidResponse { .. } => false,
            Self::Timeout { .. } => true,
            Self::NetworkError(_) => true,
        }
    }
}

/// Classification of an exhausted upsert, recorded in audit trails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertFailureKind {
    Authentication,
    AuthFailure,
    NotFound,
    BadRequest,
    UpstreamError,
}

impl UpsertFailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authentication => "authentication",
            Self::AuthFailure => "auth_failure",
            Self::NotFound => "not_found",
            Self::BadRequest => "bad_request",
            Self::UpstreamError => "upstream_error",
        }
    }
}

/// Failure of an upsert after every candidate has been tried.
#[derive(Debug, Error)]
pub enum UpsertError {
    /// Credentials could not be obtained, so no candidate was attempted.
    #[error("Authentication failed: {0}")]
    Authentication(#[from] AuthError),

    /// At least one candidate answered 401.
    #[error("Upstream rejected the access token after {attempts} attempt(s): {message}")]
    AuthFailure { attempts: usize, message: String },

    /// The target collection does not exist.
    #[error("Collection '{collection_key}' not found after {attempts} attempt(s): {message}")]
    NotFound {
        collection_key: String,
        attempts: usize,
        message: String,
    },

    /// Every candidate rejected the payload as malformed.
    #[error("Every candidate rejected the payload ({attempts} attempt(s)): {message}")]
    BadRequest { attempts: usize, message: String },

    /// Any other exhausted outcome: 5xx, timeouts, transport errors, mixed statuses.
    #[error("All API endpoints failed after {attempts} attempt(s): {message}")]
    Upstream {
        status: Option<u16>,
        attempts: usize,
        message: String,
    },

    /// The candidate list was empty.
    #[error("No upsert candidates are configured")]
    NoCandidates,
}

impl UpsertError {
    pub fn kind(&self) -> UpsertFailureKind {
        match self {
            Self::Authentication(_) => UpsertFailureKind::Authentication,
            Self::AuthFailure { .. } => UpsertFailureKind::AuthFailure,
            Self::NotFound { .. } => UpsertFailureKind::NotFound,
            Self::BadRequest { .. } => UpsertFailureKind::BadRequest,
            Self::Upstream { .. } | Self::NoCandidates => UpsertFailureKind::UpstreamError,
        }
    }

    /// Check if this error represents a transient condition that may succeed if retried.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Authentication(e) => e.is_transient(),
            Self::AuthFailure { .. } => false,
            Self::NotFound { .. } => false,
            Self::BadRequest { .. } => false,
            Self::Upstream { status, .. } => match status {
                Some(code) => *code >= 500 || *code == 429,
                None => true,
            },
            Self::NoCandidates => false,
        }
    }
}

/// Failure of an audit write. Always logged and discarded by the auditor.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Audit authentication failed: {0}")]
    Authentication(#[from] AuthError),

    #[error("Audit write rejected: {status} - {message}")]
    Rejected { status: u16, message: String },

    #[error("Audit write failed: {0}")]
    Transport(String),
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
