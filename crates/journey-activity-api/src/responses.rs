//! Response bodies for the lifecycle and operational endpoints.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Stop acknowledgment
#[derive(Debug, Serialize)]
pub struct StopResponse {
    pub status: String,
    pub message: String,
}

impl StopResponse {
    pub fn processed() -> Self {
        Self {
            status: "success".to_string(),
            message: "Stop processed successfully".to_string(),
        }
    }
}

/// Root endpoint response
#[derive(Debug, Serialize)]
pub struct ServerInfoResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub port: u16,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub uptime_seconds: i64,
    pub jwt_secret_configured: bool,
    pub app_extension_key_configured: bool,
    pub upstream_configured: bool,
}

/// Upstream connectivity check response
#[derive(Debug, Serialize)]
pub struct UpstreamCheckResponse {
    pub status: String,
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<CollectionSummary>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CollectionSummary {
    pub name: Option<String>,
    pub external_key: String,
}

/// Body for unknown routes
#[derive(Debug, Serialize)]
pub struct NotFoundResponse {
    pub status: String,
    pub message: String,
    pub method: String,
    pub url: String,
    pub available_endpoints: Vec<String>,
}

/// Body returned when a handler panics
#[derive(Debug, Serialize)]
pub struct RecoveredErrorResponse {
    pub status: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl RecoveredErrorResponse {
    pub fn new() -> Self {
        Self {
            status: "error".to_string(),
            message: "Server error but continuing".to_string(),
            timestamp: Utc::now(),
        }
    }
}

impl Default for RecoveredErrorResponse {
    fn default() -> Self {
        Self::new()
    }
}
