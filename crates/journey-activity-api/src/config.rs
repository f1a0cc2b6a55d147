//! Configuration types for the HTTP service

use journey_activity_core::config::{
    AuditFieldNames, CollectionConfig, InboundFieldNames, RecordFieldNames, UpsertConfig,
    UpstreamConfig,
};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::ConfigError;

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP server settings
    pub server: ServerConfig,

    /// Inbound token verification
    pub security: SecurityConfig,

    /// Upstream platform credentials and endpoints
    pub upstream: UpstreamConfig,

    /// Target and audit collections
    pub collections: CollectionConfig,

    /// Upsert fallback settings
    pub upsert: UpsertConfig,

    /// Inbound argument names and outbound column names
    pub fields: FieldConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl ServiceConfig {
    /// Reject configuration that cannot work at runtime.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Invalid {
                message: "server.port must be greater than zero".to_string(),
            });
        }

        if self.server.max_body_size == 0 {
            return Err(ConfigError::Invalid {
                message: "server.max_body_size must be greater than zero".to_string(),
            });
        }

        self.upstream.validate()?;
        self.collections.validate(&self.upstream)?;
        self.upsert.validate()?;
        self.fields.inbound.validate()?;

        Ok(())
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,

    /// Maximum request size in bytes
    pub max_body_size: usize,

    /// Enable CORS
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            shutdown_timeout_seconds: 30,
            max_body_size: 10 * 1024 * 1024, // 10MB
            enable_cors: true,
        }
    }
}

/// Security configuration
#[derive(Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SecurityConfig {
    /// Shared secret the orchestrator signs lifecycle tokens with
    pub jwt_secret: Option<String>,

    /// Installed package key of the activity; reported by `/health`, not enforced
    pub app_extension_key: Option<String>,
}

impl SecurityConfig {
    pub fn jwt_secret_configured(&self) -> bool {
        self.jwt_secret.as_deref().is_some_and(|s| !s.is_empty())
    }

    pub fn app_extension_key_configured(&self) -> bool {
        self.app_extension_key
            .as_deref()
            .is_some_and(|s| !s.trim().is_empty())
    }
}

impl fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("jwt_secret", &self.jwt_secret.as_ref().map(|_| "<REDACTED>"))
            .field("app_extension_key", &self.app_extension_key)
            .finish()
    }
}

/// Field name mappings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FieldConfig {
    pub inbound: InboundFieldNames,
    pub record: RecordFieldNames,
    pub audit: AuditFieldNames,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter used when RUST_LOG is not set
    pub level: String,

    /// Enable JSON structured logging
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}
