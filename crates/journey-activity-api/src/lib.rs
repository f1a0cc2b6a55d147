//! # Journey Activity HTTP Service
//!
//! HTTP surface of a journey custom activity.
//!
//! This service provides:
//! - Lifecycle endpoints called by the journey orchestrator (save, validate,
//!   publish, execute, stop), which always answer 200
//! - Health and server info endpoints
//! - An upstream connectivity check
//!
//! Execute calls are handed to [`ExecuteHandler`], which writes the record
//! upstream and audits the outcome before the response is sent.

pub mod config;
pub mod errors;
pub mod responses;

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;


pub use config::{FieldConfig, LoggingConfig, SecurityConfig, ServerConfig, ServiceConfig};
pub use errors::{ConfigError, ServiceError};

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderMap, Method, StatusCode, Uri},
    middleware,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use journey_activity_core::{
    audit::{ExecutionAuditor, NoopAuditor, UpstreamAuditor},
    credentials::CredentialVerifier,
    lifecycle::{self, LifecycleStep},
    payload::{ExecutionRequest, PayloadNormalizer},
    upsert::UpsertEngine,
    upstream::{CachedTokenProvider, ClientCredentialsAuthenticator, TokenProvider},
    ExecuteHandler,
};
use responses::{
    CollectionSummary, HealthResponse, NotFoundResponse, RecoveredErrorResponse,
    ServerInfoResponse, StopResponse, UpstreamCheckResponse,
};
use std::{any::Any, sync::Arc};
use tower::ServiceBuilder;
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, instrument, warn};

// ============================================================================
// Application State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Configuration for the service
    pub config: Arc<ServiceConfig>,

    /// Verifier for lifecycle tokens
    pub verifier: CredentialVerifier,

    /// Execute pipeline
    pub execute_handler: Arc<ExecuteHandler>,

    /// Upstream credentials, shared with the pipeline
    pub token_provider: Arc<dyn TokenProvider>,

    /// Process start time
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Create new application state
    pub fn new(
        config: ServiceConfig,
        verifier: CredentialVerifier,
        execute_handler: Arc<ExecuteHandler>,
        token_provider: Arc<dyn TokenProvider>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            verifier,
            execute_handler,
            token_provider,
            started_at: Utc::now(),
        }
    }

    /// Wire the production pipeline from configuration.
    pub fn from_config(config: ServiceConfig) -> Result<Self, ConfigError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("journey-activity/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ConfigError::HttpClient {
                message: e.to_string(),
            })?;

        Ok(Self::with_http_client(config, http))
    }

    /// Wire the production pipeline around an existing HTTP client.
    pub fn with_http_client(config: ServiceConfig, http: reqwest::Client) -> Self {
        let verifier = CredentialVerifier::new(config.security.jwt_secret.clone());

        let authenticator: Arc<dyn TokenProvider> = Arc::new(ClientCredentialsAuthenticator::new(
            http.clone(),
            config.upstream.clone(),
        ));
        let token_provider: Arc<dyn TokenProvider> = if config.upstream.cache_tokens {
            info!(
                refresh_margin_seconds = config.upstream.refresh_margin_seconds,
                "Upstream token caching enabled"
            );
            Arc::new(CachedTokenProvider::new(
                authenticator,
                config.upstream.refresh_margin(),
            ))
        } else {
            authenticator
        };

        let upserter = Arc::new(UpsertEngine::new(
            http.clone(),
            token_provider.clone(),
            config.collections.target_key.clone(),
            config.fields.record.clone(),
            &config.upsert,
        ));

        let auditor: Arc<dyn ExecutionAuditor> = if config.collections.audit_enabled {
            Arc::new(UpstreamAuditor::new(
                http,
                token_provider.clone(),
                config.collections.audit_key.clone(),
                config.fields.audit.clone(),
                config.upsert.write_timeout(),
            ))
        } else {
            Arc::new(NoopAuditor)
        };

        let normalizer = PayloadNormalizer::new(config.fields.inbound.clone(), verifier.clone());
        let execute_handler = Arc::new(ExecuteHandler::new(normalizer, upserter, auditor));

        Self::new(config, verifier, execute_handler, token_provider)
    }
}

// ============================================================================
// HTTP Server
// ============================================================================

const AVAILABLE_ENDPOINTS: &[&str] = &[
    "GET / - Server info",
    "GET /health - Health check",
    "GET /ping - Liveness probe",
    "GET /diagnostics/upstream - Test upstream connection",
    "POST /save - Save configuration",
    "POST /validate - Validate configuration",
    "POST /publish - Publish activity",
    "POST /execute - Execute for contact",
    "POST /stop - Stop processing",
];

/// Create HTTP router with all endpoints
pub fn create_router(state: AppState) -> Router {
    let lifecycle_routes = Router::new()
        .route("/save", post(handle_save))
        .route("/validate", post(handle_validate))
        .route("/publish", post(handle_publish))
        .route("/execute", post(handle_execute))
        .route("/stop", post(handle_stop));

    let operational_routes = Router::new()
        .route("/", get(handle_server_info))
        .route("/health", get(handle_health_check))
        .route("/ping", get(handle_ping).post(handle_ping))
        .route("/diagnostics/upstream", get(handle_upstream_check));

    let max_body_size = state.config.server.max_body_size;
    let enable_cors = state.config.server.enable_cors;

    let router = Router::new()
        .merge(lifecycle_routes)
        .merge(operational_routes)
        .fallback(handle_not_found)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CatchPanicLayer::custom(handle_panic))
                .layer(DefaultBodyLimit::max(max_body_size))
                .layer(middleware::from_fn(request_logging_middleware))
                .into_inner(),
        )
        .with_state(state);

    if enable_cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

/// Start HTTP server
pub async fn start_server(state: AppState) -> Result<(), ServiceError> {
    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    let shutdown_timeout = std::time::Duration::from_secs(state.config.server.shutdown_timeout_seconds);
    let app = create_router(state);

    let listener =
        tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| ServiceError::BindFailed {
                address: addr.clone(),
                message: e.to_string(),
            })?;

    info!("Starting HTTP server on {}", addr);

    let shutdown_signal = async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to install Ctrl+C signal handler");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    error!(error = %e, "Failed to install SIGTERM signal handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received SIGINT (Ctrl+C), initiating graceful shutdown with {}s timeout", shutdown_timeout.as_secs());
            },
            _ = terminate => {
                info!("Received SIGTERM, initiating graceful shutdown with {}s timeout", shutdown_timeout.as_secs());
            },
        }
    };

    // In-flight execute calls complete before the server stops; new
    // connections are refused once the signal arrives.
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .map_err(|e| ServiceError::ServerFailed {
            message: e.to_string(),
        })?;

    info!("HTTP server shutdown complete");
    Ok(())
}

// ============================================================================
// Lifecycle Handlers
// ============================================================================

fn inbound_request(headers: &HeaderMap, body: &Bytes) -> ExecutionRequest {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    ExecutionRequest::from_raw(content_type, body)
}

fn acknowledge_step(state: &AppState, step: LifecycleStep, headers: &HeaderMap, body: &Bytes) {
    let request = inbound_request(headers, body);
    lifecycle::acknowledge(&state.verifier, step, &request);
}

async fn handle_save(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> &'static str {
    acknowledge_step(&state, LifecycleStep::Save, &headers, &body);
    "OK"
}

async fn handle_validate(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> &'static str {
    acknowledge_step(&state, LifecycleStep::Validate, &headers, &body);
    "OK"
}

async fn handle_publish(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> &'static str {
    acknowledge_step(&state, LifecycleStep::Publish, &headers, &body);
    "OK"
}

/// Runs the execute pipeline to completion, then acknowledges.
#[instrument(skip(state, headers, body), fields(body_size = body.len()))]
async fn handle_execute(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> &'static str {
    let request = inbound_request(&headers, &body);
    state.execute_handler.execute(&request).await;
    "Execute"
}

async fn handle_stop(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<StopResponse> {
    acknowledge_step(&state, LifecycleStep::Stop, &headers, &body);
    Json(StopResponse::processed())
}

// ============================================================================
// Operational Handlers
// ============================================================================

async fn handle_server_info(State(state): State<AppState>) -> Json<ServerInfoResponse> {
    Json(ServerInfoResponse {
        status: "Journey Activity Server Running".to_string(),
        timestamp: Utc::now(),
        port: state.config.server.port,
    })
}

async fn handle_health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let now = Utc::now();
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: now,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: (now - state.started_at).num_seconds(),
        jwt_secret_configured: state.config.security.jwt_secret_configured(),
        app_extension_key_configured: state.config.security.app_extension_key_configured(),
        upstream_configured: state.config.upstream.has_credentials(),
    })
}

async fn handle_ping() -> &'static str {
    "pong"
}

/// Performs one token exchange and reports the result.
async fn handle_upstream_check(State(state): State<AppState>) -> Response {
    if !state.config.upstream.has_credentials() {
        return Json(UpstreamCheckResponse {
            status: "error".to_string(),
            message: "Upstream credentials not configured".to_string(),
            collection: None,
            error: None,
        })
        .into_response();
    }

    match state.token_provider.authenticate().await {
        Ok(_) => Json(UpstreamCheckResponse {
            status: "success".to_string(),
            message: "Upstream connection successful".to_string(),
            collection: Some(CollectionSummary {
                name: state.config.collections.target_name.clone(),
                external_key: state.config.collections.target_key.clone(),
            }),
            error: None,
        })
        .into_response(),
        Err(e) => {
            warn!(error = %e, "Upstream connectivity check failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(UpstreamCheckResponse {
                    status: "error".to_string(),
                    message: "Upstream connection failed".to_string(),
                    collection: None,
                    error: Some(e.to_string()),
                }),
            )
                .into_response()
        }
    }
}

async fn handle_not_found(method: Method, uri: Uri) -> (StatusCode, Json<NotFoundResponse>) {
    warn!(method = %method, uri = %uri, "Route not found");
    (
        StatusCode::NOT_FOUND,
        Json(NotFoundResponse {
            status: "error".to_string(),
            message: "Route not found".to_string(),
            method: method.to_string(),
            url: uri.to_string(),
            available_endpoints: AVAILABLE_ENDPOINTS.iter().map(|e| e.to_string()).collect(),
        }),
    )
}

/// Converts a handler panic into a 200 so the orchestrator keeps going.
fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };

    error!(panic = %detail, "Handler panicked; responding with recovered error");
    (StatusCode::OK, Json(RecoveredErrorResponse::new())).into_response()
}

// ============================================================================
// Middleware
// ============================================================================

/// Request logging middleware
///
/// Propagates `x-correlation-id`, generating one when absent.
async fn request_logging_middleware(
    mut request: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = std::time::Instant::now();

    let correlation_id = request
        .headers()
        .get("x-correlation-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    request.extensions_mut().insert(correlation_id.clone());

    info!(
        correlation_id = %correlation_id,
        method = %method,
        uri = %uri,
        "Request started"
    );

    let mut response = next.run(request).await;
    let duration = start.elapsed();

    if let Ok(header_value) = correlation_id.parse() {
        response
            .headers_mut()
            .insert("x-correlation-id", header_value);
    }

    let status = response.status();

    if status.is_server_error() {
        error!(
            correlation_id = %correlation_id,
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed with server error"
        );
    } else if status.is_client_error() {
        warn!(
            correlation_id = %correlation_id,
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed with client error"
        );
    } else {
        info!(
            correlation_id = %correlation_id,
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed successfully"
        );
    }

    response
}
