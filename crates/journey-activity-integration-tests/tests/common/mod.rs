//! Common test utilities for journey-activity integration tests
//!
//! This module provides:
//! - A service configuration pointed at a wiremock upstream
//! - Mounting helpers for the token, rowset and async-rows endpoints
//! - Request helpers for driving the router with `oneshot`

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use journey_activity_api::{create_router, AppState, ServiceConfig};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

#[allow(dead_code)]
pub const TARGET_KEY: &str = "MASTER_DE";
#[allow(dead_code)]
pub const AUDIT_KEY: &str = "ACTIVITY_LOG_DE";
#[allow(dead_code)]
pub const JWT_SECRET: &str = "integration-secret";
#[allow(dead_code)]
pub const ACCESS_TOKEN: &str = "integration-token";

pub const TOKEN_PATH: &str = "/v2/token";

#[allow(dead_code)]
pub fn rowset_path(key: &str) -> String {
    format!("/hub/v1/dataevents/key:{}/rowset", key)
}

#[allow(dead_code)]
pub fn async_rows_path(key: &str) -> String {
    format!("/data/v1/async/dataextensions/key:{}/rows", key)
}

// ============================================================================
// Configuration and router
// ============================================================================

/// Configuration whose upstream endpoints all resolve to `server`.
#[allow(dead_code)]
pub fn upstream_config(server: &MockServer) -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.security.jwt_secret = Some(JWT_SECRET.to_string());
    config.upstream.client_id = Some("client-id".to_string());
    config.upstream.client_secret = Some("client-secret".to_string());
    config.upstream.account_id = Some("100001".to_string());
    config.upstream.auth_url = Some(server.uri());
    config.upstream.rest_base_url = Some(server.uri());
    config.collections.target_key = TARGET_KEY.to_string();
    config.collections.audit_key = AUDIT_KEY.to_string();
    config.upsert.write_timeout_seconds = 5;
    config
}

/// Router wired with the production pipeline.
#[allow(dead_code)]
pub fn build_router(config: ServiceConfig) -> Router {
    create_router(AppState::with_http_client(config, reqwest::Client::new()))
}

// ============================================================================
// Upstream mocks
// ============================================================================

/// Token endpoint that always issues [`ACCESS_TOKEN`].
#[allow(dead_code)]
pub async fn mount_token(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": ACCESS_TOKEN,
            "token_type": "Bearer",
            "expires_in": 1080
        })))
        .mount(server)
        .await;
}

/// Respond to `route` with `status` and an empty JSON object.
#[allow(dead_code)]
pub async fn mount_status(server: &MockServer, route: &str, status: u16) {
    Mock::given(method("POST"))
        .and(path(route.to_string()))
        .respond_with(ResponseTemplate::new(status).set_body_json(json!({})))
        .mount(server)
        .await;
}

/// JSON bodies of every request the server received on `route`, in order.
#[allow(dead_code)]
pub async fn bodies_sent_to(server: &MockServer, route: &str) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == route)
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect()
}

/// Paths of every request the server received, in order.
#[allow(dead_code)]
pub async fn paths_received(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|r| r.url.path().to_string())
        .collect()
}

// ============================================================================
// Request helpers
// ============================================================================

#[allow(dead_code)]
pub fn sign(claims: &Value) -> String {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap()
}

#[allow(dead_code)]
pub async fn post_json(app: &Router, uri: &str, body: &Value) -> (StatusCode, String) {
    send(
        app,
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
}

#[allow(dead_code)]
pub async fn post_raw(app: &Router, uri: &str, content_type: &str, body: &str) -> (StatusCode, String) {
    send(
        app,
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", content_type)
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
}

#[allow(dead_code)]
pub async fn get(app: &Router, uri: &str) -> (StatusCode, String) {
    send(app, Request::builder().uri(uri).body(Body::empty()).unwrap()).await
}

pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, String) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}
