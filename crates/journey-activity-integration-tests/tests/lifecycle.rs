//! Integration tests for the configuration-time lifecycle endpoints.

mod common;

use common::*;
use serde_json::{json, Value};
use wiremock::MockServer;

/// Verify that save, validate and publish answer `OK` for any token state.
#[tokio::test]
async fn test_configuration_steps_acknowledge_all_token_states() {
    let server = MockServer::start().await;
    let app = build_router(upstream_config(&server));
    let valid = sign(&json!({ "activityObjectID": "act-1" }));
    let bodies = [
        json!({ "jwt": valid }),
        json!({ "jwt": "not.a.token" }),
        json!({}),
    ];

    for uri in ["/save", "/validate", "/publish"] {
        for body in &bodies {
            let (status, text) = post_json(&app, uri, body).await;
            assert_eq!(status, 200, "{} with {}", uri, body);
            assert_eq!(text, "OK");
        }
    }
}

#[tokio::test]
async fn test_configuration_steps_accept_non_json_bodies() {
    let server = MockServer::start().await;
    let app = build_router(upstream_config(&server));

    let (_, form) = post_raw(
        &app,
        "/validate",
        "application/x-www-form-urlencoded",
        "jwt=abc&activityObjectID=act-1",
    )
    .await;
    let (_, garbage) = post_raw(&app, "/publish", "application/json", "{{{").await;
    let (_, raw) = post_raw(&app, "/save", "application/jwt", "a.b.c").await;

    assert_eq!(form, "OK");
    assert_eq!(garbage, "OK");
    assert_eq!(raw, "OK");
}

#[tokio::test]
async fn test_stop_acknowledges_with_json() {
    let server = MockServer::start().await;
    let app = build_router(upstream_config(&server));

    let (status, text) = post_json(&app, "/stop", &json!({ "jwt": "anything" })).await;
    let body: Value = serde_json::from_str(&text).unwrap();

    assert_eq!(status, 200);
    assert_eq!(body["status"], "success");
    assert_eq!(body["message"], "Stop processed successfully");
}

/// Verify that lifecycle steps other than execute never reach the upstream.
#[tokio::test]
async fn test_lifecycle_steps_do_not_contact_upstream() {
    let server = MockServer::start().await;
    let app = build_router(upstream_config(&server));

    for uri in ["/save", "/validate", "/publish", "/stop"] {
        post_json(&app, uri, &json!({})).await;
    }

    assert!(paths_received(&server).await.is_empty());
}

#[tokio::test]
async fn test_lifecycle_without_secret_configured() {
    let server = MockServer::start().await;
    let mut config = upstream_config(&server);
    config.security.jwt_secret = None;
    let app = build_router(config);

    let (status, text) = post_json(&app, "/save", &json!({ "jwt": "a.b.c" })).await;

    assert_eq!((status.as_u16(), text.as_str()), (200, "OK"));
}
