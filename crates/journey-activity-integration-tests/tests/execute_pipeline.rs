//! End-to-end tests for the execute endpoint against a mocked upstream.

mod common;

use common::*;
use serde_json::json;
use wiremock::MockServer;

/// Verify that a direct-arguments execute writes the record through the
/// first candidate and audits the success.
#[tokio::test]
async fn test_execute_writes_record_and_audits() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    mount_status(&server, &rowset_path(TARGET_KEY), 200).await;
    mount_status(&server, &async_rows_path(AUDIT_KEY), 202).await;
    let app = build_router(upstream_config(&server));

    let (status, body) = post_json(
        &app,
        "/execute",
        &json!({ "inArguments": [{ "contactKey": "101010", "customMessage": "hello", "uuid": "corr-1" }] }),
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(body, "Execute");

    let writes = bodies_sent_to(&server, &rowset_path(TARGET_KEY)).await;
    assert_eq!(
        writes,
        vec![json!([{
            "keys": { "SubscriberKey": "101010" },
            "values": { "SubscriberKey": "101010", "CustomText": "hello" }
        }])]
    );

    let audits = bodies_sent_to(&server, &async_rows_path(AUDIT_KEY)).await;
    assert_eq!(audits.len(), 1);
    let row = &audits[0]["items"][0];
    assert_eq!(row["SubscriberKey"], "101010");
    assert_eq!(row["ActivityUUID"], "corr-1");
    assert_eq!(row["Status"], "Success");
    assert_eq!(row["CustomMessage"], "hello");
    assert!(row["ErrorLog"].is_null());
}

#[tokio::test]
async fn test_write_carries_bearer_token() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    mount_status(&server, &rowset_path(TARGET_KEY), 200).await;
    mount_status(&server, &async_rows_path(AUDIT_KEY), 202).await;
    let app = build_router(upstream_config(&server));

    post_json(&app, "/execute", &json!({ "inArguments": [{ "contactKey": "k" }] })).await;

    let requests = server.received_requests().await.unwrap();
    let write = requests
        .iter()
        .find(|r| r.url.path() == rowset_path(TARGET_KEY))
        .unwrap();
    assert_eq!(
        write.headers.get("authorization").unwrap(),
        &format!("Bearer {}", ACCESS_TOKEN)
    );
}

/// Verify that a rejected rowset write falls back to the async rows API.
#[tokio::test]
async fn test_rowset_failure_falls_back_to_async_rows() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    mount_status(&server, &rowset_path(TARGET_KEY), 400).await;
    mount_status(&server, &async_rows_path(TARGET_KEY), 202).await;
    mount_status(&server, &async_rows_path(AUDIT_KEY), 202).await;
    let app = build_router(upstream_config(&server));

    let (status, body) = post_json(
        &app,
        "/execute",
        &json!({ "inArguments": [{ "contactKey": "101010", "customMessage": "hello" }] }),
    )
    .await;

    assert_eq!((status.as_u16(), body.as_str()), (200, "Execute"));

    let rowset = rowset_path(TARGET_KEY);
    let rows = async_rows_path(TARGET_KEY);
    let writes: Vec<String> = paths_received(&server)
        .await
        .into_iter()
        .filter(|p| *p == rowset || *p == rows)
        .collect();
    assert_eq!(writes, vec![rowset, rows.clone()]);

    assert_eq!(
        bodies_sent_to(&server, &rows).await,
        vec![json!({ "items": [{ "SubscriberKey": "101010", "CustomText": "hello" }] })]
    );

    let audits = bodies_sent_to(&server, &async_rows_path(AUDIT_KEY)).await;
    assert_eq!(audits[0]["items"][0]["Status"], "Success");
}

/// Verify that authorization failures on every candidate still acknowledge
/// and are recorded as an error in the audit collection.
#[tokio::test]
async fn test_all_candidates_unauthorized_is_acknowledged() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    mount_status(&server, &rowset_path(TARGET_KEY), 401).await;
    mount_status(&server, &async_rows_path(TARGET_KEY), 401).await;
    mount_status(&server, &async_rows_path(AUDIT_KEY), 202).await;
    let app = build_router(upstream_config(&server));

    let (status, body) = post_json(
        &app,
        "/execute",
        &json!({ "inArguments": [{ "contactKey": "101010" }] }),
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(body, "Execute");

    let audits = bodies_sent_to(&server, &async_rows_path(AUDIT_KEY)).await;
    let row = &audits[0]["items"][0];
    assert_eq!(row["Status"], "Error");
    assert!(row["ErrorLog"].as_str().is_some_and(|e| !e.is_empty()));
}

#[tokio::test]
async fn test_upstream_outage_is_acknowledged() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    mount_status(&server, &rowset_path(TARGET_KEY), 503).await;
    mount_status(&server, &async_rows_path(TARGET_KEY), 503).await;
    mount_status(&server, &async_rows_path(AUDIT_KEY), 503).await;
    let app = build_router(upstream_config(&server));

    let (status, body) = post_json(
        &app,
        "/execute",
        &json!({ "inArguments": [{ "contactKey": "101010" }] }),
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(body, "Execute");
}

/// Verify that a failed token exchange skips every write but still acknowledges.
#[tokio::test]
async fn test_token_exchange_failure_skips_writes() {
    let server = MockServer::start().await;
    mount_status(&server, TOKEN_PATH, 401).await;
    let app = build_router(upstream_config(&server));

    let (status, body) = post_json(
        &app,
        "/execute",
        &json!({ "inArguments": [{ "contactKey": "101010" }] }),
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(body, "Execute");
    assert!(paths_received(&server).await.iter().all(|p| p == TOKEN_PATH));
}

#[tokio::test]
async fn test_missing_credentials_never_contacts_upstream() {
    let server = MockServer::start().await;
    let mut config = upstream_config(&server);
    config.upstream.client_id = None;
    config.upstream.client_secret = None;
    let app = build_router(config);

    let (status, body) = post_json(
        &app,
        "/execute",
        &json!({ "inArguments": [{ "contactKey": "101010" }] }),
    )
    .await;

    assert_eq!((status.as_u16(), body.as_str()), (200, "Execute"));
    assert!(paths_received(&server).await.is_empty());
}

/// Verify that a signed token carrying nested activity arguments supplies
/// the record key and message, and the message reaches the audit row.
#[tokio::test]
async fn test_signed_token_with_nested_arguments() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    mount_status(&server, &rowset_path(TARGET_KEY), 200).await;
    mount_status(&server, &async_rows_path(AUDIT_KEY), 202).await;
    let app = build_router(upstream_config(&server));

    let token = sign(&json!({
        "request": {
            "currentActivity": {
                "arguments": {
                    "execute": {
                        "inArguments": [{ "contactKey": "nested-1", "customMessage": "nested hello" }]
                    }
                }
            }
        }
    }));

    let (status, body) = post_json(&app, "/execute", &json!({ "jwt": token })).await;

    assert_eq!((status.as_u16(), body.as_str()), (200, "Execute"));

    let writes = bodies_sent_to(&server, &rowset_path(TARGET_KEY)).await;
    assert_eq!(writes[0][0]["keys"]["SubscriberKey"], "nested-1");
    assert_eq!(writes[0][0]["values"]["CustomText"], "nested hello");

    let audits = bodies_sent_to(&server, &async_rows_path(AUDIT_KEY)).await;
    assert_eq!(audits[0]["items"][0]["CustomMessage"], "nested hello");
}

#[tokio::test]
async fn test_raw_token_body() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    mount_status(&server, &rowset_path(TARGET_KEY), 200).await;
    mount_status(&server, &async_rows_path(AUDIT_KEY), 202).await;
    let app = build_router(upstream_config(&server));

    let token = sign(&json!({ "inArguments": [{ "contactKey": "raw-1", "customMessage": "raw" }] }));
    let (_, body) = post_raw(&app, "/execute", "application/jwt", &token).await;

    assert_eq!(body, "Execute");
    let writes = bodies_sent_to(&server, &rowset_path(TARGET_KEY)).await;
    assert_eq!(writes[0][0]["keys"]["SubscriberKey"], "raw-1");
}

/// Verify that a token signed with the wrong secret falls back to defaults.
#[tokio::test]
async fn test_forged_token_uses_defaults() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    mount_status(&server, &rowset_path(TARGET_KEY), 200).await;
    mount_status(&server, &async_rows_path(AUDIT_KEY), 202).await;
    let app = build_router(upstream_config(&server));

    let forged = jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &json!({ "inArguments": [{ "contactKey": "attacker" }] }),
        &jsonwebtoken::EncodingKey::from_secret(b"not-the-secret"),
    )
    .unwrap();

    let (_, body) = post_json(&app, "/execute", &json!({ "jwt": forged })).await;

    assert_eq!(body, "Execute");
    let writes = bodies_sent_to(&server, &rowset_path(TARGET_KEY)).await;
    assert_eq!(writes[0][0]["keys"]["SubscriberKey"], "UNKNOWN_CONTACT");
    assert_eq!(
        writes[0][0]["values"]["CustomText"],
        "Contact processed by custom journey activity"
    );
}

/// Verify that repeating the same execute produces the same write twice.
#[tokio::test]
async fn test_repeated_execute_is_an_upsert() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    mount_status(&server, &rowset_path(TARGET_KEY), 200).await;
    mount_status(&server, &async_rows_path(AUDIT_KEY), 202).await;
    let app = build_router(upstream_config(&server));
    let request = json!({ "inArguments": [{ "contactKey": "101010", "customMessage": "hello" }] });

    post_json(&app, "/execute", &request).await;
    post_json(&app, "/execute", &request).await;

    let writes = bodies_sent_to(&server, &rowset_path(TARGET_KEY)).await;
    assert_eq!(writes.len(), 2);
    assert_eq!(writes[0], writes[1]);
}

#[tokio::test]
async fn test_cached_tokens_are_reused_across_executions() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    mount_status(&server, &rowset_path(TARGET_KEY), 200).await;
    mount_status(&server, &async_rows_path(AUDIT_KEY), 202).await;
    let mut config = upstream_config(&server);
    config.upstream.cache_tokens = true;
    let app = build_router(config);
    let request = json!({ "inArguments": [{ "contactKey": "101010" }] });

    post_json(&app, "/execute", &request).await;
    post_json(&app, "/execute", &request).await;

    let exchanges = paths_received(&server)
        .await
        .into_iter()
        .filter(|p| p == TOKEN_PATH)
        .count();
    assert_eq!(exchanges, 1);
    assert_eq!(bodies_sent_to(&server, &rowset_path(TARGET_KEY)).await.len(), 2);
}

#[tokio::test]
async fn test_disabled_audit_writes_nothing() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    mount_status(&server, &rowset_path(TARGET_KEY), 200).await;
    let mut config = upstream_config(&server);
    config.collections.audit_enabled = false;
    let app = build_router(config);

    post_json(&app, "/execute", &json!({ "inArguments": [{ "contactKey": "k" }] })).await;

    assert!(bodies_sent_to(&server, &async_rows_path(AUDIT_KEY)).await.is_empty());
}
