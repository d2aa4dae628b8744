//! End-to-end tests of the HTTP transport.

use doc_gateway::store::{Namespace, Probe};
use reqwest::StatusCode;
use serde_json::{json, Value};

mod common;

use common::{payload, start_gateway};

async fn call(
    client: &reqwest::Client,
    method: reqwest::Method,
    url: &str,
    body: Value,
) -> (StatusCode, Value) {
    let res = client
        .request(method, url)
        .json(&body)
        .send()
        .await
        .expect("gateway unreachable");
    let status = res.status();
    (status, res.json().await.expect("body is not JSON"))
}

#[tokio::test]
async fn root_returns_welcome() {
    let gw = start_gateway(|_| {}).await;
    let res = reqwest::get(gw.url("/")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().contains_key("x-request-id"));
    assert_eq!(res.text().await.unwrap(), "Welcome to the MongoDB gateway");
}

#[tokio::test]
async fn full_crud_cycle() {
    let gw = start_gateway(|_| {}).await;
    let client = reqwest::Client::new();
    let url = gw.url("/mongodb");
    let post = reqwest::Method::POST;

    let (status, body) = call(
        &client,
        post.clone(),
        &url,
        payload(json!({ "db": "test", "collection": "data", "operation": "create" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "success", "message": "Collection data created" }));

    let (_, body) = call(
        &client,
        post.clone(),
        &url,
        payload(json!({ "db": "test", "collection": "data", "operation": "create" })),
    )
    .await;
    assert_eq!(body["message"], "Collection data already exists");

    let (status, body) = call(
        &client,
        post.clone(),
        &url,
        payload(json!({
            "db": "test", "collection": "data", "operation": "insert",
            "data": [{ "name": "John", "age": 25 }, { "name": "Jane", "age": 30 }, { "name": "John", "age": 41 }]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let ids = body["inserted_ids"].as_array().unwrap();
    assert_eq!(ids.len(), 3);
    assert!(ids.iter().all(Value::is_string));

    let (_, body) = call(
        &client,
        post.clone(),
        &url,
        payload(json!({
            "db": "test", "collection": "data", "operation": "insert",
            "data": { "name": "Solo" }
        })),
    )
    .await;
    assert!(body["inserted_id"].is_string());

    let (_, body) = call(
        &client,
        post.clone(),
        &url,
        payload(json!({
            "db": "test", "collection": "data", "operation": "find",
            "filter": { "name": "Jane" }
        })),
    )
    .await;
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["age"], 30);
    assert_eq!(results[0]["_id"], ids[1]);

    let (status, body) = call(
        &client,
        reqwest::Method::PUT,
        &url,
        payload(json!({
            "db": "test", "collection": "data", "operation": "update",
            "filter": { "name": "John" }, "update": { "$set": { "age": 30 } }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "success", "matched_count": 2, "modified_count": 2 }));

    let (status, body) = call(
        &client,
        reqwest::Method::DELETE,
        &url,
        payload(json!({
            "db": "test", "collection": "data", "operation": "delete",
            "filter": { "age": 30 }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "success", "deleted_count": 3 }));

    let remaining = gw.connector.documents(&Namespace::new("test", "data")).unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(gw.gateway.broker().open_handles(), 0);
}

#[tokio::test]
async fn client_errors_are_400() {
    let gw = start_gateway(|_| {}).await;
    let client = reqwest::Client::new();
    let url = gw.url("/mongodb");

    let (status, body) = call(&client, reqwest::Method::POST, &url, json!({ "query": {} })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "status": "error", "error": "Missing uri or query" }));

    let (status, body) = call(
        &client,
        reqwest::Method::POST,
        &url,
        payload(json!({ "db": "test", "collection": "data", "operation": "drop" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Unsupported operation: drop");

    // update is only accepted on PUT
    let (status, body) = call(
        &client,
        reqwest::Method::POST,
        &url,
        payload(json!({
            "db": "test", "collection": "data", "operation": "update",
            "filter": {}, "update": { "$set": { "a": 1 } }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");

    let (status, body) = call(
        &client,
        reqwest::Method::DELETE,
        &url,
        payload(json!({ "db": "test", "collection": "data", "operation": "delete" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing required field: filter");

    assert_eq!(gw.connector.opened_sessions(), 0);
}

#[tokio::test]
async fn malformed_json_gets_error_envelope() {
    let gw = start_gateway(|_| {}).await;
    let res = reqwest::Client::new()
        .post(gw.url("/mongodb"))
        .header("content-type", "application/json")
        .body("{ not json")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "error");
    assert!(body["error"].as_str().unwrap().starts_with("Invalid request"));
}

#[tokio::test]
async fn unreachable_target_is_500_without_credentials() {
    let gw = start_gateway(|_| {}).await;
    gw.connector.set_probe(Probe::Hang);

    let started = std::time::Instant::now();
    let (status, body) = call(
        &reqwest::Client::new(),
        reqwest::Method::POST,
        &gw.url("/mongodb"),
        payload(json!({ "db": "test", "collection": "data", "operation": "find" })),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(started.elapsed() < std::time::Duration::from_secs(3));
    let msg = body["error"].as_str().unwrap();
    assert!(msg.starts_with("Failed to connect to MongoDB"), "{msg}");
    assert!(!msg.contains("pa55word"));
    assert_eq!(gw.gateway.broker().open_handles(), 0);
}

#[tokio::test]
async fn engine_rejection_is_500() {
    let gw = start_gateway(|_| {}).await;
    let (status, body) = call(
        &reqwest::Client::new(),
        reqwest::Method::PUT,
        &gw.url("/mongodb"),
        payload(json!({
            "db": "test", "collection": "data", "operation": "update",
            "filter": {}, "update": { "$rename": { "a": "b" } }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "status": "error", "error": "Unknown modifier: $rename" }));
    assert_eq!(gw.connector.closed_sessions(), 1);
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let gw = start_gateway(|config| config.security.max_body_size = 64).await;
    let big = "x".repeat(256);
    let res = reqwest::Client::new()
        .post(gw.url("/mongodb"))
        .json(&payload(json!({
            "db": "test", "collection": "data", "operation": "insert", "data": { "blob": big }
        })))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(gw.connector.opened_sessions(), 0);
}

#[tokio::test]
async fn timed_out_request_gets_envelope_and_still_releases() {
    let gw = start_gateway(|config| {
        config.timeouts.request_secs = 1;
        config.broker.probe_timeout_ms = 1500;
    })
    .await;
    gw.connector.set_probe(Probe::Hang);

    let (status, body) = call(
        &reqwest::Client::new(),
        reqwest::Method::POST,
        &gw.url("/mongodb"),
        payload(json!({ "db": "test", "collection": "data", "operation": "find" })),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "status": "error", "error": "Request timed out after 1s" }));
    assert_eq!(gw.connector.opened_sessions(), 1);

    // The call keeps running past the response and releases at the probe deadline.
    tokio::time::sleep(std::time::Duration::from_millis(1500)).await;
    for _ in 0..50 {
        if gw.connector.closed_sessions() == 1 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert_eq!(gw.connector.closed_sessions(), 1);
    assert_eq!(gw.gateway.broker().open_handles(), 0);
}

#[tokio::test]
async fn abandoned_request_still_releases() {
    let gw = start_gateway(|_| {}).await;
    gw.connector.set_probe(Probe::Hang);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_millis(100))
        .build()
        .unwrap();
    let res = client
        .post(gw.url("/mongodb"))
        .json(&payload(json!({ "db": "test", "collection": "data", "operation": "find" })))
        .send()
        .await;
    assert!(res.is_err());

    // Probe deadline is 300ms in the test gateway.
    for _ in 0..100 {
        if gw.connector.closed_sessions() == 1 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert_eq!(gw.connector.opened_sessions(), 1);
    assert_eq!(gw.connector.closed_sessions(), 1);
    assert_eq!(gw.gateway.broker().open_handles(), 0);
}
