//! Stream and entity registration over HTTP.

use axum::http::StatusCode;
use integration_tests::fixtures::{boolean_stream_spec, entity, stream_spec};
use integration_tests::setup::TestContext;

/// A registered stream is returned with its effective configuration.
#[tokio::test]
async fn test_register_and_get_stream() {
    let ctx = TestContext::new();
    let server = ctx.server();

    let response = server.post("/streams").json(&stream_spec("cpu")).await;
    response.assert_status(StatusCode::CREATED);
    let body: serde_json::Value = response.json();
    assert_eq!(body["name"], "cpu");
    assert_eq!(body["chunk_interval_secs"], 3600);
    assert_eq!(body["retention_paused"], false);

    let response = server.get("/streams/cpu").await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["retention"]["archive_location"], "memory://archive");
}

/// Chunk interval is derived from the expected rate when not given.
#[tokio::test]
async fn test_chunk_interval_derived_from_rate() {
    let ctx = TestContext::new();
    let server = ctx.server();

    let response = server
        .post("/streams")
        .json(&boolean_stream_spec("door"))
        .await;
    response.assert_status(StatusCode::CREATED);
    let body: serde_json::Value = response.json();
    let interval = body["chunk_interval_secs"].as_u64().unwrap();
    assert!(interval >= 60, "interval {} below minimum", interval);

    let response = server.get("/streams").await;
    let body: Vec<serde_json::Value> = response.json();
    assert_eq!(body.len(), 1);
}

/// Registering the same name twice is a configuration error.
#[tokio::test]
async fn test_duplicate_stream_rejected() {
    let ctx = TestContext::new();
    let server = ctx.server();

    server
        .post("/streams")
        .json(&stream_spec("cpu"))
        .await
        .assert_status(StatusCode::CREATED);

    let response = server.post("/streams").json(&stream_spec("cpu")).await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "CONFIG_001");
}

/// Archival required without a location is refused at registration.
#[tokio::test]
async fn test_archive_without_location_rejected() {
    let ctx = TestContext::new();
    let server = ctx.server();

    let mut spec = stream_spec("cpu");
    spec["retention"]["archive_location"] = serde_json::Value::Null;

    let response = server.post("/streams").json(&spec).await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

/// Unknown streams return 404 with a stable error code.
#[tokio::test]
async fn test_unknown_stream_not_found() {
    let ctx = TestContext::new();
    let server = ctx.server();

    let response = server.get("/streams/missing/chunks").await;
    response.assert_status(StatusCode::NOT_FOUND);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "CONFIG_002");
}

/// An entity can be registered and read back as a composite row with
/// defaults before any data arrives.
#[tokio::test]
async fn test_entity_composite_defaults() {
    let ctx = TestContext::new();
    let server = ctx.server();

    server
        .post("/streams")
        .json(&stream_spec("cpu"))
        .await
        .assert_status(StatusCode::CREATED);
    server
        .post("/entities")
        .json(&entity("host-1", &["cpu"]))
        .await
        .assert_status(StatusCode::CREATED);

    let response = server.get("/entities/host-1/composite").await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["entity_id"], "host-1");
    assert_eq!(body["fields"][0]["present"], false);
    assert_eq!(body["fields"][0]["stats"]["kind"], "numeric");

    let response = server.get("/entities/missing/composite").await;
    response.assert_status(StatusCode::NOT_FOUND);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "COMP_001");
}
