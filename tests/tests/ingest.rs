//! Ingestion tests over HTTP.

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use integration_tests::fixtures::{ingest_payload, numeric_points, stream_spec};
use integration_tests::setup::TestContext;
use serde_json::json;

async fn context_with_stream() -> TestContext {
    let ctx = TestContext::new();
    ctx.server()
        .post("/streams")
        .json(&stream_spec("cpu"))
        .await
        .assert_status(StatusCode::CREATED);
    ctx
}

/// Points spread over three hours land in three hourly chunks.
#[tokio::test]
async fn test_ingest_creates_chunks() {
    let ctx = context_with_stream().await;
    let server = ctx.server();

    let start = Utc::now() - Duration::hours(5);
    let start = start - Duration::seconds(start.timestamp() % 3600);
    let points = numeric_points(start, 180, Duration::minutes(1));

    let response = server
        .post("/ingest")
        .json(&ingest_payload("cpu", points))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["accepted"], 180);
    assert_eq!(body["chunks_created"], 3);

    let chunks: Vec<serde_json::Value> = server.get("/streams/cpu/chunks").await.json();
    assert_eq!(chunks.len(), 3);
    assert!(chunks.iter().all(|c| c["state"] == "hot"));
    assert_eq!(
        chunks.iter().map(|c| c["row_count"].as_u64().unwrap()).sum::<u64>(),
        180
    );
}

/// Malformed JSON is rejected with 400.
#[tokio::test]
async fn test_malformed_json_rejected() {
    let ctx = context_with_stream().await;
    let server = ctx.server();

    let response = server
        .post("/ingest")
        .content_type("application/json")
        .bytes("{ not valid json".into())
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "VALID_001");
}

/// A point of the wrong value type rejects the whole batch.
#[tokio::test]
async fn test_type_mismatch_rejects_batch() {
    let ctx = context_with_stream().await;
    let server = ctx.server();

    let now = Utc::now();
    let payload = json!({
        "stream": "cpu",
        "points": [
            { "timestamp": now - Duration::minutes(2), "value": 1.0, "tags": {} },
            { "timestamp": now - Duration::minutes(1), "value": "high", "tags": {} }
        ]
    });

    let response = server.post("/ingest").json(&payload).await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let chunks: Vec<serde_json::Value> = server.get("/streams/cpu/chunks").await.json();
    assert!(chunks.is_empty());
}

/// Ingesting into an unregistered stream returns 404.
#[tokio::test]
async fn test_unknown_stream_rejected() {
    let ctx = TestContext::new();
    let server = ctx.server();

    let points = numeric_points(Utc::now() - Duration::hours(1), 3, Duration::minutes(1));
    let response = server
        .post("/ingest")
        .json(&ingest_payload("missing", points))
        .await;
    response.assert_status(StatusCode::NOT_FOUND);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "CONFIG_002");
}

/// Appending into a compressed chunk is refused until it is decompressed.
#[tokio::test]
async fn test_append_to_compressed_chunk_conflicts() {
    let ctx = context_with_stream().await;
    let server = ctx.server();

    let start = Utc::now() - Duration::hours(3);
    let start = start - Duration::seconds(start.timestamp() % 3600);
    server
        .post("/ingest")
        .json(&ingest_payload(
            "cpu",
            numeric_points(start, 10, Duration::minutes(1)),
        ))
        .await
        .assert_status_ok();

    let chunks: Vec<serde_json::Value> = server.get("/streams/cpu/chunks").await.json();
    let chunk_id = chunks[0]["id"].clone();

    server
        .post("/admin")
        .json(&json!({ "command": "compress_chunk", "chunk_id": chunk_id }))
        .await
        .assert_status_ok();

    let late = numeric_points(start + Duration::minutes(30), 1, Duration::minutes(1));
    let response = server
        .post("/ingest")
        .json(&ingest_payload("cpu", late.clone()))
        .await;
    response.assert_status(StatusCode::CONFLICT);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "CHUNK_004");

    server
        .post("/admin")
        .json(&json!({ "command": "decompress_chunk", "chunk_id": chunk_id }))
        .await
        .assert_status_ok();
    server
        .post("/ingest")
        .json(&ingest_payload("cpu", late))
        .await
        .assert_status_ok();
}
