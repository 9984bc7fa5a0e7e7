//! End-to-end lifecycle: compression, archival before deletion,
//! continuous aggregation and dashboard composites.

use axum::http::StatusCode;
use chrono::{DateTime, Duration, Utc};
use integration_tests::fixtures::{entity, ingest_payload, numeric_points, stream_spec};
use integration_tests::setup::TestContext;
use serde_json::json;

async fn register(ctx: &TestContext) {
    ctx.server()
        .post("/streams")
        .json(&stream_spec("cpu"))
        .await
        .assert_status(StatusCode::CREATED);
}

/// `n` points ten minutes apart from the hour containing `start`.
async fn ingest(ctx: &TestContext, start: DateTime<Utc>, n: usize) {
    let start = start - Duration::seconds(start.timestamp().rem_euclid(3600));
    ctx.server()
        .post("/ingest")
        .json(&ingest_payload(
            "cpu",
            numeric_points(start, n, Duration::minutes(10)),
        ))
        .await
        .assert_status_ok();
}

/// Expired chunks are archived exactly once and then dropped.
#[tokio::test]
async fn test_expired_chunks_archived_then_dropped() {
    let ctx = TestContext::new();
    register(&ctx).await;
    let server = ctx.server();

    // 100 and 10 days old: one past retention, one only past the hot window
    ingest(&ctx, Utc::now() - Duration::days(100), 6).await;
    ingest(&ctx, Utc::now() - Duration::days(10), 6).await;

    ctx.engine.run_all(Utc::now()).await;

    let records: Vec<serde_json::Value> = server.get("/archival?stream=cpu").await.json();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["row_count"], 6);
    assert_eq!(records[0]["format"], "jsonl");
    assert_eq!(ctx.storage.object_count(), 1);

    let (location, blob) = &ctx.storage.objects()[0];
    assert_eq!(records[0]["location"], location.as_str());
    let lines = std::str::from_utf8(blob).unwrap().lines().count();
    assert_eq!(lines, 6);

    let chunks: Vec<serde_json::Value> = server.get("/streams/cpu/chunks").await.json();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0]["state"], "compressed");

    // A second pass finds nothing left to archive
    ctx.engine.run_all(Utc::now()).await;
    assert_eq!(ctx.storage.object_count(), 1);
}

/// A failed archive write keeps the chunk and surfaces on the health report.
#[tokio::test]
async fn test_archive_failure_blocks_deletion() {
    let ctx = TestContext::new();
    register(&ctx).await;
    let server = ctx.server();

    ingest(&ctx, Utc::now() - Duration::days(100), 6).await;
    ctx.storage.set_should_fail(true);
    ctx.engine.run_all(Utc::now()).await;

    let chunks: Vec<serde_json::Value> = server.get("/streams/cpu/chunks").await.json();
    assert_eq!(chunks.len(), 1);

    let jobs: Vec<serde_json::Value> = server.get("/health/jobs").await.json();
    let retention = jobs
        .iter()
        .find(|j| j["stream_name"] == "cpu" && j["job_type"] == "retention")
        .unwrap();
    assert_eq!(retention["last_run_status"], "failed");
    assert_eq!(retention["consecutive_failures"], 1);
    assert_eq!(retention["chunks_eligible_for_action"], 1);

    let summary: serde_json::Value = server.get("/health").await.json();
    assert_eq!(summary["status"], "degraded");

    // Recovery on the next run
    ctx.storage.set_should_fail(false);
    ctx.engine.run_all(Utc::now()).await;

    let chunks: Vec<serde_json::Value> = server.get("/streams/cpu/chunks").await.json();
    assert!(chunks.is_empty());
    let jobs: Vec<serde_json::Value> = server.get("/health/jobs").await.json();
    let retention = jobs
        .iter()
        .find(|j| j["job_type"] == "retention")
        .unwrap();
    assert_eq!(retention["last_run_status"], "healthy");
    assert_eq!(retention["consecutive_failures"], 0);
}

/// Paused retention keeps expired chunks until resumed.
#[tokio::test]
async fn test_paused_retention_holds_data() {
    let ctx = TestContext::new();
    register(&ctx).await;
    let server = ctx.server();

    ingest(&ctx, Utc::now() - Duration::days(100), 6).await;

    let response = server
        .post("/admin")
        .json(&json!({ "command": "pause_retention", "stream": "cpu" }))
        .await;
    response.assert_status_ok();

    ctx.engine.run_all(Utc::now()).await;
    let chunks: Vec<serde_json::Value> = server.get("/streams/cpu/chunks").await.json();
    assert_eq!(chunks.len(), 1);

    server
        .post("/admin")
        .json(&json!({ "command": "resume_retention", "stream": "cpu" }))
        .await
        .assert_status_ok();

    ctx.engine.run_all(Utc::now()).await;
    let chunks: Vec<serde_json::Value> = server.get("/streams/cpu/chunks").await.json();
    assert!(chunks.is_empty());

    let audit: Vec<serde_json::Value> = server.get("/audit?stream=cpu").await.json();
    let actions: Vec<&str> = audit.iter().filter_map(|e| e["action"].as_str()).collect();
    assert!(actions.contains(&"retention_paused"));
    assert!(actions.contains(&"retention_resumed"));
}

/// Recent data is rolled up and shows up in entity composites.
#[tokio::test]
async fn test_aggregates_feed_composite() {
    let ctx = TestContext::new();
    register(&ctx).await;
    let server = ctx.server();

    ingest(&ctx, Utc::now() - Duration::hours(6), 12).await;

    ctx.engine.run_all(Utc::now()).await;

    let buckets: Vec<serde_json::Value> = server
        .get("/streams/cpu/aggregates/hourly")
        .await
        .json();
    assert_eq!(buckets.len(), 2);
    assert_eq!(buckets[0]["stats"]["kind"], "numeric");
    assert_eq!(buckets[0]["stats"]["count"], 6);

    server
        .post("/entities")
        .json(&entity("host-1", &["cpu"]))
        .await
        .assert_status(StatusCode::CREATED);

    let row: serde_json::Value = server.get("/entities/host-1/composite").await.json();
    assert_eq!(row["fields"][0]["present"], true);
    assert_eq!(row["fields"][0]["stats"]["count"], 6);
}

/// Archival records survive a restart when the log is on disk.
#[tokio::test]
async fn test_archival_log_persisted() {
    let dir = tempfile::tempdir().unwrap();

    {
        let ctx = TestContext::with_log_dir(dir.path()).await;
        register(&ctx).await;
        ingest(&ctx, Utc::now() - Duration::days(100), 6).await;
        ctx.engine.run_all(Utc::now()).await;
        assert_eq!(ctx.engine.archival_log().len(), 1);
    }

    let ctx = TestContext::with_log_dir(dir.path()).await;
    let records: Vec<serde_json::Value> = ctx.server().get("/archival").await.json();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["stream_name"], "cpu");
}
