//! Health endpoint tests.

use axum::http::StatusCode;
use integration_tests::fixtures::stream_spec;
use integration_tests::setup::TestContext;

/// Liveness check always answers.
#[tokio::test]
async fn test_health_live() {
    let ctx = TestContext::new();
    let server = ctx.server();

    let response = server.get("/health/live").await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "alive");
    assert!(body["uptime_secs"].as_i64().unwrap() >= 0);
}

/// A fresh stream reports one pending row per job type.
#[tokio::test]
async fn test_health_jobs_pending_before_first_run() {
    let ctx = TestContext::new();
    let server = ctx.server();

    server
        .post("/streams")
        .json(&stream_spec("cpu"))
        .await
        .assert_status(StatusCode::CREATED);

    let jobs: Vec<serde_json::Value> = server.get("/health/jobs").await.json();
    assert_eq!(jobs.len(), 3);
    assert!(jobs.iter().all(|j| j["last_run_status"] == "pending"));
    assert!(jobs.iter().all(|j| j["total_runs"] == 0));

    let summary: serde_json::Value = server.get("/health").await.json();
    assert_eq!(summary["status"], "healthy");
    assert_eq!(summary["streams"], 1);
    assert_eq!(summary["pending_jobs"], 3);
}

/// Metrics are exposed as JSON counters.
#[tokio::test]
async fn test_metrics_endpoint() {
    let ctx = TestContext::new();
    let server = ctx.server();

    let response = server.get("/metrics").await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert!(body.is_object());
}
