//! Ingestion endpoint handler.
//!
//! Accepts `{ "stream": "...", "points": [{ "timestamp": ..., "value": ..., "tags": {...} }] }`.
//! A batch is accepted whole or rejected whole.

use axum::{body::Bytes, extract::State, Json};
use engine_core::{
    limits::{MAX_BATCH_POINTS, MAX_INGEST_BODY_BYTES},
    Point,
};
use serde::Deserialize;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::response::{ApiError, IngestResponse};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub stream: String,
    pub points: Vec<Point>,
}

/// POST /ingest - Appends a batch of points to one stream.
pub async fn ingest_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<IngestResponse>, ApiError> {
    let start = Instant::now();

    if body.len() > MAX_INGEST_BODY_BYTES {
        return Err(ApiError::payload_too_large(format!(
            "Payload size {}KB exceeds {}KB limit",
            body.len() / 1024,
            MAX_INGEST_BODY_BYTES / 1024
        )));
    }

    let request: IngestRequest = serde_json::from_slice(&body).map_err(|e| {
        warn!(error = %e, "Failed to parse ingest payload");
        ApiError::bad_request(e.to_string())
    })?;

    if request.points.len() > MAX_BATCH_POINTS {
        return Err(ApiError::validation(vec![format!(
            "Batch has {} points, exceeds {} limit",
            request.points.len(),
            MAX_BATCH_POINTS
        )]));
    }

    debug!(stream = %request.stream, points = request.points.len(), "Received batch");

    let summary = state
        .engine
        .ingest(&request.stream, request.points)
        .await
        .map_err(|e| {
            warn!(stream = %request.stream, error = %e, "Batch rejected");
            ApiError::from(e)
        })?;

    info!(
        stream = %request.stream,
        accepted = summary.accepted,
        chunks_created = summary.chunks_created,
        latency_ms = start.elapsed().as_millis() as u64,
        "Batch processed"
    );

    Ok(Json(IngestResponse::success(
        request.stream,
        summary.accepted,
        summary.chunks_created,
    )))
}
