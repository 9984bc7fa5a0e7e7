//! Archival records, audit trail and metrics.

use axum::{
    extract::{Query, State},
    Json,
};
use engine_core::{ArchivalRecord, AuditEntry};
use serde::Deserialize;
use telemetry::{metrics, MetricsSnapshot};

use crate::state::AppState;

/// Default number of audit entries returned.
const DEFAULT_AUDIT_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
pub struct RecordQuery {
    pub stream: Option<String>,
    pub limit: Option<usize>,
}

/// GET /archival?stream= - Archival records, oldest first.
pub async fn archival_handler(
    State(state): State<AppState>,
    Query(query): Query<RecordQuery>,
) -> Json<Vec<ArchivalRecord>> {
    let log = state.engine.archival_log();
    Json(match query.stream {
        Some(stream) => log.for_stream(&stream),
        None => log.records(),
    })
}

/// GET /audit?stream=&limit= - Most recent audit entries, oldest first.
pub async fn audit_handler(
    State(state): State<AppState>,
    Query(query): Query<RecordQuery>,
) -> Json<Vec<AuditEntry>> {
    let audit = state.engine.audit();
    let entries = match query.stream {
        Some(stream) => audit.for_stream(&stream),
        None => audit.entries(),
    };
    let limit = query.limit.unwrap_or(DEFAULT_AUDIT_LIMIT);
    let skip = entries.len().saturating_sub(limit);
    Json(entries.into_iter().skip(skip).collect())
}

/// GET /metrics - In-process counters.
pub async fn metrics_handler() -> Json<MetricsSnapshot> {
    Json(metrics().snapshot())
}
