//! Health check endpoints.

use axum::{extract::State, Json};
use chrono::Utc;
use telemetry::{HealthSummary, JobHealthReport};

use crate::response::{ApiError, LiveResponse};
use crate::state::AppState;

/// GET /health - Overall job health.
pub async fn health_handler(
    State(state): State<AppState>,
) -> Result<Json<HealthSummary>, ApiError> {
    Ok(Json(state.engine.health_summary(Utc::now())?))
}

/// GET /health/jobs - One row per stream and job type.
pub async fn jobs_handler(
    State(state): State<AppState>,
) -> Result<Json<Vec<JobHealthReport>>, ApiError> {
    Ok(Json(state.engine.health_report(Utc::now())?))
}

/// GET /health/live - Liveness check (service is running).
pub async fn live_handler(State(state): State<AppState>) -> Json<LiveResponse> {
    Json(LiveResponse {
        status: "alive".into(),
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
    })
}
