//! Dashboard entities and composite rows.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use engine_core::{CompositeRow, EntitySpec};
use serde::Deserialize;

use crate::response::ApiError;
use crate::state::AppState;

/// POST /entities - Registers a dashboard entity.
pub async fn register_handler(
    State(state): State<AppState>,
    Json(spec): Json<EntitySpec>,
) -> Result<StatusCode, ApiError> {
    state.engine.register_entity(spec)?;
    Ok(StatusCode::CREATED)
}

/// GET /entities
pub async fn list_handler(State(state): State<AppState>) -> Json<Vec<EntitySpec>> {
    Json(state.engine.entities().list())
}

#[derive(Debug, Deserialize)]
pub struct CompositeQuery {
    pub as_of: Option<DateTime<Utc>>,
}

/// GET /entities/:id/composite?as_of= - Latest bucket per stream and
/// granularity at `as_of` (now by default).
pub async fn composite_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<CompositeQuery>,
) -> Result<Json<CompositeRow>, ApiError> {
    let as_of = query.as_of.unwrap_or_else(Utc::now);
    Ok(Json(state.engine.composite(&id, as_of)?))
}
