//! Stream registration and inspection.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Duration, Utc};
use engine_core::{AggregateBucket, ChunkInfo, StreamConfig, StreamSpec};
use serde::Deserialize;

use crate::response::ApiError;
use crate::state::AppState;

/// POST /streams - Registers a stream.
pub async fn register_handler(
    State(state): State<AppState>,
    Json(spec): Json<StreamSpec>,
) -> Result<(StatusCode, Json<StreamConfig>), ApiError> {
    let config = state.engine.register_stream(spec, Utc::now())?;
    Ok((StatusCode::CREATED, Json(config.as_ref().clone())))
}

/// GET /streams - All registered streams.
pub async fn list_handler(State(state): State<AppState>) -> Json<Vec<StreamConfig>> {
    Json(
        state
            .engine
            .registry()
            .list()
            .into_iter()
            .map(|c| c.as_ref().clone())
            .collect(),
    )
}

/// GET /streams/:name
pub async fn get_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<StreamConfig>, ApiError> {
    let config = state.engine.registry().get(&name)?;
    Ok(Json(config.as_ref().clone()))
}

/// GET /streams/:name/chunks - Chunk metadata, oldest first.
pub async fn chunks_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Vec<ChunkInfo>>, ApiError> {
    Ok(Json(state.engine.chunks().chunks(&name)?))
}

#[derive(Debug, Deserialize)]
pub struct BucketQuery {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

/// GET /streams/:name/aggregates/:granularity?start=&end= - Materialized
/// buckets. Defaults to the last 24 hours.
pub async fn aggregates_handler(
    State(state): State<AppState>,
    Path((name, granularity)): Path<(String, String)>,
    Query(query): Query<BucketQuery>,
) -> Result<Json<Vec<AggregateBucket>>, ApiError> {
    let config = state.engine.registry().get(&name)?;
    if config.granularity(&granularity).is_none() {
        return Err(engine_core::Error::configuration(format!(
            "stream {} has no granularity {}",
            name, granularity
        ))
        .into());
    }

    let end = query.end.unwrap_or_else(Utc::now);
    let start = query.start.unwrap_or(end - Duration::hours(24));
    Ok(Json(
        state
            .engine
            .aggregates()
            .range(&name, &granularity, start, end),
    ))
}
