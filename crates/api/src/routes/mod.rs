//! API routes.

pub mod admin;
pub mod entities;
pub mod health;
pub mod ingest;
pub mod records;
pub mod streams;

use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::state::AppState;

/// Creates the API router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(
            "/streams",
            post(streams::register_handler).get(streams::list_handler),
        )
        .route("/streams/:name", get(streams::get_handler))
        .route("/streams/:name/chunks", get(streams::chunks_handler))
        .route(
            "/streams/:name/aggregates/:granularity",
            get(streams::aggregates_handler),
        )
        .route("/ingest", post(ingest::ingest_handler))
        .route("/health", get(health::health_handler))
        .route("/health/live", get(health::live_handler))
        .route("/health/jobs", get(health::jobs_handler))
        .route("/admin", post(admin::admin_handler))
        .route(
            "/entities",
            post(entities::register_handler).get(entities::list_handler),
        )
        .route("/entities/:id/composite", get(entities::composite_handler))
        .route("/archival", get(records::archival_handler))
        .route("/audit", get(records::audit_handler))
        .route("/metrics", get(records::metrics_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(cors),
        )
        .with_state(state)
}
