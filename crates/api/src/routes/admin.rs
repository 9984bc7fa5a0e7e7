//! Administrative command endpoint.

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use engine_core::{AdminCommand, CommandOutcome};

use crate::state::AppState;

/// POST /admin - Executes one typed command.
///
/// Returns 200 with the outcome on success and 422 with the outcome when
/// the command was refused or failed.
pub async fn admin_handler(
    State(state): State<AppState>,
    Json(command): Json<AdminCommand>,
) -> (StatusCode, Json<CommandOutcome>) {
    let outcome = state.engine.execute(command, Utc::now()).await;
    let status = if outcome.success {
        StatusCode::OK
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };
    (status, Json(outcome))
}
