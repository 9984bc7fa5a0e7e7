//! Application state shared across handlers.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use worker::LifecycleEngine;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Stores, workers and job registry
    pub engine: Arc<LifecycleEngine>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(engine: Arc<LifecycleEngine>) -> Self {
        Self {
            engine,
            started_at: Utc::now(),
        }
    }
}
