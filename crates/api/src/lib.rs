//! HTTP API layer for the lifecycle engine.

pub mod response;
pub mod routes;
pub mod state;

pub use routes::router;
pub use state::AppState;
