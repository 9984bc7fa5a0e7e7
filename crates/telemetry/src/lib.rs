//! Internal telemetry for the lifecycle engine.
//!
//! Metrics stay in-process and are exposed through the API; health types are
//! filled in by the policy monitor.

pub mod health;
pub mod metrics;
pub mod tracing_setup;

pub use health::*;
pub use metrics::*;
pub use tracing_setup::*;
