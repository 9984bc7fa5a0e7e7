//! Shared setup for end-to-end tests of the lifecycle engine.

pub mod fixtures;
pub mod mocks;
pub mod setup;
