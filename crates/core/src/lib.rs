//! Core types, policies, and validation for the time-series lifecycle engine.

pub mod aggregate;
pub mod archival;
pub mod chunk;
pub mod command;
pub mod composite;
pub mod error;
pub mod job;
pub mod limits;
pub mod point;
pub mod stream;
pub mod tier;

pub use aggregate::*;
pub use archival::*;
pub use chunk::*;
pub use command::*;
pub use composite::*;
pub use error::{Error, Result};
pub use job::*;
pub use point::*;
pub use stream::*;
pub use tier::*;
