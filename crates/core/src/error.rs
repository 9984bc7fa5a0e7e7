//! Unified error types for the lifecycle engine.
//!
//! Error codes:
//! - CONFIG_001-002: Stream registration and lookup errors
//! - CHUNK_001-004: Chunk state errors
//! - VALID_001: Point and command validation errors
//! - ARCH_001: Archival errors
//! - JOB_001: Background job errors
//! - AGG_001: Aggregate consistency errors
//! - COMP_001: Composite view errors

use thiserror::Error;

use crate::chunk::ChunkId;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the lifecycle engine.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid stream or policy. Fatal to the registration call only.
    #[error("[CONFIG_001] configuration error: {0}")]
    Configuration(String),

    #[error("[CONFIG_002] unknown stream: {0}")]
    StreamNotFound(String),

    #[error("[CHUNK_001] chunk not found: {0}")]
    ChunkNotFound(ChunkId),

    /// Idempotent no-op.
    #[error("[CHUNK_002] chunk {0} is already compressed")]
    AlreadyCompressed(ChunkId),

    /// Idempotent no-op.
    #[error("[CHUNK_003] chunk {0} is already decompressed")]
    AlreadyDecompressed(ChunkId),

    #[error("[CHUNK_004] chunk {0} is compressed; decompress it before modifying")]
    ChunkCompressed(ChunkId),

    #[error("[VALID_001] validation error: {0}")]
    Validation(String),

    /// Blocks deletion of the chunk unless an operator bypass is set.
    #[error("[ARCH_001] archival failed for chunk {chunk_id}: {message}")]
    ArchivalFailure { chunk_id: ChunkId, message: String },

    /// Transient; retried on the next scheduled pass.
    #[error("[JOB_001] job execution error: {0}")]
    JobExecution(String),

    #[error("[AGG_001] consistency violation in {stream}/{granularity} at {bucket_start}: {message}")]
    ConsistencyViolation {
        stream: String,
        granularity: String,
        bucket_start: chrono::DateTime<chrono::Utc>,
        message: String,
    },

    #[error("[COMP_001] unknown entity: {0}")]
    EntityNotFound(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn stream_not_found(name: impl Into<String>) -> Self {
        Self::StreamNotFound(name.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn archival(chunk_id: ChunkId, msg: impl Into<String>) -> Self {
        Self::ArchivalFailure {
            chunk_id,
            message: msg.into(),
        }
    }

    pub fn job(msg: impl Into<String>) -> Self {
        Self::JobExecution(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Get the stable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "CONFIG_001",
            Self::StreamNotFound(_) => "CONFIG_002",
            Self::ChunkNotFound(_) => "CHUNK_001",
            Self::AlreadyCompressed(_) => "CHUNK_002",
            Self::AlreadyDecompressed(_) => "CHUNK_003",
            Self::ChunkCompressed(_) => "CHUNK_004",
            Self::Validation(_) => "VALID_001",
            Self::ArchivalFailure { .. } => "ARCH_001",
            Self::JobExecution(_) => "JOB_001",
            Self::ConsistencyViolation { .. } => "AGG_001",
            Self::EntityNotFound(_) => "COMP_001",
            Self::Serialization(_) => "INTERNAL_001",
            Self::Io(_) => "INTERNAL_002",
            Self::Internal(_) => "INTERNAL_003",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Configuration(_) => 400,
            Self::StreamNotFound(_) => 404,
            Self::ChunkNotFound(_) => 404,
            Self::AlreadyCompressed(_) => 200,
            Self::AlreadyDecompressed(_) => 200,
            Self::ChunkCompressed(_) => 409,
            Self::Validation(_) => 400,
            Self::ArchivalFailure { .. } => 502,
            Self::JobExecution(_) => 503,
            Self::ConsistencyViolation { .. } => 500,
            Self::EntityNotFound(_) => 404,
            Self::Serialization(_) => 400,
            Self::Io(_) => 500,
            Self::Internal(_) => 500,
        }
    }

    /// Whether this error reports an idempotent no-op rather than a failure.
    pub fn is_noop(&self) -> bool {
        matches!(self, Self::AlreadyCompressed(_) | Self::AlreadyDecompressed(_))
    }
}
