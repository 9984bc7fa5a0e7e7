//! Typed administrative commands.
//!
//! Commands carry parameters as typed fields; nothing is interpolated into a
//! command string. Shape checks run here, registry checks at execution.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chunk::ChunkId;
use crate::error::{Error, Result};
use crate::limits::MAX_DURATION_SECS;
use crate::stream::validate_chunk_interval;

/// An operator command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum AdminCommand {
    CompressChunk {
        chunk_id: ChunkId,
    },
    DecompressChunk {
        chunk_id: ChunkId,
    },
    RefreshAggregate {
        stream: String,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        /// All granularities when absent
        #[serde(default)]
        granularity: Option<String>,
    },
    VerifyAggregate {
        stream: String,
        granularity: String,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    ModifyRetention {
        stream: String,
        duration_secs: u64,
    },
    PauseRetention {
        stream: String,
    },
    ResumeRetention {
        stream: String,
    },
    SetArchivalBypass {
        stream: String,
        enabled: bool,
    },
    SetChunkInterval {
        stream: String,
        interval_secs: u64,
    },
}

impl AdminCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CompressChunk { .. } => "compress_chunk",
            Self::DecompressChunk { .. } => "decompress_chunk",
            Self::RefreshAggregate { .. } => "refresh_aggregate",
            Self::VerifyAggregate { .. } => "verify_aggregate",
            Self::ModifyRetention { .. } => "modify_retention",
            Self::PauseRetention { .. } => "pause_retention",
            Self::ResumeRetention { .. } => "resume_retention",
            Self::SetArchivalBypass { .. } => "set_archival_bypass",
            Self::SetChunkInterval { .. } => "set_chunk_interval",
        }
    }

    /// Stream the command targets, when addressed by stream.
    pub fn stream(&self) -> Option<&str> {
        match self {
            Self::CompressChunk { .. } | Self::DecompressChunk { .. } => None,
            Self::RefreshAggregate { stream, .. }
            | Self::VerifyAggregate { stream, .. }
            | Self::ModifyRetention { stream, .. }
            | Self::PauseRetention { stream }
            | Self::ResumeRetention { stream }
            | Self::SetArchivalBypass { stream, .. }
            | Self::SetChunkInterval { stream, .. } => Some(stream),
        }
    }

    /// Checks parameters that don't need the registry.
    pub fn validate_shape(&self) -> Result<()> {
        match self {
            Self::RefreshAggregate { start, end, .. } | Self::VerifyAggregate { start, end, .. } => {
                if start >= end {
                    return Err(Error::validation(format!(
                        "refresh window start {} is not before end {}",
                        start, end
                    )));
                }
            }
            Self::ModifyRetention { duration_secs, .. } => {
                if *duration_secs == 0 {
                    return Err(Error::validation("retention duration must be positive"));
                }
                if *duration_secs > MAX_DURATION_SECS {
                    return Err(Error::validation(format!(
                        "retention duration {}s exceeds {}s",
                        duration_secs, MAX_DURATION_SECS
                    )));
                }
            }
            Self::SetChunkInterval { interval_secs, .. } => {
                validate_chunk_interval(*interval_secs)?;
            }
            _ => {}
        }
        Ok(())
    }
}

/// Result of an administrative command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutcome {
    pub command: String,
    pub success: bool,
    pub message: String,
}

impl CommandOutcome {
    pub fn ok(command: &str, message: impl Into<String>) -> Self {
        Self {
            command: command.to_string(),
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(command: &str, message: impl Into<String>) -> Self {
        Self {
            command: command.to_string(),
            success: false,
            message: message.into(),
        }
    }
}
