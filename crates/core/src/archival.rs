//! Archival records and the administrative audit trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chunk::ChunkId;
use crate::stream::ArchiveFormat;

/// Proof that a chunk was durably exported before deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivalRecord {
    pub chunk_id: ChunkId,
    pub stream_name: String,
    pub range_start: DateTime<Utc>,
    pub range_end: DateTime<Utc>,
    pub row_count: u64,
    pub archived_at: DateTime<Utc>,
    /// Full URL of the archived object
    pub location: String,
    pub format: ArchiveFormat,
    /// Hex blake3 digest of the archived bytes
    pub checksum: String,
}

/// Who triggered an audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Actor {
    Scheduler,
    Operator,
}

/// Audited state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    ChunkCompressed,
    ChunkDecompressed,
    ChunkDropped,
    ChunkArchived,
    RetentionModified,
    RetentionPaused,
    RetentionResumed,
    ArchivalBypassChanged,
    ChunkIntervalChanged,
    AggregateRepaired,
}

/// An audit trail entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub at: DateTime<Utc>,
    pub actor: Actor,
    pub action: AuditAction,
    pub stream: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<ChunkId>,
    pub message: String,
}
