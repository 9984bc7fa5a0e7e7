//! Chunk identity, time ranges, and bucket alignment.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Unique chunk identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkId(Uuid);

impl ChunkId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ChunkId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ChunkId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| Error::validation(format!("invalid chunk id {:?}: {}", s, e)))
    }
}

/// Half-open time range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if start >= end {
            return Err(Error::validation(format!(
                "empty time range: start {} is not before end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// Builds a range from epoch milliseconds.
    pub fn from_millis(start_ms: i64, end_ms: i64) -> Result<Self> {
        Self::new(millis_to_datetime(start_ms)?, millis_to_datetime(end_ms)?)
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts < self.end
    }

    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn start_ms(&self) -> i64 {
        self.start.timestamp_millis()
    }

    pub fn end_ms(&self) -> i64 {
        self.end.timestamp_millis()
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

/// Storage tier of a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkState {
    /// Mutable, uncompressed.
    Hot,
    /// Immutable, column-encoded.
    Compressed,
}

impl ChunkState {
    pub fn is_compressed(&self) -> bool {
        matches!(self, Self::Compressed)
    }
}

/// Point-in-time view of a chunk's metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkInfo {
    pub id: ChunkId,
    pub stream: String,
    pub range: TimeRange,
    pub state: ChunkState,
    /// Rows held by the chunk
    pub row_count: u64,
    /// Approximate in-memory footprint
    pub approx_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub compressed_at: Option<DateTime<Utc>>,
    /// Last operator decompression; holds off scheduled recompression
    #[serde(default)]
    pub decompressed_at: Option<DateTime<Utc>>,
}

/// Result of routing a point to its chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRef {
    pub id: ChunkId,
    pub stream: String,
    pub range: TimeRange,
    /// Whether this call created the chunk
    pub created: bool,
}

/// Floors `ts_ms` to a multiple of `interval_ms` (Euclidean, so pre-epoch
/// timestamps floor toward negative infinity).
pub fn align_down(ts_ms: i64, interval_ms: i64) -> i64 {
    ts_ms.div_euclid(interval_ms) * interval_ms
}

/// Ceils `ts_ms` to a multiple of `interval_ms`.
pub fn align_up(ts_ms: i64, interval_ms: i64) -> i64 {
    let down = align_down(ts_ms, interval_ms);
    if down == ts_ms {
        down
    } else {
        down.saturating_add(interval_ms)
    }
}

/// Converts epoch milliseconds to a UTC timestamp.
pub fn millis_to_datetime(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| Error::validation(format!("timestamp {}ms out of range", ms)))
}
