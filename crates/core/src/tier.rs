//! Ingestion-rate tiers for choosing a stream's chunk interval.
//!
//! Larger chunks mean fewer chunks to track; smaller chunks mean cheaper
//! per-chunk scans and finer-grained compression and retention.

use serde::{Deserialize, Serialize};

use crate::limits::{DAY_SECS, HOUR_SECS, WEEK_SECS};

/// Points per second at or above which a stream is high-rate.
pub const HIGH_RATE_PER_SEC: f64 = 10.0;

/// Points per second at or above which a stream is medium-rate (1/min).
pub const MEDIUM_RATE_PER_SEC: f64 = 1.0 / 60.0;

/// Ingestion tier of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IngestionTier {
    /// ≥10 points/s
    High,
    /// ~1 point/min
    Medium,
    /// ~1 point/day
    #[default]
    Low,
}

impl IngestionTier {
    /// Picks the tier for an expected ingestion rate.
    pub fn for_rate(points_per_sec: f64) -> Self {
        if points_per_sec >= HIGH_RATE_PER_SEC {
            Self::High
        } else if points_per_sec >= MEDIUM_RATE_PER_SEC {
            Self::Medium
        } else {
            Self::Low
        }
    }

    /// Chunk interval in seconds.
    pub fn chunk_interval_secs(&self) -> u64 {
        match self {
            Self::High => HOUR_SECS,  // 1 hour
            Self::Medium => DAY_SECS, // 1 day
            Self::Low => WEEK_SECS,   // 7 days
        }
    }
}
