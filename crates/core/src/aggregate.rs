//! Continuous-aggregate buckets and their statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::stream::ValueType;

/// Numeric rollup statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct NumericStats {
    pub count: u64,
    pub sum: f64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub avg: Option<f64>,
    /// Sample standard deviation; null below two points
    pub stddev: Option<f64>,
}

/// Boolean rollup statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct BooleanStats {
    pub count: u64,
    pub true_count: u64,
    pub false_count: u64,
    pub true_ratio: Option<f64>,
}

/// Categorical rollup statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CategoricalStats {
    pub count: u64,
    pub distinct: u64,
    pub counts: BTreeMap<String, u64>,
}

/// Statistics computed for one bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BucketStats {
    Numeric(NumericStats),
    Boolean(BooleanStats),
    Categorical(CategoricalStats),
    /// Values produced by a pluggable aggregate function
    Custom { values: BTreeMap<String, f64> },
}

impl BucketStats {
    /// Null-safe defaults for a stream with no data.
    pub fn empty(value_type: ValueType) -> Self {
        match value_type {
            ValueType::Numeric => Self::Numeric(NumericStats::default()),
            ValueType::Boolean => Self::Boolean(BooleanStats::default()),
            ValueType::Categorical => Self::Categorical(CategoricalStats::default()),
        }
    }

    /// Number of raw points folded into the bucket.
    pub fn count(&self) -> u64 {
        match self {
            Self::Numeric(s) => s.count,
            Self::Boolean(s) => s.count,
            Self::Categorical(s) => s.count,
            Self::Custom { values } => values.get("count").map(|c| *c as u64).unwrap_or(0),
        }
    }
}

/// A materialized rollup bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateBucket {
    pub stream: String,
    pub granularity: String,
    pub bucket_start: DateTime<Utc>,
    pub bucket_end: DateTime<Utc>,
    pub stats: BucketStats,
    pub computed_at: DateTime<Utc>,
}

impl AggregateBucket {
    pub fn key(&self) -> BucketKey {
        BucketKey::new(
            &self.stream,
            &self.granularity,
            self.bucket_start.timestamp_millis(),
        )
    }

    /// Compares everything except `computed_at`.
    pub fn same_content(&self, other: &AggregateBucket) -> bool {
        self.stream == other.stream
            && self.granularity == other.granularity
            && self.bucket_start == other.bucket_start
            && self.bucket_end == other.bucket_end
            && self.stats == other.stats
    }
}

/// Storage key of a bucket; orders by stream, granularity, then start.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketKey {
    pub stream: String,
    pub granularity: String,
    pub bucket_start_ms: i64,
}

impl BucketKey {
    pub fn new(stream: &str, granularity: &str, bucket_start_ms: i64) -> Self {
        Self {
            stream: stream.to_string(),
            granularity: granularity.to_string(),
            bucket_start_ms,
        }
    }
}
