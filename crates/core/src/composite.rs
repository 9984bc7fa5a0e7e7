//! Composite dashboard view types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::aggregate::BucketStats;

/// A logical entity (e.g. a production line) and the streams it shows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct EntitySpec {
    #[validate(length(min = 1, max = 128))]
    pub id: String,
    #[validate(length(min = 1))]
    pub streams: Vec<String>,
    /// Granularities to fetch for every stream
    #[validate(length(min = 1))]
    pub granularities: Vec<String>,
}

/// Latest bucket of one stream at one granularity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeField {
    pub stream: String,
    pub granularity: String,
    /// False when the stream had no bucket at or before `as_of`
    pub present: bool,
    pub bucket_start: Option<DateTime<Utc>>,
    pub stats: BucketStats,
}

/// Read-optimized row for one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeRow {
    pub entity_id: String,
    pub as_of: DateTime<Utc>,
    pub fields: Vec<CompositeField>,
}

impl CompositeRow {
    pub fn field(&self, stream: &str, granularity: &str) -> Option<&CompositeField> {
        self.fields
            .iter()
            .find(|f| f.stream == stream && f.granularity == granularity)
    }
}
