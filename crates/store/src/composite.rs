//! Dashboard composer.
//!
//! Builds one read-optimized row per entity from the latest bucket of each
//! associated stream and granularity. Gaps are filled with empty statistics
//! and flagged with `present = false` instead of failing the read.

use chrono::{DateTime, Utc};
use engine_core::{
    AggregateBucket, BucketStats, CompositeField, CompositeRow, EntitySpec, Error, Result,
    ValueType,
};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};
use validator::Validate;

use crate::registry::StreamRegistry;

/// Read interface over materialized buckets.
pub trait LatestBucket: Send + Sync {
    /// Most recent bucket with `bucket_start <= as_of`.
    fn latest_bucket(
        &self,
        stream: &str,
        granularity: &str,
        as_of: DateTime<Utc>,
    ) -> Option<AggregateBucket>;
}

/// Registered dashboard entities.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    entities: RwLock<BTreeMap<String, EntitySpec>>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or replaces an entity.
    pub fn register(&self, spec: EntitySpec) -> Result<()> {
        spec.validate()
            .map_err(|e| Error::configuration(format!("entity {}: {}", spec.id, e)))?;
        info!(entity = %spec.id, streams = spec.streams.len(), "Registered entity");
        self.entities.write().insert(spec.id.clone(), spec);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<EntitySpec> {
        self.entities
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::EntityNotFound(id.to_string()))
    }

    pub fn list(&self) -> Vec<EntitySpec> {
        self.entities.read().values().cloned().collect()
    }
}

/// Assembles composite rows.
pub struct DashboardComposer {
    entities: Arc<EntityRegistry>,
    streams: Arc<StreamRegistry>,
    buckets: Arc<dyn LatestBucket>,
}

impl DashboardComposer {
    pub fn new(
        entities: Arc<EntityRegistry>,
        streams: Arc<StreamRegistry>,
        buckets: Arc<dyn LatestBucket>,
    ) -> Self {
        Self {
            entities,
            streams,
            buckets,
        }
    }

    pub fn entities(&self) -> &Arc<EntityRegistry> {
        &self.entities
    }

    pub fn composite(&self, entity_id: &str, as_of: DateTime<Utc>) -> Result<CompositeRow> {
        let entity = self.entities.get(entity_id)?;

        let mut fields = Vec::with_capacity(entity.streams.len() * entity.granularities.len());
        for stream in &entity.streams {
            // Unregistered streams get numeric defaults
            let value_type = self
                .streams
                .get(stream)
                .map(|c| c.value_type)
                .unwrap_or(ValueType::Numeric);

            for granularity in &entity.granularities {
                let field = match self.buckets.latest_bucket(stream, granularity, as_of) {
                    Some(bucket) => CompositeField {
                        stream: stream.clone(),
                        granularity: granularity.clone(),
                        present: true,
                        bucket_start: Some(bucket.bucket_start),
                        stats: bucket.stats,
                    },
                    None => {
                        debug!(
                            entity = %entity_id,
                            stream = %stream,
                            granularity = %granularity,
                            "No bucket, using defaults"
                        );
                        CompositeField {
                            stream: stream.clone(),
                            granularity: granularity.clone(),
                            present: false,
                            bucket_start: None,
                            stats: BucketStats::empty(value_type),
                        }
                    }
                };
                fields.push(field);
            }
        }

        Ok(CompositeRow {
            entity_id: entity.id,
            as_of,
            fields,
        })
    }
}
