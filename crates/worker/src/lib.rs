//! Background lifecycle jobs for the time-series engine.
//!
//! - Compression (hot chunks past the hot window → compressed tier)
//! - Retention (drop expired chunks, archive first when required)
//! - Aggregation (continuous rollups over a trailing window)
//! - Policy monitor (per-stream job health)
//! - Admin commands and the periodic scheduler

pub mod admin;
pub mod aggregation;
pub mod compression;
pub mod engine;
pub mod functions;
pub mod jobs;
pub mod monitor;
pub mod retention;
pub mod scheduler;

pub use aggregation::ContinuousAggregator;
pub use compression::CompressionWorker;
pub use engine::{EngineBuilder, LifecycleEngine};
pub use functions::{
    AggregateFunctions, BooleanAggregator, BucketAggregator, CategoricalAggregator,
    NumericAggregator,
};
pub use jobs::JobRegistry;
pub use monitor::PolicyMonitor;
pub use retention::RetentionWorker;
pub use scheduler::*;

#[cfg(test)]
pub(crate) mod test_support {
    use async_trait::async_trait;
    use bytes::Bytes;
    use chrono::{TimeZone, Utc};
    use chunk_store::{
        AggregateStore, ArchivalLog, ArchivalLogger, ArchiveStorage, AuditLog, ChunkManager,
        MemoryArchiveStorage, StreamRegistry,
    };
    use engine_core::limits::{DAY_SECS, HOUR_SECS};
    use engine_core::{
        ArchiveFormat, CompressionPolicy, Error, GranularitySpec, OrderKey, Point, Result,
        RetentionPolicy, StreamSpec, ValueType,
    };
    use std::sync::Arc;
    use url::Url;

    use crate::aggregation::ContinuousAggregator;
    use crate::compression::CompressionWorker;
    use crate::functions::AggregateFunctions;
    use crate::jobs::JobRegistry;
    use crate::monitor::PolicyMonitor;
    use crate::retention::RetentionWorker;
    use crate::scheduler::WorkerConfig;

    /// Hourly chunks, 7 day hot window, 90 day retention without archival.
    pub fn numeric_spec(name: &str) -> StreamSpec {
        StreamSpec {
            name: name.to_string(),
            value_type: ValueType::Numeric,
            chunk_interval_secs: Some(HOUR_SECS),
            expected_rate_per_sec: None,
            compression: CompressionPolicy {
                hot_window_secs: 7 * DAY_SECS,
                segment_keys: vec!["sensor".into()],
                order_key: OrderKey::default(),
            },
            retention: RetentionPolicy {
                duration_secs: 90 * DAY_SECS,
                archive_before_delete: false,
                archive_location: None,
                archive_format: ArchiveFormat::Jsonl,
            },
            aggregates: vec![GranularitySpec::new("hourly", HOUR_SECS)],
        }
    }

    /// `numeric_spec` archiving to `memory://archive` before deletion.
    pub fn archived_spec(name: &str) -> StreamSpec {
        let mut spec = numeric_spec(name);
        spec.retention.archive_before_delete = true;
        spec.retention.archive_location = Some("memory://archive".into());
        spec
    }

    /// Storage for `memory://` that rejects every write.
    pub struct FailingStorage;

    #[async_trait]
    impl ArchiveStorage for FailingStorage {
        fn scheme(&self) -> &'static str {
            "memory"
        }

        async fn put(&self, _blob: Bytes, location: &Url) -> Result<String> {
            Err(Error::internal(format!("archive unavailable: {}", location)))
        }

        async fn get(&self, location: &Url) -> Result<Bytes> {
            Err(Error::internal(format!("archive unavailable: {}", location)))
        }
    }

    /// Stores and workers for one registered stream.
    pub struct TestStore {
        pub registry: Arc<StreamRegistry>,
        pub chunks: Arc<ChunkManager>,
        pub aggregates: Arc<AggregateStore>,
        pub audit: Arc<AuditLog>,
        pub archival: Arc<ArchivalLogger>,
        pub storage: Arc<MemoryArchiveStorage>,
        pub jobs: Arc<JobRegistry>,
    }

    impl TestStore {
        pub fn new(spec: StreamSpec) -> Self {
            let storage = Arc::new(MemoryArchiveStorage::new());
            Self::build(spec, storage.clone(), storage)
        }

        pub fn with_storage(spec: StreamSpec, archive: Arc<dyn ArchiveStorage>) -> Self {
            Self::build(spec, Arc::new(MemoryArchiveStorage::new()), archive)
        }

        fn build(
            spec: StreamSpec,
            storage: Arc<MemoryArchiveStorage>,
            archive: Arc<dyn ArchiveStorage>,
        ) -> Self {
            let registry = Arc::new(StreamRegistry::new());
            let registered_at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
            registry.register(spec, registered_at).unwrap();

            Self {
                chunks: Arc::new(ChunkManager::new(registry.clone())),
                registry,
                aggregates: Arc::new(AggregateStore::new()),
                audit: Arc::new(AuditLog::new()),
                archival: Arc::new(
                    ArchivalLogger::new(Arc::new(ArchivalLog::in_memory())).with_storage(archive),
                ),
                storage,
                jobs: Arc::new(JobRegistry::new()),
            }
        }

        pub async fn ingest(&self, stream: &str, points: Vec<Point>) {
            self.chunks.append_points(stream, points).await.unwrap();
        }

        pub fn compression(&self) -> CompressionWorker {
            CompressionWorker::new(self.registry.clone(), self.chunks.clone(), self.audit.clone())
        }

        pub fn retention(&self) -> RetentionWorker {
            RetentionWorker::new(
                self.registry.clone(),
                self.chunks.clone(),
                self.aggregates.clone(),
                self.archival.clone(),
                self.audit.clone(),
            )
        }

        pub fn aggregator(&self) -> ContinuousAggregator {
            self.aggregator_with(AggregateFunctions::default())
        }

        pub fn aggregator_with(&self, functions: AggregateFunctions) -> ContinuousAggregator {
            ContinuousAggregator::new(
                self.registry.clone(),
                self.chunks.clone(),
                self.aggregates.clone(),
                Arc::new(functions),
                self.audit.clone(),
            )
        }

        pub fn monitor(&self) -> PolicyMonitor {
            PolicyMonitor::new(
                self.registry.clone(),
                self.chunks.clone(),
                self.jobs.clone(),
                WorkerConfig::default(),
            )
        }
    }
}
