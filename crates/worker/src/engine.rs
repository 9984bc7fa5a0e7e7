//! The lifecycle engine: every store and worker wired together once at
//! startup, shared by the scheduler, the HTTP layer and the admin executor.

use chrono::{DateTime, Duration, Utc};
use chunk_store::{
    AggregateStore, AppendSummary, ArchivalLog, ArchivalLogger, ArchiveStorage, AuditLog,
    ChunkManager, DashboardComposer, EntityRegistry, FsArchiveStorage, LatestBucket,
    MemoryArchiveStorage, StreamRegistry,
};
use engine_core::{
    CompositeRow, EntitySpec, Error, JobType, PassReport, Point, Result, RunStatus, StreamConfig,
    StreamSpec,
};
use std::sync::Arc;
use std::time::Instant;
use telemetry::{metrics, HealthSummary, JobHealthReport};
use tracing::{info, warn};

use crate::aggregation::ContinuousAggregator;
use crate::compression::CompressionWorker;
use crate::functions::AggregateFunctions;
use crate::jobs::JobRegistry;
use crate::monitor::PolicyMonitor;
use crate::retention::RetentionWorker;
use crate::scheduler::WorkerConfig;

/// Builder for [`LifecycleEngine`].
pub struct EngineBuilder {
    config: WorkerConfig,
    archival_log: Option<Arc<ArchivalLog>>,
    storages: Vec<Arc<dyn ArchiveStorage>>,
    functions: AggregateFunctions,
    audit_capacity: Option<usize>,
}

impl EngineBuilder {
    pub fn config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    /// Archival log to append to. In-memory when not set.
    pub fn archival_log(mut self, log: Arc<ArchivalLog>) -> Self {
        self.archival_log = Some(log);
        self
    }

    /// Adds an archive storage, replacing the built-in one for its scheme.
    pub fn storage(mut self, storage: Arc<dyn ArchiveStorage>) -> Self {
        self.storages.push(storage);
        self
    }

    pub fn functions(mut self, functions: AggregateFunctions) -> Self {
        self.functions = functions;
        self
    }

    pub fn audit_capacity(mut self, capacity: usize) -> Self {
        self.audit_capacity = Some(capacity);
        self
    }

    pub fn build(self) -> LifecycleEngine {
        let registry = Arc::new(StreamRegistry::new());
        let chunks = Arc::new(ChunkManager::new(registry.clone()));
        let aggregates = Arc::new(AggregateStore::new());
        let audit = Arc::new(match self.audit_capacity {
            Some(capacity) => AuditLog::with_capacity(capacity),
            None => AuditLog::new(),
        });
        let entities = Arc::new(EntityRegistry::new());
        let jobs = Arc::new(JobRegistry::new());

        let log = self
            .archival_log
            .unwrap_or_else(|| Arc::new(ArchivalLog::in_memory()));
        let mut archival = ArchivalLogger::new(log)
            .with_storage(Arc::new(FsArchiveStorage::new()))
            .with_storage(Arc::new(MemoryArchiveStorage::new()));
        for storage in self.storages {
            archival = archival.with_storage(storage);
        }
        let archival = Arc::new(archival);

        let compression = CompressionWorker::new(registry.clone(), chunks.clone(), audit.clone());
        let retention = RetentionWorker::new(
            registry.clone(),
            chunks.clone(),
            aggregates.clone(),
            archival.clone(),
            audit.clone(),
        );
        let aggregator = ContinuousAggregator::new(
            registry.clone(),
            chunks.clone(),
            aggregates.clone(),
            Arc::new(self.functions),
            audit.clone(),
        );
        let composer = DashboardComposer::new(
            entities.clone(),
            registry.clone(),
            aggregates.clone() as Arc<dyn LatestBucket>,
        );
        let monitor = PolicyMonitor::new(
            registry.clone(),
            chunks.clone(),
            jobs.clone(),
            self.config.clone(),
        );

        LifecycleEngine {
            config: self.config,
            registry,
            chunks,
            aggregates,
            audit,
            archival,
            entities,
            jobs,
            compression,
            retention,
            aggregator,
            composer,
            monitor,
        }
    }
}

pub struct LifecycleEngine {
    config: WorkerConfig,
    registry: Arc<StreamRegistry>,
    chunks: Arc<ChunkManager>,
    aggregates: Arc<AggregateStore>,
    audit: Arc<AuditLog>,
    archival: Arc<ArchivalLogger>,
    entities: Arc<EntityRegistry>,
    jobs: Arc<JobRegistry>,
    pub(crate) compression: CompressionWorker,
    pub(crate) retention: RetentionWorker,
    pub(crate) aggregator: ContinuousAggregator,
    composer: DashboardComposer,
    monitor: PolicyMonitor,
}

/// Clears the running flag if a run is dropped before it finishes.
struct RunGuard {
    jobs: Arc<JobRegistry>,
    job: JobType,
    stream: String,
    finished: bool,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        metrics().running_jobs.dec();
        if !self.finished {
            warn!(job = %self.job, stream = %self.stream, "Run abandoned");
            self.jobs.abandon(self.job, &self.stream);
        }
    }
}

impl LifecycleEngine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder {
            config: WorkerConfig::default(),
            archival_log: None,
            storages: Vec::new(),
            functions: AggregateFunctions::default(),
            audit_capacity: None,
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<StreamRegistry> {
        &self.registry
    }

    pub fn chunks(&self) -> &Arc<ChunkManager> {
        &self.chunks
    }

    pub fn aggregates(&self) -> &Arc<AggregateStore> {
        &self.aggregates
    }

    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    pub fn archival_log(&self) -> &Arc<ArchivalLog> {
        self.archival.log()
    }

    pub fn entities(&self) -> &Arc<EntityRegistry> {
        &self.entities
    }

    pub fn jobs(&self) -> &Arc<JobRegistry> {
        &self.jobs
    }

    pub fn register_stream(
        &self,
        spec: StreamSpec,
        now: DateTime<Utc>,
    ) -> Result<Arc<StreamConfig>> {
        let config = self.registry.register(spec, now)?;
        info!(
            stream = %config.name,
            value_type = ?config.value_type,
            chunk_interval_secs = config.chunk_interval_secs,
            retention_secs = config.retention.duration_secs,
            "Registered stream"
        );
        Ok(config)
    }

    pub fn register_entity(&self, spec: EntitySpec) -> Result<()> {
        self.entities.register(spec)
    }

    pub async fn ingest(&self, stream: &str, points: Vec<Point>) -> Result<AppendSummary> {
        self.chunks.append_points(stream, points).await
    }

    /// Runs one job for one stream and records the run.
    ///
    /// A second run of the same job on the same stream is refused while the
    /// first is still going.
    pub async fn run_job(
        &self,
        job: JobType,
        stream: &str,
        now: DateTime<Utc>,
    ) -> Result<PassReport> {
        // Fail fast on unknown streams without touching job state
        self.registry.get(stream)?;

        if !self.jobs.try_start(job, stream, now) {
            return Err(Error::job(format!(
                "{} already running for stream {}",
                job, stream
            )));
        }
        metrics().running_jobs.inc();
        let mut guard = RunGuard {
            jobs: self.jobs.clone(),
            job,
            stream: stream.to_string(),
            finished: false,
        };

        let started = Instant::now();
        let result = match job {
            JobType::Compression => self.compression.run_pass(stream, now).await,
            JobType::Retention => self.retention.run_pass(stream, now).await,
            JobType::Aggregation => self.aggregator.run_pass(stream, now).await,
        };
        let finished_at =
            now + Duration::from_std(started.elapsed()).unwrap_or_else(|_| Duration::zero());

        match &result {
            Ok(report) => {
                self.jobs
                    .finish(job, stream, report.status(), finished_at, summarize(report));
            }
            Err(e) => {
                self.jobs.finish(
                    job,
                    stream,
                    RunStatus::Failed,
                    finished_at,
                    Some(e.to_string()),
                );
            }
        }
        guard.finished = true;

        result
    }

    /// Runs every job for every stream once, in job order.
    pub async fn run_all(&self, now: DateTime<Utc>) -> Vec<PassReport> {
        let mut reports = Vec::new();
        for job in JobType::ALL {
            for stream in self.registry.names() {
                match self.run_job(job, &stream, now).await {
                    Ok(report) => reports.push(report),
                    Err(e) => warn!(job = %job, stream = %stream, error = %e, "Run failed"),
                }
            }
        }
        reports
    }

    pub fn composite(&self, entity_id: &str, as_of: DateTime<Utc>) -> Result<CompositeRow> {
        self.composer.composite(entity_id, as_of)
    }

    pub fn health_report(&self, now: DateTime<Utc>) -> Result<Vec<JobHealthReport>> {
        self.monitor.health_report(now)
    }

    pub fn health_summary(&self, now: DateTime<Utc>) -> Result<HealthSummary> {
        self.monitor.summary(now)
    }
}

fn summarize(report: &PassReport) -> Option<String> {
    let first = report.failures.first()?;
    Some(format!(
        "{} failure(s); first on {}: {}",
        report.failures.len(),
        first.target,
        first.error
    ))
}
