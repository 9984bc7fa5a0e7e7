//! Policy monitor: read-only health view over streams and job runs.

use chrono::{DateTime, Utc};
use chunk_store::{ChunkHandle, ChunkManager, StreamRegistry};
use engine_core::{JobType, Result, RunStatus, StreamConfig};
use std::sync::Arc;
use telemetry::{HealthStatus, HealthSummary, JobHealthReport};

use crate::jobs::JobRegistry;
use crate::scheduler::WorkerConfig;

pub struct PolicyMonitor {
    registry: Arc<StreamRegistry>,
    chunks: Arc<ChunkManager>,
    jobs: Arc<JobRegistry>,
    config: WorkerConfig,
}

impl PolicyMonitor {
    pub fn new(
        registry: Arc<StreamRegistry>,
        chunks: Arc<ChunkManager>,
        jobs: Arc<JobRegistry>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            registry,
            chunks,
            jobs,
            config,
        }
    }

    /// One row per stream and job type, ordered by stream.
    pub fn health_report(&self, now: DateTime<Utc>) -> Result<Vec<JobHealthReport>> {
        let mut reports = Vec::new();
        for config in self.registry.list() {
            let handles = self.chunks.handles(&config.name)?;
            for job in JobType::ALL {
                reports.push(self.report(&config, job, &handles, now));
            }
        }
        Ok(reports)
    }

    pub fn summary(&self, now: DateTime<Utc>) -> Result<HealthSummary> {
        Ok(HealthSummary::from_reports(&self.health_report(now)?, now))
    }

    fn report(
        &self,
        config: &StreamConfig,
        job: JobType,
        handles: &[Arc<ChunkHandle>],
        now: DateTime<Utc>,
    ) -> JobHealthReport {
        let run = self.jobs.get(job, &config.name);
        let eligible: Vec<&Arc<ChunkHandle>> = handles
            .iter()
            .filter(|h| is_eligible(config, job, h, now))
            .collect();

        let status = match run.as_ref().and_then(|r| r.last_status) {
            Some(RunStatus::Succeeded) => HealthStatus::Healthy,
            Some(RunStatus::Failed) => HealthStatus::Failed,
            Some(RunStatus::Skipped) | None => HealthStatus::Pending,
        };

        JobHealthReport {
            stream_name: config.name.clone(),
            job_type: job.to_string(),
            schedule_interval_secs: self.config.interval(job).as_secs(),
            last_run_status: status,
            last_successful_finish: run.as_ref().and_then(|r| r.last_successful_finish),
            last_error: run.as_ref().and_then(|r| r.last_error.clone()),
            total_runs: run.as_ref().map_or(0, |r| r.total_runs),
            total_failures: run.as_ref().map_or(0, |r| r.total_failures),
            consecutive_failures: run.as_ref().map_or(0, |r| r.consecutive_failures),
            chunks_eligible_for_action: eligible.len() as u64,
            estimated_data_volume: eligible.iter().map(|h| h.approx_bytes()).sum(),
        }
    }
}

/// Whether the next run of `job` would act on the chunk.
fn is_eligible(
    config: &StreamConfig,
    job: JobType,
    handle: &ChunkHandle,
    now: DateTime<Utc>,
) -> bool {
    let range = handle.range();
    match job {
        JobType::Compression => {
            !handle.is_compressed()
                && config
                    .compression_horizon(now)
                    .is_ok_and(|horizon| range.end < horizon)
        }
        JobType::Retention => {
            !config.retention_paused
                && config
                    .retention_horizon(now)
                    .is_ok_and(|horizon| range.end < horizon)
        }
        // Chunks the trailing windows read from
        JobType::Aggregation => config.aggregates.iter().any(|g| {
            g.window(now)
                .is_ok_and(|(from, to)| range.end > from && range.start < to)
        }),
    }
}
