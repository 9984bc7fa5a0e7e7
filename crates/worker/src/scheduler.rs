//! Worker scheduler for background lifecycle jobs.

use chrono::Utc;
use engine_core::JobType;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::engine::LifecycleEngine;

/// Worker scheduler configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Compression check interval
    pub compression_interval: Duration,
    /// Retention check interval
    pub retention_interval: Duration,
    /// Continuous aggregate refresh interval
    pub aggregation_interval: Duration,
    /// Streams processed in parallel by one job loop
    pub max_concurrent_streams: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            compression_interval: Duration::from_secs(3600), // 1 hour
            retention_interval: Duration::from_secs(3600),   // 1 hour
            aggregation_interval: Duration::from_secs(300),  // 5 minutes
            max_concurrent_streams: 4,
        }
    }
}

impl WorkerConfig {
    pub fn interval(&self, job: JobType) -> Duration {
        match job {
            JobType::Compression => self.compression_interval,
            JobType::Retention => self.retention_interval,
            JobType::Aggregation => self.aggregation_interval,
        }
    }
}

/// Background worker scheduler: one loop per job type.
pub struct WorkerScheduler {
    engine: Arc<LifecycleEngine>,
}

impl WorkerScheduler {
    pub fn new(engine: Arc<LifecycleEngine>) -> Self {
        Self { engine }
    }

    /// Starts all job loops. Each loop exits when `shutdown` flips to `true`,
    /// abandoning any run in progress.
    pub fn start(
        self: Arc<Self>,
        shutdown: watch::Receiver<bool>,
    ) -> Vec<tokio::task::JoinHandle<()>> {
        let handles = JobType::ALL
            .into_iter()
            .map(|job| {
                let scheduler = self.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    scheduler.run_job_loop(job, shutdown).await;
                })
            })
            .collect();

        info!("Background workers started");
        handles
    }

    async fn run_job_loop(&self, job: JobType, mut shutdown: watch::Receiver<bool>) {
        let period = self.engine.config().interval(job);
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(job = %job, interval_secs = period.as_secs(), "Job loop started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = self.run_cycle(job) => {}
                _ = shutdown.changed() => {
                    warn!(job = %job, "Shutdown during run, abandoning");
                    break;
                }
            }
        }

        info!(job = %job, "Job loop stopped");
    }

    /// Runs `job` once for every registered stream.
    pub async fn run_cycle(&self, job: JobType) {
        let limit = self.engine.config().max_concurrent_streams.max(1);
        let permits = Arc::new(Semaphore::new(limit));
        let mut tasks = JoinSet::new();

        for stream in self.engine.registry().names() {
            let permit = match permits.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let engine = self.engine.clone();
            tasks.spawn(async move {
                let _permit = permit;
                match engine.run_job(job, &stream, Utc::now()).await {
                    Ok(report) if report.is_success() => {
                        debug!(
                            job = %job,
                            stream = %stream,
                            processed = report.processed,
                            "Run complete"
                        );
                    }
                    Ok(report) => {
                        warn!(
                            job = %job,
                            stream = %stream,
                            failures = report.failures.len(),
                            "Run finished with failures"
                        );
                    }
                    Err(e) => error!(job = %job, stream = %stream, error = %e, "Job run failed"),
                }
            });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(job = %job, error = %e, "Job task panicked");
            }
        }
    }
}
