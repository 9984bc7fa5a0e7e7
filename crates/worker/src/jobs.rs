//! Job run bookkeeping, constructed once at startup and shared by `Arc`.

use chrono::{DateTime, Utc};
use engine_core::{JobRun, JobType, RunStatus};
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Last-known run state per (stream, job type).
#[derive(Debug, Default)]
pub struct JobRegistry {
    runs: RwLock<BTreeMap<(String, JobType), JobRun>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a run as started. Returns `false` if one is already running.
    pub fn try_start(&self, job: JobType, stream: &str, at: DateTime<Utc>) -> bool {
        let mut runs = self.runs.write();
        let run = runs
            .entry((stream.to_string(), job))
            .or_insert_with(|| JobRun::new(job, stream));
        if run.running {
            return false;
        }
        run.record_start(at);
        true
    }

    pub fn finish(
        &self,
        job: JobType,
        stream: &str,
        status: RunStatus,
        at: DateTime<Utc>,
        error: Option<String>,
    ) {
        let mut runs = self.runs.write();
        let run = runs
            .entry((stream.to_string(), job))
            .or_insert_with(|| JobRun::new(job, stream));
        run.record_finish(status, at, error);
    }

    /// Clears the running flag of a run that was cancelled before finishing.
    /// The run is not counted.
    pub fn abandon(&self, job: JobType, stream: &str) {
        if let Some(run) = self.runs.write().get_mut(&(stream.to_string(), job)) {
            run.running = false;
        }
    }

    pub fn get(&self, job: JobType, stream: &str) -> Option<JobRun> {
        self.runs.read().get(&(stream.to_string(), job)).cloned()
    }

    /// All runs, ordered by stream then job type.
    pub fn list(&self) -> Vec<JobRun> {
        self.runs.read().values().cloned().collect()
    }
}
