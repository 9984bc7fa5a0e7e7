//! Background job bookkeeping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Background job type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    Compression,
    Retention,
    Aggregation,
}

impl JobType {
    pub const ALL: [JobType; 3] = [Self::Compression, Self::Retention, Self::Aggregation];
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compression => write!(f, "compression"),
            Self::Retention => write!(f, "retention"),
            Self::Aggregation => write!(f, "aggregation"),
        }
    }
}

/// Outcome of one job run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Succeeded,
    Failed,
    /// Run skipped, e.g. retention paused
    Skipped,
}

/// A per-target failure inside a pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassFailure {
    /// Chunk id or `granularity@bucket`
    pub target: String,
    pub error: String,
}

/// Summary of one pass over one stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassReport {
    pub job_type: JobType,
    pub stream: String,
    /// Chunks transitioned or buckets written
    pub processed: u64,
    /// Idempotent no-ops and ineligible targets
    pub skipped: u64,
    pub failures: Vec<PassFailure>,
    /// Approximate bytes touched by the pass
    pub bytes_affected: u64,
    /// Whole pass was skipped (paused stream)
    pub paused: bool,
}

impl PassReport {
    pub fn new(job_type: JobType, stream: impl Into<String>) -> Self {
        Self {
            job_type,
            stream: stream.into(),
            processed: 0,
            skipped: 0,
            failures: Vec::new(),
            bytes_affected: 0,
            paused: false,
        }
    }

    pub fn paused(job_type: JobType, stream: impl Into<String>) -> Self {
        Self {
            paused: true,
            ..Self::new(job_type, stream)
        }
    }

    pub fn fail(&mut self, target: impl Into<String>, error: impl fmt::Display) {
        self.failures.push(PassFailure {
            target: target.into(),
            error: error.to_string(),
        });
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn status(&self) -> RunStatus {
        if self.paused {
            RunStatus::Skipped
        } else if self.is_success() {
            RunStatus::Succeeded
        } else {
            RunStatus::Failed
        }
    }
}

/// Last-known state of a job for one stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRun {
    pub job_type: JobType,
    pub stream: String,
    pub last_status: Option<RunStatus>,
    pub last_started: Option<DateTime<Utc>>,
    pub last_finished: Option<DateTime<Utc>>,
    pub last_successful_finish: Option<DateTime<Utc>>,
    pub last_duration_ms: Option<u64>,
    pub last_error: Option<String>,
    pub consecutive_failures: u64,
    pub total_runs: u64,
    pub total_failures: u64,
    /// Run currently executing
    pub running: bool,
}

impl JobRun {
    pub fn new(job_type: JobType, stream: impl Into<String>) -> Self {
        Self {
            job_type,
            stream: stream.into(),
            last_status: None,
            last_started: None,
            last_finished: None,
            last_successful_finish: None,
            last_duration_ms: None,
            last_error: None,
            consecutive_failures: 0,
            total_runs: 0,
            total_failures: 0,
            running: false,
        }
    }

    pub fn record_start(&mut self, at: DateTime<Utc>) {
        self.last_started = Some(at);
        self.running = true;
    }

    /// Records a finished run. `error` summarizes failures, if any.
    pub fn record_finish(
        &mut self,
        status: RunStatus,
        finished_at: DateTime<Utc>,
        error: Option<String>,
    ) {
        self.running = false;
        self.total_runs += 1;
        self.last_status = Some(status);
        self.last_finished = Some(finished_at);
        self.last_duration_ms = self
            .last_started
            .map(|s| (finished_at - s).num_milliseconds().max(0) as u64);

        match status {
            RunStatus::Succeeded => {
                self.consecutive_failures = 0;
                self.last_successful_finish = Some(finished_at);
                self.last_error = None;
            }
            RunStatus::Failed => {
                self.consecutive_failures += 1;
                self.total_failures += 1;
                self.last_error = error;
            }
            RunStatus::Skipped => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_run_failure_streak() {
        let now = Utc::now();
        let mut run = JobRun::new(JobType::Retention, "s");

        run.record_start(now);
        run.record_finish(RunStatus::Failed, now, Some("archive down".into()));
        run.record_start(now);
        run.record_finish(RunStatus::Failed, now, Some("archive down".into()));
        assert_eq!(run.consecutive_failures, 2);
        assert_eq!(run.total_failures, 2);
        assert!(run.last_successful_finish.is_none());

        run.record_start(now);
        run.record_finish(RunStatus::Succeeded, now, None);
        assert_eq!(run.consecutive_failures, 0);
        assert_eq!(run.total_runs, 3);
        assert_eq!(run.last_successful_finish, Some(now));
        assert!(run.last_error.is_none());
    }

    #[test]
    fn test_pass_report_status() {
        let mut report = PassReport::new(JobType::Compression, "s");
        assert_eq!(report.status(), RunStatus::Succeeded);
        report.fail("chunk-1", "boom");
        assert_eq!(report.status(), RunStatus::Failed);
        assert_eq!(
            PassReport::paused(JobType::Retention, "s").status(),
            RunStatus::Skipped
        );
    }
}
