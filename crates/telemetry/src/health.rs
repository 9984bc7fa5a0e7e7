//! Job health report types.
//!
//! Reports are built on demand by the policy monitor from an explicitly
//! constructed job registry; nothing here holds global state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Health of one background job for one stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Failed,
    /// Never run, running for the first time, or paused
    Pending,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed)
    }
}

/// Per-stream, per-job health row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobHealthReport {
    pub stream_name: String,
    pub job_type: String,
    pub schedule_interval_secs: u64,
    pub last_run_status: HealthStatus,
    pub last_successful_finish: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub total_runs: u64,
    pub total_failures: u64,
    pub consecutive_failures: u64,
    pub chunks_eligible_for_action: u64,
    /// Approximate bytes in the eligible chunks
    pub estimated_data_volume: u64,
}

/// Overall status across all job rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    Healthy,
    Degraded,
}

/// Aggregated health summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSummary {
    pub status: OverallStatus,
    pub streams: usize,
    pub healthy_jobs: usize,
    pub failed_jobs: usize,
    pub pending_jobs: usize,
    pub generated_at: DateTime<Utc>,
}

impl HealthSummary {
    pub fn from_reports(reports: &[JobHealthReport], generated_at: DateTime<Utc>) -> Self {
        let count = |status: HealthStatus| {
            reports
                .iter()
                .filter(|r| r.last_run_status == status)
                .count()
        };
        let failed_jobs = count(HealthStatus::Failed);

        let mut streams: Vec<&str> = reports.iter().map(|r| r.stream_name.as_str()).collect();
        streams.sort_unstable();
        streams.dedup();

        Self {
            status: if failed_jobs == 0 {
                OverallStatus::Healthy
            } else {
                OverallStatus::Degraded
            },
            streams: streams.len(),
            healthy_jobs: count(HealthStatus::Healthy),
            failed_jobs,
            pending_jobs: count(HealthStatus::Pending),
            generated_at,
        }
    }
}
