//! Continuous aggregator: materializes fixed-width buckets from raw points.
//!
//! Every run recomputes a trailing window and replaces the stored buckets in
//! that window wholesale, so late points are absorbed without merge logic.
//! Windows never reach behind the retention horizon: once raw data is gone,
//! its buckets are the only copy left.

use chrono::{DateTime, Utc};
use chunk_store::{AggregateStore, AuditLog, ChunkManager, StreamRegistry};
use engine_core::{
    align_down, align_up, millis_to_datetime, Actor, AggregateBucket, AuditAction, Error,
    GranularitySpec, JobType, PassReport, Point, Result, StreamConfig, TimeRange,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use telemetry::metrics;
use tracing::{debug, info, warn};

use crate::functions::AggregateFunctions;

pub struct ContinuousAggregator {
    registry: Arc<StreamRegistry>,
    chunks: Arc<ChunkManager>,
    aggregates: Arc<AggregateStore>,
    functions: Arc<AggregateFunctions>,
    audit: Arc<AuditLog>,
}

impl ContinuousAggregator {
    pub fn new(
        registry: Arc<StreamRegistry>,
        chunks: Arc<ChunkManager>,
        aggregates: Arc<AggregateStore>,
        functions: Arc<AggregateFunctions>,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            registry,
            chunks,
            aggregates,
            functions,
            audit,
        }
    }

    /// Scheduled run: for every granularity, recomputes
    /// `[align(now - trailing_window), align(now - end_offset))`.
    pub async fn run_pass(&self, stream: &str, now: DateTime<Utc>) -> Result<PassReport> {
        let started = Instant::now();
        let config = self.registry.get(stream)?;
        let mut report = PassReport::new(JobType::Aggregation, stream);

        for gran in &config.aggregates {
            let window = gran.window(now).and_then(|(from, to)| {
                clamp_window(
                    &config,
                    gran,
                    align_down(from.timestamp_millis(), gran.width_ms()),
                    to.timestamp_millis(),
                    now,
                )
            });

            let window = match window {
                Ok(Some(window)) => window,
                Ok(None) => {
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    report.fail(gran.name.clone(), e);
                    continue;
                }
            };

            match self.materialize(&config, gran, window, now).await {
                Ok(written) => report.processed += written,
                Err(e) => {
                    warn!(
                        stream = %stream,
                        granularity = %gran.name,
                        error = %e,
                        "Failed to materialize aggregate window"
                    );
                    report.fail(gran.name.clone(), e);
                }
            }
        }

        metrics()
            .aggregation_pass_ms
            .observe(started.elapsed().as_millis() as u64);
        debug!(
            stream = %stream,
            buckets = report.processed,
            failed = report.failures.len(),
            "Aggregation pass complete"
        );

        Ok(report)
    }

    /// Recomputes buckets in `[start, end)` for backfill. The window is shrunk
    /// to whole buckets and clamped to the retention horizon. Returns the
    /// number of buckets written.
    pub async fn refresh(
        &self,
        stream: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        granularity: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let config = self.registry.get(stream)?;
        let mut written = 0;

        for gran in self.granularities(&config, granularity)? {
            let window = clamp_window(
                &config,
                gran,
                start.timestamp_millis(),
                end.timestamp_millis(),
                now,
            )?;
            if let Some(window) = window {
                written += self.materialize(&config, gran, window, now).await?;
            }
        }

        info!(
            stream = %stream,
            start = %start,
            end = %end,
            buckets = written,
            "Refreshed aggregates"
        );
        Ok(written)
    }

    /// Recomputes buckets in `[start, end)` and compares them with the stored
    /// ones. On any mismatch the whole window is replaced by the recomputed
    /// buckets. Returns the number of mismatched buckets.
    pub async fn verify(
        &self,
        stream: &str,
        granularity: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        actor: Actor,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let config = self.registry.get(stream)?;
        let gran = self.granularities(&config, Some(granularity))?[0];
        let Some(window) = clamp_window(
            &config,
            gran,
            start.timestamp_millis(),
            end.timestamp_millis(),
            now,
        )?
        else {
            return Ok(0);
        };

        let computed = self.compute_window(&config, gran, window, now).await?;
        let stored = self
            .aggregates
            .range(stream, &gran.name, window.start, window.end);

        let mismatches = diff_buckets(&computed, &stored);
        if mismatches.is_empty() {
            return Ok(0);
        }

        for violation in &mismatches {
            warn!(error = %violation, code = violation.code(), "Aggregate mismatch");
        }

        let repaired = mismatches.len() as u64;
        self.aggregates
            .replace_window(stream, &gran.name, window.start, window.end, computed);

        let m = metrics();
        m.consistency_repairs.inc_by(repaired);
        self.audit.record(
            now,
            actor,
            AuditAction::AggregateRepaired,
            stream,
            None,
            format!(
                "recomputed {} granularity over {}: {} buckets differed",
                gran.name, window, repaired
            ),
        );

        Ok(repaired)
    }

    fn granularities<'a>(
        &self,
        config: &'a StreamConfig,
        name: Option<&str>,
    ) -> Result<Vec<&'a GranularitySpec>> {
        match name {
            None => Ok(config.aggregates.iter().collect()),
            Some(name) => config.granularity(name).map(|g| vec![g]).ok_or_else(|| {
                Error::configuration(format!(
                    "stream {} has no granularity {}",
                    config.name, name
                ))
            }),
        }
    }

    async fn materialize(
        &self,
        config: &StreamConfig,
        gran: &GranularitySpec,
        window: TimeRange,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let buckets = self.compute_window(config, gran, window, now).await?;
        let written = self.aggregates.replace_window(
            &config.name,
            &gran.name,
            window.start,
            window.end,
            buckets,
        ) as u64;
        metrics().buckets_written.inc_by(written);
        Ok(written)
    }

    /// Buckets for every non-empty interval of `window`.
    async fn compute_window(
        &self,
        config: &StreamConfig,
        gran: &GranularitySpec,
        window: TimeRange,
        now: DateTime<Utc>,
    ) -> Result<Vec<AggregateBucket>> {
        let width = gran.width_ms();
        let points = self.chunks.read_range(&config.name, window).await?;

        let mut grouped: BTreeMap<i64, Vec<Point>> = BTreeMap::new();
        for point in points {
            grouped
                .entry(align_down(point.timestamp_ms(), width))
                .or_default()
                .push(point);
        }

        grouped
            .into_iter()
            .map(|(start_ms, points)| {
                self.functions.compute(
                    &config.name,
                    config.value_type,
                    &gran.name,
                    millis_to_datetime(start_ms)?,
                    millis_to_datetime(start_ms.saturating_add(width))?,
                    points,
                    now,
                )
            })
            .collect()
    }
}

/// Shrinks `[start_ms, end_ms)` to whole buckets no older than the retention
/// horizon. `None` when nothing is left.
fn clamp_window(
    config: &StreamConfig,
    gran: &GranularitySpec,
    start_ms: i64,
    end_ms: i64,
    now: DateTime<Utc>,
) -> Result<Option<TimeRange>> {
    let width = gran.width_ms();
    let floor = config.retention_horizon(now)?.timestamp_millis();
    let start_ms = align_up(start_ms.max(floor), width);
    let end_ms = align_down(end_ms, width);
    if start_ms >= end_ms {
        return Ok(None);
    }
    TimeRange::from_millis(start_ms, end_ms).map(Some)
}

fn diff_buckets(computed: &[AggregateBucket], stored: &[AggregateBucket]) -> Vec<Error> {
    let computed: BTreeMap<_, _> = computed.iter().map(|b| (b.bucket_start, b)).collect();
    let stored: BTreeMap<_, _> = stored.iter().map(|b| (b.bucket_start, b)).collect();

    let mut violations = Vec::new();
    for (start, bucket) in &computed {
        let message = match stored.get(start) {
            None => "bucket missing from store",
            Some(existing) if !existing.same_content(bucket) => "stored statistics differ",
            Some(_) => continue,
        };
        violations.push(violation(bucket, message));
    }
    for (start, bucket) in &stored {
        if !computed.contains_key(start) {
            violations.push(violation(bucket, "stored bucket has no raw data"));
        }
    }
    violations
}

fn violation(bucket: &AggregateBucket, message: &str) -> Error {
    Error::ConsistencyViolation {
        stream: bucket.stream.clone(),
        granularity: bucket.granularity.clone(),
        bucket_start: bucket.bucket_start,
        message: message.to_string(),
    }
}
