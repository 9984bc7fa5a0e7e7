//! Retention enforcer: drops chunks past the retention horizon, archiving
//! them first when the stream requires it.
//!
//! Eligibility is decided twice: once from chunk metadata to pick candidates,
//! and again under the chunk's exclusive lock against the stream's current
//! configuration. Only the second check can delete.

use chrono::{DateTime, Utc};
use chunk_store::{AggregateStore, ArchivalLogger, AuditLog, ChunkManager, StreamRegistry};
use engine_core::{before, Actor, AuditAction, JobType, PassReport, Result};
use std::sync::Arc;
use std::time::Instant;
use telemetry::metrics;
use tracing::{debug, error, info, warn};

/// Worker that enforces retention policies.
pub struct RetentionWorker {
    registry: Arc<StreamRegistry>,
    chunks: Arc<ChunkManager>,
    aggregates: Arc<AggregateStore>,
    archival: Arc<ArchivalLogger>,
    audit: Arc<AuditLog>,
}

impl RetentionWorker {
    pub fn new(
        registry: Arc<StreamRegistry>,
        chunks: Arc<ChunkManager>,
        aggregates: Arc<AggregateStore>,
        archival: Arc<ArchivalLogger>,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            registry,
            chunks,
            aggregates,
            archival,
            audit,
        }
    }

    /// Runs retention for one stream.
    pub async fn run_pass(&self, stream: &str, now: DateTime<Utc>) -> Result<PassReport> {
        let started = Instant::now();
        let config = self.registry.get(stream)?;
        if config.retention_paused {
            debug!(stream = %stream, "Retention paused, skipping pass");
            return Ok(PassReport::paused(JobType::Retention, stream));
        }

        let mut report = PassReport::new(JobType::Retention, stream);
        let horizon = config.retention_horizon(now)?;
        let candidates: Vec<_> = self
            .chunks
            .handles(stream)?
            .into_iter()
            .filter(|h| h.range().end < horizon)
            .collect();

        for handle in candidates {
            let mut body = handle.write().await;

            // Configuration may have changed while waiting for the lock
            let current = self.registry.get(stream)?;
            if current.retention_paused {
                info!(stream = %stream, "Retention paused mid-pass, stopping");
                break;
            }
            let expired = current
                .retention_horizon(now)
                .is_ok_and(|horizon| handle.range().end < horizon);
            if body.is_dropped() || !expired {
                report.skipped += 1;
                continue;
            }

            if current.retention.archive_before_delete {
                let archived = match current.retention.archive_location.as_deref() {
                    Some(location) => match body.rows() {
                        Ok(rows) => {
                            self.archival
                                .archive(
                                    &handle.info(),
                                    &rows,
                                    location,
                                    current.retention.archive_format,
                                    now,
                                )
                                .await
                        }
                        Err(e) => Err(e),
                    },
                    None => Err(engine_core::Error::archival(
                        handle.id(),
                        "archive_before_delete is set without an archive location",
                    )),
                };

                if let Err(e) = archived {
                    if current.archival_bypass {
                        warn!(
                            stream = %stream,
                            chunk_id = %handle.id(),
                            error = %e,
                            "Archival failed, deleting under operator bypass"
                        );
                    } else {
                        metrics().deletions_blocked.inc();
                        error!(
                            stream = %stream,
                            chunk_id = %handle.id(),
                            error = %e,
                            "Archival failed, chunk kept"
                        );
                        report.fail(handle.id().to_string(), e);
                        continue;
                    }
                }
            }

            let bytes = handle.approx_bytes();
            let rows = self.chunks.remove(&handle, &mut body);
            drop(body);

            report.processed += 1;
            report.bytes_affected += bytes;
            self.audit.record(
                now,
                Actor::Scheduler,
                AuditAction::ChunkDropped,
                stream,
                Some(handle.id()),
                format!(
                    "dropped {} rows in {} (retention {}s)",
                    rows,
                    handle.range(),
                    current.retention.duration_secs
                ),
            );
        }

        let pruned = self.prune_aggregates(stream, now)?;

        metrics()
            .retention_pass_ms
            .observe(started.elapsed().as_millis() as u64);

        if report.processed > 0 || pruned > 0 || !report.failures.is_empty() {
            info!(
                stream = %stream,
                dropped_chunks = report.processed,
                dropped_bytes = report.bytes_affected,
                dropped_bytes_human = %format_bytes(report.bytes_affected),
                pruned_buckets = pruned,
                blocked = report.failures.len(),
                "Retention pass complete"
            );
        }

        Ok(report)
    }

    /// Removes buckets of granularities that carry their own retention.
    fn prune_aggregates(&self, stream: &str, now: DateTime<Utc>) -> Result<usize> {
        let config = self.registry.get(stream)?;
        let mut pruned = 0;
        for gran in &config.aggregates {
            if let Some(retention) = gran.retention() {
                pruned += self
                    .aggregates
                    .prune_before(stream, &gran.name, before(now, retention)?);
            }
        }
        Ok(pruned)
    }
}

/// Format bytes into human-readable string.
fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
