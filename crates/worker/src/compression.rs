//! Compression scheduler: moves chunks past the hot window into the
//! compressed tier.

use chrono::{DateTime, Utc};
use chunk_store::{AuditLog, ChunkManager, CompressionOutcome, StreamRegistry};
use engine_core::{Actor, AuditAction, ChunkId, Error, JobType, PassReport, Result};
use std::sync::Arc;
use std::time::Instant;
use telemetry::metrics;
use tracing::{debug, info, warn};

/// Worker that compresses eligible chunks.
pub struct CompressionWorker {
    registry: Arc<StreamRegistry>,
    chunks: Arc<ChunkManager>,
    audit: Arc<AuditLog>,
}

impl CompressionWorker {
    pub fn new(
        registry: Arc<StreamRegistry>,
        chunks: Arc<ChunkManager>,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            registry,
            chunks,
            audit,
        }
    }

    /// Compresses every hot chunk of `stream` ending before `now - hot_window`.
    ///
    /// A chunk that fails is reported and left hot; the next pass retries it.
    /// A chunk an operator decompressed stays hot for one hot window after the
    /// decompression.
    pub async fn run_pass(&self, stream: &str, now: DateTime<Utc>) -> Result<PassReport> {
        let started = Instant::now();
        let config = self.registry.get(stream)?;
        let horizon = config.compression_horizon(now)?;
        let mut report = PassReport::new(JobType::Compression, stream);

        for handle in self.chunks.handles(stream)? {
            if handle.is_compressed() || handle.range().end >= horizon {
                continue;
            }
            if handle.decompressed_at().is_some_and(|at| at > horizon) {
                debug!(chunk_id = %handle.id(), "Chunk held hot after decompression");
                report.skipped += 1;
                continue;
            }

            match handle.compress(&config.compression, now).await {
                Ok(outcome) => {
                    report.processed += 1;
                    report.bytes_affected += outcome.bytes_before;
                    self.record_compression(handle.id(), stream, Actor::Scheduler, outcome, now);
                }
                Err(e) if e.is_noop() || matches!(e, Error::ChunkNotFound(_)) => {
                    debug!(chunk_id = %handle.id(), reason = %e, "Skipping chunk");
                    report.skipped += 1;
                }
                Err(e) => {
                    metrics().compression_failures.inc();
                    warn!(
                        stream = %stream,
                        chunk_id = %handle.id(),
                        error = %e,
                        "Failed to compress chunk"
                    );
                    report.fail(handle.id().to_string(), e);
                }
            }
        }

        metrics()
            .compression_pass_ms
            .observe(started.elapsed().as_millis() as u64);

        if report.processed > 0 || !report.failures.is_empty() {
            info!(
                stream = %stream,
                compressed = report.processed,
                skipped = report.skipped,
                failed = report.failures.len(),
                bytes_before = report.bytes_affected,
                "Compression pass complete"
            );
        }

        Ok(report)
    }

    /// Compresses one chunk on operator request.
    pub async fn compress_chunk(
        &self,
        id: ChunkId,
        actor: Actor,
        now: DateTime<Utc>,
    ) -> Result<CompressionOutcome> {
        let handle = self.chunks.handle(id)?;
        let config = self.registry.get(handle.stream())?;
        let outcome = handle.compress(&config.compression, now).await?;
        self.record_compression(id, handle.stream(), actor, outcome, now);
        Ok(outcome)
    }

    /// Restores a compressed chunk to the hot tier. Returns the row count.
    pub async fn decompress_chunk(
        &self,
        id: ChunkId,
        actor: Actor,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let handle = self.chunks.handle(id)?;
        let config = self.registry.get(handle.stream())?;
        let rows = handle.decompress(now).await?;

        metrics().chunks_decompressed.inc();
        self.audit.record(
            now,
            actor,
            AuditAction::ChunkDecompressed,
            handle.stream(),
            Some(id),
            format!(
                "decompressed {} rows in {}, held hot for {}s",
                rows,
                handle.range(),
                config.compression.hot_window_secs
            ),
        );

        Ok(rows)
    }

    fn record_compression(
        &self,
        id: ChunkId,
        stream: &str,
        actor: Actor,
        outcome: CompressionOutcome,
        now: DateTime<Utc>,
    ) {
        let m = metrics();
        m.chunks_compressed.inc();
        m.bytes_before_compression.inc_by(outcome.bytes_before);
        m.bytes_after_compression.inc_by(outcome.bytes_after);

        self.audit.record(
            now,
            actor,
            AuditAction::ChunkCompressed,
            stream,
            Some(id),
            format!(
                "compressed {} rows, {} -> {} bytes",
                outcome.rows, outcome.bytes_before, outcome.bytes_after
            ),
        );
    }
}
