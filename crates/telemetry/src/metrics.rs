//! Internal metrics collection.
//!
//! Collected in-memory with relaxed atomics; snapshots are served by the API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// A counter metric.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// A gauge metric (can go up or down).
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn set(&self, val: u64) {
        self.0.store(val, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Saturates at zero.
    pub fn dec(&self) {
        let _ = self
            .0
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| Some(v.saturating_sub(1)));
    }
}

/// Histogram for pass durations.
#[derive(Debug)]
pub struct Histogram {
    /// Buckets: 1ms, 10ms, 100ms, 1s, 10s, 1m, 10m, overflow
    buckets: [AtomicU64; 8],
    sum: AtomicU64,
    count: AtomicU64,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    const BUCKET_BOUNDS: [u64; 7] = [1, 10, 100, 1_000, 10_000, 60_000, 600_000];

    pub fn new() -> Self {
        Self {
            buckets: Default::default(),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Records a value in milliseconds.
    pub fn observe(&self, ms: u64) {
        self.sum.fetch_add(ms, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        let idx = Self::BUCKET_BOUNDS
            .iter()
            .position(|&bound| ms <= bound)
            .unwrap_or(Self::BUCKET_BOUNDS.len());
        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn sum(&self) -> u64 {
        self.sum.load(Ordering::Relaxed)
    }

    pub fn mean(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            0.0
        } else {
            self.sum() as f64 / count as f64
        }
    }

    /// Returns `(upper_bound_ms, count)` pairs; the overflow bucket has bound `u64::MAX`.
    pub fn buckets(&self) -> Vec<(u64, u64)> {
        Self::BUCKET_BOUNDS
            .iter()
            .copied()
            .chain(std::iter::once(u64::MAX))
            .zip(self.buckets.iter())
            .map(|(bound, count)| (bound, count.load(Ordering::Relaxed)))
            .collect()
    }
}

/// Collected metrics for the lifecycle engine.
#[derive(Debug, Default)]
pub struct Metrics {
    // Ingestion
    pub points_ingested: Counter,
    pub points_rejected: Counter,
    pub chunks_created: Counter,

    // Compression
    pub chunks_compressed: Counter,
    pub chunks_decompressed: Counter,
    pub compression_failures: Counter,
    pub bytes_before_compression: Counter,
    pub bytes_after_compression: Counter,

    // Retention
    pub chunks_dropped: Counter,
    pub rows_dropped: Counter,
    pub chunks_archived: Counter,
    pub archival_failures: Counter,
    pub deletions_blocked: Counter,

    // Aggregation
    pub buckets_written: Counter,
    pub consistency_repairs: Counter,

    // Pass latency
    pub compression_pass_ms: Histogram,
    pub retention_pass_ms: Histogram,
    pub aggregation_pass_ms: Histogram,

    // Gauges
    pub hot_chunks: Gauge,
    pub compressed_chunks: Gauge,
    pub running_jobs: Gauge,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub points_ingested: u64,
    pub points_rejected: u64,
    pub chunks_created: u64,
    pub chunks_compressed: u64,
    pub chunks_decompressed: u64,
    pub compression_failures: u64,
    pub compression_ratio: Option<f64>,
    pub chunks_dropped: u64,
    pub rows_dropped: u64,
    pub chunks_archived: u64,
    pub archival_failures: u64,
    pub deletions_blocked: u64,
    pub buckets_written: u64,
    pub consistency_repairs: u64,
    pub compression_pass_mean_ms: f64,
    pub retention_pass_mean_ms: f64,
    pub aggregation_pass_mean_ms: f64,
    pub hot_chunks: u64,
    pub compressed_chunks: u64,
    pub running_jobs: u64,
}

impl Metrics {
    /// Takes a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let before = self.bytes_before_compression.get();
        let after = self.bytes_after_compression.get();

        MetricsSnapshot {
            timestamp: Utc::now(),
            points_ingested: self.points_ingested.get(),
            points_rejected: self.points_rejected.get(),
            chunks_created: self.chunks_created.get(),
            chunks_compressed: self.chunks_compressed.get(),
            chunks_decompressed: self.chunks_decompressed.get(),
            compression_failures: self.compression_failures.get(),
            compression_ratio: (after > 0).then(|| before as f64 / after as f64),
            chunks_dropped: self.chunks_dropped.get(),
            rows_dropped: self.rows_dropped.get(),
            chunks_archived: self.chunks_archived.get(),
            archival_failures: self.archival_failures.get(),
            deletions_blocked: self.deletions_blocked.get(),
            buckets_written: self.buckets_written.get(),
            consistency_repairs: self.consistency_repairs.get(),
            compression_pass_mean_ms: self.compression_pass_ms.mean(),
            retention_pass_mean_ms: self.retention_pass_ms.mean(),
            aggregation_pass_mean_ms: self.aggregation_pass_ms.mean(),
            hot_chunks: self.hot_chunks.get(),
            compressed_chunks: self.compressed_chunks.get(),
            running_jobs: self.running_jobs.get(),
        }
    }
}

/// Global metrics registry.
pub static METRICS: std::sync::LazyLock<Metrics> = std::sync::LazyLock::new(Metrics::new);

/// Get the global metrics instance.
pub fn metrics() -> &'static Metrics {
    &METRICS
}
