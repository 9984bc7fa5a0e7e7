//! Limits and time constants for the lifecycle engine.
//!
//! Limits bound the memory a single registration or point can pin. The
//! `#[validate]` derive requires literal values in attributes, so a few of
//! these are duplicated on `StreamSpec`. Keep both in sync when modifying.

// === Time ===

pub const MINUTE_SECS: u64 = 60;
pub const HOUR_SECS: u64 = 60 * MINUTE_SECS;
pub const DAY_SECS: u64 = 24 * HOUR_SECS;
pub const WEEK_SECS: u64 = 7 * DAY_SECS;

// === Stream Registration ===

/// Stream name max length.
pub const MAX_STREAM_NAME_LEN: usize = 128;

/// Smallest chunk interval accepted (1 minute).
///
/// Smaller intervals explode chunk counts without improving scan cost.
pub const MIN_CHUNK_INTERVAL_SECS: u64 = MINUTE_SECS;

/// Largest chunk interval accepted (1 year).
pub const MAX_CHUNK_INTERVAL_SECS: u64 = 365 * DAY_SECS;

/// Maximum segment-by keys per compression policy.
pub const MAX_SEGMENT_KEYS: usize = 8;

/// Most distinct segment-by combinations one chunk may compress into.
pub const MAX_SEGMENTS_PER_CHUNK: usize = 4096;

/// Maximum rollup granularities per stream.
pub const MAX_GRANULARITIES: usize = 8;

/// Longest accepted policy duration (100 years): retention, hot window,
/// granularity width, trailing window, end offset and bucket retention.
pub const MAX_DURATION_SECS: u64 = 100 * 365 * DAY_SECS;

/// Default trailing window recomputed by each aggregator run (3 days).
pub const DEFAULT_TRAILING_WINDOW_SECS: u64 = 3 * DAY_SECS;

// === Points ===

/// Maximum tags per point.
pub const MAX_TAGS_PER_POINT: usize = 32;

/// Maximum tag key or value length.
pub const MAX_TAG_LEN: usize = 256;

/// Maximum categorical value length.
pub const MAX_CATEGORY_LEN: usize = 512;

// === Ingestion ===

/// Maximum points accepted in one ingest request.
pub const MAX_BATCH_POINTS: usize = 100_000;

/// Maximum ingest request body (16MB).
pub const MAX_INGEST_BODY_BYTES: usize = 16 * 1024 * 1024;

// === Audit ===

/// Audit entries kept in memory before the oldest are evicted.
pub const MAX_AUDIT_ENTRIES: usize = 10_000;

// === Archive ===

/// Archive location URL schemes with a storage backend.
pub const SUPPORTED_ARCHIVE_SCHEMES: &[&str] = &["file", "memory"];
