//! Chunked storage for the lifecycle engine.
//!
//! Holds the stream registry, time-partitioned chunks in their hot and
//! compressed forms, materialized aggregate buckets, the archival logger, and
//! the dashboard composer that reads buckets back.

pub mod aggregates;
pub mod archival;
pub mod archive;
pub mod audit;
pub mod chunks;
pub mod composite;
pub mod encoding;
pub mod registry;

pub use aggregates::AggregateStore;
pub use archival::{encode_rows, object_location, ArchivalLog, ArchivalLogger};
pub use archive::{checksum, ArchiveStorage, FsArchiveStorage, MemoryArchiveStorage};
pub use audit::AuditLog;
pub use chunks::{
    AppendSummary, ChunkBody, ChunkData, ChunkHandle, ChunkManager, CompressionOutcome,
};
pub use composite::{DashboardComposer, EntityRegistry, LatestBucket};
pub use encoding::CompressedChunk;
pub use registry::StreamRegistry;
