//! Chunk manager: time partitioning, routing, and per-chunk state.
//!
//! Each stream keeps an index of chunks keyed by start. Chunk metadata lives
//! in atomics so listings never wait on a chunk lock; the rows live behind a
//! per-chunk `tokio::sync::RwLock` that compression, decompression and
//! deletion take exclusively.

use chrono::{DateTime, Utc};
use engine_core::{
    align_down, validate_point, ChunkId, ChunkInfo, ChunkRef, ChunkState, CompressionPolicy,
    Error, Point, Result, StreamConfig, TimeRange,
};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use telemetry::metrics;
use tokio::sync::{RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

use crate::encoding::{hot_point_bytes, CompressedChunk};
use crate::registry::StreamRegistry;

/// Appends racing a deletion re-route this many times before giving up.
const MAX_ROUTE_ATTEMPTS: usize = 3;

/// Row storage of a chunk.
#[derive(Debug)]
pub enum ChunkData {
    Hot(Vec<Point>),
    Compressed(CompressedChunk),
}

/// Lock-protected body of a chunk.
#[derive(Debug)]
pub struct ChunkBody {
    data: ChunkData,
    dropped: bool,
}

impl ChunkBody {
    fn new() -> Self {
        Self {
            data: ChunkData::Hot(Vec::new()),
            dropped: false,
        }
    }

    pub fn is_dropped(&self) -> bool {
        self.dropped
    }

    pub fn is_compressed(&self) -> bool {
        matches!(self.data, ChunkData::Compressed(_))
    }

    pub fn data(&self) -> &ChunkData {
        &self.data
    }

    /// Copies every committed row; decodes compressed chunks.
    pub fn rows(&self) -> Result<Vec<Point>> {
        if self.dropped {
            return Ok(Vec::new());
        }
        match &self.data {
            ChunkData::Hot(points) => Ok(points.clone()),
            ChunkData::Compressed(chunk) => chunk.decode(),
        }
    }
}

/// Sizes recorded by a compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionOutcome {
    pub rows: u64,
    pub bytes_before: u64,
    pub bytes_after: u64,
}

/// A chunk and its metadata.
#[derive(Debug)]
pub struct ChunkHandle {
    id: ChunkId,
    stream: String,
    range: TimeRange,
    created_at: DateTime<Utc>,
    compressed: AtomicBool,
    row_count: AtomicU64,
    approx_bytes: AtomicU64,
    compressed_at: Mutex<Option<DateTime<Utc>>>,
    decompressed_at: Mutex<Option<DateTime<Utc>>>,
    body: tokio::sync::RwLock<ChunkBody>,
}

impl ChunkHandle {
    fn new(stream: &str, range: TimeRange, created_at: DateTime<Utc>) -> Self {
        Self {
            id: ChunkId::new(),
            stream: stream.to_string(),
            range,
            created_at,
            compressed: AtomicBool::new(false),
            row_count: AtomicU64::new(0),
            approx_bytes: AtomicU64::new(0),
            compressed_at: Mutex::new(None),
            decompressed_at: Mutex::new(None),
            body: tokio::sync::RwLock::new(ChunkBody::new()),
        }
    }

    pub fn id(&self) -> ChunkId {
        self.id
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }

    pub fn range(&self) -> TimeRange {
        self.range
    }

    pub fn is_compressed(&self) -> bool {
        self.compressed.load(Ordering::Acquire)
    }

    pub fn row_count(&self) -> u64 {
        self.row_count.load(Ordering::Relaxed)
    }

    pub fn approx_bytes(&self) -> u64 {
        self.approx_bytes.load(Ordering::Relaxed)
    }

    pub fn decompressed_at(&self) -> Option<DateTime<Utc>> {
        *self.decompressed_at.lock()
    }

    pub fn info(&self) -> ChunkInfo {
        ChunkInfo {
            id: self.id,
            stream: self.stream.clone(),
            range: self.range,
            state: if self.is_compressed() {
                ChunkState::Compressed
            } else {
                ChunkState::Hot
            },
            row_count: self.row_count(),
            approx_bytes: self.approx_bytes(),
            created_at: self.created_at,
            compressed_at: *self.compressed_at.lock(),
            decompressed_at: self.decompressed_at(),
        }
    }

    pub fn to_ref(&self, created: bool) -> ChunkRef {
        ChunkRef {
            id: self.id,
            stream: self.stream.clone(),
            range: self.range,
            created,
        }
    }

    /// Shared access to the rows.
    pub async fn read(&self) -> RwLockReadGuard<'_, ChunkBody> {
        self.body.read().await
    }

    /// Exclusive access, as held by compression, decompression and deletion.
    pub async fn write(&self) -> RwLockWriteGuard<'_, ChunkBody> {
        self.body.write().await
    }

    /// Copies the committed rows.
    pub async fn snapshot(&self) -> Result<Vec<Point>> {
        self.read().await.rows()
    }

    /// Appends rows to a hot chunk. `Ok(false)` means the chunk was dropped
    /// before the lock was acquired and the caller must re-route.
    async fn append(&self, points: &[Point]) -> Result<bool> {
        let mut body = self.write().await;
        if body.dropped {
            return Ok(false);
        }
        if body.is_compressed() {
            return Err(Error::ChunkCompressed(self.id));
        }
        self.extend_locked(&mut body, points);
        Ok(true)
    }

    /// Appends under a write lock the caller already holds on a live hot body.
    fn extend_locked(&self, body: &mut ChunkBody, points: &[Point]) {
        if let ChunkData::Hot(rows) = &mut body.data {
            let bytes: u64 = points.iter().map(hot_point_bytes).sum();
            rows.extend_from_slice(points);
            self.row_count.store(rows.len() as u64, Ordering::Relaxed);
            self.approx_bytes.fetch_add(bytes, Ordering::Relaxed);
        }
    }

    /// Encodes the chunk and swaps the body in one step.
    pub async fn compress(
        &self,
        policy: &CompressionPolicy,
        now: DateTime<Utc>,
    ) -> Result<CompressionOutcome> {
        let mut body = self.write().await;
        if body.dropped {
            return Err(Error::ChunkNotFound(self.id));
        }
        let ChunkData::Hot(rows) = &body.data else {
            return Err(Error::AlreadyCompressed(self.id));
        };

        let encoded = CompressedChunk::encode(rows, policy)?;
        let outcome = CompressionOutcome {
            rows: encoded.row_count(),
            bytes_before: self.approx_bytes(),
            bytes_after: encoded.encoded_bytes(),
        };

        body.data = ChunkData::Compressed(encoded);
        self.approx_bytes.store(outcome.bytes_after, Ordering::Relaxed);
        *self.compressed_at.lock() = Some(now);
        *self.decompressed_at.lock() = None;
        self.compressed.store(true, Ordering::Release);

        let m = metrics();
        m.hot_chunks.dec();
        m.compressed_chunks.inc();

        Ok(outcome)
    }

    /// Restores the hot representation. Returns the row count.
    pub async fn decompress(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut body = self.write().await;
        if body.dropped {
            return Err(Error::ChunkNotFound(self.id));
        }
        let ChunkData::Compressed(chunk) = &body.data else {
            return Err(Error::AlreadyDecompressed(self.id));
        };

        let rows = chunk.decode()?;
        let bytes: u64 = rows.iter().map(hot_point_bytes).sum();
        let count = rows.len() as u64;

        body.data = ChunkData::Hot(rows);
        self.approx_bytes.store(bytes, Ordering::Relaxed);
        self.row_count.store(count, Ordering::Relaxed);
        *self.compressed_at.lock() = None;
        *self.decompressed_at.lock() = Some(now);
        self.compressed.store(false, Ordering::Release);

        let m = metrics();
        m.compressed_chunks.dec();
        m.hot_chunks.inc();

        Ok(count)
    }
}

/// Chunk index of one stream, keyed by range start in milliseconds.
#[derive(Debug, Default)]
pub struct StreamChunks {
    index: RwLock<BTreeMap<i64, Arc<ChunkHandle>>>,
}

impl StreamChunks {
    fn find(index: &BTreeMap<i64, Arc<ChunkHandle>>, ts_ms: i64) -> Option<Arc<ChunkHandle>> {
        index
            .range(..=ts_ms)
            .next_back()
            .filter(|(_, handle)| ts_ms < handle.range.end_ms())
            .map(|(_, handle)| handle.clone())
    }

    /// Aligned range for a new chunk, clipped against its neighbours so that
    /// an interval change never produces overlaps.
    fn new_range(
        index: &BTreeMap<i64, Arc<ChunkHandle>>,
        ts_ms: i64,
        interval_ms: i64,
    ) -> Result<TimeRange> {
        let mut start = align_down(ts_ms, interval_ms);
        let mut end = start.saturating_add(interval_ms);

        if let Some((_, prev)) = index.range(..=ts_ms).next_back() {
            start = start.max(prev.range.end_ms());
        }
        if let Some((_, next)) = index.range(ts_ms.saturating_add(1)..).next() {
            end = end.min(next.range.start_ms());
        }

        TimeRange::from_millis(start, end)
    }

    pub fn handles(&self) -> Vec<Arc<ChunkHandle>> {
        self.index.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.index.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.read().is_empty()
    }
}

/// Ingestion batch result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppendSummary {
    pub accepted: u64,
    pub chunks_created: u64,
}

/// Owns all chunks of all streams.
pub struct ChunkManager {
    registry: Arc<StreamRegistry>,
    streams: RwLock<HashMap<String, Arc<StreamChunks>>>,
    by_id: RwLock<HashMap<ChunkId, Arc<ChunkHandle>>>,
}

impl ChunkManager {
    pub fn new(registry: Arc<StreamRegistry>) -> Self {
        Self {
            registry,
            streams: RwLock::new(HashMap::new()),
            by_id: RwLock::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<StreamRegistry> {
        &self.registry
    }

    fn stream_chunks(&self, stream: &str) -> Arc<StreamChunks> {
        if let Some(chunks) = self.streams.read().get(stream) {
            return chunks.clone();
        }
        self.streams
            .write()
            .entry(stream.to_string())
            .or_default()
            .clone()
    }

    /// Finds the chunk containing `timestamp`, creating it if needed.
    pub fn route_point(&self, stream: &str, timestamp: DateTime<Utc>) -> Result<ChunkRef> {
        let config = self.registry.get(stream)?;
        let (handle, created) = self.route(&config, timestamp.timestamp_millis())?;
        Ok(handle.to_ref(created))
    }

    fn route(&self, config: &StreamConfig, ts_ms: i64) -> Result<(Arc<ChunkHandle>, bool)> {
        let chunks = self.stream_chunks(&config.name);

        if let Some(handle) = StreamChunks::find(&chunks.index.read(), ts_ms) {
            return Ok((handle, false));
        }

        let mut index = chunks.index.write();
        if let Some(handle) = StreamChunks::find(&index, ts_ms) {
            return Ok((handle, false));
        }

        let range = StreamChunks::new_range(&index, ts_ms, config.chunk_interval_ms())?;
        let handle = Arc::new(ChunkHandle::new(&config.name, range, Utc::now()));
        index.insert(range.start_ms(), handle.clone());
        self.by_id.write().insert(handle.id, handle.clone());
        drop(index);

        let m = metrics();
        m.chunks_created.inc();
        m.hot_chunks.inc();

        debug!(
            stream = %config.name,
            chunk_id = %handle.id,
            range = %range,
            "Created chunk"
        );

        Ok((handle, true))
    }

    /// Validates and appends one point.
    pub async fn append_point(&self, stream: &str, point: Point) -> Result<ChunkRef> {
        let config = self.registry.get(stream)?;
        if let Err(e) = validate_point(&point, config.value_type) {
            metrics().points_rejected.inc();
            return Err(e);
        }

        let ts_ms = point.timestamp_ms();
        let points = [point];
        let mut created_any = false;

        for _ in 0..MAX_ROUTE_ATTEMPTS {
            let (handle, created) = self.route(&config, ts_ms)?;
            created_any |= created;
            if handle.append(&points).await? {
                metrics().points_ingested.inc();
                return Ok(handle.to_ref(created_any));
            }
            debug!(stream = %stream, chunk_id = %handle.id, "Chunk dropped during append, re-routing");
        }

        Err(Error::internal(format!(
            "{}: chunk for {} kept disappearing during append",
            stream, ts_ms
        )))
    }

    /// Validates a batch, then appends it grouped by chunk.
    ///
    /// The batch is all or nothing. Validation runs before routing, and the
    /// write locks of every target chunk are taken in `ChunkId` order before
    /// any row is written, so a compressed target rejects the whole batch and
    /// a dropped target re-routes the whole batch.
    pub async fn append_points(&self, stream: &str, points: Vec<Point>) -> Result<AppendSummary> {
        let config = self.registry.get(stream)?;
        for point in &points {
            if let Err(e) = validate_point(point, config.value_type) {
                metrics().points_rejected.inc_by(points.len() as u64);
                return Err(e);
            }
        }

        let mut summary = AppendSummary::default();
        let mut pending = points;

        for _ in 0..MAX_ROUTE_ATTEMPTS {
            let mut groups: BTreeMap<ChunkId, (Arc<ChunkHandle>, Vec<Point>)> = BTreeMap::new();
            for point in pending.drain(..) {
                let (handle, created) = self.route(&config, point.timestamp_ms())?;
                if created {
                    summary.chunks_created += 1;
                }
                groups
                    .entry(handle.id)
                    .or_insert_with(|| (handle, Vec::new()))
                    .1
                    .push(point);
            }

            let committed = {
                let mut locked = Vec::with_capacity(groups.len());
                for (handle, rows) in groups.values() {
                    let body = handle.write().await;
                    locked.push((handle, rows, body));
                }

                if locked.iter().any(|(_, _, body)| body.dropped) {
                    false
                } else {
                    if let Some((handle, _, _)) =
                        locked.iter().find(|(_, _, body)| body.is_compressed())
                    {
                        metrics().points_rejected.inc_by(
                            groups.values().map(|(_, rows)| rows.len() as u64).sum(),
                        );
                        return Err(Error::ChunkCompressed(handle.id));
                    }
                    for (handle, rows, body) in locked.iter_mut() {
                        handle.extend_locked(&mut **body, rows.as_slice());
                        summary.accepted += rows.len() as u64;
                    }
                    true
                }
            };

            if committed {
                metrics().points_ingested.inc_by(summary.accepted);
                return Ok(summary);
            }

            debug!(stream = %stream, "Chunk dropped during append, re-routing batch");
            pending = groups.into_values().flat_map(|(_, rows)| rows).collect();
        }

        Err(Error::internal(format!(
            "{}: {} points could not be placed",
            stream,
            pending.len()
        )))
    }

    /// Chunk handles of a stream, ordered by range start.
    pub fn handles(&self, stream: &str) -> Result<Vec<Arc<ChunkHandle>>> {
        self.registry.get(stream)?;
        Ok(self
            .streams
            .read()
            .get(stream)
            .map(|chunks| chunks.handles())
            .unwrap_or_default())
    }

    /// Chunk metadata of a stream, ordered by range start.
    pub fn chunks(&self, stream: &str) -> Result<Vec<ChunkInfo>> {
        Ok(self.handles(stream)?.iter().map(|h| h.info()).collect())
    }

    pub fn handle(&self, id: ChunkId) -> Result<Arc<ChunkHandle>> {
        self.by_id
            .read()
            .get(&id)
            .cloned()
            .ok_or(Error::ChunkNotFound(id))
    }

    pub fn chunk(&self, id: ChunkId) -> Result<ChunkInfo> {
        Ok(self.handle(id)?.info())
    }

    /// Committed rows with timestamps in `range`, in canonical order.
    pub async fn read_range(&self, stream: &str, range: TimeRange) -> Result<Vec<Point>> {
        let mut rows = Vec::new();
        for handle in self.handles(stream)? {
            if !handle.range.overlaps(&range) {
                continue;
            }
            let snapshot = handle.snapshot().await?;
            rows.extend(snapshot.into_iter().filter(|p| range.contains(p.timestamp)));
        }
        rows.sort_by(Point::canonical_cmp);
        Ok(rows)
    }

    /// Drops a chunk. The caller holds the chunk's write lock and passes its
    /// body; the body is cleared and the chunk unlinked from every index.
    /// Returns the number of rows removed.
    pub fn remove(&self, handle: &ChunkHandle, body: &mut ChunkBody) -> u64 {
        if body.dropped {
            return 0;
        }

        let rows = handle.row_count();
        let was_compressed = body.is_compressed();
        body.dropped = true;
        body.data = ChunkData::Hot(Vec::new());

        if let Some(chunks) = self.streams.read().get(&handle.stream) {
            let mut index = chunks.index.write();
            if index
                .get(&handle.range.start_ms())
                .is_some_and(|h| h.id == handle.id)
            {
                index.remove(&handle.range.start_ms());
            } else {
                warn!(chunk_id = %handle.id, "Dropped chunk was not in its stream index");
            }
        }
        self.by_id.write().remove(&handle.id);

        let m = metrics();
        if was_compressed {
            m.compressed_chunks.dec();
        } else {
            m.hot_chunks.dec();
        }
        m.chunks_dropped.inc();
        m.rows_dropped.inc_by(rows);

        info!(
            stream = %handle.stream,
            chunk_id = %handle.id,
            range = %handle.range,
            rows = rows,
            "Removed chunk"
        );

        rows
    }

    /// Total chunks across all streams.
    pub fn total_chunks(&self) -> usize {
        self.by_id.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{numeric_spec, t0};
    use chrono::{Duration, TimeZone};
    use engine_core::limits::HOUR_SECS;
    use proptest::prelude::*;

    fn manager() -> ChunkManager {
        let registry = Arc::new(StreamRegistry::new());
        registry.register(numeric_spec("line1.temp"), t0()).unwrap();
        ChunkManager::new(registry)
    }

    fn assert_partitioned(infos: &[ChunkInfo]) {
        for pair in infos.windows(2) {
            assert!(
                pair[0].range.end <= pair[1].range.start,
                "overlap between {} and {}",
                pair[0].range,
                pair[1].range
            );
        }
    }

    #[tokio::test]
    async fn test_ten_thousand_points_over_three_hours() {
        let manager = manager();
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 6, 0, 0).unwrap();
        let step_ms = (3 * HOUR_SECS as i64 * 1000) / 10_000;

        let points: Vec<Point> = (0..10_000)
            .map(|i| Point::numeric(start + Duration::milliseconds(i * step_ms), i as f64))
            .collect();
        let summary = manager.append_points("line1.temp", points).await.unwrap();
        assert_eq!(summary.accepted, 10_000);
        assert_eq!(summary.chunks_created, 3);

        let infos = manager.chunks("line1.temp").unwrap();
        assert_eq!(infos.len(), 3);
        for info in &infos {
            assert_eq!(info.range.start_ms() % (HOUR_SECS as i64 * 1000), 0);
            assert_eq!(info.range.end - info.range.start, Duration::hours(1));
        }
        let total: u64 = infos.iter().map(|i| i.row_count).sum();
        assert_eq!(total, 10_000);
    }

    #[tokio::test]
    async fn test_route_is_idempotent() {
        let manager = manager();
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 6, 30, 0).unwrap();
        let first = manager.route_point("line1.temp", ts).unwrap();
        let second = manager.route_point("line1.temp", ts + Duration::minutes(10)).unwrap();
        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_concurrent_routing_creates_one_chunk() {
        let manager = Arc::new(manager());
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 6, 30, 0).unwrap();

        let mut tasks = Vec::new();
        for i in 0..16 {
            let manager = manager.clone();
            tasks.push(tokio::spawn(async move {
                manager
                    .append_point("line1.temp", Point::numeric(ts + Duration::seconds(i), 1.0))
                    .await
                    .unwrap()
                    .id
            }));
        }

        let mut ids = Vec::new();
        for task in tasks {
            ids.push(task.await.unwrap());
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(manager.chunks("line1.temp").unwrap()[0].row_count, 16);
    }

    #[tokio::test]
    async fn test_pre_epoch_alignment() {
        let manager = manager();
        let ts = Utc.with_ymd_and_hms(1969, 12, 31, 23, 30, 0).unwrap();
        let chunk = manager.route_point("line1.temp", ts).unwrap();
        assert_eq!(chunk.range.start, Utc.with_ymd_and_hms(1969, 12, 31, 23, 0, 0).unwrap());
        assert_eq!(chunk.range.end, Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn test_interval_change_clips_new_chunk() {
        let manager = manager();
        let base = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();

        manager.route_point("line1.temp", base + Duration::minutes(30)).unwrap();
        manager.registry().set_chunk_interval("line1.temp", 86_400).unwrap();
        let daily = manager.route_point("line1.temp", base + Duration::hours(5)).unwrap();

        assert_eq!(daily.range.start, base + Duration::hours(1));
        assert_eq!(daily.range.end, base + Duration::days(1));
        assert_partitioned(&manager.chunks("line1.temp").unwrap());
    }

    #[tokio::test]
    async fn test_type_mismatch_rejected() {
        let manager = manager();
        let err = manager
            .append_point("line1.temp", Point::boolean(t0(), true))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALID_001");
        assert!(manager.chunks("line1.temp").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_stream() {
        let manager = manager();
        assert!(matches!(
            manager.append_point("nope", Point::numeric(t0(), 1.0)).await,
            Err(Error::StreamNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_append_to_compressed_chunk_rejected() {
        let manager = manager();
        let chunk = manager
            .append_point("line1.temp", Point::numeric(t0(), 1.0))
            .await
            .unwrap();
        let handle = manager.handle(chunk.id).unwrap();
        let config = manager.registry().get("line1.temp").unwrap();
        handle.compress(&config.compression, t0()).await.unwrap();

        let err = manager
            .append_point("line1.temp", Point::numeric(t0(), 2.0))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ChunkCompressed(id) if id == chunk.id));
    }

    #[tokio::test]
    async fn test_batch_touching_compressed_chunk_writes_nothing() {
        let manager = manager();
        let chunk = manager
            .append_point("line1.temp", Point::numeric(t0(), 1.0))
            .await
            .unwrap();
        let handle = manager.handle(chunk.id).unwrap();
        let config = manager.registry().get("line1.temp").unwrap();
        handle.compress(&config.compression, t0()).await.unwrap();

        let batch = vec![
            Point::numeric(t0() + Duration::hours(5), 2.0),
            Point::numeric(t0() + Duration::minutes(1), 3.0),
        ];
        let err = manager.append_points("line1.temp", batch).await.unwrap_err();
        assert!(matches!(err, Error::ChunkCompressed(id) if id == chunk.id));

        let infos = manager.chunks("line1.temp").unwrap();
        let total: u64 = infos.iter().map(|i| i.row_count).sum();
        assert_eq!(total, 1);
        let later = TimeRange::new(t0() + Duration::hours(5), t0() + Duration::hours(6)).unwrap();
        assert!(manager.read_range("line1.temp", later).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_compress_decompress_restores_rows() {
        let manager = manager();
        let points: Vec<Point> = (0..50)
            .map(|i| {
                Point::numeric(t0() + Duration::seconds(i), (i * 7 % 13) as f64)
                    .with_tag("sensor", format!("s{}", i % 4))
            })
            .collect();
        manager.append_points("line1.temp", points).await.unwrap();
        let handle = manager.handles("line1.temp").unwrap().remove(0);
        let before = handle.snapshot().await.unwrap();
        let config = manager.registry().get("line1.temp").unwrap();

        handle.compress(&config.compression, t0()).await.unwrap();
        assert!(handle.is_compressed());
        assert!(matches!(
            handle.compress(&config.compression, t0()).await,
            Err(Error::AlreadyCompressed(_))
        ));

        assert_eq!(handle.decompress(t0()).await.unwrap(), 50);
        assert_eq!(handle.info().decompressed_at, Some(t0()));
        let mut after = handle.snapshot().await.unwrap();
        let mut before = before;
        before.sort_by(Point::canonical_cmp);
        after.sort_by(Point::canonical_cmp);
        assert_eq!(before, after);
        assert!(matches!(
            handle.decompress(t0()).await,
            Err(Error::AlreadyDecompressed(_))
        ));
    }

    #[tokio::test]
    async fn test_append_after_remove_reroutes() {
        let manager = manager();
        let chunk = manager
            .append_point("line1.temp", Point::numeric(t0(), 1.0))
            .await
            .unwrap();
        let handle = manager.handle(chunk.id).unwrap();
        {
            let mut body = handle.write().await;
            assert_eq!(manager.remove(&handle, &mut body), 1);
        }
        assert!(manager.handle(chunk.id).is_err());

        let next = manager
            .append_point("line1.temp", Point::numeric(t0(), 2.0))
            .await
            .unwrap();
        assert_ne!(next.id, chunk.id);
        assert!(next.created);
    }

    #[tokio::test]
    async fn test_read_range_is_half_open() {
        let manager = manager();
        let base = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let points: Vec<Point> = (0..4)
            .map(|h| Point::numeric(base + Duration::hours(h), h as f64))
            .collect();
        manager.append_points("line1.temp", points).await.unwrap();

        let range = TimeRange::new(base + Duration::hours(1), base + Duration::hours(3)).unwrap();
        let rows = manager.read_range("line1.temp", range).await.unwrap();
        let values: Vec<f64> = rows.iter().filter_map(|p| p.value.as_f64()).collect();
        assert_eq!(values, vec![1.0, 2.0]);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_chunks_partition_observed_time(
            offsets in proptest::collection::vec(-200_000_000i64..200_000_000, 1..200),
            switch_at in 0usize..200,
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            runtime.block_on(async {
                let manager = manager();
                let base = t0().timestamp_millis();

                for (i, offset) in offsets.iter().enumerate() {
                    if i == switch_at {
                        manager.registry().set_chunk_interval("line1.temp", 600).unwrap();
                    }
                    let ts = DateTime::from_timestamp_millis(base + offset).unwrap();
                    manager.append_point("line1.temp", Point::numeric(ts, 1.0)).await.unwrap();
                }

                let infos = manager.chunks("line1.temp").unwrap();
                assert_partitioned(&infos);

                for offset in &offsets {
                    let ts = DateTime::from_timestamp_millis(base + offset).unwrap();
                    let owners = infos.iter().filter(|c| c.range.contains(ts)).count();
                    assert_eq!(owners, 1);
                }

                let rows: u64 = infos.iter().map(|c| c.row_count).sum();
                assert_eq!(rows, offsets.len() as u64);
            });
        }
    }
}
