//! Archival logger: exports chunks before deletion and keeps the durable
//! record of every export.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use engine_core::{
    validate_archive_location, ArchivalRecord, ArchiveFormat, ChunkId, ChunkInfo, Error, Point,
    Result,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use telemetry::metrics;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use url::Url;

use crate::archive::{checksum, ArchiveStorage};

/// Append-only log of archival records.
///
/// With a path, each record is written as one JSON line and synced to disk
/// before `append` returns.
pub struct ArchivalLog {
    path: Option<PathBuf>,
    file: Mutex<Option<tokio::fs::File>>,
    records: RwLock<Vec<ArchivalRecord>>,
}

impl ArchivalLog {
    /// A log kept only in memory.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            file: Mutex::new(None),
            records: RwLock::new(Vec::new()),
        }
    }

    /// Opens (or creates) a JSONL log, loading existing records.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut records = Vec::new();
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => {
                for (line_no, line) in contents.lines().enumerate() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<ArchivalRecord>(line) {
                        Ok(record) => records.push(record),
                        Err(e) => {
                            warn!(
                                path = %path.display(),
                                line = line_no + 1,
                                error = %e,
                                "Skipping unreadable archival log line"
                            );
                        }
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        info!(path = %path.display(), records = records.len(), "Opened archival log");

        Ok(Self {
            path: Some(path),
            file: Mutex::new(Some(file)),
            records: RwLock::new(records),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Durably appends a record.
    pub async fn append(&self, record: ArchivalRecord) -> Result<()> {
        let mut file = self.file.lock().await;
        if let Some(file) = file.as_mut() {
            let mut line = serde_json::to_vec(&record)?;
            line.push(b'\n');
            file.write_all(&line).await?;
            file.sync_all().await?;
        }
        self.records.write().push(record);
        Ok(())
    }

    pub fn records(&self) -> Vec<ArchivalRecord> {
        self.records.read().clone()
    }

    pub fn for_stream(&self, stream: &str) -> Vec<ArchivalRecord> {
        self.records
            .read()
            .iter()
            .filter(|r| r.stream_name == stream)
            .cloned()
            .collect()
    }

    pub fn find(&self, chunk_id: ChunkId) -> Option<ArchivalRecord> {
        self.records
            .read()
            .iter()
            .find(|r| r.chunk_id == chunk_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

/// Object URL for an archived chunk: `{base}/{stream}/{start_ms}_{chunk_id}.{ext}`.
pub fn object_location(base: &Url, chunk: &ChunkInfo, format: ArchiveFormat) -> Result<Url> {
    let location = format!(
        "{}/{}/{}_{}.{}",
        base.as_str().trim_end_matches('/'),
        chunk.stream,
        chunk.range.start_ms(),
        chunk.id,
        format.extension()
    );
    Url::parse(&location)
        .map_err(|e| Error::archival(chunk.id, format!("bad object location {}: {}", location, e)))
}

/// Serializes chunk rows in the archive format.
pub fn encode_rows(rows: &[Point], format: ArchiveFormat) -> Result<Bytes> {
    match format {
        ArchiveFormat::Jsonl => {
            let mut out = Vec::new();
            for row in rows {
                serde_json::to_writer(&mut out, row)?;
                out.push(b'\n');
            }
            Ok(Bytes::from(out))
        }
        ArchiveFormat::Csv => {
            let mut out = String::from("timestamp,value,tags\n");
            for row in rows {
                let tags = serde_json::to_string(&row.tags)?;
                writeln!(
                    out,
                    "{},{},{}",
                    row.timestamp.to_rfc3339(),
                    csv_field(&row.value.render()),
                    csv_field(&tags)
                )
                .map_err(|e| Error::internal(format!("csv encoding failed: {}", e)))?;
            }
            Ok(Bytes::from(out))
        }
    }
}

fn csv_field(raw: &str) -> String {
    if raw.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}

/// Exports chunks to archive storage and records the result.
pub struct ArchivalLogger {
    storages: HashMap<&'static str, Arc<dyn ArchiveStorage>>,
    log: Arc<ArchivalLog>,
}

impl ArchivalLogger {
    pub fn new(log: Arc<ArchivalLog>) -> Self {
        Self {
            storages: HashMap::new(),
            log,
        }
    }

    /// Registers a storage for its URL scheme, replacing any previous one.
    pub fn with_storage(mut self, storage: Arc<dyn ArchiveStorage>) -> Self {
        self.storages.insert(storage.scheme(), storage);
        self
    }

    pub fn log(&self) -> &Arc<ArchivalLog> {
        &self.log
    }

    /// Archives a chunk snapshot.
    ///
    /// The record is durable in the log before this returns `Ok`. A chunk
    /// already recorded is not exported again.
    pub async fn archive(
        &self,
        chunk: &ChunkInfo,
        rows: &[Point],
        location: &str,
        format: ArchiveFormat,
        now: DateTime<Utc>,
    ) -> Result<ArchivalRecord> {
        if let Some(existing) = self.log.find(chunk.id) {
            info!(chunk_id = %chunk.id, location = %existing.location, "Chunk already archived");
            return Ok(existing);
        }

        match self.export(chunk, rows, location, format, now).await {
            Ok(record) => {
                metrics().chunks_archived.inc();
                info!(
                    stream = %chunk.stream,
                    chunk_id = %chunk.id,
                    rows = record.row_count,
                    location = %record.location,
                    "Archived chunk"
                );
                Ok(record)
            }
            Err(e) => {
                metrics().archival_failures.inc();
                error!(stream = %chunk.stream, chunk_id = %chunk.id, error = %e, "Archival failed");
                Err(match e {
                    e @ Error::ArchivalFailure { .. } => e,
                    other => Error::archival(chunk.id, other.to_string()),
                })
            }
        }
    }

    async fn export(
        &self,
        chunk: &ChunkInfo,
        rows: &[Point],
        location: &str,
        format: ArchiveFormat,
        now: DateTime<Utc>,
    ) -> Result<ArchivalRecord> {
        let base = validate_archive_location(location)?;
        let storage = self.storages.get(base.scheme()).ok_or_else(|| {
            Error::archival(
                chunk.id,
                format!("no archive storage for scheme {:?}", base.scheme()),
            )
        })?;

        let url = object_location(&base, chunk, format)?;
        let blob = encode_rows(rows, format)?;
        let expected = checksum(&blob);

        let stored = storage.put(blob, &url).await?;
        if stored != expected {
            return Err(Error::archival(
                chunk.id,
                format!("checksum mismatch: wrote {}, storage has {}", expected, stored),
            ));
        }

        let record = ArchivalRecord {
            chunk_id: chunk.id,
            stream_name: chunk.stream.clone(),
            range_start: chunk.range.start,
            range_end: chunk.range.end,
            row_count: rows.len() as u64,
            archived_at: now,
            location: url.to_string(),
            format,
            checksum: expected,
        };
        self.log.append(record.clone()).await?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{FsArchiveStorage, MemoryArchiveStorage};
    use crate::test_support::t0;
    use chrono::Duration;
    use engine_core::{ChunkState, TimeRange};

    fn chunk() -> ChunkInfo {
        ChunkInfo {
            id: ChunkId::new(),
            stream: "line1.temp".into(),
            range: TimeRange::new(t0(), t0() + Duration::hours(1)).unwrap(),
            state: ChunkState::Compressed,
            row_count: 2,
            approx_bytes: 100,
            created_at: t0(),
            compressed_at: None,
            decompressed_at: None,
        }
    }

    fn rows() -> Vec<Point> {
        vec![
            Point::numeric(t0(), 1.5).with_tag("sensor", "a,b"),
            Point::numeric(t0() + Duration::minutes(1), 2.5),
        ]
    }

    #[test]
    fn test_object_location_layout() {
        let base = Url::parse("memory://archive/raw/").unwrap();
        let chunk = chunk();
        let url = object_location(&base, &chunk, ArchiveFormat::Csv).unwrap();
        assert_eq!(
            url.as_str(),
            format!(
                "memory://archive/raw/line1.temp/{}_{}.csv",
                chunk.range.start_ms(),
                chunk.id
            )
        );
    }

    #[test]
    fn test_csv_quotes_fields() {
        let blob = encode_rows(&rows(), ArchiveFormat::Csv).unwrap();
        let text = std::str::from_utf8(&blob).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("timestamp,value,tags"));
        assert!(lines.next().unwrap().ends_with(r#",1.5,"{""sensor"":""a,b""}""#));
    }

    #[test]
    fn test_csv_writes_every_row() {
        let rows: Vec<Point> = (0..5)
            .map(|i| Point::numeric(t0() + Duration::minutes(i), i as f64))
            .collect();
        let blob = encode_rows(&rows, ArchiveFormat::Csv).unwrap();
        let text = std::str::from_utf8(&blob).unwrap();
        assert_eq!(text.lines().count(), 6);
        assert!(text.ends_with(",4,{}\n"));
    }

    #[test]
    fn test_jsonl_one_row_per_line() {
        let blob = encode_rows(&rows(), ArchiveFormat::Jsonl).unwrap();
        let parsed: Vec<Point> = std::str::from_utf8(&blob)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(parsed, rows());
    }

    #[tokio::test]
    async fn test_archive_to_filesystem_is_durable() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("archival.jsonl");
        let log = Arc::new(ArchivalLog::open(&log_path).await.unwrap());
        let logger =
            ArchivalLogger::new(log.clone()).with_storage(Arc::new(FsArchiveStorage::new()));

        let base = Url::from_directory_path(dir.path().join("objects")).unwrap();
        let chunk = chunk();
        let record = logger
            .archive(&chunk, &rows(), base.as_str(), ArchiveFormat::Jsonl, t0())
            .await
            .unwrap();

        assert_eq!(record.row_count, 2);
        let stored = FsArchiveStorage::new()
            .get(&Url::parse(&record.location).unwrap())
            .await
            .unwrap();
        assert_eq!(checksum(&stored), record.checksum);

        let reopened = ArchivalLog::open(&log_path).await.unwrap();
        assert_eq!(reopened.find(chunk.id), Some(record));
    }

    #[tokio::test]
    async fn test_archive_is_recorded_once() {
        let storage = Arc::new(MemoryArchiveStorage::new());
        let logger = ArchivalLogger::new(Arc::new(ArchivalLog::in_memory()))
            .with_storage(storage.clone());
        let chunk = chunk();

        let first = logger
            .archive(&chunk, &rows(), "memory://archive", ArchiveFormat::Jsonl, t0())
            .await
            .unwrap();
        let second = logger
            .archive(&chunk, &rows(), "memory://archive", ArchiveFormat::Jsonl, t0())
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(storage.len(), 1);
        assert_eq!(logger.log().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_storage_is_archival_failure() {
        let logger = ArchivalLogger::new(Arc::new(ArchivalLog::in_memory()));
        let err = logger
            .archive(&chunk(), &rows(), "memory://archive", ArchiveFormat::Jsonl, t0())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ARCH_001");
        assert!(logger.log().is_empty());
    }
}
