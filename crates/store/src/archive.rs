//! Archive object storage.
//!
//! `put` returns the checksum of the bytes as stored, so the caller can
//! compare it with the checksum of what it meant to write.

use async_trait::async_trait;
use bytes::Bytes;
use engine_core::{Error, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use url::Url;

/// Hex blake3 digest.
pub fn checksum(blob: &[u8]) -> String {
    blake3::hash(blob).to_hex().to_string()
}

/// Destination of archived chunk exports.
#[async_trait]
pub trait ArchiveStorage: Send + Sync {
    /// URL scheme served by this storage.
    fn scheme(&self) -> &'static str;

    /// Durably stores `blob` at `location`, returning the stored checksum.
    async fn put(&self, blob: Bytes, location: &Url) -> Result<String>;

    /// Reads an object back.
    async fn get(&self, location: &Url) -> Result<Bytes>;
}

/// Local filesystem storage for `file://` locations.
#[derive(Debug, Default, Clone)]
pub struct FsArchiveStorage;

impl FsArchiveStorage {
    pub fn new() -> Self {
        Self
    }

    fn path(location: &Url) -> Result<PathBuf> {
        location
            .to_file_path()
            .map_err(|_| Error::validation(format!("{} is not a local file path", location)))
    }
}

#[async_trait]
impl ArchiveStorage for FsArchiveStorage {
    fn scheme(&self) -> &'static str {
        "file"
    }

    async fn put(&self, blob: Bytes, location: &Url) -> Result<String> {
        let path = Self::path(location)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::File::create(&path).await?;
        file.write_all(&blob).await?;
        file.sync_all().await?;
        drop(file);

        // Checksum what is on disk, not what was handed in
        let stored = tokio::fs::read(&path).await?;
        debug!(path = %path.display(), bytes = stored.len(), "Wrote archive object");
        Ok(checksum(&stored))
    }

    async fn get(&self, location: &Url) -> Result<Bytes> {
        let path = Self::path(location)?;
        Ok(Bytes::from(tokio::fs::read(&path).await?))
    }
}

/// In-process storage for `memory://` locations.
#[derive(Debug, Default)]
pub struct MemoryArchiveStorage {
    objects: Mutex<HashMap<String, Bytes>>,
}

impl MemoryArchiveStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.lock().is_empty()
    }

    pub fn locations(&self) -> Vec<String> {
        let mut locations: Vec<String> = self.objects.lock().keys().cloned().collect();
        locations.sort();
        locations
    }
}

#[async_trait]
impl ArchiveStorage for MemoryArchiveStorage {
    fn scheme(&self) -> &'static str {
        "memory"
    }

    async fn put(&self, blob: Bytes, location: &Url) -> Result<String> {
        let sum = checksum(&blob);
        self.objects.lock().insert(location.to_string(), blob);
        Ok(sum)
    }

    async fn get(&self, location: &Url) -> Result<Bytes> {
        self.objects
            .lock()
            .get(location.as_str())
            .cloned()
            .ok_or_else(|| Error::internal(format!("no archive object at {}", location)))
    }
}
