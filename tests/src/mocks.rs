//! Mock implementations for testing.

use async_trait::async_trait;
use bytes::Bytes;
use chunk_store::{checksum, ArchiveStorage};
use engine_core::{Error, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

/// `memory://` archive storage that can be switched into failure mode.
///
/// Stored objects are kept so tests can read back what retention exported.
#[derive(Clone, Default)]
pub struct FlakyArchiveStorage {
    objects: Arc<Mutex<HashMap<String, Bytes>>>,
    should_fail: Arc<Mutex<bool>>,
}

impl FlakyArchiveStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set failure mode for testing error handling.
    pub fn set_should_fail(&self, fail: bool) {
        *self.should_fail.lock() = fail;
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().len()
    }

    pub fn objects(&self) -> Vec<(String, Bytes)> {
        let mut objects: Vec<_> = self
            .objects
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        objects.sort_by(|a, b| a.0.cmp(&b.0));
        objects
    }
}

#[async_trait]
impl ArchiveStorage for FlakyArchiveStorage {
    fn scheme(&self) -> &'static str {
        "memory"
    }

    async fn put(&self, blob: Bytes, location: &Url) -> Result<String> {
        if *self.should_fail.lock() {
            return Err(Error::internal(format!(
                "simulated archive outage writing {}",
                location
            )));
        }
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
