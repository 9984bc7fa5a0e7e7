//! Stream registry.
//!
//! Configurations are published as immutable `Arc<StreamConfig>` snapshots.
//! A modification clones the current snapshot, applies the change, bumps the
//! version, and swaps it in; passes already holding the old `Arc` finish with
//! the configuration they started with.

use chrono::{DateTime, Utc};
use engine_core::{validate_chunk_interval, validate_duration, Error, Result, StreamConfig, StreamSpec};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Registered streams by name.
#[derive(Debug, Default)]
pub struct StreamRegistry {
    streams: RwLock<BTreeMap<String, Arc<StreamConfig>>>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and registers a stream.
    pub fn register(&self, spec: StreamSpec, now: DateTime<Utc>) -> Result<Arc<StreamConfig>> {
        spec.validate_spec()?;

        let mut streams = self.streams.write();
        if streams.contains_key(&spec.name) {
            return Err(Error::configuration(format!(
                "stream {:?} is already registered",
                spec.name
            )));
        }

        let config = Arc::new(StreamConfig::from_spec(spec, now));
        streams.insert(config.name.clone(), config.clone());

        info!(
            stream = %config.name,
            value_type = %config.value_type,
            chunk_interval_secs = config.chunk_interval_secs,
            hot_window_secs = config.compression.hot_window_secs,
            retention_secs = config.retention.duration_secs,
            "Registered stream"
        );

        Ok(config)
    }

    pub fn get(&self, name: &str) -> Result<Arc<StreamConfig>> {
        self.streams
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::stream_not_found(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.streams.read().contains_key(name)
    }

    /// All streams, ordered by name.
    pub fn list(&self) -> Vec<Arc<StreamConfig>> {
        self.streams.read().values().cloned().collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.streams.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.streams.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.read().is_empty()
    }

    /// Changes the retention duration for future passes.
    pub fn modify_retention(&self, name: &str, duration_secs: u64) -> Result<Arc<StreamConfig>> {
        self.update(name, |config| {
            validate_duration("retention", duration_secs)?;
            if config.compression.hot_window_secs >= duration_secs {
                return Err(Error::configuration(format!(
                    "{}: retention ({}s) must exceed the hot window ({}s)",
                    config.name, duration_secs, config.compression.hot_window_secs
                )));
            }
            config.retention.duration_secs = duration_secs;
            Ok(())
        })
    }

    /// Changes the interval used for chunks created from now on.
    pub fn set_chunk_interval(&self, name: &str, interval_secs: u64) -> Result<Arc<StreamConfig>> {
        validate_chunk_interval(interval_secs)?;
        self.update(name, |config| {
            config.chunk_interval_secs = interval_secs;
            Ok(())
        })
    }

    pub fn pause_retention(&self, name: &str) -> Result<Arc<StreamConfig>> {
        self.update(name, |config| {
            config.retention_paused = true;
            Ok(())
        })
    }

    pub fn resume_retention(&self, name: &str) -> Result<Arc<StreamConfig>> {
        self.update(name, |config| {
            config.retention_paused = false;
            Ok(())
        })
    }

    pub fn set_archival_bypass(&self, name: &str, enabled: bool) -> Result<Arc<StreamConfig>> {
        self.update(name, |config| {
            config.archival_bypass = enabled;
            Ok(())
        })
    }

    fn update<F>(&self, name: &str, apply: F) -> Result<Arc<StreamConfig>>
    where
        F: FnOnce(&mut StreamConfig) -> Result<()>,
    {
        let mut streams = self.streams.write();
        let current = streams
            .get(name)
            .ok_or_else(|| Error::stream_not_found(name))?;

        let mut next = StreamConfig::clone(current);
        apply(&mut next)?;
        next.version += 1;

        let next = Arc::new(next);
        streams.insert(name.to_string(), next.clone());

        info!(stream = %name, version = next.version, "Stream configuration updated");
        Ok(next)
    }
}
