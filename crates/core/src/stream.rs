//! Stream registration specs and resolved stream configuration.

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;
use url::Url;
use validator::Validate;

use crate::error::{Error, Result};
use crate::limits::{
    DEFAULT_TRAILING_WINDOW_SECS, MAX_CHUNK_INTERVAL_SECS, MAX_DURATION_SECS, MAX_GRANULARITIES,
    MAX_SEGMENT_KEYS, MIN_CHUNK_INTERVAL_SECS, SUPPORTED_ARCHIVE_SCHEMES,
};
use crate::tier::IngestionTier;

/// Stream names: lowercase identifier segments separated by dots.
const STREAM_NAME_PATTERN: &str = r"^[a-z][a-z0-9_]*(\.[a-z0-9_]+)*$";

static STREAM_NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(STREAM_NAME_PATTERN).expect("invalid stream name pattern"));

/// Value type carried by a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Numeric,
    Boolean,
    Categorical,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric => write!(f, "numeric"),
            Self::Boolean => write!(f, "boolean"),
            Self::Categorical => write!(f, "categorical"),
        }
    }
}

/// Archive encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveFormat {
    /// One JSON object per row
    #[default]
    Jsonl,
    /// `timestamp,value,tags` with a header row
    Csv,
}

impl ArchiveFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jsonl => "jsonl",
            Self::Csv => "csv",
        }
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Column compressed data is ordered by within each segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderKey {
    /// `time` or a tag name
    pub column: String,
    #[serde(default = "default_descending")]
    pub descending: bool,
}

fn default_descending() -> bool {
    true
}

impl OrderKey {
    pub const TIME: &'static str = "time";

    pub fn time_desc() -> Self {
        Self {
            column: Self::TIME.to_string(),
            descending: true,
        }
    }

    pub fn is_time(&self) -> bool {
        self.column == Self::TIME
    }
}

impl Default for OrderKey {
    fn default() -> Self {
        Self::time_desc()
    }
}

/// Hot-to-compressed transition policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct CompressionPolicy {
    /// Chunks ending more than this long ago are compressed
    #[validate(range(min = 1))]
    pub hot_window_secs: u64,
    /// Tags grouping related series into one segment
    #[serde(default)]
    #[validate(length(max = 8))]
    pub segment_keys: Vec<String>,
    #[serde(default)]
    pub order_key: OrderKey,
}

impl CompressionPolicy {
    pub fn hot_window(&self) -> Duration {
        secs(self.hot_window_secs)
    }
}

/// Retention and archival policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct RetentionPolicy {
    /// Chunks ending more than this long ago are dropped
    #[validate(range(min = 1))]
    pub duration_secs: u64,
    #[serde(default)]
    pub archive_before_delete: bool,
    /// Archive base URL (`file:///var/lib/archive`, `memory://archive`)
    #[serde(default)]
    pub archive_location: Option<String>,
    #[serde(default)]
    pub archive_format: ArchiveFormat,
}

impl RetentionPolicy {
    pub fn duration(&self) -> Duration {
        secs(self.duration_secs)
    }
}

/// One continuous-aggregate granularity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct GranularitySpec {
    /// e.g. `hourly`, `daily`
    #[validate(length(min = 1, max = 64))]
    pub name: String,
    #[validate(range(min = 1))]
    pub width_secs: u64,
    /// Trailing window recomputed on every run to absorb late data
    #[serde(default = "default_trailing_window_secs")]
    pub trailing_window_secs: u64,
    /// Most recent span left unmaterialized
    #[serde(default)]
    pub end_offset_secs: u64,
    /// Buckets older than this are pruned by the retention pass
    #[serde(default)]
    pub retention_secs: Option<u64>,
}

fn default_trailing_window_secs() -> u64 {
    DEFAULT_TRAILING_WINDOW_SECS
}

impl GranularitySpec {
    pub fn new(name: impl Into<String>, width_secs: u64) -> Self {
        Self {
            name: name.into(),
            width_secs,
            trailing_window_secs: DEFAULT_TRAILING_WINDOW_SECS,
            end_offset_secs: 0,
            retention_secs: None,
        }
    }

    pub fn width_ms(&self) -> i64 {
        (self.width_secs as i64).saturating_mul(1000)
    }

    pub fn trailing_window(&self) -> Duration {
        secs(self.trailing_window_secs)
    }

    pub fn end_offset(&self) -> Duration {
        secs(self.end_offset_secs)
    }

    pub fn retention(&self) -> Option<Duration> {
        self.retention_secs.map(secs)
    }

    /// Raw window `[now - trailing_window, now - end_offset)` before bucket
    /// alignment.
    pub fn window(&self, now: DateTime<Utc>) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        Ok((
            before(now, self.trailing_window())?,
            before(now, self.end_offset())?,
        ))
    }
}

/// Stream registration request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct StreamSpec {
    #[validate(length(min = 1, max = 128))]
    pub name: String,
    pub value_type: ValueType,
    /// Explicit chunk interval; derived from `expected_rate_per_sec` when absent
    #[serde(default)]
    pub chunk_interval_secs: Option<u64>,
    /// Expected ingestion rate, used to pick a chunk interval tier
    #[serde(default)]
    pub expected_rate_per_sec: Option<f64>,
    #[validate(nested)]
    pub compression: CompressionPolicy,
    #[validate(nested)]
    pub retention: RetentionPolicy,
    #[serde(default)]
    #[validate(nested)]
    pub aggregates: Vec<GranularitySpec>,
}

impl StreamSpec {
    /// Validates the spec, returning `Error::Configuration` on any problem.
    pub fn validate_spec(&self) -> Result<()> {
        self.validate()
            .map_err(|e| Error::configuration(format!("{}: {}", self.name, e)))?;

        if !STREAM_NAME_REGEX.is_match(&self.name) {
            return Err(Error::configuration(format!(
                "invalid stream name {:?}",
                self.name
            )));
        }

        if let Some(interval) = self.chunk_interval_secs {
            validate_chunk_interval(interval)?;
        }

        if let Some(rate) = self.expected_rate_per_sec {
            if !rate.is_finite() || rate < 0.0 {
                return Err(Error::configuration(format!(
                    "{}: expected_rate_per_sec must be a non-negative number",
                    self.name
                )));
            }
        }

        self.validate_compression()?;
        self.validate_retention()?;
        self.validate_aggregates()
    }

    fn validate_compression(&self) -> Result<()> {
        let policy = &self.compression;
        if policy.segment_keys.len() > MAX_SEGMENT_KEYS {
            return Err(Error::configuration(format!(
                "{}: at most {} segment keys",
                self.name, MAX_SEGMENT_KEYS
            )));
        }

        let mut seen = HashSet::new();
        for key in &policy.segment_keys {
            if key.is_empty() || key == OrderKey::TIME {
                return Err(Error::configuration(format!(
                    "{}: invalid segment key {:?}",
                    self.name, key
                )));
            }
            if !seen.insert(key) {
                return Err(Error::configuration(format!(
                    "{}: duplicate segment key {:?}",
                    self.name, key
                )));
            }
        }

        if policy.order_key.column.is_empty() {
            return Err(Error::configuration(format!(
                "{}: order key column is empty",
                self.name
            )));
        }

        validate_duration("hot window", policy.hot_window_secs)?;
        if policy.hot_window_secs >= self.retention.duration_secs {
            return Err(Error::configuration(format!(
                "{}: hot window ({}s) must be shorter than retention ({}s)",
                self.name, policy.hot_window_secs, self.retention.duration_secs
            )));
        }

        Ok(())
    }

    fn validate_retention(&self) -> Result<()> {
        let policy = &self.retention;
        validate_duration("retention", policy.duration_secs)?;
        match &policy.archive_location {
            Some(location) => {
                validate_archive_location(location)?;
            }
            None if policy.archive_before_delete => {
                return Err(Error::configuration(format!(
                    "{}: archive_before_delete requires archive_location",
                    self.name
                )));
            }
            None => {}
        }
        Ok(())
    }

    fn validate_aggregates(&self) -> Result<()> {
        if self.aggregates.len() > MAX_GRANULARITIES {
            return Err(Error::configuration(format!(
                "{}: at most {} granularities",
                self.name, MAX_GRANULARITIES
            )));
        }

        let mut seen = HashSet::new();
        for gran in &self.aggregates {
            if !seen.insert(gran.name.as_str()) {
                return Err(Error::configuration(format!(
                    "{}: duplicate granularity {:?}",
                    self.name, gran.name
                )));
            }
            validate_duration("granularity width", gran.width_secs)?;
            validate_duration("trailing window", gran.trailing_window_secs)?;
            if gran.end_offset_secs > MAX_DURATION_SECS {
                return Err(Error::configuration(format!(
                    "{}: granularity {:?} end offset exceeds {}s",
                    self.name, gran.name, MAX_DURATION_SECS
                )));
            }
            if let Some(retention) = gran.retention_secs {
                validate_duration("bucket retention", retention)?;
            }
            if gran.trailing_window_secs < gran.width_secs {
                return Err(Error::configuration(format!(
                    "{}: granularity {:?} trailing window is narrower than one bucket",
                    self.name, gran.name
                )));
            }
        }
        Ok(())
    }

    /// Effective chunk interval in seconds.
    pub fn effective_chunk_interval(&self) -> u64 {
        self.chunk_interval_secs.unwrap_or_else(|| {
            IngestionTier::for_rate(self.expected_rate_per_sec.unwrap_or(0.0)).chunk_interval_secs()
        })
    }
}

/// Validates a chunk interval in seconds.
pub fn validate_chunk_interval(interval_secs: u64) -> Result<()> {
    if !(MIN_CHUNK_INTERVAL_SECS..=MAX_CHUNK_INTERVAL_SECS).contains(&interval_secs) {
        return Err(Error::configuration(format!(
            "chunk interval {}s outside [{}s, {}s]",
            interval_secs, MIN_CHUNK_INTERVAL_SECS, MAX_CHUNK_INTERVAL_SECS
        )));
    }
    Ok(())
}

/// Parses and checks an archive base URL.
pub fn validate_archive_location(location: &str) -> Result<Url> {
    let url = Url::parse(location)
        .map_err(|e| Error::configuration(format!("invalid archive location {:?}: {}", location, e)))?;
    if !SUPPORTED_ARCHIVE_SCHEMES.contains(&url.scheme()) {
        return Err(Error::configuration(format!(
            "unsupported archive scheme {:?} (supported: {})",
            url.scheme(),
            SUPPORTED_ARCHIVE_SCHEMES.join(", ")
        )));
    }
    Ok(url)
}

/// Resolved configuration of a registered stream.
///
/// Held behind an `Arc` by the registry; modifications publish a new copy so
/// in-flight passes keep the configuration they started with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    pub name: String,
    pub value_type: ValueType,
    pub chunk_interval_secs: u64,
    pub compression: CompressionPolicy,
    pub retention: RetentionPolicy,
    pub aggregates: Vec<GranularitySpec>,
    /// Retention enforcement suspended (investigation hold)
    pub retention_paused: bool,
    /// Operator allows deletion when archival fails
    pub archival_bypass: bool,
    pub registered_at: DateTime<Utc>,
    /// Incremented on every prospective modification
    pub version: u64,
}

impl StreamConfig {
    pub fn from_spec(spec: StreamSpec, registered_at: DateTime<Utc>) -> Self {
        let chunk_interval_secs = spec.effective_chunk_interval();
        Self {
            name: spec.name,
            value_type: spec.value_type,
            chunk_interval_secs,
            compression: spec.compression,
            retention: spec.retention,
            aggregates: spec.aggregates,
            retention_paused: false,
            archival_bypass: false,
            registered_at,
            version: 1,
        }
    }

    pub fn chunk_interval_ms(&self) -> i64 {
        (self.chunk_interval_secs as i64).saturating_mul(1000)
    }

    /// Chunks ending before this instant may be compressed.
    pub fn compression_horizon(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        before(now, self.compression.hot_window())
    }

    /// Chunks ending before this instant may be dropped.
    pub fn retention_horizon(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        before(now, self.retention.duration())
    }

    pub fn granularity(&self, name: &str) -> Option<&GranularitySpec> {
        self.aggregates.iter().find(|g| g.name == name)
    }
}

fn secs(value: u64) -> Duration {
    Duration::seconds(value.min(MAX_DURATION_SECS) as i64)
}

/// `now - span`, or `Error::Configuration` outside the representable range.
pub fn before(now: DateTime<Utc>, span: Duration) -> Result<DateTime<Utc>> {
    now.checked_sub_signed(span).ok_or_else(|| {
        Error::configuration(format!("{} before {} is out of range", span, now))
    })
}

/// Checks a policy duration against `[1, MAX_DURATION_SECS]`.
pub fn validate_duration(field: &str, value_secs: u64) -> Result<()> {
    if !(1..=MAX_DURATION_SECS).contains(&value_secs) {
        return Err(Error::configuration(format!(
            "{} {}s outside [1s, {}s]",
            field, value_secs, MAX_DURATION_SECS
        )));
    }
    Ok(())
}
