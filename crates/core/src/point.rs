//! Raw time-series points.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::limits::{MAX_CATEGORY_LEN, MAX_TAGS_PER_POINT, MAX_TAG_LEN};
use crate::stream::ValueType;

/// A single observed value.
///
/// Untagged on the wire: `true` is boolean, `1.5` numeric, `"idle"` categorical.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Boolean(bool),
    Numeric(f64),
    Categorical(String),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Boolean(_) => ValueType::Boolean,
            Self::Numeric(_) => ValueType::Numeric,
            Self::Categorical(_) => ValueType::Categorical,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Numeric(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_category(&self) -> Option<&str> {
        match self {
            Self::Categorical(v) => Some(v),
            _ => None,
        }
    }

    /// Total order across all values, used to fold points deterministically.
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Self::Numeric(a), Self::Numeric(b)) => a.total_cmp(b),
            (Self::Boolean(a), Self::Boolean(b)) => a.cmp(b),
            (Self::Categorical(a), Self::Categorical(b)) => a.cmp(b),
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Boolean(_) => 0,
            Self::Numeric(_) => 1,
            Self::Categorical(_) => 2,
        }
    }

    /// Renders the value for text archive formats.
    pub fn render(&self) -> String {
        match self {
            Self::Boolean(v) => v.to_string(),
            Self::Numeric(v) => v.to_string(),
            Self::Categorical(v) => v.clone(),
        }
    }
}

/// A raw point appended to a stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub timestamp: DateTime<Utc>,
    pub value: Value,
    /// Series tags; segment-by keys refer to these
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

impl Point {
    pub fn new(timestamp: DateTime<Utc>, value: Value) -> Self {
        Self {
            timestamp,
            value,
            tags: BTreeMap::new(),
        }
    }

    pub fn numeric(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self::new(timestamp, Value::Numeric(value))
    }

    pub fn boolean(timestamp: DateTime<Utc>, value: bool) -> Self {
        Self::new(timestamp, Value::Boolean(value))
    }

    pub fn categorical(timestamp: DateTime<Utc>, value: impl Into<String>) -> Self {
        Self::new(timestamp, Value::Categorical(value.into()))
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn timestamp_ms(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }

    /// Canonical ordering: timestamp, then value, then tags.
    pub fn canonical_cmp(&self, other: &Point) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| self.value.total_cmp(&other.value))
            .then_with(|| self.tags.cmp(&other.tags))
    }
}

/// Validates a point against the stream's value type.
pub fn validate_point(point: &Point, value_type: ValueType) -> Result<()> {
    if point.value.value_type() != value_type {
        return Err(Error::validation(format!(
            "expected {} value, got {}",
            value_type,
            point.value.value_type()
        )));
    }

    match &point.value {
        Value::Numeric(v) if !v.is_finite() => {
            return Err(Error::validation("numeric value must be finite"));
        }
        Value::Categorical(v) if v.len() > MAX_CATEGORY_LEN => {
            return Err(Error::validation(format!(
                "category exceeds {} bytes",
                MAX_CATEGORY_LEN
            )));
        }
        _ => {}
    }

    if point.tags.len() > MAX_TAGS_PER_POINT {
        return Err(Error::validation(format!(
            "point has {} tags, exceeds {} limit",
            point.tags.len(),
            MAX_TAGS_PER_POINT
        )));
    }

    for (key, value) in &point.tags {
        if key.is_empty() || key.len() > MAX_TAG_LEN || value.len() > MAX_TAG_LEN {
            return Err(Error::validation(format!("invalid tag {:?}", key)));
        }
    }

    Ok(())
}
