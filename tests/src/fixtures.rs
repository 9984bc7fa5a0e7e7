//! Test fixtures and payload generators.

use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};

/// Stream registration body: hourly chunks, 7 day hot window, 90 day
/// retention archived to `memory://archive`, one hourly rollup.
pub fn stream_spec(name: &str) -> Value {
    json!({
        "name": name,
        "value_type": "numeric",
        "chunk_interval_secs": 3600,
        "compression": {
            "hot_window_secs": 7 * 86_400,
            "segment_keys": ["sensor"]
        },
        "retention": {
            "duration_secs": 90 * 86_400,
            "archive_before_delete": true,
            "archive_location": "memory://archive",
            "archive_format": "jsonl"
        },
        "aggregates": [
            { "name": "hourly", "width_secs": 3600 }
        ]
    })
}

/// Boolean stream without archival.
pub fn boolean_stream_spec(name: &str) -> Value {
    json!({
        "name": name,
        "value_type": "boolean",
        "expected_rate_per_sec": 20.0,
        "compression": { "hot_window_secs": 86_400 },
        "retention": { "duration_secs": 30 * 86_400 },
        "aggregates": [
            { "name": "hourly", "width_secs": 3600 }
        ]
    })
}

/// `n` numeric points starting at `start`, `step` apart, alternating sensors.
pub fn numeric_points(start: DateTime<Utc>, n: usize, step: Duration) -> Vec<Value> {
    (0..n)
        .map(|i| {
            json!({
                "timestamp": start + step * i as i32,
                "value": i as f64,
                "tags": { "sensor": if i % 2 == 0 { "a" } else { "b" } }
            })
        })
        .collect()
}

pub fn ingest_payload(stream: &str, points: Vec<Value>) -> Value {
    json!({ "stream": stream, "points": points })
}

pub fn entity(id: &str, streams: &[&str]) -> Value {
    json!({
        "id": id,
        "streams": streams,
        "granularities": ["hourly"]
    })
}
