//! Materialized aggregate buckets.

use chrono::{DateTime, Utc};
use engine_core::{AggregateBucket, BucketKey};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;

use crate::composite::LatestBucket;

/// Bucket storage ordered by (stream, granularity, bucket start).
#[derive(Debug, Default)]
pub struct AggregateStore {
    buckets: RwLock<BTreeMap<BucketKey, AggregateBucket>>,
}

fn window(
    stream: &str,
    granularity: &str,
    start_ms: i64,
    end_ms: i64,
) -> (Bound<BucketKey>, Bound<BucketKey>) {
    (
        Bound::Included(BucketKey::new(stream, granularity, start_ms)),
        Bound::Excluded(BucketKey::new(stream, granularity, end_ms)),
    )
}

impl AggregateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces every bucket starting in `[start, end)` with `buckets` in one
    /// step. Readers see either the old window or the new one.
    pub fn replace_window(
        &self,
        stream: &str,
        granularity: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        buckets: Vec<AggregateBucket>,
    ) -> usize {
        let range = window(
            stream,
            granularity,
            start.timestamp_millis(),
            end.timestamp_millis(),
        );

        let mut store = self.buckets.write();
        if start < end {
            let stale: Vec<BucketKey> = store.range(range).map(|(k, _)| k.clone()).collect();
            for key in stale {
                store.remove(&key);
            }
        }

        let written = buckets.len();
        for bucket in buckets {
            store.insert(bucket.key(), bucket);
        }
        written
    }

    /// Buckets starting in `[start, end)`, oldest first.
    pub fn range(
        &self,
        stream: &str,
        granularity: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<AggregateBucket> {
        if start >= end {
            return Vec::new();
        }
        self.buckets
            .read()
            .range(window(
                stream,
                granularity,
                start.timestamp_millis(),
                end.timestamp_millis(),
            ))
            .map(|(_, b)| b.clone())
            .collect()
    }

    pub fn get(
        &self,
        stream: &str,
        granularity: &str,
        bucket_start: DateTime<Utc>,
    ) -> Option<AggregateBucket> {
        self.buckets
            .read()
            .get(&BucketKey::new(
                stream,
                granularity,
                bucket_start.timestamp_millis(),
            ))
            .cloned()
    }

    /// Removes buckets ending at or before `cutoff`. Returns the count removed.
    pub fn prune_before(&self, stream: &str, granularity: &str, cutoff: DateTime<Utc>) -> usize {
        let mut store = self.buckets.write();
        let expired: Vec<BucketKey> = store
            .range(window(stream, granularity, i64::MIN, cutoff.timestamp_millis()))
            .filter(|(_, b)| b.bucket_end <= cutoff)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            store.remove(key);
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.buckets.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.read().is_empty()
    }
}

impl LatestBucket for AggregateStore {
    fn latest_bucket(
        &self,
        stream: &str,
        granularity: &str,
        as_of: DateTime<Utc>,
    ) -> Option<AggregateBucket> {
        let as_of_ms = as_of.timestamp_millis();
        self.buckets
            .read()
            .range((
                Bound::Included(BucketKey::new(stream, granularity, i64::MIN)),
                Bound::Included(BucketKey::new(stream, granularity, as_of_ms)),
            ))
            .next_back()
            .map(|(_, b)| b.clone())
    }
}
