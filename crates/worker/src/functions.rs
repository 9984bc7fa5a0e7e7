//! Aggregate functions folded over a bucket's raw points.
//!
//! Inputs are sorted canonically before folding, so the same raw data always
//! produces bit-identical floating point results regardless of the order
//! rows were read in.

use chrono::{DateTime, Utc};
use engine_core::{
    AggregateBucket, BooleanStats, BucketStats, CategoricalStats, NumericStats, Point, Result,
    ValueType,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Computes bucket statistics from canonically ordered points.
///
/// An error fails the bucket's granularity for the current pass only; other
/// granularities and the next pass are unaffected.
pub trait BucketAggregator: Send + Sync {
    fn name(&self) -> &str;

    fn aggregate(&self, points: &[Point]) -> Result<BucketStats>;
}

/// count, sum, min, max, avg, sample stddev.
#[derive(Debug, Default, Clone, Copy)]
pub struct NumericAggregator;

impl BucketAggregator for NumericAggregator {
    fn name(&self) -> &str {
        "numeric"
    }

    fn aggregate(&self, points: &[Point]) -> Result<BucketStats> {
        let values: Vec<f64> = points.iter().filter_map(|p| p.value.as_f64()).collect();
        let count = values.len() as u64;
        if count == 0 {
            return Ok(BucketStats::empty(ValueType::Numeric));
        }

        let sum: f64 = values.iter().sum();
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let avg = sum / count as f64;

        let stddev = (count >= 2).then(|| {
            let squares: f64 = values.iter().map(|v| (v - avg) * (v - avg)).sum();
            (squares / (count - 1) as f64).sqrt()
        });

        Ok(BucketStats::Numeric(NumericStats {
            count,
            sum,
            min: Some(min),
            max: Some(max),
            avg: Some(avg),
            stddev,
        }))
    }
}

/// count, true/false counts, true ratio.
#[derive(Debug, Default, Clone, Copy)]
pub struct BooleanAggregator;

impl BucketAggregator for BooleanAggregator {
    fn name(&self) -> &str {
        "boolean"
    }

    fn aggregate(&self, points: &[Point]) -> Result<BucketStats> {
        let (true_count, false_count) = points
            .iter()
            .filter_map(|p| p.value.as_bool())
            .fold((0u64, 0u64), |(t, f), v| if v { (t + 1, f) } else { (t, f + 1) });
        let count = true_count + false_count;

        Ok(BucketStats::Boolean(BooleanStats {
            count,
            true_count,
            false_count,
            true_ratio: (count > 0).then(|| true_count as f64 / count as f64),
        }))
    }
}

/// count, distinct, per-category counts.
#[derive(Debug, Default, Clone, Copy)]
pub struct CategoricalAggregator;

impl BucketAggregator for CategoricalAggregator {
    fn name(&self) -> &str {
        "categorical"
    }

    fn aggregate(&self, points: &[Point]) -> Result<BucketStats> {
        let mut counts: BTreeMap<String, u64> = BTreeMap::new();
        for category in points.iter().filter_map(|p| p.value.as_category()) {
            *counts.entry(category.to_string()).or_default() += 1;
        }

        Ok(BucketStats::Categorical(CategoricalStats {
            count: counts.values().sum(),
            distinct: counts.len() as u64,
            counts,
        }))
    }
}

/// Aggregate function lookup: per-stream overrides, then per-type defaults.
#[derive(Clone)]
pub struct AggregateFunctions {
    defaults: HashMap<ValueType, Arc<dyn BucketAggregator>>,
    overrides: HashMap<String, Arc<dyn BucketAggregator>>,
}

fn builtin(value_type: ValueType) -> Arc<dyn BucketAggregator> {
    match value_type {
        ValueType::Numeric => Arc::new(NumericAggregator),
        ValueType::Boolean => Arc::new(BooleanAggregator),
        ValueType::Categorical => Arc::new(CategoricalAggregator),
    }
}

impl Default for AggregateFunctions {
    fn default() -> Self {
        let defaults = [
            ValueType::Numeric,
            ValueType::Boolean,
            ValueType::Categorical,
        ]
        .into_iter()
        .map(|t| (t, builtin(t)))
        .collect();
        Self {
            defaults,
            overrides: HashMap::new(),
        }
    }
}

impl AggregateFunctions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the default function for one value type.
    pub fn with_default(mut self, value_type: ValueType, f: Arc<dyn BucketAggregator>) -> Self {
        self.defaults.insert(value_type, f);
        self
    }

    /// Uses `f` for one stream instead of its type default.
    pub fn with_stream(mut self, stream: impl Into<String>, f: Arc<dyn BucketAggregator>) -> Self {
        self.overrides.insert(stream.into(), f);
        self
    }

    pub fn resolve(&self, stream: &str, value_type: ValueType) -> Arc<dyn BucketAggregator> {
        self.overrides
            .get(stream)
            .or_else(|| self.defaults.get(&value_type))
            .cloned()
            .unwrap_or_else(|| builtin(value_type))
    }

    /// Folds one bucket. `points` may arrive in any order.
    #[allow(clippy::too_many_arguments)]
    pub fn compute(
        &self,
        stream: &str,
        value_type: ValueType,
        granularity: &str,
        bucket_start: DateTime<Utc>,
        bucket_end: DateTime<Utc>,
        mut points: Vec<Point>,
        computed_at: DateTime<Utc>,
    ) -> Result<AggregateBucket> {
        points.sort_by(Point::canonical_cmp);
        let stats = self.resolve(stream, value_type).aggregate(&points)?;

        Ok(AggregateBucket {
            stream: stream.to_string(),
            granularity: granularity.to_string(),
            bucket_start,
            bucket_end,
            stats,
            computed_at,
        })
    }
}
