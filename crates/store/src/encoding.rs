//! Columnar encoding of compressed chunks.
//!
//! Rows are grouped by their segment-by tag values. Inside a segment, rows are
//! ordered by the order key and serialized column by column into one block:
//! zigzag varint timestamp deltas against the segment's first timestamp, a
//! type-specific value column, then the residual tags. Each block is
//! compressed with LZ4 and prefixed with its uncompressed size.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use engine_core::limits::MAX_SEGMENTS_PER_CHUNK;
use engine_core::{CompressionPolicy, Error, OrderKey, Point, Result, Value};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Fixed per-row overhead of a hot `Point` beyond its payload.
const HOT_ROW_OVERHEAD: u64 = 48;

const NUMERIC_COLUMN: u8 = 0;
const BOOLEAN_COLUMN: u8 = 1;
const CATEGORICAL_COLUMN: u8 = 2;

/// Approximate in-memory footprint of a hot point.
pub fn hot_point_bytes(point: &Point) -> u64 {
    let value = match &point.value {
        Value::Numeric(_) => 8,
        Value::Boolean(_) => 1,
        Value::Categorical(s) => s.len() as u64,
    };
    let tags: u64 = point
        .tags
        .iter()
        .map(|(k, v)| (k.len() + v.len()) as u64 + 16)
        .sum();
    HOT_ROW_OVERHEAD + value + tags
}

fn corrupt(msg: impl std::fmt::Display) -> Error {
    Error::internal(format!("corrupt segment block: {}", msg))
}

fn put_varint(buf: &mut impl BufMut, value: i64) {
    put_uvarint(buf, ((value << 1) ^ (value >> 63)) as u64);
}

fn put_uvarint(buf: &mut impl BufMut, mut value: u64) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            buf.put_u8(byte);
            return;
        }
        buf.put_u8(byte | 0x80);
    }
}

fn put_str(buf: &mut impl BufMut, s: &str) {
    put_uvarint(buf, s.len() as u64);
    buf.put_slice(s.as_bytes());
}

fn get_uvarint(buf: &mut impl Buf) -> Result<u64> {
    let mut value = 0u64;
    let mut shift = 0u32;
    loop {
        if shift > 63 {
            return Err(corrupt("varint overflow"));
        }
        if !buf.has_remaining() {
            return Err(corrupt("truncated varint"));
        }
        let byte = buf.get_u8();
        value |= u64::from(byte & 0x7F) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
    }
}

fn get_varint(buf: &mut impl Buf) -> Result<i64> {
    let unsigned = get_uvarint(buf)?;
    Ok(((unsigned >> 1) as i64) ^ -((unsigned & 1) as i64))
}

fn get_len(buf: &mut impl Buf) -> Result<usize> {
    usize::try_from(get_uvarint(buf)?).map_err(|_| corrupt("length overflow"))
}

fn get_str(buf: &mut impl Buf) -> Result<String> {
    let len = get_len(buf)?;
    if buf.remaining() < len {
        return Err(corrupt("truncated string"));
    }
    String::from_utf8(buf.copy_to_bytes(len).to_vec()).map_err(corrupt)
}

/// Type-specific value column.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueColumn {
    Numeric(Vec<f64>),
    /// One bit per row, least significant bit first
    Boolean { bits: Vec<u64>, len: usize },
    /// Dictionary of distinct categories plus one code per row
    Categorical {
        dictionary: Vec<String>,
        codes: Vec<u32>,
    },
}

impl ValueColumn {
    fn encode(values: &[&Value]) -> Result<Self> {
        let Some(first) = values.first() else {
            return Ok(Self::Numeric(Vec::new()));
        };

        let mismatch = || Error::internal("mixed value types in one chunk");

        match first {
            Value::Numeric(_) => values
                .iter()
                .map(|v| v.as_f64().ok_or_else(mismatch))
                .collect::<Result<Vec<_>>>()
                .map(Self::Numeric),
            Value::Boolean(_) => {
                let mut bits = vec![0u64; values.len().div_ceil(64)];
                for (i, v) in values.iter().enumerate() {
                    if v.as_bool().ok_or_else(mismatch)? {
                        bits[i / 64] |= 1 << (i % 64);
                    }
                }
                Ok(Self::Boolean {
                    bits,
                    len: values.len(),
                })
            }
            Value::Categorical(_) => {
                let mut dictionary: Vec<String> = Vec::new();
                let mut lookup: BTreeMap<&str, u32> = BTreeMap::new();
                let mut codes = Vec::with_capacity(values.len());
                for v in values {
                    let category = v.as_category().ok_or_else(mismatch)?;
                    let code = match lookup.get(category) {
                        Some(code) => *code,
                        None => {
                            let code = u32::try_from(dictionary.len())
                                .map_err(|_| Error::internal("category dictionary overflow"))?;
                            dictionary.push(category.to_string());
                            lookup.insert(category, code);
                            code
                        }
                    };
                    codes.push(code);
                }
                Ok(Self::Categorical { dictionary, codes })
            }
        }
    }

    fn write(&self, buf: &mut BytesMut) {
        match self {
            Self::Numeric(values) => {
                buf.put_u8(NUMERIC_COLUMN);
                put_uvarint(buf, values.len() as u64);
                for v in values {
                    buf.put_f64_le(*v);
                }
            }
            Self::Boolean { bits, len } => {
                buf.put_u8(BOOLEAN_COLUMN);
                put_uvarint(buf, *len as u64);
                for word in bits {
                    buf.put_u64_le(*word);
                }
            }
            Self::Categorical { dictionary, codes } => {
                buf.put_u8(CATEGORICAL_COLUMN);
                put_uvarint(buf, dictionary.len() as u64);
                for category in dictionary {
                    put_str(buf, category);
                }
                put_uvarint(buf, codes.len() as u64);
                for code in codes {
                    put_uvarint(buf, u64::from(*code));
                }
            }
        }
    }

    fn read(buf: &mut impl Buf) -> Result<Self> {
        if !buf.has_remaining() {
            return Err(corrupt("missing value column"));
        }
        match buf.get_u8() {
            NUMERIC_COLUMN => {
                let len = get_len(buf)?;
                if len.checked_mul(8).map_or(true, |n| buf.remaining() < n) {
                    return Err(corrupt("truncated numeric column"));
                }
                Ok(Self::Numeric((0..len).map(|_| buf.get_f64_le()).collect()))
            }
            BOOLEAN_COLUMN => {
                let len = get_len(buf)?;
                let words = len.div_ceil(64);
                if buf.remaining() < words * 8 {
                    return Err(corrupt("truncated boolean column"));
                }
                let bits = (0..words).map(|_| buf.get_u64_le()).collect();
                Ok(Self::Boolean { bits, len })
            }
            CATEGORICAL_COLUMN => {
                let entries = get_len(buf)?;
                let mut dictionary = Vec::with_capacity(entries.min(buf.remaining()));
                for _ in 0..entries {
                    dictionary.push(get_str(buf)?);
                }
                let len = get_len(buf)?;
                let mut codes = Vec::with_capacity(len.min(buf.remaining()));
                for _ in 0..len {
                    let code = u32::try_from(get_uvarint(buf)?)
                        .map_err(|_| corrupt("category code overflow"))?;
                    codes.push(code);
                }
                Ok(Self::Categorical { dictionary, codes })
            }
            other => Err(corrupt(format!("unknown column type {}", other))),
        }
    }

    fn len(&self) -> usize {
        match self {
            Self::Numeric(v) => v.len(),
            Self::Boolean { len, .. } => *len,
            Self::Categorical { codes, .. } => codes.len(),
        }
    }

    fn get(&self, i: usize) -> Result<Value> {
        let out_of_range = || Error::internal(format!("value column index {} out of range", i));
        match self {
            Self::Numeric(v) => v.get(i).copied().map(Value::Numeric).ok_or_else(out_of_range),
            Self::Boolean { bits, len } => {
                if i >= *len {
                    return Err(out_of_range());
                }
                let word = bits.get(i / 64).ok_or_else(out_of_range)?;
                Ok(Value::Boolean((word >> (i % 64)) & 1 == 1))
            }
            Self::Categorical { dictionary, codes } => {
                let code = codes.get(i).ok_or_else(out_of_range)?;
                dictionary
                    .get(*code as usize)
                    .cloned()
                    .map(Value::Categorical)
                    .ok_or_else(|| Error::internal(format!("unknown category code {}", code)))
            }
        }
    }
}

/// Decoded columns of one segment.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentColumns {
    pub base_ts_ms: i64,
    pub ts_deltas: Vec<i64>,
    pub values: ValueColumn,
    /// Tags not covered by segment keys, per row
    pub residual_tags: Vec<BTreeMap<String, String>>,
}

/// Rows sharing one combination of segment-by tag values.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    /// Value of each segment key, `None` when the row lacked the tag
    key: Vec<Option<String>>,
    rows: u64,
    /// LZ4 block with the uncompressed size prepended
    block: Bytes,
}

impl Segment {
    fn encode(key: Vec<Option<String>>, columns: &SegmentColumns) -> Self {
        let mut buf = BytesMut::new();
        put_varint(&mut buf, columns.base_ts_ms);
        put_uvarint(&mut buf, columns.ts_deltas.len() as u64);
        for delta in &columns.ts_deltas {
            put_varint(&mut buf, *delta);
        }
        columns.values.write(&mut buf);
        for tags in &columns.residual_tags {
            put_uvarint(&mut buf, tags.len() as u64);
            for (k, v) in tags {
                put_str(&mut buf, k);
                put_str(&mut buf, v);
            }
        }

        Self {
            key,
            rows: columns.ts_deltas.len() as u64,
            block: Bytes::from(lz4_flex::compress_prepend_size(&buf)),
        }
    }

    pub fn key(&self) -> &[Option<String>] {
        &self.key
    }

    pub fn row_count(&self) -> u64 {
        self.rows
    }

    pub fn block(&self) -> &Bytes {
        &self.block
    }

    /// Decompresses and parses the block.
    pub fn columns(&self) -> Result<SegmentColumns> {
        let raw = lz4_flex::decompress_size_prepended(&self.block).map_err(corrupt)?;
        let mut buf = raw.as_slice();

        let base_ts_ms = get_varint(&mut buf)?;
        let rows = get_len(&mut buf)?;
        if rows as u64 != self.rows {
            return Err(corrupt(format!("{} rows recorded, {} stored", self.rows, rows)));
        }

        let mut ts_deltas = Vec::with_capacity(rows.min(buf.remaining()));
        for _ in 0..rows {
            ts_deltas.push(get_varint(&mut buf)?);
        }
        let values = ValueColumn::read(&mut buf)?;

        let mut residual_tags = Vec::with_capacity(rows.min(buf.remaining()));
        for _ in 0..rows {
            let count = get_len(&mut buf)?;
            let mut tags = BTreeMap::new();
            for _ in 0..count {
                let k = get_str(&mut buf)?;
                let v = get_str(&mut buf)?;
                tags.insert(k, v);
            }
            residual_tags.push(tags);
        }

        if buf.has_remaining() {
            return Err(corrupt(format!("{} trailing bytes", buf.remaining())));
        }

        Ok(SegmentColumns {
            base_ts_ms,
            ts_deltas,
            values,
            residual_tags,
        })
    }

    fn encoded_bytes(&self) -> u64 {
        let key: u64 = self
            .key
            .iter()
            .map(|k| k.as_ref().map_or(1, |s| s.len() as u64 + 1))
            .sum();
        key + self.block.len() as u64
    }
}

/// Immutable column-encoded chunk body.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressedChunk {
    segment_keys: Vec<String>,
    order_key: OrderKey,
    segments: Vec<Segment>,
    row_count: u64,
    encoded_bytes: u64,
}

impl CompressedChunk {
    /// Encodes rows under the stream's compression policy.
    pub fn encode(points: &[Point], policy: &CompressionPolicy) -> Result<Self> {
        let keys = &policy.segment_keys;

        let mut groups: BTreeMap<Vec<Option<String>>, Vec<&Point>> = BTreeMap::new();
        for point in points {
            let key = keys.iter().map(|k| point.tags.get(k).cloned()).collect();
            groups.entry(key).or_default().push(point);
        }
        if groups.len() > MAX_SEGMENTS_PER_CHUNK {
            return Err(Error::validation(format!(
                "{} segment-by combinations exceed the limit of {}",
                groups.len(),
                MAX_SEGMENTS_PER_CHUNK
            )));
        }

        let mut segments = Vec::with_capacity(groups.len());
        for (key, mut rows) in groups {
            rows.sort_by(|a, b| order_cmp(a, b, &policy.order_key));

            let base_ts_ms = rows.first().map(|p| p.timestamp_ms()).unwrap_or(0);
            let values: Vec<&Value> = rows.iter().map(|p| &p.value).collect();
            let columns = SegmentColumns {
                base_ts_ms,
                ts_deltas: rows.iter().map(|p| p.timestamp_ms() - base_ts_ms).collect(),
                values: ValueColumn::encode(&values)?,
                residual_tags: rows
                    .iter()
                    .map(|p| {
                        p.tags
                            .iter()
                            .filter(|(k, _)| !keys.contains(*k))
                            .map(|(k, v)| (k.clone(), v.clone()))
                            .collect()
                    })
                    .collect(),
            };
            segments.push(Segment::encode(key, &columns));
        }

        let encoded_bytes = segments.iter().map(Segment::encoded_bytes).sum();

        Ok(Self {
            segment_keys: keys.clone(),
            order_key: policy.order_key.clone(),
            segments,
            row_count: points.len() as u64,
            encoded_bytes,
        })
    }

    /// Restores every row, ordered canonically.
    pub fn decode(&self) -> Result<Vec<Point>> {
        let mut points = Vec::with_capacity(self.row_count as usize);

        for segment in &self.segments {
            let columns = segment.columns()?;
            if columns.values.len() != columns.ts_deltas.len() {
                return Err(corrupt("column lengths differ"));
            }

            for (i, (delta, residual)) in columns
                .ts_deltas
                .iter()
                .zip(columns.residual_tags)
                .enumerate()
            {
                let ts_ms = columns
                    .base_ts_ms
                    .checked_add(*delta)
                    .ok_or_else(|| corrupt("timestamp overflow"))?;
                let timestamp = engine_core::millis_to_datetime(ts_ms)?;

                let mut tags = residual;
                for (name, value) in self.segment_keys.iter().zip(&segment.key) {
                    if let Some(value) = value {
                        tags.insert(name.clone(), value.clone());
                    }
                }

                points.push(Point {
                    timestamp,
                    value: columns.values.get(i)?,
                    tags,
                });
            }
        }

        if points.len() as u64 != self.row_count {
            return Err(corrupt(format!(
                "{} rows recorded, {} decoded",
                self.row_count,
                points.len()
            )));
        }

        points.sort_by(Point::canonical_cmp);
        Ok(points)
    }

    pub fn row_count(&self) -> u64 {
        self.row_count
    }

    /// Stored size: compressed blocks plus segment keys.
    pub fn encoded_bytes(&self) -> u64 {
        self.encoded_bytes
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn segment_keys(&self) -> &[String] {
        &self.segment_keys
    }

    pub fn order_key(&self) -> &OrderKey {
        &self.order_key
    }
}

/// Orders rows by the order key, breaking ties canonically.
fn order_cmp(a: &Point, b: &Point, order_key: &OrderKey) -> Ordering {
    let primary = if order_key.is_time() {
        a.timestamp.cmp(&b.timestamp)
    } else {
        a.tags
            .get(&order_key.column)
            .cmp(&b.tags.get(&order_key.column))
            .then_with(|| a.timestamp.cmp(&b.timestamp))
    };
    let primary = if order_key.descending {
        primary.reverse()
    } else {
        primary
    };
    primary.then_with(|| a.canonical_cmp(b))
}
