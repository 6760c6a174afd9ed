//! Key and sorted-set member layout of the redis backend.
//!
//! The layout is shared with existing deployments and must not change:
//!
//! * `data_{namespace}-{series}-{bucket}`: sorted set of points for one day
//! * `series_{namespace}_{name}`: series id by name
//! * `lock_series_{namespace}_{name}`: creation lock
//! * `id_{namespace}`: id counter
//! * `meta_{namespace}_{id}`: json encoded metadata
//! * `tag_{namespace}_{tag}`: set of ids carrying a tag
use crate::backend::{Namespace, SeriesId};
use crate::common::DAY_MILLIS;
use crate::error::{BackendError, BackendResult};

pub const BUCKET_SIZE: u64 = DAY_MILLIS;

#[inline]
pub fn bucket_of(timestamp: u64) -> u64 {
    timestamp - (timestamp % BUCKET_SIZE)
}

/// Upper limit of buckets, i.e. days, a single read may span.
pub const MAX_READ_BUCKETS: u64 = 3_660;

/// Every bucket intersecting `[from, to]`, both inclusive.
pub fn buckets_in_range(from: u64, to: u64) -> impl Iterator<Item = u64> {
    let first = bucket_of(from);
    let last = bucket_of(to.max(from));
    (first..=last).step_by(BUCKET_SIZE as usize)
}

pub fn bucket_count(from: u64, to: u64) -> u64 {
    (bucket_of(to.max(from)) - bucket_of(from)) / BUCKET_SIZE + 1
}

/// Buckets a read of `[from, to]` has to visit, refusing spans of more than
/// `MAX_READ_BUCKETS` days.
pub fn read_buckets(from: u64, to: u64) -> BackendResult<Vec<u64>> {
    let count = bucket_count(from, to);
    if count > MAX_READ_BUCKETS {
        return Err(BackendError::InvalidQuery(format!(
            "read range [{from}, {to}] spans {count} days, at most {MAX_READ_BUCKETS} allowed"
        )));
    }
    Ok(buckets_in_range(from, to).collect())
}

/// Unix seconds at which the bucket starting at `bucket` ends.
pub fn bucket_end_seconds(bucket: u64) -> u64 {
    bucket.saturating_add(BUCKET_SIZE) / 1000
}

pub fn data_key(namespace: Namespace, series: SeriesId, bucket: u64) -> String {
    format!("data_{namespace}-{series}-{bucket}")
}

pub fn series_key(namespace: Namespace, name: &str) -> String {
    format!("series_{namespace}_{name}")
}

pub fn lock_key(series_key: &str) -> String {
    format!("lock_{series_key}")
}

pub fn id_key(namespace: Namespace) -> String {
    format!("id_{namespace}")
}

pub fn meta_key(namespace: Namespace, id: SeriesId) -> String {
    format!("meta_{namespace}_{id}")
}

pub fn tag_key(namespace: Namespace, tag: &str) -> String {
    format!("tag_{namespace}_{tag}")
}

/// Shortest representation that parses back to the same value, i.e. without trailing zeros.
pub fn float_to_string(value: f64) -> String {
    format!("{value}")
}

#[derive(Clone, Debug, PartialEq)]
pub struct EncodedPoint {
    pub bucket: u64,
    pub score: f64,
    pub member: String,
}

/// Builds the score and member for one point. The member is `value:suffix` where the
/// suffix is the padded timestamp minus the leading characters it shares with the
/// bucket, so two equal values stored at different scores are still distinct members.
pub fn encode_point(timestamp: u64, value: f64, padding: f64) -> EncodedPoint {
    encode_scored_point(timestamp, timestamp as f64 + padding, value)
}

/// Like `encode_point`, for a score already padded.
pub fn encode_scored_point(timestamp: u64, score: f64, value: f64) -> EncodedPoint {
    let bucket = bucket_of(timestamp);
    let score_str = format!("{score:.6}");
    let bucket_str = bucket.to_string();
    let common = score_str
        .bytes()
        .zip(bucket_str.bytes())
        .take_while(|(a, b)| a == b)
        .count();
    let member = format!("{}:{}", float_to_string(value), &score_str[common..]);
    EncodedPoint {
        bucket,
        score,
        member,
    }
}

/// The next representable score above a non-negative `score`.
pub fn next_score(score: f64) -> f64 {
    f64::from_bits(score.to_bits() + 1)
}

pub fn parse_member_value(member: &str) -> BackendResult<f64> {
    let value = member.split_once(':').map_or(member, |(value, _)| value);
    value
        .parse::<f64>()
        .map_err(|e| BackendError::Internal(format!("invalid member \"{member}\": {e}")))
}
