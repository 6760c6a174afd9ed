use crate::common::MAX_PADDING;
use ahash::AHashMap;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt::Display;
use xxhash_rust::xxh3::xxh3_64;

/// Tenant / partition key. All series and metadata keys are scoped by it.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Namespace(pub i32);

impl Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for Namespace {
    fn from(value: i32) -> Self {
        Namespace(value)
    }
}

/// Series identifier, unique within a namespace and assigned by the backend.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeriesId(pub u64);

impl Display for SeriesId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for SeriesId {
    fn from(value: u64) -> Self {
        SeriesId(value)
    }
}

/// Scopes a batch of writes that are flushed together.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    pub fn new() -> Self {
        RequestId(uuid::Uuid::new_v4().to_string())
    }

    pub fn empty() -> Self {
        RequestId(String::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        RequestId(value.to_string())
    }
}

impl From<String> for RequestId {
    fn from(value: String) -> Self {
        RequestId(value)
    }
}

/// Client supplied token correlating a create request with its result.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeriesCreateIdentifier(pub u64);

impl SeriesCreateIdentifier {
    /// xxh3 of the bytes of a random v4 uuid.
    pub fn random() -> Self {
        let uuid = uuid::Uuid::new_v4();
        SeriesCreateIdentifier(xxh3_64(uuid.as_bytes()))
    }
}

impl From<u64> for SeriesCreateIdentifier {
    fn from(value: u64) -> Self {
        SeriesCreateIdentifier(value)
    }
}

/// Descriptor of one series. Immutable once created.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesMetadata {
    pub id: SeriesId,
    pub namespace: Namespace,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Absolute unix seconds after which the series is gone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_expire_at: Option<u64>,
}

impl SeriesMetadata {
    pub fn identifier(&self) -> SeriesIdentifier {
        SeriesIdentifier::new(self.namespace, self.id)
    }

    pub fn is_expired(&self, now_seconds: u64) -> bool {
        match self.ttl_expire_at {
            Some(expire_at) => expire_at < now_seconds,
            None => false,
        }
    }
}

/// Input for a create-or-update call.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesMetadataInput {
    pub namespace: Namespace,
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Relative TTL in seconds, counted from creation.
    #[serde(default)]
    pub ttl: Option<u32>,
}

impl SeriesMetadataInput {
    pub fn new(namespace: impl Into<Namespace>, name: &str) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_tags<S: AsRef<str>>(mut self, tags: &[S]) -> Self {
        self.tags = tags.iter().map(|t| t.as_ref().to_string()).collect();
        self
    }

    pub fn with_ttl(mut self, ttl_seconds: u32) -> Self {
        self.ttl = Some(ttl_seconds);
        self
    }

    pub(crate) fn into_metadata(self, id: SeriesId, now_seconds: u64) -> SeriesMetadata {
        let ttl_expire_at = self
            .ttl
            .filter(|ttl| *ttl > 0)
            .map(|ttl| now_seconds + ttl as u64);
        SeriesMetadata {
            id,
            namespace: self.namespace,
            name: self.name,
            tags: self.tags,
            ttl_expire_at,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeriesIdentifier {
    pub namespace: Namespace,
    pub id: SeriesId,
}

impl SeriesIdentifier {
    pub fn new(namespace: impl Into<Namespace>, id: impl Into<SeriesId>) -> Self {
        Self {
            namespace: namespace.into(),
            id: id.into(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CreateSeries {
    pub series: AHashMap<SeriesCreateIdentifier, SeriesMetadataInput>,
}

impl CreateSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(identifier: impl Into<SeriesCreateIdentifier>, input: SeriesMetadataInput) -> Self {
        let mut res = Self::new();
        res.add(identifier, input);
        res
    }

    pub fn add(&mut self, identifier: impl Into<SeriesCreateIdentifier>, input: SeriesMetadataInput) {
        self.series.insert(identifier.into(), input);
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SeriesCreateResult {
    pub id: SeriesId,
    pub identifier: SeriesCreateIdentifier,
    /// false when the series already existed
    pub created: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CreateSeriesResult {
    pub results: AHashMap<SeriesCreateIdentifier, SeriesCreateResult>,
}

impl CreateSeriesResult {
    pub fn get(&self, identifier: impl Into<SeriesCreateIdentifier>) -> Option<&SeriesCreateResult> {
        self.results.get(&identifier.into())
    }

    pub(crate) fn insert(&mut self, identifier: SeriesCreateIdentifier, id: SeriesId, created: bool) {
        self.results.insert(
            identifier,
            SeriesCreateResult {
                id,
                identifier,
                created,
            },
        );
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum SearchComparator {
    #[default]
    Equals,
    NotEquals,
}

/// A single search predicate. `and`/`or` combinators are parsed but rejected
/// by every backend with `InvalidQuery`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SearchSeries {
    pub namespace: Namespace,
    pub name: String,
    pub tag: Option<String>,
    pub comparator: SearchComparator,
    pub and: Option<Vec<SearchSeries>>,
    pub or: Option<Vec<SearchSeries>>,
}

impl SearchSeries {
    pub fn by_name(namespace: impl Into<Namespace>, name: &str) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.to_string(),
            ..Default::default()
        }
    }
}

/// Request scoped details used to pick a backend.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Context {
    pub namespace: Namespace,
    pub series: SeriesId,
    pub request_id: RequestId,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WriteContext {
    pub namespace: Namespace,
    pub series: SeriesId,
    pub request_id: RequestId,
}

impl WriteContext {
    pub fn new(namespace: impl Into<Namespace>, series: impl Into<SeriesId>, request_id: RequestId) -> Self {
        Self {
            namespace: namespace.into(),
            series: series.into(),
            request_id,
        }
    }

    pub fn series_identifier(&self) -> SeriesIdentifier {
        SeriesIdentifier::new(self.namespace, self.series)
    }
}

/// Closed range read `[from, to]` in milliseconds.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReadContext {
    pub namespace: Namespace,
    pub series: SeriesId,
    pub from: u64,
    pub to: u64,
}

impl ReadContext {
    pub fn new(namespace: impl Into<Namespace>, series: impl Into<SeriesId>, from: u64, to: u64) -> Self {
        Self {
            namespace: namespace.into(),
            series: series.into(),
            from,
            to,
        }
    }

    pub fn series_identifier(&self) -> SeriesIdentifier {
        SeriesIdentifier::new(self.namespace, self.series)
    }

    /// Inclusive upper bound of physical keys, so a point written at `to` is
    /// never lost to its padding. Past 2^49 ms the padding rounds away and this
    /// equals `to`, hence callers keep keys whose truncated timestamp is `<= to`.
    pub fn padded_upper_bound(&self) -> f64 {
        self.to as f64 + MAX_PADDING
    }

    pub fn contains(&self, key: PaddedTimestamp) -> bool {
        let timestamp = key.timestamp();
        timestamp >= self.from && timestamp <= self.to
    }
}

/// Physical storage key: a millisecond timestamp plus random padding.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PaddedTimestamp(pub f64);

impl PaddedTimestamp {
    pub fn new(timestamp: u64, padding: f64) -> Self {
        PaddedTimestamp(timestamp as f64 + padding)
    }

    pub fn random(timestamp: u64) -> Self {
        Self::new(timestamp, random_padding())
    }

    /// The logical timestamp, with the padding truncated away.
    pub fn timestamp(&self) -> u64 {
        self.0 as u64
    }
}

impl Eq for PaddedTimestamp {}

impl PartialOrd for PaddedTimestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PaddedTimestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

pub fn random_padding() -> f64 {
    rand::thread_rng().gen::<f64>() * MAX_PADDING
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DataPoint {
    pub timestamp: u64,
    pub value: f64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReadResult {
    /// Ordered by physical key. Points sharing a timestamp are all present.
    pub points: Vec<DataPoint>,
}

impl ReadResult {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Collapses the points into a timestamp keyed map; for duplicate
    /// timestamps the last point in physical order wins.
    pub fn to_map(&self) -> BTreeMap<u64, f64> {
        self.points.iter().map(|p| (p.timestamp, p.value)).collect()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BackendType {
    Memory,
    Redis,
}

impl BackendType {
    pub fn name(&self) -> &'static str {
        match self {
            BackendType::Memory => "memory",
            BackendType::Redis => "redis",
        }
    }
}

impl Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl TryFrom<&str> for BackendType {
    type Error = crate::error::BackendError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            s if s.eq_ignore_ascii_case("memory") => Ok(BackendType::Memory),
            s if s.eq_ignore_ascii_case("redis") => Ok(BackendType::Redis),
            _ => Err(crate::error::BackendError::Config(format!(
                "backend {s} not supported"
            ))),
        }
    }
}
