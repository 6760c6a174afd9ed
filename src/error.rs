use crate::backend::RequestId;
use thiserror::Error;

pub type BackendResult<T> = Result<T, BackendError>;

#[derive(Debug, Error)]
pub enum BackendError {
    /// The series is known but nothing falls inside the requested range.
    #[error("no data found")]
    NoDataFound,
    /// The series is unknown to this backend instance, e.g. after a restart of a
    /// non-persistent backend. Callers are expected to recreate the metadata and retry.
    #[error("series metadata not found")]
    MetadataNotFound,
    #[error("series expired")]
    SeriesExpired,
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("failed to obtain metadata lock: {0}")]
    LockAcquisitionFailed(String),
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("invalid namespace")]
    NamespaceMismatch,
    /// Every physical key available to the timestamp is taken by an equal point.
    #[error("no free physical key left for timestamp {0}")]
    KeySpaceExhausted(u64),
    #[error("nothing to flush for request {0}")]
    NothingToFlush(RequestId),
    #[error("no backend strategy configured")]
    NoStrategy,
    #[error("configuration: {0}")]
    Config(String),
    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("internal: {0}")]
    Internal(String),
}

impl BackendError {
    /// Errors where repeating the whole call may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            BackendError::BackendUnavailable(_) | BackendError::LockAcquisitionFailed(_) => true,
            BackendError::Redis(e) => {
                e.is_io_error() || e.is_timeout() || e.is_connection_dropped() || e.is_connection_refusal()
            }
            _ => false,
        }
    }

    /// Readers treat an expired series the same as an empty range.
    pub fn is_no_data(&self) -> bool {
        matches!(self, BackendError::NoDataFound | BackendError::SeriesExpired)
    }

    pub fn is_missing_metadata(&self) -> bool {
        matches!(self, BackendError::MetadataNotFound | BackendError::SeriesExpired)
    }
}

impl PartialEq for BackendError {
    fn eq(&self, other: &Self) -> bool {
        use BackendError::*;
        match (self, other) {
            (NoDataFound, NoDataFound)
            | (MetadataNotFound, MetadataNotFound)
            | (SeriesExpired, SeriesExpired)
            | (NamespaceMismatch, NamespaceMismatch)
            | (NoStrategy, NoStrategy) => true,
            (BackendUnavailable(a), BackendUnavailable(b)) => a == b,
            (LockAcquisitionFailed(a), LockAcquisitionFailed(b)) => a == b,
            (InvalidQuery(a), InvalidQuery(b)) => a == b,
            (NothingToFlush(a), NothingToFlush(b)) => a == b,
            (KeySpaceExhausted(a), KeySpaceExhausted(b)) => a == b,
            (Config(a), Config(b)) => a == b,
            (Internal(a), Internal(b)) => a == b,
            (Redis(a), Redis(b)) => a.to_string() == b.to_string(),
            (Serialization(a), Serialization(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}
