use super::types::*;
use crate::error::BackendResult;
use std::sync::{RwLock, Weak};

/// Operations every storage engine implements.
///
/// `init` must be called before anything else. All methods take `&self`; engines
/// synchronize internally so a single instance can be shared across threads.
pub trait Backend: Send + Sync {
    fn backend_type(&self) -> BackendType;

    fn init(&self) -> BackendResult<()>;

    /// `timestamps` and `values` are expected to be of equal length; this is
    /// enforced by the caller.
    fn write(&self, ctx: &WriteContext, timestamps: &[u64], values: &[f64]) -> BackendResult<()>;

    /// Applies every write staged under `request_id`. A no-op for engines that
    /// do not buffer.
    fn flush_pending_writes(&self, request_id: &RequestId) -> BackendResult<()>;

    fn read(&self, ctx: &ReadContext) -> BackendResult<ReadResult>;

    fn create_or_update_series(&self, create: CreateSeries) -> BackendResult<CreateSeriesResult>;

    fn search_series(&self, search: &SearchSeries) -> BackendResult<Vec<SeriesIdentifier>>;

    fn delete_series(&self, series: &[SeriesIdentifier]) -> BackendResult<()>;

    fn set_reverse_api(&self, api: Weak<dyn ReverseApi>);

    /// Wipes all state. Intended for tests.
    fn clear(&self) -> BackendResult<()>;
}

/// The narrow callback a backend uses to ask the metadata layer to delete a
/// series, e.g. when it finds the series' TTL expired on access.
pub trait ReverseApi: Send + Sync {
    fn delete_series(&self, series: &[SeriesIdentifier]) -> BackendResult<()>;
}

/// Holder for a linked reverse api. The link is weak since the metadata layer
/// usually owns the backend that calls back into it.
#[derive(Default)]
pub struct ReverseApiHandle {
    inner: RwLock<Option<Weak<dyn ReverseApi>>>,
}

impl ReverseApiHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, api: Weak<dyn ReverseApi>) {
        *self.inner.write().unwrap() = Some(api);
    }

    /// Deletes through the linked api. Returns `None` when nothing is linked (or
    /// the target was dropped) so the caller can fall back to deleting locally.
    pub fn delete_series(&self, series: &[SeriesIdentifier]) -> Option<BackendResult<()>> {
        let api = self.inner.read().unwrap().as_ref().and_then(|weak| weak.upgrade());
        api.map(|api| api.delete_series(series))
    }
}

/// Rejects the predicates no backend supports yet.
pub(crate) fn validate_search(search: &SearchSeries) -> BackendResult<()> {
    use crate::error::BackendError;
    if search.and.is_some() {
        return Err(BackendError::InvalidQuery("no AND support yet".to_string()));
    }
    if search.or.is_some() {
        return Err(BackendError::InvalidQuery("no OR support yet".to_string()));
    }
    if search.comparator != SearchComparator::Equals {
        return Err(BackendError::InvalidQuery("only EQUALS support".to_string()));
    }
    if search.tag.as_ref().is_some_and(|t| !t.is_empty()) {
        return Err(BackendError::InvalidQuery("no tag support yet".to_string()));
    }
    Ok(())
}
