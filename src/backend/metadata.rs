use super::traits::{Backend, ReverseApi};
use super::types::*;
use crate::error::BackendResult;
use std::sync::Arc;

/// Entry point for series metadata operations. Delegates to the backend that
/// was configured as metadata store, and serves as the reverse api other
/// backends call to remove expired series.
pub struct Metadata {
    backend: Arc<dyn Backend>,
}

impl Metadata {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn create_or_update_series(&self, create: CreateSeries) -> BackendResult<CreateSeriesResult> {
        self.backend.create_or_update_series(create)
    }

    pub fn search_series(&self, search: &SearchSeries) -> BackendResult<Vec<SeriesIdentifier>> {
        self.backend.search_series(search)
    }

    pub fn delete_series(&self, series: &[SeriesIdentifier]) -> BackendResult<()> {
        self.backend.delete_series(series)
    }

    pub fn clear(&self) -> BackendResult<()> {
        self.backend.clear()
    }
}

impl ReverseApi for Metadata {
    fn delete_series(&self, series: &[SeriesIdentifier]) -> BackendResult<()> {
        Metadata::delete_series(self, series)
    }
}
