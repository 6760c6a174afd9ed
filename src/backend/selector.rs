use super::strategy::Strategy;
use super::traits::Backend;
use super::types::Context;
use crate::error::{BackendError, BackendResult};
use std::sync::Arc;

/// Picks the strategy, and through it the backend, for a request.
#[derive(Default)]
pub struct Selector {
    strategies: Vec<Arc<dyn Strategy>>,
}

impl Selector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_strategy(&mut self, strategy: Arc<dyn Strategy>) {
        self.strategies.push(strategy);
    }

    pub fn strategy_count(&self) -> usize {
        self.strategies.len()
    }

    // TODO: route on the context once more than one strategy is supported
    pub fn select_strategy(&self, _ctx: &Context) -> BackendResult<Arc<dyn Strategy>> {
        self.strategies.first().cloned().ok_or(BackendError::NoStrategy)
    }

    pub fn select_backend(&self, ctx: &Context) -> BackendResult<Arc<dyn Backend>> {
        Ok(self.select_strategy(ctx)?.backend())
    }
}
