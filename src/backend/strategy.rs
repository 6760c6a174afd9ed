use super::traits::Backend;
use crate::error::{BackendError, BackendResult};
use std::sync::Arc;

pub const SIMPLE_STRATEGY: &str = "simple";

/// Decides which backend serves a request.
pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn backend(&self) -> Arc<dyn Backend>;
}

/// Routes everything to a single backend.
pub struct SimpleStrategy {
    backend: Arc<dyn Backend>,
}

impl SimpleStrategy {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Builds the strategy over the configured backends; exactly one is supported.
    pub fn from_backends(backends: &[Arc<dyn Backend>]) -> BackendResult<Self> {
        match backends {
            [backend] => Ok(Self::new(backend.clone())),
            [] => Err(BackendError::Config("simple strategy requires a backend".to_string())),
            _ => Err(BackendError::Config(
                "no more than 1 backend supported for now".to_string(),
            )),
        }
    }
}

impl Strategy for SimpleStrategy {
    fn name(&self) -> &'static str {
        SIMPLE_STRATEGY
    }

    fn backend(&self) -> Arc<dyn Backend> {
        self.backend.clone()
    }
}
