//! Construction of backends and strategies from configuration.
use super::memory::MemoryBackend;
use super::redis::{RedisBackend, RedisOptions};
use super::strategy::{SimpleStrategy, Strategy, SIMPLE_STRATEGY};
use super::traits::Backend;
use super::types::BackendType;
use crate::common::Clock;
use crate::config::{BackendOpts, StrategyOpts};
use crate::error::{BackendError, BackendResult};
use std::sync::Arc;

/// Creates an uninitialized backend. Unknown types and invalid options are
/// reported as `BackendError::Config`.
pub fn create_backend(opts: &BackendOpts, clock: Arc<dyn Clock>) -> BackendResult<Arc<dyn Backend>> {
    let backend: Arc<dyn Backend> = match BackendType::try_from(opts.backend_type.as_str())? {
        BackendType::Memory => Arc::new(MemoryBackend::with_clock(clock)),
        BackendType::Redis => {
            let redis_opts = RedisOptions::from_backend_options(&opts.options)?;
            Arc::new(RedisBackend::with_clock(redis_opts, clock))
        }
    };
    Ok(backend)
}

pub fn create_strategy(opts: &StrategyOpts, backends: &[Arc<dyn Backend>]) -> BackendResult<Arc<dyn Strategy>> {
    match opts.strategy_type.trim() {
        "" | SIMPLE_STRATEGY => Ok(Arc::new(SimpleStrategy::from_backends(backends)?)),
        other => Err(BackendError::Config(format!(
            "backend strategy {other} not supported"
        ))),
    }
}
