use super::factory::{create_backend, create_strategy};
use super::init_task::InitTask;
use super::metadata::Metadata;
use super::selector::Selector;
use super::traits::{Backend, ReverseApi};
use super::types::Context;
use crate::common::{Clock, SystemClock};
use crate::config::{BackendOpts, StorageConfig, StrategyOpts};
use crate::error::{BackendError, BackendResult};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A configured backend together with the options it was built from.
pub struct RegisteredBackend {
    pub opts: BackendOpts,
    pub backend: Arc<dyn Backend>,
}

/// Owns the backends, the selector routing requests to them and the
/// metadata store they report expired series to.
pub struct BackendRegistry {
    backends: Vec<RegisteredBackend>,
    selector: Selector,
    metadata: Arc<Metadata>,
    init_tasks: Vec<InitTask>,
}

impl BackendRegistry {
    pub fn builder() -> BackendRegistryBuilder {
        BackendRegistryBuilder::default()
    }

    pub fn metadata(&self) -> &Arc<Metadata> {
        &self.metadata
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    pub fn select_backend(&self, ctx: &Context) -> BackendResult<Arc<dyn Backend>> {
        self.selector.select_backend(ctx)
    }

    pub fn backend(&self, identifier: &str) -> Option<Arc<dyn Backend>> {
        self.backends
            .iter()
            .find(|b| b.opts.identifier == identifier)
            .map(|b| b.backend.clone())
    }

    pub fn backends(&self) -> &[RegisteredBackend] {
        &self.backends
    }

    /// Background initializations, empty unless built with `build_with_init_tasks`.
    pub fn init_tasks(&self) -> &[InitTask] {
        &self.init_tasks
    }
}

pub struct BackendRegistryBuilder {
    backends: Vec<BackendOpts>,
    strategy: StrategyOpts,
    clock: Arc<dyn Clock>,
}

impl Default for BackendRegistryBuilder {
    fn default() -> Self {
        Self {
            backends: Vec::new(),
            strategy: StrategyOpts::default(),
            clock: Arc::new(SystemClock),
        }
    }
}

impl BackendRegistryBuilder {
    pub fn with_config(mut self, config: StorageConfig) -> Self {
        self.backends.extend(config.backends);
        self.strategy = config.strategy;
        self
    }

    pub fn add_backend(mut self, opts: BackendOpts) -> Self {
        self.backends.push(opts);
        self
    }

    pub fn with_strategy(mut self, strategy: StrategyOpts) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Builds the registry and initializes every backend before returning.
    pub fn build(self) -> BackendResult<BackendRegistry> {
        let registry = self.assemble()?;
        for registered in registry.backends.iter() {
            registered.backend.init()?;
        }
        info!(backends = registry.backends.len(), "storage backends initialized");
        Ok(registry)
    }

    /// Builds the registry and starts backend initialization in the background,
    /// each bounded by `timeout`. Progress is observable through `init_tasks`.
    pub fn build_with_init_tasks(self, timeout: Duration) -> BackendResult<BackendRegistry> {
        let mut registry = self.assemble()?;
        registry.init_tasks = registry
            .backends
            .iter()
            .map(|registered| InitTask::spawn(registered.backend.clone(), timeout))
            .collect();
        Ok(registry)
    }

    fn assemble(mut self) -> BackendResult<BackendRegistry> {
        if self.backends.is_empty() {
            warn!("no backends defined, creating default non-persistent embedded memory backend");
            self.backends.push(BackendOpts::memory_metadata());
        }

        let mut backends = Vec::with_capacity(self.backends.len());
        for opts in self.backends {
            let backend = create_backend(&opts, self.clock.clone())?;
            debug!(backend_type = %backend.backend_type(), identifier = %opts.identifier, "backend created");
            backends.push(RegisteredBackend { opts, backend });
        }

        let instances: Vec<Arc<dyn Backend>> = backends.iter().map(|b| b.backend.clone()).collect();
        let strategy = create_strategy(&self.strategy, &instances)?;
        let mut selector = Selector::new();
        selector.add_strategy(strategy);

        let Some(store) = backends.iter().rev().find(|b| b.opts.is_metadata_store) else {
            return Err(BackendError::Config("no metadata backend defined".to_string()));
        };
        let metadata = Arc::new(Metadata::new(store.backend.clone()));

        // backends hold a weak link, the registry keeps the metadata store alive
        let reverse_api: Arc<dyn ReverseApi> = metadata.clone();
        for registered in backends.iter() {
            registered.backend.set_reverse_api(Arc::downgrade(&reverse_api));
        }

        Ok(BackendRegistry {
            backends,
            selector,
            metadata,
            init_tasks: Vec::new(),
        })
    }
}
