use super::traits::Backend;
use crate::common::async_runtime;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InitState {
    Pending,
    Succeeded,
    Failed(String),
    TimedOut,
}

impl InitState {
    pub fn is_done(&self) -> bool {
        !matches!(self, InitState::Pending)
    }
}

/// Backend initialization running in the background.
///
/// `init` runs on the blocking pool, bounded by `timeout`. A timed out `init`
/// is not interrupted; its late result is discarded.
pub struct InitTask {
    state: watch::Receiver<InitState>,
}

impl InitTask {
    pub fn spawn(backend: Arc<dyn Backend>, timeout: Duration) -> Self {
        let (tx, rx) = watch::channel(InitState::Pending);
        let backend_type = backend.backend_type();

        async_runtime::spawn(async move {
            let init = async_runtime::spawn_blocking(move || backend.init());
            let state = match tokio::time::timeout(timeout, init).await {
                Ok(Ok(Ok(()))) => InitState::Succeeded,
                Ok(Ok(Err(e))) => InitState::Failed(e.to_string()),
                Ok(Err(e)) => InitState::Failed(format!("init task aborted: {e}")),
                Err(_) => InitState::TimedOut,
            };
            match &state {
                InitState::Succeeded => info!(%backend_type, "backend initialized"),
                state => warn!(%backend_type, ?state, "backend initialization failed"),
            }
            let _ = tx.send(state);
        });

        Self { state: rx }
    }

    pub fn state(&self) -> InitState {
        self.state.borrow().clone()
    }

    /// Blocks until the task has finished. Must not be called from within the async runtime.
    pub fn wait(&self) -> InitState {
        let mut rx = self.state.clone();
        async_runtime::block_on(async move {
            match rx.wait_for(InitState::is_done).await {
                Ok(state) => state.clone(),
                Err(_) => InitState::Failed("init task dropped".to_string()),
            }
        })
    }
}
