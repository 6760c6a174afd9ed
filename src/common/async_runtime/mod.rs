mod tokio;

use std::future::Future;
pub use self::tokio::TOKIO_RUNTIME;
pub use ::tokio::task::JoinHandle;

pub fn block_on<F: Future>(future: F) -> F::Output {
    TOKIO_RUNTIME.block_on(future)
}

pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    TOKIO_RUNTIME.spawn(future)
}

/// Runs blocking backend work (network round trips, lock waits) off the async workers.
pub fn spawn_blocking<F, R>(f: F) -> JoinHandle<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    TOKIO_RUNTIME.spawn_blocking(f)
}
