use std::sync::LazyLock;
use tokio::runtime::Runtime;

/// Runtime hosting background backend work such as eager initialization.
pub static TOKIO_RUNTIME: LazyLock<Runtime> = LazyLock::new(create_runtime);

const BLOCKING_THREADS: usize = 16;

fn create_runtime() -> Runtime {
    // backend calls are synchronous; the async workers only await them
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .max_blocking_threads(BLOCKING_THREADS)
        .thread_name("tsdb-backend")
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
}
