mod memory_backend;

pub use memory_backend::*;

cfg_if::cfg_if! {
    if #[cfg(test)] {
        mod memory_backend_tests;
    }
}
