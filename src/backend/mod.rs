mod factory;
mod init_task;
mod metadata;
mod registry;
mod selector;
mod strategy;
mod traits;
mod types;

pub mod memory;
pub mod redis;

pub use factory::*;
pub use init_task::*;
pub use metadata::*;
pub use registry::*;
pub use selector::*;
pub use strategy::*;
pub use traits::*;
pub use types::*;

cfg_if::cfg_if! {
    if #[cfg(test)] {
    }
}
