//! Storage backends for a namespaced time series database.
//!
//! Points are written to and read from a [`Backend`](backend::Backend), either kept
//! in process memory or persisted to a redis compatible server. Series metadata
//! (names, tags, TTLs) is managed through the [`Metadata`](backend::Metadata) store,
//! and a [`BackendRegistry`](backend::BackendRegistry) wires both together from
//! configuration.
pub mod backend;
pub mod common;
pub mod config;
pub mod error;

pub use backend::{Backend, BackendRegistry, Metadata, ReverseApi};
pub use config::{BackendOpts, StorageConfig, StrategyOpts};
pub use error::{BackendError, BackendResult};
