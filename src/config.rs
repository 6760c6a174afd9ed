//! Configuration types for the storage layer.
//!
//! Loading configuration files is left to the embedding service; these types only
//! describe the shape and can be parsed from a yaml document.
use crate::error::{BackendError, BackendResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One configured backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendOpts {
    /// `memory` or `redis`.
    #[serde(rename = "type")]
    pub backend_type: String,
    #[serde(default)]
    pub identifier: String,
    /// The backend holding series metadata. Exactly one backend should set it.
    #[serde(default, rename = "metadata")]
    pub is_metadata_store: bool,
    /// Backend specific settings, e.g. `redis` connection details.
    #[serde(default)]
    pub options: HashMap<String, serde_json::Value>,
}

impl BackendOpts {
    pub fn new(backend_type: &str) -> Self {
        Self {
            backend_type: backend_type.to_string(),
            ..Default::default()
        }
    }

    pub fn memory_metadata() -> Self {
        Self {
            backend_type: "memory".to_string(),
            identifier: "default".to_string(),
            is_metadata_store: true,
            options: HashMap::new(),
        }
    }

    pub fn with_identifier(mut self, identifier: &str) -> Self {
        self.identifier = identifier.to_string();
        self
    }

    pub fn with_metadata_store(mut self, is_metadata_store: bool) -> Self {
        self.is_metadata_store = is_metadata_store;
        self
    }

    pub fn with_option(mut self, key: &str, value: serde_json::Value) -> Self {
        self.options.insert(key.to_string(), value);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyOpts {
    /// `simple` or empty.
    #[serde(default, rename = "type")]
    pub strategy_type: String,
    #[serde(default)]
    pub options: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backends: Vec<BackendOpts>,
    #[serde(default)]
    pub strategy: StrategyOpts,
}

impl StorageConfig {
    pub fn from_yaml_str(yaml: &str) -> BackendResult<Self> {
        serde_yaml::from_str(yaml).map_err(|e| BackendError::Config(format!("invalid storage config: {e}")))
    }
}
