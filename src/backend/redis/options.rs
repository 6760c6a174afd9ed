use crate::backend::Namespace;
use crate::error::{BackendError, BackendResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// Namespace whose connection serves every namespace without a dedicated one.
pub const DEFAULT_CONNECTION_NAMESPACE: Namespace = Namespace(0);

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_LOCK_LEASE: Duration = Duration::from_secs(60);
pub const DEFAULT_LOCK_WAIT: Duration = Duration::from_secs(5);
pub const DEFAULT_METADATA_CACHE_TTL: Duration = Duration::from_secs(1);

const OPTION_REDIS: &str = "redis";
const OPTION_TIMEOUTS: &str = "timeouts";

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RedisConnectionType {
    #[default]
    Server,
    Cluster,
    Memory,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedisConnectionDetails {
    pub addr: String,
    pub port: u16,
    /// Empty means no auth.
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub database: i64,
    #[serde(default, rename = "type")]
    pub connection_type: RedisConnectionType,
}

impl RedisConnectionDetails {
    pub fn new(addr: &str, port: u16) -> Self {
        Self {
            addr: addr.to_string(),
            port,
            password: String::new(),
            database: 0,
            connection_type: RedisConnectionType::Server,
        }
    }
}

/// Timeout overrides, all in milliseconds.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
struct RedisTimeouts {
    connect_ms: Option<u64>,
    io_ms: Option<u64>,
    lock_lease_ms: Option<u64>,
    lock_wait_ms: Option<u64>,
    metadata_cache_ms: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RedisOptions {
    /// Connection per namespace; `DEFAULT_CONNECTION_NAMESPACE` is the fallback.
    pub connections: BTreeMap<Namespace, RedisConnectionDetails>,
    pub connect_timeout: Duration,
    pub io_timeout: Duration,
    /// Lifetime of the series creation lock. Bounds how long a crashed holder blocks others.
    pub lock_lease: Duration,
    /// How long a creator waits for the creation lock before giving up.
    pub lock_wait: Duration,
    pub metadata_cache_ttl: Duration,
}

impl RedisOptions {
    pub fn new(connections: BTreeMap<Namespace, RedisConnectionDetails>) -> Self {
        Self {
            connections,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            io_timeout: DEFAULT_IO_TIMEOUT,
            lock_lease: DEFAULT_LOCK_LEASE,
            lock_wait: DEFAULT_LOCK_WAIT,
            metadata_cache_ttl: DEFAULT_METADATA_CACHE_TTL,
        }
    }

    pub fn single(details: RedisConnectionDetails) -> Self {
        let mut connections = BTreeMap::new();
        connections.insert(DEFAULT_CONNECTION_NAMESPACE, details);
        Self::new(connections)
    }

    /// Extracts the options from a backend's free-form option map. `options["redis"]`
    /// is a list of connection descriptors, the list index being the namespace.
    pub fn from_backend_options(options: &HashMap<String, serde_json::Value>) -> BackendResult<Self> {
        let Some(value) = options.get(OPTION_REDIS) else {
            return Err(BackendError::Config("no redis opts".to_string()));
        };
        let list: Vec<RedisConnectionDetails> = serde_json::from_value(value.clone())
            .map_err(|e| BackendError::Config(format!("invalid redis opts: {e}")))?;
        if list.is_empty() {
            return Err(BackendError::Config("no namespaces found".to_string()));
        }

        let connections = list
            .into_iter()
            .enumerate()
            .map(|(idx, details)| (Namespace(idx as i32), details))
            .collect();
        let mut res = Self::new(connections);

        if let Some(value) = options.get(OPTION_TIMEOUTS) {
            let timeouts: RedisTimeouts = serde_json::from_value(value.clone())
                .map_err(|e| BackendError::Config(format!("invalid redis timeouts: {e}")))?;
            res.apply_timeouts(&timeouts);
        }

        Ok(res)
    }

    fn apply_timeouts(&mut self, timeouts: &RedisTimeouts) {
        let millis = Duration::from_millis;
        if let Some(v) = timeouts.connect_ms {
            self.connect_timeout = millis(v);
        }
        if let Some(v) = timeouts.io_ms {
            self.io_timeout = millis(v);
        }
        if let Some(v) = timeouts.lock_lease_ms {
            self.lock_lease = millis(v);
        }
        if let Some(v) = timeouts.lock_wait_ms {
            self.lock_wait = millis(v);
        }
        if let Some(v) = timeouts.metadata_cache_ms {
            self.metadata_cache_ttl = millis(v);
        }
    }
}
