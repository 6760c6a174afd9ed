use super::options::{RedisConnectionDetails, RedisConnectionType, RedisOptions, DEFAULT_CONNECTION_NAMESPACE};
use crate::backend::Namespace;
use crate::error::{BackendError, BackendResult};
use redis::cluster::ClusterClient;
use redis::{ConnectionAddr, ConnectionInfo, ConnectionLike, RedisConnectionInfo, RedisResult};
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::info;

type BoxedConnection = Box<dyn ConnectionLike + Send>;

pub(super) struct NamespaceConnection {
    conn: Mutex<BoxedConnection>,
    /// MULTI/EXEC is only available on a single server.
    pub(super) supports_transactions: bool,
}

/// One connection per configured namespace. Namespaces without a dedicated
/// connection use the default one.
pub(super) struct RedisConnections {
    connections: BTreeMap<Namespace, NamespaceConnection>,
}

impl RedisConnections {
    pub(super) fn connect(opts: &RedisOptions) -> BackendResult<Self> {
        let mut connections = BTreeMap::new();
        for (namespace, details) in opts.connections.iter() {
            let conn = open_connection(details, opts.connect_timeout, opts.io_timeout).map_err(|e| match e {
                BackendError::Config(_) => e,
                e => BackendError::BackendUnavailable(format!("failed to init namespace {namespace}: {e}")),
            })?;
            info!(%namespace, addr = %details.addr, port = details.port, "redis connection established");
            connections.insert(*namespace, conn);
        }
        Ok(Self { connections })
    }

    fn get(&self, namespace: Namespace) -> BackendResult<&NamespaceConnection> {
        self.connections
            .get(&namespace)
            .or_else(|| self.connections.get(&DEFAULT_CONNECTION_NAMESPACE))
            .ok_or_else(|| BackendError::BackendUnavailable(format!("no connection for namespace {namespace}")))
    }

    pub(super) fn supports_transactions(&self, namespace: Namespace) -> BackendResult<bool> {
        Ok(self.get(namespace)?.supports_transactions)
    }

    /// Runs `f` on the connection serving `namespace`. The connection is held for
    /// the duration of `f` only.
    pub(super) fn with_connection<R, F>(&self, namespace: Namespace, f: F) -> BackendResult<R>
    where
        F: FnOnce(&mut dyn ConnectionLike) -> RedisResult<R>,
    {
        let entry = self.get(namespace)?;
        let mut conn = entry
            .conn
            .lock()
            .map_err(|_| BackendError::Internal("redis connection mutex poisoned".to_string()))?;
        let res = f(&mut **conn)?;
        Ok(res)
    }

    pub(super) fn ping_all(&self) -> BackendResult<()> {
        for namespace in self.connections.keys() {
            self.with_connection(*namespace, |conn| redis::cmd("PING").query::<String>(conn))
                .map_err(|e| BackendError::BackendUnavailable(format!("ping failed for namespace {namespace}: {e}")))?;
        }
        Ok(())
    }

    pub(super) fn namespaces(&self) -> impl Iterator<Item = &Namespace> {
        self.connections.keys()
    }
}

fn connection_info(details: &RedisConnectionDetails) -> ConnectionInfo {
    let password = if details.password.is_empty() {
        None
    } else {
        Some(details.password.clone())
    };
    ConnectionInfo {
        addr: ConnectionAddr::Tcp(details.addr.clone(), details.port),
        redis: RedisConnectionInfo {
            db: details.database,
            password,
            ..Default::default()
        },
    }
}

fn open_connection(
    details: &RedisConnectionDetails,
    connect_timeout: Duration,
    io_timeout: Duration,
) -> BackendResult<NamespaceConnection> {
    match details.connection_type {
        RedisConnectionType::Server => {
            let client = redis::Client::open(connection_info(details))?;
            let conn = client.get_connection_with_timeout(connect_timeout)?;
            conn.set_read_timeout(Some(io_timeout))?;
            conn.set_write_timeout(Some(io_timeout))?;
            Ok(NamespaceConnection {
                conn: Mutex::new(Box::new(conn)),
                supports_transactions: true,
            })
        }
        RedisConnectionType::Cluster => {
            // the cluster client connects lazily per node, only io timeouts apply
            let client = ClusterClient::builder(vec![connection_info(details)]).build()?;
            let conn = client.get_connection()?;
            conn.set_read_timeout(Some(io_timeout))?;
            conn.set_write_timeout(Some(io_timeout))?;
            Ok(NamespaceConnection {
                conn: Mutex::new(Box::new(conn)),
                supports_transactions: false,
            })
        }
        RedisConnectionType::Memory => Err(BackendError::Config(format!(
            "redis connection type memory is not supported ({}:{})",
            details.addr, details.port
        ))),
    }
}
