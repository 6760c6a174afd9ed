use super::connection::RedisConnections;
use crate::backend::Namespace;
use crate::error::{BackendError, BackendResult};
use redis::Script;
use std::sync::LazyLock;
use std::thread;
use std::time::{Duration, Instant};

const MIN_RETRY_INTERVAL: Duration = Duration::from_millis(5);
const MAX_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Deletes the lock only if it still carries our token.
static RELEASE_SCRIPT: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"if redis.call("get", KEYS[1]) == ARGV[1] then
    return redis.call("del", KEYS[1])
else
    return 0
end"#,
    )
});

/// Mutual exclusion across processes through a key with a bounded lease.
/// A holder that crashes releases the lock implicitly when the lease runs out.
pub(super) struct LeaseLock<'a> {
    connections: &'a RedisConnections,
    namespace: Namespace,
    key: String,
    token: String,
}

impl<'a> LeaseLock<'a> {
    /// Polls until the lock is obtained or `wait` has elapsed.
    pub(super) fn obtain(
        connections: &'a RedisConnections,
        namespace: Namespace,
        key: String,
        lease: Duration,
        wait: Duration,
    ) -> BackendResult<Self> {
        let token = uuid::Uuid::new_v4().to_string();
        let lease_ms = lease.as_millis().max(1) as u64;
        let deadline = Instant::now() + wait;
        let mut interval = MIN_RETRY_INTERVAL;

        loop {
            let acquired: Option<String> = connections.with_connection(namespace, |conn| {
                redis::cmd("SET")
                    .arg(&key)
                    .arg(&token)
                    .arg("NX")
                    .arg("PX")
                    .arg(lease_ms)
                    .query(conn)
            })?;
            if acquired.is_some() {
                return Ok(LeaseLock {
                    connections,
                    namespace,
                    key,
                    token,
                });
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(BackendError::LockAcquisitionFailed(format!(
                    "{key} held by another creator for more than {wait:?}"
                )));
            }
            thread::sleep(interval.min(deadline - now));
            interval = (interval * 2).min(MAX_RETRY_INTERVAL);
        }
    }

    pub(super) fn key(&self) -> &str {
        &self.key
    }

    /// Returns false when the lease had already expired and someone else owns the key.
    pub(super) fn release(&self) -> BackendResult<bool> {
        let deleted: i64 = self.connections.with_connection(self.namespace, |conn| {
            RELEASE_SCRIPT.key(&self.key).arg(&self.token).invoke(conn)
        })?;
        Ok(deleted == 1)
    }
}
