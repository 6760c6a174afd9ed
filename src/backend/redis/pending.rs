use super::connection::RedisConnections;
use crate::backend::{Namespace, RequestId};
use crate::error::{BackendError, BackendResult};
use ahash::AHashMap;
use redis::Cmd;
use std::sync::Mutex;
use tracing::debug;

/// A write command waiting for its flush.
pub(super) struct StagedCommand {
    cmd: Cmd,
    /// Number of elements the command must report as added, if checked at all.
    expected: Option<usize>,
}

impl StagedCommand {
    pub(super) fn checked(cmd: Cmd, expected: usize) -> Self {
        Self {
            cmd,
            expected: Some(expected),
        }
    }

    pub(super) fn unchecked(cmd: Cmd) -> Self {
        Self {
            cmd,
            expected: None,
        }
    }

    #[cfg(test)]
    pub(super) fn cmd(&self) -> &Cmd {
        &self.cmd
    }

    #[cfg(test)]
    pub(super) fn expected(&self) -> Option<usize> {
        self.expected
    }
}

#[derive(Default)]
pub(super) struct PendingWrites {
    by_namespace: AHashMap<Namespace, Vec<StagedCommand>>,
}

impl PendingWrites {
    pub(super) fn command_count(&self) -> usize {
        self.by_namespace.values().map(|cmds| cmds.len()).sum()
    }

    pub(super) fn into_namespaces(self) -> impl Iterator<Item = (Namespace, Vec<StagedCommand>)> {
        self.by_namespace.into_iter()
    }
}

/// Writes buffered per request id until the request is flushed.
#[derive(Default)]
pub(super) struct PendingBuffer {
    inner: Mutex<AHashMap<RequestId, PendingWrites>>,
}

impl PendingBuffer {
    pub(super) fn stage(
        &self,
        request_id: &RequestId,
        namespace: Namespace,
        commands: Vec<StagedCommand>,
    ) -> BackendResult<()> {
        let mut inner = self.lock()?;
        inner
            .entry(request_id.clone())
            .or_default()
            .by_namespace
            .entry(namespace)
            .or_default()
            .extend(commands);
        Ok(())
    }

    /// Removes and returns the writes staged under `request_id`.
    pub(super) fn take(&self, request_id: &RequestId) -> BackendResult<Option<PendingWrites>> {
        Ok(self.lock()?.remove(request_id))
    }

    pub(super) fn clear(&self) -> BackendResult<()> {
        self.lock()?.clear();
        Ok(())
    }

    pub(super) fn len(&self) -> usize {
        self.inner.lock().map_or(0, |inner| inner.len())
    }

    fn lock(&self) -> BackendResult<std::sync::MutexGuard<'_, AHashMap<RequestId, PendingWrites>>> {
        self.inner
            .lock()
            .map_err(|_| BackendError::Internal("pending writes mutex poisoned".to_string()))
    }
}

/// Sends `commands` to the connection serving `namespace`, as one MULTI/EXEC
/// block where the connection supports it, and verifies the reported counts.
pub(super) fn execute(
    connections: &RedisConnections,
    namespace: Namespace,
    commands: Vec<StagedCommand>,
) -> BackendResult<()> {
    if commands.is_empty() {
        return Ok(());
    }

    let expected: usize = commands.iter().filter_map(|c| c.expected).sum();

    let added: Vec<usize> = if connections.supports_transactions(namespace)? {
        let mut pipe = redis::pipe();
        pipe.atomic();
        for staged in commands {
            pipe.add_command(staged.cmd);
            if staged.expected.is_none() {
                pipe.ignore();
            }
        }
        connections.with_connection(namespace, |conn| pipe.query(conn))?
    } else {
        // cluster connections cannot span slots in one transaction
        connections.with_connection(namespace, |conn| {
            let mut added = Vec::new();
            for staged in commands.iter() {
                if staged.expected.is_some() {
                    added.push(staged.cmd.query::<usize>(conn)?);
                } else {
                    staged.cmd.query::<()>(conn)?;
                }
            }
            Ok(added)
        })?
    };

    let actual: usize = added.iter().sum();
    debug!(%namespace, expected, actual, "flushed staged writes");
    if actual != expected {
        return Err(BackendError::Internal(format!(
            "failed write count: expected {expected} new points, stored {actual}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zadd(key: &str) -> Cmd {
        let mut cmd = redis::cmd("ZADD");
        cmd.arg(key).arg(1.5).arg("1:1.5");
        cmd
    }

    #[test]
    fn test_stage_and_take() {
        let buffer = PendingBuffer::default();
        let request = RequestId::from("req-1");

        buffer
            .stage(&request, Namespace(1), vec![StagedCommand::checked(zadd("a"), 1)])
            .unwrap();
        buffer
            .stage(&request, Namespace(2), vec![StagedCommand::checked(zadd("b"), 1)])
            .unwrap();
        buffer
            .stage(&request, Namespace(1), vec![StagedCommand::unchecked(zadd("c"))])
            .unwrap();
        assert_eq!(buffer.len(), 1);

        let writes = buffer.take(&request).unwrap().expect("staged writes");
        assert_eq!(writes.command_count(), 3);
        let mut namespaces: Vec<Namespace> = writes.into_namespaces().map(|(ns, _)| ns).collect();
        namespaces.sort();
        assert_eq!(namespaces, vec![Namespace(1), Namespace(2)]);

        // a request is flushed once
        assert!(buffer.take(&request).unwrap().is_none());
        assert_eq!(buffer.len(), 0);
    }

    #[test]
    fn test_requests_are_isolated() {
        let buffer = PendingBuffer::default();
        let first = RequestId::new();
        let second = RequestId::new();
        buffer
            .stage(&first, Namespace(0), vec![StagedCommand::checked(zadd("a"), 1)])
            .unwrap();
        buffer
            .stage(&second, Namespace(0), vec![StagedCommand::checked(zadd("b"), 1)])
            .unwrap();

        buffer.take(&first).unwrap();
        assert_eq!(buffer.len(), 1);

        buffer.clear().unwrap();
        assert!(buffer.take(&second).unwrap().is_none());
    }
}
