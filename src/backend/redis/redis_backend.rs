use super::connection::RedisConnections;
use super::keys::*;
use super::lock::LeaseLock;
use super::options::RedisOptions;
use super::pending::{execute, PendingBuffer, StagedCommand};
use crate::backend::traits::{validate_search, Backend, ReverseApi, ReverseApiHandle};
use crate::backend::types::*;
use crate::common::{Clock, SystemClock, MAX_PADDING};
use crate::error::{BackendError, BackendResult};
use ahash::{AHashMap, AHashSet};
use lru_time_cache::LruCache;
use redis::Cmd;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock, Weak};
use tracing::{debug, error, info, warn};

const METADATA_CACHE_CAPACITY: usize = 10_000;
/// Random paddings tried before stepping through the padding range in order.
const RANDOM_PADDING_ATTEMPTS: usize = 8;

/// Backend persisting points and metadata in a redis compatible server.
///
/// Points are kept in one sorted set per series and day, scored by the padded
/// timestamp. Writes carrying a request id are buffered until
/// `flush_pending_writes` and then applied in one transaction per connection.
pub struct RedisBackend {
    opts: RedisOptions,
    connections: RwLock<Option<Arc<RedisConnections>>>,
    pending: PendingBuffer,
    cache: Mutex<LruCache<SeriesIdentifier, SeriesMetadata>>,
    clock: Arc<dyn Clock>,
    reverse_api: ReverseApiHandle,
}

impl RedisBackend {
    pub fn new(opts: RedisOptions) -> Self {
        Self::with_clock(opts, Arc::new(SystemClock))
    }

    pub fn with_clock(opts: RedisOptions, clock: Arc<dyn Clock>) -> Self {
        let cache = LruCache::with_expiry_duration_and_capacity(opts.metadata_cache_ttl, METADATA_CACHE_CAPACITY);
        RedisBackend {
            opts,
            connections: RwLock::new(None),
            pending: PendingBuffer::default(),
            cache: Mutex::new(cache),
            clock,
            reverse_api: ReverseApiHandle::new(),
        }
    }

    pub fn options(&self) -> &RedisOptions {
        &self.opts
    }

    /// Number of request ids with writes waiting for a flush.
    pub fn pending_request_count(&self) -> usize {
        self.pending.len()
    }

    fn connections(&self) -> BackendResult<Arc<RedisConnections>> {
        let guard = self
            .connections
            .read()
            .map_err(|_| BackendError::Internal("redis connections lock poisoned".to_string()))?;
        guard
            .clone()
            .ok_or_else(|| BackendError::BackendUnavailable("redis backend not initialized".to_string()))
    }

    fn get_series_id(&self, conns: &RedisConnections, namespace: Namespace, name: &str) -> BackendResult<Option<SeriesId>> {
        let key = series_key(namespace, name);
        let id: Option<u64> = conns.with_connection(namespace, |conn| redis::cmd("GET").arg(&key).query(conn))?;
        Ok(id.map(SeriesId))
    }

    fn load_meta(&self, conns: &RedisConnections, key: SeriesIdentifier) -> BackendResult<Option<SeriesMetadata>> {
        let meta_key = meta_key(key.namespace, key.id);
        let raw: Option<String> =
            conns.with_connection(key.namespace, |conn| redis::cmd("GET").arg(&meta_key).query(conn))?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Read-through lookup; entries stay cached for `metadata_cache_ttl`.
    fn cached_meta(&self, conns: &RedisConnections, key: SeriesIdentifier) -> BackendResult<Option<SeriesMetadata>> {
        if let Ok(mut cache) = self.cache.lock() {
            if let Some(meta) = cache.get(&key) {
                return Ok(Some(meta.clone()));
            }
        }
        let meta = self.load_meta(conns, key)?;
        if let (Some(meta), Ok(mut cache)) = (meta.as_ref(), self.cache.lock()) {
            cache.insert(key, meta.clone());
        }
        Ok(meta)
    }

    fn invalidate(&self, keys: impl IntoIterator<Item = SeriesIdentifier>) {
        if let Ok(mut cache) = self.cache.lock() {
            for key in keys {
                cache.remove(&key);
            }
        }
    }

    fn live_series_meta(&self, conns: &RedisConnections, key: SeriesIdentifier) -> BackendResult<SeriesMetadata> {
        let meta = match self.cached_meta(conns, key)? {
            Some(meta) if meta.namespace == key.namespace => meta,
            _ => return Err(BackendError::MetadataNotFound),
        };
        if meta.is_expired(self.clock.now_seconds()) {
            self.expire_series(key)?;
            return Err(BackendError::SeriesExpired);
        }
        Ok(meta)
    }

    fn expire_series(&self, key: SeriesIdentifier) -> BackendResult<()> {
        warn!(namespace = %key.namespace, series = %key.id, "series ttl expired, removing");
        let ids = [key];
        match self.reverse_api.delete_series(&ids) {
            Some(res) => res,
            None => self.delete_series(&ids),
        }
    }

    /// Runs independent read commands, pipelined when the connection allows it.
    fn query_all<T: redis::FromRedisValue>(
        &self,
        conns: &RedisConnections,
        namespace: Namespace,
        commands: Vec<Cmd>,
    ) -> BackendResult<Vec<T>> {
        if conns.supports_transactions(namespace)? {
            let mut pipe = redis::pipe();
            for cmd in commands {
                pipe.add_command(cmd);
            }
            conns.with_connection(namespace, |conn| pipe.query(conn))
        } else {
            conns.with_connection(namespace, |conn| {
                commands.iter().map(|cmd| cmd.query::<T>(&mut *conn)).collect()
            })
        }
    }

    fn create_one(&self, conns: &RedisConnections, input: SeriesMetadataInput) -> BackendResult<(SeriesId, bool)> {
        let namespace = input.namespace;
        if let Some(id) = self.get_series_id(conns, namespace, &input.name)? {
            return Ok((id, false));
        }

        let lock_key = lock_key(&series_key(namespace, &input.name));
        let lock = LeaseLock::obtain(conns, namespace, lock_key, self.opts.lock_lease, self.opts.lock_wait)?;
        let _lock = scopeguard::guard(lock, |lock| match lock.release() {
            Ok(true) => {}
            Ok(false) => warn!(key = lock.key(), "creation lock lease expired before release"),
            Err(e) => warn!(key = lock.key(), error = %e, "failed to release creation lock"),
        });

        // another creator may have won while we waited
        if let Some(id) = self.get_series_id(conns, namespace, &input.name)? {
            return Ok((id, false));
        }

        let id: u64 = conns.with_connection(namespace, |conn| redis::cmd("INCR").arg(id_key(namespace)).query(conn))?;
        let meta = input.into_metadata(SeriesId(id), self.clock.now_seconds());
        let encoded = serde_json::to_string(&meta)?;

        let mut commands = Vec::with_capacity(2 + meta.tags.len());
        let mut set_name = redis::cmd("SET");
        set_name.arg(series_key(namespace, &meta.name)).arg(id);
        commands.push(StagedCommand::unchecked(set_name));
        let mut set_meta = redis::cmd("SET");
        set_meta.arg(meta_key(namespace, meta.id)).arg(encoded);
        commands.push(StagedCommand::unchecked(set_meta));
        for tag in meta.tags.iter() {
            let mut sadd = redis::cmd("SADD");
            sadd.arg(tag_key(namespace, tag)).arg(id);
            commands.push(StagedCommand::unchecked(sadd));
        }
        execute(conns, namespace, commands)?;

        self.invalidate([meta.identifier()]);
        debug!(%namespace, name = %meta.name, id, "series created");
        Ok((meta.id, true))
    }
}

impl Backend for RedisBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::Redis
    }

    fn init(&self) -> BackendResult<()> {
        let conns = {
            let mut guard = self
                .connections
                .write()
                .map_err(|_| BackendError::Internal("redis connections lock poisoned".to_string()))?;
            match guard.as_ref() {
                Some(conns) => conns.clone(),
                None => {
                    let conns = Arc::new(RedisConnections::connect(&self.opts)?);
                    *guard = Some(conns.clone());
                    conns
                }
            }
        };
        conns.ping_all()?;
        info!(namespaces = self.opts.connections.len(), "redis backend initialized");
        Ok(())
    }

    fn write(&self, ctx: &WriteContext, timestamps: &[u64], values: &[f64]) -> BackendResult<()> {
        let conns = self.connections()?;
        let meta = self.live_series_meta(&conns, ctx.series_identifier())?;
        let commands = stage_points(&meta, timestamps, values)?;

        if ctx.request_id.is_empty() {
            return execute(&conns, ctx.namespace, commands);
        }
        self.pending.stage(&ctx.request_id, ctx.namespace, commands)
    }

    fn flush_pending_writes(&self, request_id: &RequestId) -> BackendResult<()> {
        let Some(writes) = self.pending.take(request_id)? else {
            return Err(BackendError::NothingToFlush(request_id.clone()));
        };
        let conns = self.connections()?;
        debug!(%request_id, commands = writes.command_count(), "flushing pending writes");
        for (namespace, commands) in writes.into_namespaces() {
            execute(&conns, namespace, commands)?;
        }
        Ok(())
    }

    fn read(&self, ctx: &ReadContext) -> BackendResult<ReadResult> {
        let conns = self.connections()?;
        self.live_series_meta(&conns, ctx.series_identifier())?;

        if ctx.from > ctx.to {
            return Err(BackendError::NoDataFound);
        }
        let buckets = read_buckets(ctx.from, ctx.to)?;
        let upper = ctx.padded_upper_bound().to_string();
        let commands: Vec<Cmd> = buckets
            .into_iter()
            .map(|bucket| {
                let mut cmd = redis::cmd("ZRANGEBYSCORE");
                cmd.arg(data_key(ctx.namespace, ctx.series, bucket))
                    .arg(ctx.from)
                    .arg(&upper)
                    .arg("WITHSCORES");
                cmd
            })
            .collect();

        let ranges: Vec<Vec<(String, f64)>> = self.query_all(&conns, ctx.namespace, commands)?;

        let mut scored = Vec::with_capacity(ranges.iter().map(|r| r.len()).sum());
        for (member, score) in ranges.into_iter().flatten() {
            if ctx.contains(PaddedTimestamp(score)) {
                scored.push((score, parse_member_value(&member)?));
            }
        }
        if scored.is_empty() {
            return Err(BackendError::NoDataFound);
        }
        scored.sort_by(|a, b| a.0.total_cmp(&b.0));

        let points = scored
            .into_iter()
            .map(|(score, value)| DataPoint {
                timestamp: PaddedTimestamp(score).timestamp(),
                value,
            })
            .collect();
        Ok(ReadResult { points })
    }

    fn create_or_update_series(&self, create: CreateSeries) -> BackendResult<CreateSeriesResult> {
        let conns = self.connections()?;
        let mut result = CreateSeriesResult::default();
        for (identifier, input) in create.series {
            let (id, created) = self.create_one(&conns, input)?;
            result.insert(identifier, id, created);
        }
        Ok(result)
    }

    fn search_series(&self, search: &SearchSeries) -> BackendResult<Vec<SeriesIdentifier>> {
        validate_search(search)?;

        let conns = self.connections()?;
        let Some(id) = self.get_series_id(&conns, search.namespace, &search.name)? else {
            return Ok(vec![]);
        };
        let key = SeriesIdentifier::new(search.namespace, id);
        if self.cached_meta(&conns, key)?.is_none() {
            error!(namespace = %search.namespace, name = %search.name, %id, "series present in name index but missing metadata");
            return Err(BackendError::Internal(format!(
                "series {id} indexed by name but has no metadata"
            )));
        }
        Ok(vec![key])
    }

    fn delete_series(&self, series: &[SeriesIdentifier]) -> BackendResult<()> {
        let conns = self.connections()?;

        let mut metas = Vec::with_capacity(series.len());
        for key in series {
            let Some(meta) = self.load_meta(&conns, *key)? else {
                return Err(BackendError::MetadataNotFound);
            };
            if meta.namespace != key.namespace {
                return Err(BackendError::NamespaceMismatch);
            }
            metas.push(meta);
        }

        let mut by_namespace: AHashMap<Namespace, Vec<StagedCommand>> = AHashMap::new();
        for meta in metas.iter() {
            let commands = by_namespace.entry(meta.namespace).or_default();
            let mut del = redis::cmd("DEL");
            del.arg(series_key(meta.namespace, &meta.name))
                .arg(meta_key(meta.namespace, meta.id));
            commands.push(StagedCommand::unchecked(del));
            for tag in meta.tags.iter() {
                let mut srem = redis::cmd("SREM");
                srem.arg(tag_key(meta.namespace, tag)).arg(meta.id.0);
                commands.push(StagedCommand::unchecked(srem));
            }
        }
        for (namespace, commands) in by_namespace {
            execute(&conns, namespace, commands)?;
        }

        self.invalidate(metas.iter().map(|meta| meta.identifier()));
        debug!(count = metas.len(), "series deleted");
        Ok(())
    }

    fn set_reverse_api(&self, api: Weak<dyn ReverseApi>) {
        self.reverse_api.set(api);
    }

    fn clear(&self) -> BackendResult<()> {
        let conns = self.connections()?;
        for namespace in conns.namespaces() {
            conns.with_connection(*namespace, |conn| redis::cmd("FLUSHDB").query::<()>(conn))?;
        }
        self.pending.clear()?;
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
        Ok(())
    }
}

/// Picks a padding for which `(bucket, member)` is not yet taken. A few random
/// paddings are tried first, then every representable score below
/// `timestamp + MAX_PADDING` in order.
fn unique_point(taken: &AHashSet<(u64, String)>, timestamp: u64, value: f64) -> BackendResult<EncodedPoint> {
    let is_free = |point: &EncodedPoint| !taken.contains(&(point.bucket, point.member.clone()));

    for _ in 0..RANDOM_PADDING_ATTEMPTS {
        let point = encode_point(timestamp, value, random_padding());
        if is_free(&point) {
            return Ok(point);
        }
    }

    let limit = timestamp as f64 + MAX_PADDING;
    let mut score = timestamp as f64;
    while score < limit {
        let point = encode_scored_point(timestamp, score, value);
        if is_free(&point) {
            return Ok(point);
        }
        score = next_score(score);
    }
    Err(BackendError::KeySpaceExhausted(timestamp))
}

/// Turns a batch of points into one checked `ZADD` per day bucket, plus an
/// `EXPIREAT` per bucket for series with a TTL.
pub(super) fn stage_points(
    meta: &SeriesMetadata,
    timestamps: &[u64],
    values: &[f64],
) -> BackendResult<Vec<StagedCommand>> {
    let mut buckets: BTreeMap<u64, Vec<EncodedPoint>> = BTreeMap::new();
    // equal members would collapse into one sorted set entry
    let mut taken: AHashSet<(u64, String)> = AHashSet::with_capacity(timestamps.len());

    for (&timestamp, &value) in timestamps.iter().zip(values.iter()) {
        let point = unique_point(&taken, timestamp, value)?;
        taken.insert((point.bucket, point.member.clone()));
        buckets.entry(point.bucket).or_default().push(point);
    }

    let mut commands = Vec::with_capacity(buckets.len() * 2);
    for (bucket, points) in buckets {
        let key = data_key(meta.namespace, meta.id, bucket);
        let mut zadd = redis::cmd("ZADD");
        zadd.arg(&key);
        for point in points.iter() {
            zadd.arg(point.score).arg(&point.member);
        }
        commands.push(StagedCommand::checked(zadd, points.len()));

        if let Some(expire_at) = meta.ttl_expire_at {
            let mut expire = redis::cmd("EXPIREAT");
            expire.arg(&key).arg(bucket_end_seconds(bucket).max(expire_at));
            commands.push(StagedCommand::unchecked(expire));
        }
    }
    Ok(commands)
}
