use crate::backend::traits::{validate_search, Backend, ReverseApi, ReverseApiHandle};
use crate::backend::types::*;
use crate::common::{Clock, SystemClock};
use crate::error::{BackendError, BackendResult};
use ahash::AHashMap;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};
use tracing::{debug, error, warn};

/// Values whose padded keys coincide share one entry, in write order.
type SeriesData = BTreeMap<PaddedTimestamp, Vec<f64>>;
type NamespaceData = AHashMap<SeriesId, SeriesData>;

#[derive(Default)]
struct SeriesStore {
    by_id: AHashMap<SeriesId, SeriesMetadata>,
    by_name: AHashMap<(Namespace, String), SeriesId>,
}

impl SeriesStore {
    fn get_by_name(&self, namespace: Namespace, name: &str) -> BackendResult<Option<SeriesId>> {
        let Some(id) = self.by_name.get(&(namespace, name.to_string())).copied() else {
            return Ok(None);
        };
        if !self.by_id.contains_key(&id) {
            error!(%namespace, name, %id, "series present in name index but missing metadata");
            return Err(BackendError::Internal(format!(
                "series {id} indexed by name but has no metadata"
            )));
        }
        Ok(Some(id))
    }

    fn insert(&mut self, meta: SeriesMetadata) {
        self.by_name.insert((meta.namespace, meta.name.clone()), meta.id);
        self.by_id.insert(meta.id, meta);
    }

    fn remove(&mut self, id: SeriesId) -> Option<SeriesMetadata> {
        let meta = self.by_id.remove(&id)?;
        self.by_name.remove(&(meta.namespace, meta.name.clone()));
        Some(meta)
    }
}

/// Reference backend keeping points and metadata in process memory.
///
/// Points live in `data` and metadata in `series`, each behind its own lock. Nothing
/// survives a restart: clients resend metadata when they get `MetadataNotFound`.
pub struct MemoryBackend {
    data: RwLock<AHashMap<Namespace, NamespaceData>>,
    series: RwLock<SeriesStore>,
    id_counter: AtomicU64,
    clock: Arc<dyn Clock>,
    reverse_api: ReverseApiHandle,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        MemoryBackend {
            data: RwLock::new(AHashMap::new()),
            series: RwLock::new(SeriesStore::default()),
            id_counter: AtomicU64::new(0),
            clock,
            reverse_api: ReverseApiHandle::new(),
        }
    }

    pub fn with_reverse_api(self, api: Weak<dyn ReverseApi>) -> Self {
        self.reverse_api.set(api);
        self
    }

    pub fn get_series_meta(&self, id: SeriesId) -> Option<SeriesMetadata> {
        let series = self.series.read().unwrap();
        series.by_id.get(&id).cloned()
    }

    pub fn series_count(&self) -> usize {
        self.series.read().unwrap().by_id.len()
    }

    /// Number of stored points for a series, regardless of range.
    pub fn point_count(&self, namespace: Namespace, id: SeriesId) -> usize {
        let data = self.data.read().unwrap();
        data.get(&namespace)
            .and_then(|ns| ns.get(&id))
            .map_or(0, |series| series.values().map(Vec::len).sum())
    }

    /// Fetches metadata and enforces the TTL. Must be called without holding
    /// the data lock, since expiry deletes through the reverse api.
    fn live_series_meta(&self, key: SeriesIdentifier) -> BackendResult<SeriesMetadata> {
        let Some(meta) = self.get_series_meta(key.id) else {
            // e.g. the server restarted while the client still believes the series is initialized
            return Err(BackendError::MetadataNotFound);
        };
        if meta.namespace != key.namespace {
            return Err(BackendError::MetadataNotFound);
        }
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

    fn create_series(&self, store: &mut SeriesStore, input: SeriesMetadataInput) -> SeriesId {
        let id = SeriesId(self.id_counter.fetch_add(1, Ordering::SeqCst) + 1);
        let meta = input.into_metadata(id, self.clock.now_seconds());
        debug!(namespace = %meta.namespace, name = %meta.name, %id, "series created");
        store.insert(meta);
        id
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for MemoryBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::Memory
    }

    fn init(&self) -> BackendResult<()> {
        Ok(())
    }

    fn write(&self, ctx: &WriteContext, timestamps: &[u64], values: &[f64]) -> BackendResult<()> {
        self.live_series_meta(ctx.series_identifier())?;

        let mut data = self.data.write().unwrap();
        let series = data
            .entry(ctx.namespace)
            .or_default()
            .entry(ctx.series)
            .or_default();

        for (&timestamp, &value) in timestamps.iter().zip(values.iter()) {
            // pad the timestamp so several values can share the same millisecond
            series
                .entry(PaddedTimestamp::random(timestamp))
                .or_default()
                .push(value);
        }

        Ok(())
    }

    fn flush_pending_writes(&self, _request_id: &RequestId) -> BackendResult<()> {
        Ok(())
    }

    fn read(&self, ctx: &ReadContext) -> BackendResult<ReadResult> {
        self.live_series_meta(ctx.series_identifier())?;

        if ctx.from > ctx.to {
            return Err(BackendError::NoDataFound);
        }
        let lower = PaddedTimestamp(ctx.from as f64);
        let upper = PaddedTimestamp(ctx.padded_upper_bound());

        let data = self.data.read().unwrap();
        let Some(series) = data.get(&ctx.namespace).and_then(|ns| ns.get(&ctx.series)) else {
            return Err(BackendError::NoDataFound);
        };

        let points: Vec<DataPoint> = series
            .range(lower..=upper)
            .filter(|(key, _)| ctx.contains(**key))
            .flat_map(|(key, values)| {
                let timestamp = key.timestamp();
                values.iter().map(move |&value| DataPoint { timestamp, value })
            })
            .collect();

        if points.is_empty() {
            return Err(BackendError::NoDataFound);
        }

        Ok(ReadResult { points })
    }

    fn create_or_update_series(&self, create: CreateSeries) -> BackendResult<CreateSeriesResult> {
        let mut result = CreateSeriesResult::default();

        // optimistic pass, most creates are re-creates of existing series
        let mut new_series = Vec::new();
        {
            let store = self.series.read().unwrap();
            for (identifier, input) in create.series {
                match store.get_by_name(input.namespace, &input.name)? {
                    Some(id) => result.insert(identifier, id, false),
                    None => new_series.push((identifier, input)),
                }
            }
        }

        if new_series.is_empty() {
            return Ok(result);
        }

        let mut store = self.series.write().unwrap();
        for (identifier, input) in new_series {
            // check again, now holding the write lock
            if let Some(id) = store.get_by_name(input.namespace, &input.name)? {
                result.insert(identifier, id, false);
                continue;
            }
            let id = self.create_series(&mut store, input);
            result.insert(identifier, id, true);
        }

        Ok(result)
    }

    fn search_series(&self, search: &SearchSeries) -> BackendResult<Vec<SeriesIdentifier>> {
        validate_search(search)?;

        let store = self.series.read().unwrap();
        let res = store
            .get_by_name(search.namespace, &search.name)?
            .map(|id| vec![SeriesIdentifier::new(search.namespace, id)])
            .unwrap_or_default();
        Ok(res)
    }

    fn delete_series(&self, series: &[SeriesIdentifier]) -> BackendResult<()> {
        {
            let mut store = self.series.write().unwrap();
            for key in series {
                match store.by_id.get(&key.id) {
                    Some(meta) if meta.namespace != key.namespace => {
                        return Err(BackendError::NamespaceMismatch)
                    }
                    Some(_) => {}
                    None => return Err(BackendError::MetadataNotFound),
                }
            }
            for key in series {
                store.remove(key.id);
            }
        }

        let mut data = self.data.write().unwrap();
        for key in series {
            if let Some(ns) = data.get_mut(&key.namespace) {
                ns.remove(&key.id);
            }
        }
        Ok(())
    }

    fn set_reverse_api(&self, api: Weak<dyn ReverseApi>) {
        self.reverse_api.set(api);
    }

    fn clear(&self) -> BackendResult<()> {
        let mut series = self.series.write().unwrap();
        let mut data = self.data.write().unwrap();
        *data = AHashMap::new();
        *series = SeriesStore::default();
        self.id_counter.store(0, Ordering::SeqCst);
        Ok(())
    }
}
