#[cfg(test)]
mod tests {
    use crate::backend::memory::MemoryBackend;
    use crate::backend::{
        Backend, CreateSeries, Namespace, ReadContext, RequestId, SearchComparator, SearchSeries,
        SeriesCreateIdentifier, SeriesId, SeriesIdentifier, SeriesMetadataInput, WriteContext,
    };
    use crate::common::{Clock, MockClock};
    use crate::error::BackendError;
    use chrono::Duration;
    use std::sync::{Arc, Barrier};
    use std::thread;
    use test_case::test_case;

    fn create_banana(backend: &MemoryBackend, identifier: u64) -> (SeriesId, bool) {
        let req = CreateSeries::single(
            identifier,
            SeriesMetadataInput::new(1, "banana").with_tags(&["one", "two"]),
        );
        let resp = backend.create_or_update_series(req).unwrap();
        let res = resp.get(identifier).unwrap();
        assert_eq!(res.identifier, SeriesCreateIdentifier(identifier));
        (res.id, res.created)
    }

    fn create_series(backend: &MemoryBackend, namespace: i32, name: &str, ttl: Option<u32>) -> SeriesId {
        let mut input = SeriesMetadataInput::new(namespace, name);
        input.ttl = ttl;
        let identifier = SeriesCreateIdentifier::random();
        let resp = backend
            .create_or_update_series(CreateSeries::single(identifier, input))
            .unwrap();
        resp.get(identifier).unwrap().id
    }

    fn write_ctx(namespace: i32, series: SeriesId) -> WriteContext {
        WriteContext::new(namespace, series, RequestId::new())
    }

    #[test]
    fn test_create_search_delete_scenario() {
        let backend = MemoryBackend::new();

        // first create
        let (id, created) = create_banana(&backend, 12345);
        assert_eq!(id, SeriesId(1));
        assert!(created, "should be new");

        // second create (actually not a create)
        let (id, created) = create_banana(&backend, 2345);
        assert_eq!(id, SeriesId(1));
        assert!(!created, "should not be new");

        // tags are never overwritten
        let meta = backend.get_series_meta(SeriesId(1)).unwrap();
        assert_eq!(meta.tags, vec!["one".to_string(), "two".to_string()]);

        let found = backend.search_series(&SearchSeries::by_name(1, "banana")).unwrap();
        assert_eq!(found, vec![SeriesIdentifier::new(1, 1)]);

        let found = backend.search_series(&SearchSeries::by_name(1, "notBanana")).unwrap();
        assert!(found.is_empty());

        let found = backend.search_series(&SearchSeries::by_name(2, "banana")).unwrap();
        assert!(found.is_empty());

        // delete wrong namespace
        let res = backend.delete_series(&[SeriesIdentifier::new(2, 1)]);
        assert_eq!(res, Err(BackendError::NamespaceMismatch));

        // delete non existing
        let res = backend.delete_series(&[SeriesIdentifier::new(1, 15)]);
        assert_eq!(res, Err(BackendError::MetadataNotFound));

        backend.delete_series(&[SeriesIdentifier::new(1, 1)]).unwrap();

        let found = backend.search_series(&SearchSeries::by_name(1, "banana")).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn test_namespace_isolation() {
        let backend = MemoryBackend::new();
        let first = create_series(&backend, 1, "x", None);
        let second = create_series(&backend, 2, "x", None);
        assert_ne!(first, second);

        let found = backend.search_series(&SearchSeries::by_name(1, "x")).unwrap();
        assert_eq!(found, vec![SeriesIdentifier::new(1, first)]);
        let found = backend.search_series(&SearchSeries::by_name(2, "x")).unwrap();
        assert_eq!(found, vec![SeriesIdentifier::new(2, second)]);

        // a series is not reachable through another namespace
        let res = backend.read(&ReadContext::new(2, first, 0, 100));
        assert_eq!(res, Err(BackendError::MetadataNotFound));
    }

    #[test]
    fn test_duplicate_names_in_one_batch_create_once() {
        let backend = MemoryBackend::new();
        let mut req = CreateSeries::new();
        req.add(1, SeriesMetadataInput::new(1, "dup"));
        req.add(2, SeriesMetadataInput::new(1, "dup"));
        let resp = backend.create_or_update_series(req).unwrap();

        let a = resp.get(1).unwrap();
        let b = resp.get(2).unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(a.created as u8 + b.created as u8, 1);
        assert_eq!(backend.series_count(), 1);
    }

    #[test]
    fn test_concurrent_create_is_idempotent() {
        const THREADS: usize = 16;
        let backend = Arc::new(MemoryBackend::new());
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles: Vec<_> = (0..THREADS)
            .map(|i| {
                let backend = backend.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    let identifier = i as u64 + 1;
                    let req = CreateSeries::single(identifier, SeriesMetadataInput::new(7, "race"));
                    let resp = backend.create_or_update_series(req).unwrap();
                    *resp.get(identifier).unwrap()
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let created = results.iter().filter(|r| r.created).count();
        assert_eq!(created, 1);
        let id = results[0].id;
        assert!(results.iter().all(|r| r.id == id));
        assert_eq!(backend.series_count(), 1);
    }

    #[test]
    fn test_round_trip() {
        let backend = MemoryBackend::new();
        let id = create_series(&backend, 1, "round-trip", None);
        let ts = 1_598_261_325_123;
        let value = 1.234;

        backend.write(&write_ctx(1, id), &[ts], &[value]).unwrap();

        let res = backend.read(&ReadContext::new(1, id, ts - 1, ts + 1)).unwrap();
        assert_eq!(res.len(), 1);
        assert_eq!(res.points[0].timestamp, ts);
        assert_eq!(res.points[0].value, value);
    }

    #[test]
    fn test_same_timestamp_values_do_not_collide() {
        let backend = MemoryBackend::new();
        let id = create_series(&backend, 1, "collide", None);
        let ts = 1_000_000;

        backend
            .write(&write_ctx(1, id), &[ts, ts, ts], &[1.0, 2.0, 3.0])
            .unwrap();

        let res = backend.read(&ReadContext::new(1, id, 0, u32::MAX as u64)).unwrap();
        assert_eq!(res.len(), 3);
        let mut values: Vec<f64> = res.points.iter().map(|p| p.value).collect();
        values.sort_by(|a, b| a.total_cmp(b));
        assert_eq!(values, vec![1.0, 2.0, 3.0]);
        assert!(res.points.iter().all(|p| p.timestamp == ts));
    }

    #[test]
    fn test_thousand_values_at_one_timestamp() {
        let backend = MemoryBackend::new();
        let id = create_series(&backend, 1, "crowded", None);
        let ts = 1_598_261_325_123;
        let timestamps = vec![ts; 1_000];
        let values = vec![7.5; 1_000];

        backend.write(&write_ctx(1, id), &timestamps, &values).unwrap();

        assert_eq!(backend.point_count(Namespace(1), id), 1_000);
        let res = backend.read(&ReadContext::new(1, id, ts, ts)).unwrap();
        assert_eq!(res.len(), 1_000);
        assert!(res.points.iter().all(|p| p.timestamp == ts && p.value == 7.5));
    }

    #[test]
    fn test_timestamps_beyond_padding_precision() {
        let backend = MemoryBackend::new();
        let id = create_series(&backend, 1, "far-future", None);
        // at 2^50 the f64 spacing is 0.25, so every padding rounds to the same key
        let ts = 1u64 << 50;

        backend.write(&write_ctx(1, id), &[ts, ts], &[1.0, 2.0]).unwrap();

        let res = backend.read(&ReadContext::new(1, id, ts, ts)).unwrap();
        assert_eq!(res.len(), 2);
        let values: Vec<f64> = res.points.iter().map(|p| p.value).collect();
        assert_eq!(values, vec![1.0, 2.0]);
        assert!(res.points.iter().all(|p| p.timestamp == ts));

        let res = backend.read(&ReadContext::new(1, id, ts + 1, ts + 10));
        assert_eq!(res, Err(BackendError::NoDataFound));
    }

    #[test_case(100, 100, 1 ; "from and to equal the timestamp")]
    #[test_case(99, 100, 1 ; "to equals the timestamp")]
    #[test_case(100, 200, 1 ; "from equals the timestamp")]
    #[test_case(101, 200, 0 ; "range after the timestamp")]
    #[test_case(0, 99, 0 ; "range before the timestamp")]
    fn test_read_range_bounds(from: u64, to: u64, expected: usize) {
        let backend = MemoryBackend::new();
        let id = create_series(&backend, 1, "bounds", None);
        backend.write(&write_ctx(1, id), &[100], &[42.0]).unwrap();

        let res = backend.read(&ReadContext::new(1, id, from, to));
        match expected {
            0 => assert_eq!(res, Err(BackendError::NoDataFound)),
            n => assert_eq!(res.unwrap().len(), n),
        }
    }

    #[test]
    fn test_read_counts_every_accepted_write() {
        let backend = MemoryBackend::new();
        let id = create_series(&backend, 3, "counts", None);
        let timestamps: Vec<u64> = (0..500).map(|i| 1_000 + (i % 50)).collect();
        let values: Vec<f64> = (0..500).map(|i| i as f64).collect();

        backend.write(&write_ctx(3, id), &timestamps, &values).unwrap();

        let res = backend.read(&ReadContext::new(3, id, 1_000, 1_049)).unwrap();
        assert_eq!(res.len(), 500);
        assert!(res.points.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn test_read_unknown_series() {
        let backend = MemoryBackend::new();
        let res = backend.read(&ReadContext::new(1, 99, 0, 100));
        assert_eq!(res, Err(BackendError::MetadataNotFound));

        let res = backend.write(&write_ctx(1, SeriesId(99)), &[1], &[1.0]);
        assert_eq!(res, Err(BackendError::MetadataNotFound));
    }

    #[test]
    fn test_read_known_series_without_points() {
        let backend = MemoryBackend::new();
        let id = create_series(&backend, 1, "empty", None);
        let res = backend.read(&ReadContext::new(1, id, 0, 100));
        assert_eq!(res, Err(BackendError::NoDataFound));
    }

    #[test]
    fn test_ttl_expiry() {
        let clock = Arc::new(MockClock::new());
        let backend = MemoryBackend::with_clock(clock.clone());
        let id = create_series(&backend, 1, "short-lived", Some(1));
        let now = clock.now_millis();

        backend.write(&write_ctx(1, id), &[now], &[1.0]).unwrap();
        let res = backend.read(&ReadContext::new(1, id, now - 1, now + 1)).unwrap();
        assert_eq!(res.len(), 1);

        clock.advance(Duration::seconds(2));

        let res = backend.read(&ReadContext::new(1, id, now - 1, now + 1));
        assert_eq!(res, Err(BackendError::SeriesExpired));
        assert!(res.unwrap_err().is_no_data());

        // metadata and points are gone
        assert!(backend.get_series_meta(id).is_none());
        assert_eq!(backend.point_count(Namespace(1), id), 0);
        let found = backend.search_series(&SearchSeries::by_name(1, "short-lived")).unwrap();
        assert!(found.is_empty());

        // from now on the series is unknown
        let res = backend.write(&write_ctx(1, id), &[now], &[2.0]);
        assert_eq!(res, Err(BackendError::MetadataNotFound));
    }

    #[test]
    fn test_write_to_expired_series_fails() {
        let clock = Arc::new(MockClock::new());
        let backend = MemoryBackend::with_clock(clock.clone());
        let id = create_series(&backend, 1, "expired-write", Some(5));

        clock.advance(Duration::seconds(10));
        let res = backend.write(&write_ctx(1, id), &[1], &[1.0]);
        assert_eq!(res, Err(BackendError::SeriesExpired));
        assert!(res.unwrap_err().is_missing_metadata());
        assert_eq!(backend.series_count(), 0);
    }

    #[test]
    fn test_failed_delete_leaves_state_unchanged() {
        let backend = MemoryBackend::new();
        let first = create_series(&backend, 1, "a", None);
        let second = create_series(&backend, 1, "b", None);

        // the valid first entry must not be deleted when the second one fails
        let res = backend.delete_series(&[
            SeriesIdentifier::new(1, first),
            SeriesIdentifier::new(2, second),
        ]);
        assert_eq!(res, Err(BackendError::NamespaceMismatch));
        assert_eq!(backend.series_count(), 2);

        let res = backend.delete_series(&[
            SeriesIdentifier::new(1, first),
            SeriesIdentifier::new(1, 1000),
        ]);
        assert_eq!(res, Err(BackendError::MetadataNotFound));
        assert_eq!(backend.series_count(), 2);
    }

    #[test]
    fn test_unsupported_search_predicates() {
        let backend = MemoryBackend::new();

        let mut search = SearchSeries::by_name(1, "x");
        search.and = Some(vec![SearchSeries::by_name(1, "y")]);
        assert!(matches!(backend.search_series(&search), Err(BackendError::InvalidQuery(_))));

        let mut search = SearchSeries::by_name(1, "x");
        search.or = Some(vec![]);
        assert!(matches!(backend.search_series(&search), Err(BackendError::InvalidQuery(_))));

        let mut search = SearchSeries::by_name(1, "x");
        search.comparator = SearchComparator::NotEquals;
        assert!(matches!(backend.search_series(&search), Err(BackendError::InvalidQuery(_))));

        let mut search = SearchSeries::by_name(1, "x");
        search.tag = Some("one".to_string());
        assert!(matches!(backend.search_series(&search), Err(BackendError::InvalidQuery(_))));
    }

    #[test]
    fn test_clear_resets_ids() {
        let backend = MemoryBackend::new();
        create_series(&backend, 1, "a", None);
        create_series(&backend, 1, "b", None);
        backend.clear().unwrap();
        assert_eq!(backend.series_count(), 0);

        // a restarted backend hands out ids from the start, clients resend metadata
        let id = create_series(&backend, 1, "b", None);
        assert_eq!(id, SeriesId(1));
    }

    #[test]
    fn test_flush_is_noop() {
        let backend = MemoryBackend::new();
        backend.flush_pending_writes(&RequestId::new()).unwrap();
    }
}
