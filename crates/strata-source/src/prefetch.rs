use std::{collections::HashSet, sync::Arc};

use parking_lot::Mutex;
use strata_cache::DiskCacheStore;
use strata_net::Net;
use tracing::{debug, trace};

use crate::{
    cached::CacheDataSource,
    pool::PrefetchPool,
    request::MediaRequest,
    traits::{DataSource, ReadOutcome},
};

/// Fire-and-forget cache warming with in-flight deduplication.
///
/// At most one network fetch per exact `(key, range)` proceeds at a time, no
/// matter how many callers ask; already-satisfied ranges are skipped up
/// front. Failures are swallowed; a failed prefetch only means a later
/// foreground read pays the network round trip itself.
pub struct SegmentPrefetcher<N> {
    net: Arc<N>,
    store: DiskCacheStore,
    pool: PrefetchPool,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl<N> Clone for SegmentPrefetcher<N> {
    fn clone(&self) -> Self {
        Self {
            net: self.net.clone(),
            store: self.store.clone(),
            pool: self.pool.clone(),
            in_flight: self.in_flight.clone(),
        }
    }
}

impl<N: Net + 'static> SegmentPrefetcher<N> {
    #[must_use]
    pub fn new(net: Arc<N>, store: DiskCacheStore, pool: PrefetchPool) -> Self {
        Self {
            net,
            store,
            pool,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Warm the cache for `request`'s range in the background.
    pub fn prefetch(&self, request: MediaRequest) {
        let Ok(key) = request.cache_key() else {
            return;
        };

        if self.store.is_cached(&key, request.range) {
            trace!(key = %key, range = %request.range, "prefetch skipped, already cached");
            return;
        }

        let job_id = format!(
            "{}:{}:{}",
            key.as_str(),
            request.range.position,
            request
                .range
                .length
                .map_or_else(|| "eof".to_string(), |len| len.to_string()),
        );
        {
            let mut in_flight = self.in_flight.lock();
            if !in_flight.insert(job_id.clone()) {
                trace!(job_id, "prefetch skipped, already in flight");
                return;
            }
        }
        let guard = InFlightGuard {
            set: self.in_flight.clone(),
            id: job_id,
        };

        let net = self.net.clone();
        let store = self.store.clone();
        self.pool.spawn(async move {
            // Removal on every outcome, including cancellation mid-await.
            let _guard = guard;

            let mut source = CacheDataSource::new(net, store, true);
            match source.open(&request).await {
                Ok(_) => {
                    let mut buf = [0u8; 16 * 1024];
                    loop {
                        match source.read(&mut buf).await {
                            Ok(ReadOutcome::Bytes(_)) => {}
                            Ok(ReadOutcome::EndOfInput) => break,
                            Err(e) => {
                                debug!(url = %request.url, error = %e, "prefetch read failed");
                                break;
                            }
                        }
                    }
                }
                Err(e) => {
                    debug!(url = %request.url, error = %e, "prefetch open failed");
                }
            }
            let _ = source.close().await;
        });
    }

    /// Number of jobs currently in flight (diagnostics and tests).
    #[must_use]
    pub fn in_flight_len(&self) -> usize {
        self.in_flight.lock().len()
    }
}

struct InFlightGuard {
    set: Arc<Mutex<HashSet<String>>>,
    id: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.lock().remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use async_trait::async_trait;
    use bytes::Bytes;
    use strata_core::ByteRange;
    use strata_net::{Headers, NetError, NetResponse, RangeSpec};
    use tempfile::TempDir;
    use url::Url;

    use super::*;

    /// Counts fetches and serves a fixed payload after a short delay, so
    /// concurrent prefetch calls overlap while the first is in flight.
    struct CountingNet {
        fetches: AtomicUsize,
        payload: Vec<u8>,
    }

    impl CountingNet {
        fn new(payload: Vec<u8>) -> Self {
            Self {
                fetches: AtomicUsize::new(0),
                payload,
            }
        }

        fn respond(&self, start: u64, len: Option<u64>) -> NetResponse {
            let end = len
                .map(|l| (start + l).min(self.payload.len() as u64))
                .unwrap_or(self.payload.len() as u64);
            let body = Bytes::copy_from_slice(&self.payload[start as usize..end as usize]);
            let mut headers = Headers::new();
            headers.insert("content-length", body.len().to_string());
            headers.insert(
                "content-range",
                format!("bytes {start}-{}/{}", end.max(start + 1) - 1, self.payload.len()),
            );
            let stream = futures::stream::iter(vec![Ok(body)]);
            NetResponse::new(headers, Box::pin(stream))
        }
    }

    #[async_trait]
    impl Net for CountingNet {
        async fn get_bytes(
            &self,
            _url: Url,
            _headers: Option<Headers>,
        ) -> Result<Bytes, NetError> {
            unreachable!("prefetch streams, it never buffers whole bodies")
        }

        async fn stream(
            &self,
            _url: Url,
            _headers: Option<Headers>,
        ) -> Result<NetResponse, NetError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(30)).await;
            Ok(self.respond(0, None))
        }

        async fn get_range(
            &self,
            _url: Url,
            range: RangeSpec,
            _headers: Option<Headers>,
        ) -> Result<NetResponse, NetError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(30)).await;
            let len = range.end.map(|e| e - range.start + 1);
            Ok(self.respond(range.start, len))
        }

        async fn head(&self, _url: Url, _headers: Option<Headers>) -> Result<Headers, NetError> {
            Ok(Headers::new())
        }
    }

    fn request(range: ByteRange) -> MediaRequest {
        MediaRequest::get(Url::parse("https://example.com/seg_0001.m4s").unwrap())
            .with_range(range)
    }

    async fn wait_idle(prefetcher: &SegmentPrefetcher<CountingNet>) {
        for _ in 0..200 {
            if prefetcher.in_flight_len() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("prefetch jobs never drained");
    }

    #[tokio::test]
    async fn duplicate_prefetches_fetch_once() {
        let dir = TempDir::new().unwrap();
        let store = DiskCacheStore::open(dir.path(), 0).unwrap();
        let net = Arc::new(CountingNet::new(vec![b'x'; 2048]));
        let prefetcher = SegmentPrefetcher::new(net.clone(), store, PrefetchPool::new(4));

        let range = ByteRange::new(0, Some(1024));
        for _ in 0..10 {
            prefetcher.prefetch(request(range));
        }

        wait_idle(&prefetcher).await;
        assert_eq!(net.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cached_range_is_not_fetched_again() {
        let dir = TempDir::new().unwrap();
        let store = DiskCacheStore::open(dir.path(), 0).unwrap();
        let net = Arc::new(CountingNet::new(vec![b'x'; 2048]));
        let prefetcher =
            SegmentPrefetcher::new(net.clone(), store.clone(), PrefetchPool::new(4));

        let range = ByteRange::new(0, Some(1024));
        prefetcher.prefetch(request(range));
        wait_idle(&prefetcher).await;
        assert_eq!(net.fetches.load(Ordering::SeqCst), 1);

        // Range is on disk now; a second prefetch is a no-op.
        prefetcher.prefetch(request(range));
        wait_idle(&prefetcher).await;
        assert_eq!(net.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn distinct_ranges_fetch_independently() {
        let dir = TempDir::new().unwrap();
        let store = DiskCacheStore::open(dir.path(), 0).unwrap();
        let net = Arc::new(CountingNet::new(vec![b'x'; 4096]));
        let prefetcher = SegmentPrefetcher::new(net.clone(), store, PrefetchPool::new(4));

        prefetcher.prefetch(request(ByteRange::new(0, Some(1024))));
        prefetcher.prefetch(request(ByteRange::new(1024, Some(1024))));

        wait_idle(&prefetcher).await;
        assert_eq!(net.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn in_flight_ids_drain_after_failure() {
        struct FailingNet;

        #[async_trait]
        impl Net for FailingNet {
            async fn get_bytes(
                &self,
                _url: Url,
                _headers: Option<Headers>,
            ) -> Result<Bytes, NetError> {
                Err(NetError::Timeout)
            }
            async fn stream(
                &self,
                _url: Url,
                _headers: Option<Headers>,
            ) -> Result<NetResponse, NetError> {
                Err(NetError::Timeout)
            }
            async fn get_range(
                &self,
                _url: Url,
                _range: RangeSpec,
                _headers: Option<Headers>,
            ) -> Result<NetResponse, NetError> {
                Err(NetError::Timeout)
            }
            async fn head(
                &self,
                _url: Url,
                _headers: Option<Headers>,
            ) -> Result<Headers, NetError> {
                Err(NetError::Timeout)
            }
        }

        let dir = TempDir::new().unwrap();
        let store = DiskCacheStore::open(dir.path(), 0).unwrap();
        let prefetcher =
            SegmentPrefetcher::new(Arc::new(FailingNet), store, PrefetchPool::new(2));

        prefetcher.prefetch(
            MediaRequest::get(Url::parse("https://example.com/seg.m4s").unwrap())
                .with_range(ByteRange::new(0, Some(100))),
        );

        for _ in 0..200 {
            if prefetcher.in_flight_len() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("in-flight id leaked after failed prefetch");
    }
}
