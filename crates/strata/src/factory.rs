use std::sync::Arc;

use strata_cache::{CacheResult, DiskCacheStore};
use strata_net::{HttpClient, NetOptions};
use strata_source::{
    FlatCacheOptions, PrefetchPool, PrefetchingDiskCacheDataSource, SegmentPrefetcher,
    SmartCachingDataSource, StreamCacheOptions,
};
use tracing::debug;

/// Owns the shared pieces of the data layer (HTTP client, disk store,
/// prefetch pool) and stamps out per-open sources.
///
/// One instance per player; dropping it (after [`shutdown`](Self::shutdown))
/// cancels all background prefetch without touching open foreground reads.
pub struct StreamCache {
    net: Arc<HttpClient>,
    store: DiskCacheStore,
    flat_store: DiskCacheStore,
    pool: PrefetchPool,
    options: StreamCacheOptions,
}

impl StreamCache {
    /// Open the cache directories and build the shared state.
    ///
    /// # Errors
    ///
    /// Fails when a cache directory cannot be created.
    pub fn open(options: StreamCacheOptions) -> CacheResult<Self> {
        // Two stores, two naming schemes: spans for the segmenting path,
        // whole files for the flat path.
        let store = DiskCacheStore::open(
            options.cache_dir.join("stream_cache"),
            options.max_cache_bytes,
        )?;
        let flat_store = DiskCacheStore::open(
            options.cache_dir.join("segment_cache"),
            options.max_cache_bytes,
        )?;
        let pool = PrefetchPool::new(options.prefetch_pool_size);
        debug!(cache_dir = %options.cache_dir.display(), "stream cache opened");
        Ok(Self {
            net: Arc::new(HttpClient::new(NetOptions::default())),
            store,
            flat_store,
            pool,
            options,
        })
    }

    /// Per-open dispatcher over the shared store and pool.
    #[must_use]
    pub fn create_source(&self) -> SmartCachingDataSource<HttpClient> {
        SmartCachingDataSource::new(
            self.net.clone(),
            Some(self.store.clone()),
            &self.pool,
            &self.options,
        )
    }

    /// Flat-cache source for segment-templated streams.
    #[must_use]
    pub fn create_flat_source(&self) -> PrefetchingDiskCacheDataSource<HttpClient> {
        PrefetchingDiskCacheDataSource::new(
            self.net.clone(),
            self.flat_store.clone(),
            FlatCacheOptions {
                prefetch_count: self.options.eager_prefetch_count,
                max_prefetch_bytes: self.options.eager_prefetch_max_bytes,
            },
            self.pool.clone(),
        )
    }

    /// Prefetcher handle for wiring a [`strata_dash::DashManifestPrefetcher`].
    #[must_use]
    pub fn segment_prefetcher(&self) -> SegmentPrefetcher<HttpClient> {
        SegmentPrefetcher::new(self.net.clone(), self.store.clone(), self.pool.clone())
    }

    #[must_use]
    pub fn store(&self) -> &DiskCacheStore {
        &self.store
    }

    /// Cancel all background prefetch jobs.
    pub fn shutdown(&self) {
        self.pool.shutdown();
    }

    /// Drop every cached byte (both naming schemes).
    pub fn clear(&self) {
        self.store.clear();
        self.flat_store.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_creates_both_cache_directories() {
        let dir = tempfile::TempDir::new().unwrap();
        let cache = StreamCache::open(StreamCacheOptions::new(dir.path())).unwrap();

        assert!(dir.path().join("stream_cache").is_dir());
        assert!(dir.path().join("segment_cache").is_dir());

        let _source = cache.create_source();
        let _flat = cache.create_flat_source();
        cache.shutdown();
    }
}
