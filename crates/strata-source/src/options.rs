use std::{path::PathBuf, sync::Arc};

use strata_net::BasicCredentials;
use url::Url;

/// Per-URL routing predicate supplied by the embedding player.
pub type UrlPredicate = Arc<dyn Fn(&Url) -> bool + Send + Sync>;

/// Configuration surface consumed from the player's settings store.
#[derive(Clone)]
pub struct StreamCacheOptions {
    /// Root directory for the span cache.
    pub cache_dir: PathBuf,
    /// Global size ceiling; 0 disables eviction.
    pub max_cache_bytes: u64,
    /// Chunk size for the range-segmenting strategy.
    pub chunk_size_bytes: u64,
    /// Chunks/segments fetched ahead of the read position. 1 disables
    /// look-ahead.
    pub prefetch_concurrency: u32,
    /// Background worker slots shared by all prefetch jobs.
    pub prefetch_pool_size: usize,
    /// Sequentially numbered siblings warmed by the flat variant.
    pub eager_prefetch_count: u32,
    /// Size guard for eager sibling prefetches.
    pub eager_prefetch_max_bytes: u64,
    /// "Never cache this URL" predicate.
    pub skip_cache: Option<UrlPredicate>,
    /// "Use range segmenting for this URL" predicate.
    pub use_range_segmenting: Option<UrlPredicate>,
    /// WebDAV credentials; when set they apply to HTTP(S) opens made through
    /// the dispatcher.
    pub credentials: Option<BasicCredentials>,
}

impl StreamCacheOptions {
    /// Options rooted at `cache_dir`, everything else defaulted.
    #[must_use]
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            max_cache_bytes: 512 * 1024 * 1024,
            chunk_size_bytes: 2 * 1024 * 1024,
            prefetch_concurrency: 3,
            prefetch_pool_size: 4,
            eager_prefetch_count: 2,
            eager_prefetch_max_bytes: 25 * 1024 * 1024,
            skip_cache: None,
            use_range_segmenting: None,
            credentials: None,
        }
    }

    #[must_use]
    pub fn with_max_cache_bytes(mut self, max_cache_bytes: u64) -> Self {
        self.max_cache_bytes = max_cache_bytes;
        self
    }

    #[must_use]
    pub fn with_chunk_size_bytes(mut self, chunk_size_bytes: u64) -> Self {
        self.chunk_size_bytes = chunk_size_bytes;
        self
    }

    #[must_use]
    pub fn with_prefetch_concurrency(mut self, prefetch_concurrency: u32) -> Self {
        self.prefetch_concurrency = prefetch_concurrency;
        self
    }

    #[must_use]
    pub fn with_prefetch_pool_size(mut self, prefetch_pool_size: usize) -> Self {
        self.prefetch_pool_size = prefetch_pool_size;
        self
    }

    #[must_use]
    pub fn with_eager_prefetch_count(mut self, eager_prefetch_count: u32) -> Self {
        self.eager_prefetch_count = eager_prefetch_count;
        self
    }

    #[must_use]
    pub fn with_eager_prefetch_max_bytes(mut self, eager_prefetch_max_bytes: u64) -> Self {
        self.eager_prefetch_max_bytes = eager_prefetch_max_bytes;
        self
    }

    #[must_use]
    pub fn with_skip_cache(mut self, predicate: UrlPredicate) -> Self {
        self.skip_cache = Some(predicate);
        self
    }

    #[must_use]
    pub fn with_range_segmenting(mut self, predicate: UrlPredicate) -> Self {
        self.use_range_segmenting = Some(predicate);
        self
    }

    #[must_use]
    pub fn with_credentials(mut self, credentials: BasicCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }
}

impl std::fmt::Debug for StreamCacheOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamCacheOptions")
            .field("cache_dir", &self.cache_dir)
            .field("max_cache_bytes", &self.max_cache_bytes)
            .field("chunk_size_bytes", &self.chunk_size_bytes)
            .field("prefetch_concurrency", &self.prefetch_concurrency)
            .field("prefetch_pool_size", &self.prefetch_pool_size)
            .field("eager_prefetch_count", &self.eager_prefetch_count)
            .field("eager_prefetch_max_bytes", &self.eager_prefetch_max_bytes)
            .field("skip_cache", &self.skip_cache.is_some())
            .field("use_range_segmenting", &self.use_range_segmenting.is_some())
            .field("credentials", &self.credentials.is_some())
            .finish()
    }
}
