use std::sync::Arc;

use async_trait::async_trait;
use strata_cache::DiskCacheStore;
use strata_net::{BasicCredentials, Headers, Net};
use tracing::trace;
use url::Url;

use crate::{
    cached::CacheDataSource,
    error::{SourceError, SourceResult},
    file::FileDataSource,
    http::HttpDataSource,
    options::{StreamCacheOptions, UrlPredicate},
    pool::PrefetchPool,
    prefetch::SegmentPrefetcher,
    request::MediaRequest,
    segmenting::RangeSegmentingSource,
    traits::{DataSource, ReadOutcome},
    webdav::WebDavDataSource,
};

/// Per-open strategy dispatcher.
///
/// Decision order: skip-cache predicate, then scheme, then cache presence,
/// then the range-segmenting predicate; the remainder gets plain
/// cache-wrapped HTTP. Stateless per call beyond the delegates it wraps.
pub struct SmartCachingDataSource<N> {
    net: Arc<N>,
    store: Option<DiskCacheStore>,
    prefetcher: Option<SegmentPrefetcher<N>>,
    skip_cache: Option<UrlPredicate>,
    use_range_segmenting: Option<UrlPredicate>,
    credentials: Option<BasicCredentials>,
    chunk_size_bytes: u64,
    prefetch_concurrency: u32,
    delegate: Option<Box<dyn DataSource + Send>>,
}

impl<N: Net + 'static> SmartCachingDataSource<N> {
    /// Wire a dispatcher from the player-facing options.
    ///
    /// The pool (and with it every background prefetch) belongs to the
    /// caller; dropping or shutting it down cancels outstanding work without
    /// touching open foreground reads.
    #[must_use]
    pub fn new(
        net: Arc<N>,
        store: Option<DiskCacheStore>,
        pool: &PrefetchPool,
        options: &StreamCacheOptions,
    ) -> Self {
        let prefetcher = store
            .clone()
            .map(|store| SegmentPrefetcher::new(net.clone(), store, pool.clone()));
        Self {
            net,
            store,
            prefetcher,
            skip_cache: options.skip_cache.clone(),
            use_range_segmenting: options.use_range_segmenting.clone(),
            credentials: options.credentials.clone(),
            chunk_size_bytes: options.chunk_size_bytes,
            prefetch_concurrency: options.prefetch_concurrency,
            delegate: None,
        }
    }

    /// Plain transport with no caching: local files, or HTTP with the
    /// configured WebDAV credentials when present.
    ///
    /// Configured credentials apply to every HTTP(S) URL opened through this
    /// dispatcher, not only ones on the WebDAV host.
    fn pass_through(&self, url: &Url) -> SourceResult<Box<dyn DataSource + Send>> {
        match url.scheme() {
            "file" => Ok(Box::new(FileDataSource::new())),
            "http" | "https" => match &self.credentials {
                Some(credentials) => Ok(Box::new(WebDavDataSource::new(
                    self.net.clone(),
                    credentials.clone(),
                ))),
                None => Ok(Box::new(HttpDataSource::new(self.net.clone()))),
            },
            other => Err(SourceError::UnsupportedScheme(other.to_string())),
        }
    }

    fn select(&self, request: &MediaRequest) -> SourceResult<Box<dyn DataSource + Send>> {
        let url = &request.url;

        if self
            .skip_cache
            .as_ref()
            .is_some_and(|predicate| predicate(url))
        {
            trace!(url = %url, "route: skip-cache predicate");
            return self.pass_through(url);
        }

        if !request.is_http() {
            trace!(url = %url, "route: non-http pass-through");
            return self.pass_through(url);
        }

        let Some(store) = &self.store else {
            trace!(url = %url, "route: no cache configured");
            return self.pass_through(url);
        };

        if self
            .use_range_segmenting
            .as_ref()
            .is_some_and(|predicate| predicate(url))
        {
            if let Some(prefetcher) = &self.prefetcher {
                trace!(url = %url, "route: range segmenting");
                return Ok(Box::new(RangeSegmentingSource::new(
                    self.net.clone(),
                    store.clone(),
                    prefetcher.clone(),
                    self.chunk_size_bytes,
                    self.prefetch_concurrency,
                )));
            }
        }

        trace!(url = %url, "route: cache-wrapped http");
        Ok(Box::new(CacheDataSource::new(
            self.net.clone(),
            store.clone(),
            true,
        )))
    }
}

#[async_trait]
impl<N: Net + 'static> DataSource for SmartCachingDataSource<N> {
    async fn open(&mut self, request: &MediaRequest) -> SourceResult<Option<u64>> {
        let mut delegate = self.select(request)?;
        let resolved = delegate.open(request).await?;
        self.delegate = Some(delegate);
        Ok(resolved)
    }

    async fn read(&mut self, buf: &mut [u8]) -> SourceResult<ReadOutcome> {
        match self.delegate.as_mut() {
            Some(delegate) => delegate.read(buf).await,
            None => Ok(ReadOutcome::EndOfInput),
        }
    }

    async fn close(&mut self) -> SourceResult<()> {
        if let Some(mut delegate) = self.delegate.take() {
            delegate.close().await?;
        }
        Ok(())
    }

    fn url(&self) -> Option<&Url> {
        self.delegate.as_ref().and_then(|d| d.url())
    }

    fn response_headers(&self) -> Headers {
        self.delegate
            .as_ref()
            .map(|d| d.response_headers())
            .unwrap_or_default()
    }
}
