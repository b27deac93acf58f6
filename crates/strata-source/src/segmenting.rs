use std::sync::Arc;

use async_trait::async_trait;
use strata_cache::DiskCacheStore;
use strata_core::{ByteRange, CacheKey};
use strata_net::{Headers, Net};
use tracing::trace;
use url::Url;

use crate::{
    cached::CacheDataSource,
    error::{SourceError, SourceResult},
    prefetch::SegmentPrefetcher,
    request::MediaRequest,
    traits::{DataSource, ReadOutcome},
};

/// Presents one logical read as a sequence of fixed-size chunk reads through
/// the cache, prefetching upcoming chunks as each one opens.
///
/// Every chunk goes through the general cache-or-network path, so a chunk
/// miss degrades to a network fetch of one chunk, never the whole resource.
/// The resolved end position is re-checked at each chunk boundary: a
/// concurrent prefetch may have learned the content length since the open.
pub struct RangeSegmentingSource<N> {
    net: Arc<N>,
    store: DiskCacheStore,
    prefetcher: SegmentPrefetcher<N>,
    chunk_size: u64,
    concurrency: u32,

    base: Option<MediaRequest>,
    key: Option<CacheKey>,
    content_length: Option<u64>,
    requested_end: Option<u64>,
    end_position: Option<u64>,
    read_position: u64,
    current: Option<CacheDataSource<N>>,
    chunk_requested: u64,
    chunk_delivered: u64,
}

impl<N: Net + 'static> RangeSegmentingSource<N> {
    #[must_use]
    pub fn new(
        net: Arc<N>,
        store: DiskCacheStore,
        prefetcher: SegmentPrefetcher<N>,
        chunk_size: u64,
        concurrency: u32,
    ) -> Self {
        Self {
            net,
            store,
            prefetcher,
            chunk_size: chunk_size.max(1),
            concurrency: concurrency.max(1),
            base: None,
            key: None,
            content_length: None,
            requested_end: None,
            end_position: None,
            read_position: 0,
            current: None,
            chunk_requested: 0,
            chunk_delivered: 0,
        }
    }

    fn refresh_end_position(&mut self) {
        if let Some(key) = &self.key {
            self.content_length = self.store.content_length(key);
        }
        self.end_position = match (self.requested_end, self.content_length) {
            (Some(requested), Some(content)) => Some(requested.min(content)),
            (Some(requested), None) => Some(requested),
            (None, Some(content)) => Some(content),
            (None, None) => None,
        };
    }

    async fn open_chunk(&mut self, start: u64) -> SourceResult<()> {
        let Some(base) = self.base.clone() else {
            return Err(SourceError::NotOpened);
        };

        let length = chunk_length(start, self.chunk_size, self.end_position);
        let chunk_request = base.with_range(ByteRange::new(start, Some(length)));
        trace!(start, length, "opening chunk");

        let mut delegate =
            CacheDataSource::new(self.net.clone(), self.store.clone(), true);
        delegate.open(&chunk_request).await?;
        self.current = Some(delegate);
        self.chunk_requested = length;
        self.chunk_delivered = 0;

        // The chunk open may have just learned the content length.
        self.refresh_end_position();
        self.schedule_prefetch(start);
        Ok(())
    }

    fn schedule_prefetch(&self, start: u64) {
        let Some(base) = self.base.as_ref() else { return };
        for range in
            plan_prefetch(start, self.chunk_size, self.concurrency, self.end_position)
        {
            self.prefetcher.prefetch(base.clone().with_range(range));
        }
    }
}

fn is_range_not_satisfiable(error: &SourceError) -> bool {
    matches!(
        error,
        SourceError::Net(net) if net.status_code() == Some(416)
    )
}

/// Chunk length starting at `start`: the configured size, capped at the
/// resolved end when one is known.
fn chunk_length(start: u64, chunk_size: u64, end_position: Option<u64>) -> u64 {
    match end_position {
        Some(end) => end.saturating_sub(start).min(chunk_size),
        None => chunk_size,
    }
}

/// Ranges to warm after opening the chunk at `start`: the next
/// `concurrency - 1` chunks, stopping at the resolved end.
fn plan_prefetch(
    start: u64,
    chunk_size: u64,
    concurrency: u32,
    end_position: Option<u64>,
) -> Vec<ByteRange> {
    let mut planned = Vec::new();
    for i in 1..u64::from(concurrency) {
        let chunk_start = start + i * chunk_size;
        if let Some(end) = end_position {
            if chunk_start >= end {
                break;
            }
        }
        let length = chunk_length(chunk_start, chunk_size, end_position);
        if length == 0 {
            break;
        }
        planned.push(ByteRange::new(chunk_start, Some(length)));
    }
    planned
}

#[async_trait]
impl<N: Net + 'static> DataSource for RangeSegmentingSource<N> {
    async fn open(&mut self, request: &MediaRequest) -> SourceResult<Option<u64>> {
        let key = request.cache_key()?;

        self.base = Some(request.clone());
        self.key = Some(key);
        self.read_position = request.range.position;
        self.requested_end = request.range.end();
        self.refresh_end_position();

        let resolved = match self.end_position {
            Some(end) => Some(end.saturating_sub(request.range.position)),
            None => request.range.length,
        };
        if resolved == Some(0) {
            // Nothing to deliver; no delegate is ever opened.
            return Ok(Some(0));
        }

        self.open_chunk(request.range.position).await?;
        Ok(resolved)
    }

    async fn read(&mut self, buf: &mut [u8]) -> SourceResult<ReadOutcome> {
        if self.base.is_none() {
            return Err(SourceError::NotOpened);
        }

        loop {
            let Some(delegate) = self.current.as_mut() else {
                return Ok(ReadOutcome::EndOfInput);
            };

            match delegate.read(buf).await? {
                ReadOutcome::Bytes(n) => {
                    self.read_position += n as u64;
                    self.chunk_delivered += n as u64;
                    return Ok(ReadOutcome::Bytes(n));
                }
                ReadOutcome::EndOfInput => {
                    // Chunk exhausted; the next one starts where we stand.
                    if let Some(delegate) = self.current.as_mut() {
                        let _ = delegate.close().await;
                    }
                    self.current = None;

                    self.refresh_end_position();
                    match self.end_position {
                        Some(end) => {
                            if self.read_position >= end {
                                return Ok(ReadOutcome::EndOfInput);
                            }
                            self.open_chunk(self.read_position).await?;
                        }
                        None => {
                            // End unknown. A short chunk means the resource
                            // ran out; a full chunk means keep going, where
                            // 416 from the next open is the server's EOF.
                            if self.chunk_delivered < self.chunk_requested {
                                return Ok(ReadOutcome::EndOfInput);
                            }
                            match self.open_chunk(self.read_position).await {
                                Ok(()) => {}
                                Err(e) if is_range_not_satisfiable(&e) => {
                                    return Ok(ReadOutcome::EndOfInput);
                                }
                                Err(e) => return Err(e),
                            }
                        }
                    }
                }
            }
        }
    }

    async fn close(&mut self) -> SourceResult<()> {
        if let Some(mut delegate) = self.current.take() {
            let _ = delegate.close().await;
        }
        self.base = None;
        self.key = None;
        self.content_length = None;
        self.requested_end = None;
        self.end_position = None;
        self.read_position = 0;
        self.chunk_requested = 0;
        self.chunk_delivered = 0;
        Ok(())
    }

    fn url(&self) -> Option<&Url> {
        self.current
            .as_ref()
            .and_then(DataSource::url)
            .or_else(|| self.base.as_ref().map(|b| &b.url))
    }

    fn response_headers(&self) -> Headers {
        self.current
            .as_ref()
            .map(DataSource::response_headers)
            .unwrap_or_default()
    }
}
