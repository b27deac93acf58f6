use std::{io::Read, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use strata_cache::{DiskCacheStore, SpanReader, WriteHandle};
use strata_core::{ByteRange, CacheKey};
use strata_net::{ByteStream, Headers, Net, RangeSpec};
use tracing::{debug, trace, warn};
use url::Url;

use crate::{
    error::{SourceError, SourceResult},
    request::{HttpMethod, MediaRequest},
    traits::{DataSource, ReadOutcome},
};

/// Cache-on-read HTTP source.
///
/// Serves fully covered requests from the disk store; everything else is
/// fetched from the network and written through to a `.part` span that is
/// committed when the read completes cleanly. A write that cannot start or
/// fails midway degrades to uncached delivery; the foreground read never
/// fails because of the cache.
pub struct CacheDataSource<N> {
    net: Arc<N>,
    store: DiskCacheStore,
    ignore_cache_on_error: bool,
    state: Option<OpenState>,
}

struct OpenState {
    url: Url,
    key: CacheKey,
    response_headers: Headers,
    backing: Backing,
}

enum Backing {
    /// Zero-length requests and HEAD: nothing to deliver.
    Empty,
    Disk(SpanReader),
    Network {
        body: ByteStream,
        pending: Bytes,
        write: Option<WriteHandle>,
        remaining: Option<u64>,
        /// Record the final size as the content length on commit (only for
        /// full-resource fetches, where "all of it" defines the total).
        set_len_on_commit: bool,
    },
}

impl<N: Net> CacheDataSource<N> {
    #[must_use]
    pub fn new(net: Arc<N>, store: DiskCacheStore, ignore_cache_on_error: bool) -> Self {
        Self {
            net,
            store,
            ignore_cache_on_error,
            state: None,
        }
    }

    fn try_disk(&self, key: &CacheKey, range: ByteRange) -> SourceResult<Option<SpanReader>> {
        if !self.store.is_cached(key, range) {
            return Ok(None);
        }
        // Bound open-ended ranges against the known content length so the
        // read covers exactly what servability promised.
        let bounded = match range.length {
            Some(_) => range,
            None => {
                let Some(total) = self.store.content_length(key) else {
                    return Ok(None);
                };
                ByteRange::new(range.position, Some(total.saturating_sub(range.position)))
            }
        };
        match self.store.read(key, bounded) {
            Ok(reader) => Ok(reader),
            Err(e) if self.ignore_cache_on_error => {
                // Coverage said yes but the read path failed; the network
                // takes over instead of failing playback.
                warn!(key = %key, error = %e, "cache read failed, ignoring cache");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn open_network(
        &mut self,
        request: &MediaRequest,
        key: &CacheKey,
    ) -> SourceResult<OpenState> {
        let headers = if request.headers.is_empty() {
            None
        } else {
            Some(request.headers.clone())
        };

        let response = if request.range.is_full_resource() {
            self.net.stream(request.url.clone(), headers).await?
        } else {
            let spec = match request.range.length {
                Some(len) => RangeSpec::with_length(request.range.position, len),
                None => RangeSpec::from_start(request.range.position),
            };
            self.net
                .get_range(request.url.clone(), spec, headers)
                .await?
        };

        // Learn the total resource size while we are here: 206 responses say
        // it in Content-Range, full responses in Content-Length.
        if let Some(total) = response.headers.content_range_total() {
            self.store.set_content_length(key, total);
        } else if request.range.is_full_resource() {
            if let Some(total) = response.headers.content_length() {
                self.store.set_content_length(key, total);
            }
        }

        // Only write through when the response demonstrably matches the
        // requested span: a server that ignored our Range header would make
        // us commit misaligned bytes.
        let range_honored = request.range.is_full_resource()
            || response.headers.get_ignore_case("content-range").is_some();

        let write = if range_honored {
            match self.store.begin_write(key, request.range.position) {
                Ok(handle) => Some(handle),
                Err(e) => {
                    trace!(key = %key, error = %e, "span write unavailable, delivering uncached");
                    None
                }
            }
        } else {
            trace!(key = %key, "range not honored by server, delivering uncached");
            None
        };

        let remaining = request
            .range
            .length
            .or_else(|| response.headers.content_length());

        Ok(OpenState {
            url: request.url.clone(),
            key: key.clone(),
            response_headers: response.headers,
            backing: Backing::Network {
                body: response.body,
                pending: Bytes::new(),
                write,
                remaining,
                set_len_on_commit: request.range.is_full_resource(),
            },
        })
    }
}

fn finish_write(
    store: &DiskCacheStore,
    key: &CacheKey,
    write: &mut Option<WriteHandle>,
    set_len_on_commit: bool,
) {
    let Some(handle) = write.take() else { return };
    let written = handle.written();
    match handle.commit() {
        Ok(()) => {
            if set_len_on_commit {
                store.set_content_length(key, written);
            }
        }
        Err(e) => {
            // Bytes already reached the caller; only the warm cache is lost.
            debug!(key = %key, error = %e, "cache commit failed");
        }
    }
}

#[async_trait]
impl<N: Net> DataSource for CacheDataSource<N> {
    async fn open(&mut self, request: &MediaRequest) -> SourceResult<Option<u64>> {
        if !request.is_http() {
            return Err(SourceError::UnsupportedScheme(
                request.url.scheme().to_string(),
            ));
        }
        let key = request.cache_key()?;

        if request.method == HttpMethod::Head {
            let headers = if request.headers.is_empty() {
                None
            } else {
                Some(request.headers.clone())
            };
            let response_headers = self.net.head(request.url.clone(), headers).await?;
            let resolved = response_headers.content_length();
            self.state = Some(OpenState {
                url: request.url.clone(),
                key,
                response_headers,
                backing: Backing::Empty,
            });
            return Ok(resolved);
        }

        if request.range.is_empty() {
            self.state = Some(OpenState {
                url: request.url.clone(),
                key,
                response_headers: Headers::new(),
                backing: Backing::Empty,
            });
            return Ok(Some(0));
        }

        if let Some(reader) = self.try_disk(&key, request.range)? {
            let resolved = reader.len();
            trace!(key = %key, range = %request.range, "serving from cache");
            self.state = Some(OpenState {
                url: request.url.clone(),
                key,
                response_headers: Headers::new(),
                backing: Backing::Disk(reader),
            });
            return Ok(Some(resolved));
        }

        let state = self.open_network(request, &key).await?;
        let resolved = match &state.backing {
            Backing::Network { remaining, .. } => *remaining,
            _ => None,
        };
        self.state = Some(state);
        Ok(resolved)
    }

    async fn read(&mut self, buf: &mut [u8]) -> SourceResult<ReadOutcome> {
        let state = self.state.as_mut().ok_or(SourceError::NotOpened)?;
        if buf.is_empty() {
            return Ok(ReadOutcome::EndOfInput);
        }

        match &mut state.backing {
            Backing::Empty => Ok(ReadOutcome::EndOfInput),
            Backing::Disk(reader) => {
                let n = reader.read(buf)?;
                if n == 0 {
                    Ok(ReadOutcome::EndOfInput)
                } else {
                    Ok(ReadOutcome::Bytes(n))
                }
            }
            Backing::Network {
                body,
                pending,
                write,
                remaining,
                set_len_on_commit,
            } => {
                if *remaining == Some(0) {
                    finish_write(&self.store, &state.key, write, *set_len_on_commit);
                    return Ok(ReadOutcome::EndOfInput);
                }

                while pending.is_empty() {
                    match body.next().await {
                        Some(Ok(chunk)) => {
                            if let Some(handle) = write.as_mut() {
                                if let Err(e) = handle.write(&chunk) {
                                    // Keep serving; drop the handle so the
                                    // partial file is cleaned up.
                                    warn!(key = %state.key, error = %e, "cache write failed, continuing uncached");
                                    *write = None;
                                }
                            }
                            *pending = chunk;
                        }
                        Some(Err(e)) => {
                            // Abandoned write: the drop deletes the partial.
                            *write = None;
                            return Err(e.into());
                        }
                        None => {
                            finish_write(&self.store, &state.key, write, *set_len_on_commit);
                            return Ok(ReadOutcome::EndOfInput);
                        }
                    }
                }

                let mut n = buf.len().min(pending.len());
                if let Some(rem) = remaining {
                    n = n.min(usize::try_from(*rem).unwrap_or(usize::MAX));
                }
                let chunk = pending.split_to(n);
                buf[..n].copy_from_slice(&chunk);
                if let Some(rem) = remaining.as_mut() {
                    *rem -= n as u64;
                }
                Ok(ReadOutcome::Bytes(n))
            }
        }
    }

    async fn close(&mut self) -> SourceResult<()> {
        // Dropping the state releases the connection and deletes any
        // uncommitted partial file.
        self.state = None;
        Ok(())
    }

    fn url(&self) -> Option<&Url> {
        self.state.as_ref().map(|s| &s.url)
    }

    fn response_headers(&self) -> Headers {
        self.state
            .as_ref()
            .map(|s| s.response_headers.clone())
            .unwrap_or_default()
    }
}
