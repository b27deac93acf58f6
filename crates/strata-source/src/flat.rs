use std::{
    collections::HashSet,
    sync::{Arc, OnceLock},
};

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use regex::Regex;
use strata_cache::{DiskCacheStore, SpanReader, WriteHandle};
use strata_core::{ByteRange, CacheKey};
use strata_net::{ByteStream, Headers, Net, RangeSpec};
use tracing::{debug, trace};
use url::Url;

use crate::{
    error::{SourceError, SourceResult},
    file::FileDataSource,
    http::HttpDataSource,
    pool::PrefetchPool,
    request::{HttpMethod, MediaRequest},
    traits::{DataSource, ReadOutcome},
};

/// Tuning for the flat-cache source.
#[derive(Clone, Debug)]
pub struct FlatCacheOptions {
    /// Sequentially numbered sibling URLs to warm after a full-resource
    /// fetch.
    pub prefetch_count: u32,
    /// Guard against caching huge non-segment resources eagerly.
    pub max_prefetch_bytes: u64,
}

impl Default for FlatCacheOptions {
    fn default() -> Self {
        Self {
            prefetch_count: 2,
            max_prefetch_bytes: 25 * 1024 * 1024,
        }
    }
}

/// Whole-resource HTTP source over a flat disk cache, with eager prefetch of
/// numerically sequential sibling URLs (`...0042.m4s` warms `...0043.m4s`).
///
/// Entries are complete files only: a response is promoted from its `.part`
/// file when the read exhausts cleanly, never earlier, so partial reads can
/// always be served from a committed file's prefix. Non-HTTP(S) schemes and
/// HEAD bypass the cache entirely.
pub struct PrefetchingDiskCacheDataSource<N> {
    net: Arc<N>,
    store: DiskCacheStore,
    options: FlatCacheOptions,
    pool: PrefetchPool,
    in_flight: Arc<Mutex<HashSet<String>>>,
    state: Option<OpenState>,
}

struct OpenState {
    url: Url,
    response_headers: Headers,
    backing: Backing,
}

enum Backing {
    Bypass(Box<dyn DataSource + Send>),
    Disk(SpanReader),
    Network {
        body: ByteStream,
        pending: Bytes,
        write: Option<WriteHandle>,
        remaining: Option<u64>,
        key: CacheKey,
    },
}

impl<N: Net + 'static> PrefetchingDiskCacheDataSource<N> {
    #[must_use]
    pub fn new(
        net: Arc<N>,
        store: DiskCacheStore,
        options: FlatCacheOptions,
        pool: PrefetchPool,
    ) -> Self {
        Self {
            net,
            store,
            options,
            pool,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            state: None,
        }
    }

    async fn open_bypass(
        &mut self,
        request: &MediaRequest,
        mut delegate: Box<dyn DataSource + Send>,
    ) -> SourceResult<Option<u64>> {
        let resolved = delegate.open(request).await?;
        self.state = Some(OpenState {
            url: request.url.clone(),
            response_headers: delegate.response_headers(),
            backing: Backing::Bypass(delegate),
        });
        Ok(resolved)
    }

    fn enqueue_sibling_prefetches(&self, url: &Url, headers: &Headers) {
        if self.options.prefetch_count == 0 {
            return;
        }
        let siblings = derive_next_segment_urls(url, self.options.prefetch_count);
        if siblings.is_empty() {
            return;
        }

        // Range headers from the current request must not leak into
        // whole-file sibling fetches.
        let mut headers = headers.clone();
        headers.remove("Range");

        for sibling in siblings {
            self.spawn_sibling_prefetch(sibling, headers.clone());
        }
    }

    fn spawn_sibling_prefetch(&self, url: Url, headers: Headers) {
        if !is_cacheable_url(&url) {
            return;
        }
        let Ok(key) = CacheKey::for_url(&url) else {
            return;
        };
        if self.store.is_cached(&key, ByteRange::new(0, Some(1))) {
            return;
        }

        let job_id = key.file_stem().to_string();
        {
            let mut in_flight = self.in_flight.lock();
            if !in_flight.insert(job_id.clone()) {
                return;
            }
        }
        let guard = InFlightGuard {
            set: self.in_flight.clone(),
            id: job_id,
        };

        let net = self.net.clone();
        let store = self.store.clone();
        let max_bytes = self.options.max_prefetch_bytes;
        self.pool.spawn(async move {
            let _guard = guard;
            if let Err(e) = prefetch_to_disk(&*net, &store, &url, headers, max_bytes).await {
                debug!(url = %url, error = %e, "sibling prefetch failed");
            }
        });
    }
}

async fn prefetch_to_disk<N: Net>(
    net: &N,
    store: &DiskCacheStore,
    url: &Url,
    headers: Headers,
    max_bytes: u64,
) -> SourceResult<()> {
    let headers = if headers.is_empty() {
        None
    } else {
        Some(headers)
    };
    let response = net.stream(url.clone(), headers).await?;

    if let Some(len) = response.headers.content_length() {
        if len > max_bytes {
            trace!(url = %url, len, max_bytes, "sibling too large, skipping");
            return Ok(());
        }
    }

    let key = CacheKey::for_url(url)?;
    let mut handle = store.begin_write(&key, 0)?;

    let mut body = response.body;
    let mut written: u64 = 0;
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        written += chunk.len() as u64;
        if written > max_bytes {
            trace!(url = %url, written, max_bytes, "sibling exceeded size guard mid-fetch");
            return Ok(()); // handle drop deletes the partial
        }
        handle.write(&chunk)?;
    }

    handle.commit()?;
    store.set_content_length(&key, written);
    debug!(url = %url, bytes = written, "sibling prefetched");
    Ok(())
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

#[async_trait]
impl<N: Net + 'static> DataSource for PrefetchingDiskCacheDataSource<N> {
    async fn open(&mut self, request: &MediaRequest) -> SourceResult<Option<u64>> {
        if !request.is_http() {
            let delegate: Box<dyn DataSource + Send> = if request.url.scheme() == "file" {
                Box::new(FileDataSource::new())
            } else {
                return Err(SourceError::UnsupportedScheme(
                    request.url.scheme().to_string(),
                ));
            };
            return self.open_bypass(request, delegate).await;
        }
        if request.method == HttpMethod::Head {
            let delegate = Box::new(HttpDataSource::new(self.net.clone()));
            return self.open_bypass(request, delegate).await;
        }

        // Flat cache keys come from the URL alone.
        let key = CacheKey::for_url(&request.url)?;

        if let Some(reader) = self.store.read(&key, request.range)? {
            let resolved = reader.len();
            trace!(url = %request.url, "flat cache hit");
            self.state = Some(OpenState {
                url: request.url.clone(),
                response_headers: Headers::new(),
                backing: Backing::Disk(reader),
            });
            return Ok(Some(resolved));
        }

        let headers = if request.headers.is_empty() {
            None
        } else {
            Some(request.headers.clone())
        };
        // Range header only when the caller explicitly asked for a range.
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

        let remaining = request
            .range
            .length
            .or_else(|| response.headers.content_length());

        let cache_write = request.method == HttpMethod::Get
            && request.range.is_full_resource()
            && is_cacheable_url(&request.url);
        let write = if cache_write {
            match self.store.begin_write(&key, 0) {
                Ok(handle) => {
                    self.enqueue_sibling_prefetches(&request.url, &request.headers);
                    Some(handle)
                }
                Err(e) => {
                    trace!(url = %request.url, error = %e, "flat cache write unavailable");
                    None
                }
            }
        } else {
            None
        };

        self.state = Some(OpenState {
            url: request.url.clone(),
            response_headers: response.headers,
            backing: Backing::Network {
                body: response.body,
                pending: Bytes::new(),
                write,
                remaining,
                key,
            },
        });
        Ok(remaining)
    }

    async fn read(&mut self, buf: &mut [u8]) -> SourceResult<ReadOutcome> {
        let state = self.state.as_mut().ok_or(SourceError::NotOpened)?;
        if buf.is_empty() {
            return Ok(ReadOutcome::EndOfInput);
        }

        match &mut state.backing {
            Backing::Bypass(delegate) => delegate.read(buf).await,
            Backing::Disk(reader) => {
                let n = std::io::Read::read(reader, buf)?;
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
                key,
            } => {
                while pending.is_empty() {
                    match body.next().await {
                        Some(Ok(chunk)) => {
                            if let Some(handle) = write.as_mut() {
                                if let Err(e) = handle.write(&chunk) {
                                    debug!(key = %key, error = %e, "flat cache write failed, continuing uncached");
                                    *write = None;
                                }
                            }
                            *pending = chunk;
                        }
                        Some(Err(e)) => {
                            *write = None;
                            return Err(e.into());
                        }
                        None => {
                            // Promotion happens only here, on clean
                            // exhaustion of the network read.
                            if let Some(handle) = write.take() {
                                let written = handle.written();
                                match handle.commit() {
                                    Ok(()) => {
                                        self.store.set_content_length(key, written);
                                        trace!(key = %key, bytes = written, "flat cache entry promoted");
                                    }
                                    Err(e) => {
                                        debug!(key = %key, error = %e, "flat cache commit failed");
                                    }
                                }
                            }
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
        if let Some(mut state) = self.state.take() {
            if let Backing::Bypass(delegate) = &mut state.backing {
                delegate.close().await?;
            }
            // Dropping the state releases the connection and deletes any
            // unpromoted partial file.
        }
        Ok(())
    }

    fn url(&self) -> Option<&Url> {
        self.state.as_ref().map(|s| &s.url)
    }

    fn response_headers(&self) -> Headers {
        match self.state.as_ref() {
            Some(state) => match &state.backing {
                Backing::Bypass(delegate) => delegate.response_headers(),
                _ => state.response_headers.clone(),
            },
            None => Headers::new(),
        }
    }
}

fn segment_number_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(.*?)(\d+)(\.[^./?]+)$").expect("valid regex"))
}

fn numbered_mp4_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+\.mp4$").expect("valid regex"))
}

/// Whether a URL names a cacheable media segment.
fn is_cacheable_url(url: &Url) -> bool {
    if !matches!(url.scheme(), "http" | "https") {
        return false;
    }
    let last = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or("")
        .to_lowercase();
    last.ends_with(".m4s")
        || last.ends_with(".m4a")
        || last.ends_with(".webm")
        || (last.ends_with(".mp4") && numbered_mp4_regex().is_match(&last))
}

/// The next `count` sibling URLs in a numbered segment sequence, zero-padding
/// preserved. Empty when the URL carries no trailing number before its
/// extension.
fn derive_next_segment_urls(current: &Url, count: u32) -> Vec<Url> {
    let s = current.as_str();
    let without_fragment = s.split('#').next().unwrap_or(s);
    let (base, query) = match without_fragment.split_once('?') {
        Some((base, query)) => (base, Some(query)),
        None => (without_fragment, None),
    };

    let Some(captures) = segment_number_regex().captures(base) else {
        return Vec::new();
    };
    let prefix = &captures[1];
    let number_text = &captures[2];
    let suffix = &captures[3];

    let Ok(number) = number_text.parse::<u64>() else {
        return Vec::new();
    };
    let width = number_text.len();

    (1..=u64::from(count))
        .filter_map(|delta| {
            let next = format!("{:0width$}", number + delta, width = width);
            let rebuilt = match query {
                Some(query) => format!("{prefix}{next}{suffix}?{query}"),
                None => format!("{prefix}{next}{suffix}"),
            };
            Url::parse(&rebuilt).ok()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use strata_net::{NetError, NetResponse};
    use tempfile::TempDir;

    use super::*;
    use crate::traits::read_to_end;

    #[test]
    fn sibling_urls_preserve_zero_padding() {
        let url = Url::parse("https://cdn.example.com/media/segment_00042.m4s").unwrap();
        let siblings = derive_next_segment_urls(&url, 2);
        assert_eq!(
            siblings
                .iter()
                .map(Url::as_str)
                .collect::<Vec<_>>(),
            vec![
                "https://cdn.example.com/media/segment_00043.m4s",
                "https://cdn.example.com/media/segment_00044.m4s",
            ]
        );
    }

    #[test]
    fn sibling_urls_keep_query_strings() {
        let url = Url::parse("https://cdn.example.com/seg0009.m4s?token=abc").unwrap();
        let siblings = derive_next_segment_urls(&url, 1);
        assert_eq!(
            siblings[0].as_str(),
            "https://cdn.example.com/seg0010.m4s?token=abc"
        );
    }

    #[test]
    fn unnumbered_urls_have_no_siblings() {
        let url = Url::parse("https://cdn.example.com/manifest.mpd").unwrap();
        assert!(derive_next_segment_urls(&url, 2).is_empty());
    }

    #[test]
    fn cacheable_allowlist() {
        let cacheable = [
            "https://x.com/seg001.m4s",
            "https://x.com/audio_02.m4a",
            "https://x.com/chunk9.webm",
            "https://x.com/part123.mp4",
        ];
        for u in cacheable {
            assert!(is_cacheable_url(&Url::parse(u).unwrap()), "{u}");
        }

        let not_cacheable = [
            "https://x.com/movie.mp4", // un-numbered mp4
            "https://x.com/manifest.mpd",
            "https://x.com/clip.ts",
            "file:///tmp/seg001.m4s",
        ];
        for u in not_cacheable {
            assert!(!is_cacheable_url(&Url::parse(u).unwrap()), "{u}");
        }
    }

    /// Serves fixed payloads by URL path; counts fetches per path.
    struct SegmentServer {
        payloads: HashMap<String, Vec<u8>>,
        fetches: Mutex<HashMap<String, usize>>,
        total: AtomicUsize,
    }

    impl SegmentServer {
        fn new(payloads: Vec<(&str, Vec<u8>)>) -> Arc<Self> {
            Arc::new(Self {
                payloads: payloads
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v))
                    .collect(),
                fetches: Mutex::new(HashMap::new()),
                total: AtomicUsize::new(0),
            })
        }

        fn respond(&self, url: &Url) -> Result<NetResponse, NetError> {
            self.total.fetch_add(1, Ordering::SeqCst);
            *self
                .fetches
                .lock()
                .entry(url.path().to_string())
                .or_insert(0) += 1;
            let Some(payload) = self.payloads.get(url.path()) else {
                return Err(NetError::http_status(404, url.to_string()));
            };
            let mut headers = Headers::new();
            headers.insert("content-length", payload.len().to_string());
            let body = Bytes::copy_from_slice(payload);
            let stream = futures::stream::iter(vec![Ok(body)]);
            Ok(NetResponse::new(headers, Box::pin(stream)))
        }
    }

    #[async_trait]
    impl Net for SegmentServer {
        async fn get_bytes(
            &self,
            _url: Url,
            _headers: Option<Headers>,
        ) -> Result<Bytes, NetError> {
            unreachable!()
        }

        async fn stream(
            &self,
            url: Url,
            _headers: Option<Headers>,
        ) -> Result<NetResponse, NetError> {
            self.respond(&url)
        }

        async fn get_range(
            &self,
            url: Url,
            _range: RangeSpec,
            _headers: Option<Headers>,
        ) -> Result<NetResponse, NetError> {
            self.respond(&url)
        }

        async fn head(&self, _url: Url, _headers: Option<Headers>) -> Result<Headers, NetError> {
            Ok(Headers::new())
        }
    }

    fn source_over(
        server: Arc<SegmentServer>,
        store: DiskCacheStore,
        options: FlatCacheOptions,
    ) -> PrefetchingDiskCacheDataSource<SegmentServer> {
        PrefetchingDiskCacheDataSource::new(server, store, options, PrefetchPool::new(4))
    }

    async fn wait_for<F: Fn() -> bool>(cond: F, what: &str) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("timed out waiting for {what}");
    }

    #[tokio::test]
    async fn full_fetch_caches_and_prefetches_siblings() {
        let dir = TempDir::new().unwrap();
        let store = DiskCacheStore::open(dir.path(), 0).unwrap();
        let server = SegmentServer::new(vec![
            ("/seg_0001.m4s", vec![b'a'; 100]),
            ("/seg_0002.m4s", vec![b'b'; 100]),
            ("/seg_0003.m4s", vec![b'c'; 100]),
        ]);

        let url = Url::parse("https://cdn.example.com/seg_0001.m4s").unwrap();
        let mut source = source_over(server.clone(), store.clone(), FlatCacheOptions::default());
        source.open(&MediaRequest::get(url.clone())).await.unwrap();
        let bytes = read_to_end(&mut source).await.unwrap();
        assert_eq!(bytes, vec![b'a'; 100]);
        source.close().await.unwrap();

        // Base segment was promoted.
        let key = CacheKey::for_url(&url).unwrap();
        assert!(store.is_cached(&key, ByteRange::new(0, Some(100))));

        // Siblings land in the cache in the background.
        let sib2 = CacheKey::for_url(
            &Url::parse("https://cdn.example.com/seg_0002.m4s").unwrap(),
        )
        .unwrap();
        let sib3 = CacheKey::for_url(
            &Url::parse("https://cdn.example.com/seg_0003.m4s").unwrap(),
        )
        .unwrap();
        wait_for(
            || {
                store.is_cached(&sib2, ByteRange::new(0, Some(100)))
                    && store.is_cached(&sib3, ByteRange::new(0, Some(100)))
            },
            "sibling prefetch",
        )
        .await;
    }

    #[tokio::test]
    async fn cached_segment_serves_without_network() {
        let dir = TempDir::new().unwrap();
        let store = DiskCacheStore::open(dir.path(), 0).unwrap();
        let server = SegmentServer::new(vec![("/seg_0001.m4s", vec![b'a'; 100])]);
        let options = FlatCacheOptions {
            prefetch_count: 0,
            ..FlatCacheOptions::default()
        };

        let url = Url::parse("https://cdn.example.com/seg_0001.m4s").unwrap();
        {
            let mut source = source_over(server.clone(), store.clone(), options.clone());
            source.open(&MediaRequest::get(url.clone())).await.unwrap();
            read_to_end(&mut source).await.unwrap();
        }
        assert_eq!(server.total.load(Ordering::SeqCst), 1);

        let mut source = source_over(server.clone(), store, options);
        source.open(&MediaRequest::get(url)).await.unwrap();
        let bytes = read_to_end(&mut source).await.unwrap();
        assert_eq!(bytes, vec![b'a'; 100]);
        assert_eq!(server.total.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn ranged_request_is_not_cached() {
        let dir = TempDir::new().unwrap();
        let store = DiskCacheStore::open(dir.path(), 0).unwrap();
        let server = SegmentServer::new(vec![("/seg_0001.m4s", vec![b'a'; 100])]);

        let url = Url::parse("https://cdn.example.com/seg_0001.m4s").unwrap();
        let request =
            MediaRequest::get(url).with_range(ByteRange::new(10, Some(20)));
        let mut source = source_over(server, store.clone(), FlatCacheOptions::default());
        source.open(&request).await.unwrap();
        read_to_end(&mut source).await.unwrap();
        source.close().await.unwrap();

        assert_eq!(store.total_committed_bytes(), 0);
    }

    #[tokio::test]
    async fn partial_read_from_cached_whole_file() {
        let dir = TempDir::new().unwrap();
        let store = DiskCacheStore::open(dir.path(), 0).unwrap();
        let payload: Vec<u8> = (0..100u8).collect();
        let server = SegmentServer::new(vec![("/seg_0001.m4s", payload.clone())]);
        let options = FlatCacheOptions {
            prefetch_count: 0,
            ..FlatCacheOptions::default()
        };

        let url = Url::parse("https://cdn.example.com/seg_0001.m4s").unwrap();
        {
            let mut source = source_over(server.clone(), store.clone(), options.clone());
            source.open(&MediaRequest::get(url.clone())).await.unwrap();
            read_to_end(&mut source).await.unwrap();
        }

        // Bounded range out of the committed whole file.
        let request = MediaRequest::get(url).with_range(ByteRange::new(10, Some(20)));
        let mut source = source_over(server.clone(), store, options);
        let resolved = source.open(&request).await.unwrap();
        assert_eq!(resolved, Some(20));
        let bytes = read_to_end(&mut source).await.unwrap();
        assert_eq!(bytes, &payload[10..30]);
        assert_eq!(server.total.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn oversized_sibling_is_skipped() {
        let dir = TempDir::new().unwrap();
        let store = DiskCacheStore::open(dir.path(), 0).unwrap();
        let server = SegmentServer::new(vec![
            ("/seg_0001.m4s", vec![b'a'; 10]),
            ("/seg_0002.m4s", vec![b'b'; 1000]),
        ]);
        let options = FlatCacheOptions {
            prefetch_count: 1,
            max_prefetch_bytes: 100,
        };

        let url = Url::parse("https://cdn.example.com/seg_0001.m4s").unwrap();
        let mut source = source_over(server.clone(), store.clone(), options);
        source.open(&MediaRequest::get(url)).await.unwrap();
        read_to_end(&mut source).await.unwrap();
        source.close().await.unwrap();

        // Give the background job time to run (and be skipped).
        tokio::time::sleep(Duration::from_millis(100)).await;
        let sib = CacheKey::for_url(
            &Url::parse("https://cdn.example.com/seg_0002.m4s").unwrap(),
        )
        .unwrap();
        assert!(!store.is_cached(&sib, ByteRange::new(0, Some(1))));
    }

    #[tokio::test]
    async fn missing_sibling_fails_quietly() {
        let dir = TempDir::new().unwrap();
        let store = DiskCacheStore::open(dir.path(), 0).unwrap();
        // Only the base segment exists; the sibling 404s.
        let server = SegmentServer::new(vec![("/seg_0001.m4s", vec![b'a'; 10])]);

        let url = Url::parse("https://cdn.example.com/seg_0001.m4s").unwrap();
        let mut source = source_over(
            server.clone(),
            store.clone(),
            FlatCacheOptions {
                prefetch_count: 1,
                ..FlatCacheOptions::default()
            },
        );
        source.open(&MediaRequest::get(url)).await.unwrap();
        let bytes = read_to_end(&mut source).await.unwrap();
        assert_eq!(bytes, vec![b'a'; 10]);

        tokio::time::sleep(Duration::from_millis(100)).await;
        // Foreground read was unaffected; nothing extra cached.
        assert_eq!(store.total_committed_bytes(), 10);
    }
}
