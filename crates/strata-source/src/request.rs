use strata_core::{derive_key, ByteRange, CacheKey, CoreResult};
use strata_net::Headers;
use url::Url;

/// HTTP method of a media request. Only GET and HEAD reach this layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Head,
}

/// One read request from the playback engine.
#[derive(Clone, Debug)]
pub struct MediaRequest {
    pub url: Url,
    pub range: ByteRange,
    /// Explicit cache key overriding URL-derived keying.
    pub key: Option<String>,
    pub method: HttpMethod,
    pub headers: Headers,
}

impl MediaRequest {
    /// GET for the whole resource.
    #[must_use]
    pub fn get(url: Url) -> Self {
        Self {
            url,
            range: ByteRange::full(),
            key: None,
            method: HttpMethod::Get,
            headers: Headers::new(),
        }
    }

    #[must_use]
    pub fn with_range(mut self, range: ByteRange) -> Self {
        self.range = range;
        self
    }

    #[must_use]
    pub fn with_key<S: Into<String>>(mut self, key: S) -> Self {
        self.key = Some(key.into());
        self
    }

    #[must_use]
    pub fn with_method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    #[must_use]
    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    /// Cache key for this request: explicit key wins, else canonical URL.
    ///
    /// # Errors
    ///
    /// [`strata_core::CoreError`] for an empty explicit key or a URL without
    /// a host.
    pub fn cache_key(&self) -> CoreResult<CacheKey> {
        derive_key(&self.url, self.key.as_deref())
    }

    #[must_use]
    pub fn is_http(&self) -> bool {
        matches!(self.url.scheme(), "http" | "https")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let req = MediaRequest::get(Url::parse("https://example.com/v.mp4").unwrap());
        assert_eq!(req.range, ByteRange::full());
        assert_eq!(req.method, HttpMethod::Get);
        assert!(req.key.is_none());
        assert!(req.headers.is_empty());
        assert!(req.is_http());
    }

    #[test]
    fn explicit_key_feeds_cache_key() {
        let req = MediaRequest::get(Url::parse("https://example.com/v.mp4").unwrap())
            .with_key("stream-42");
        assert_eq!(req.cache_key().unwrap().as_str(), "stream-42");
    }

    #[test]
    fn file_urls_are_not_http() {
        let req = MediaRequest::get(Url::parse("file:///tmp/v.mp4").unwrap());
        assert!(!req.is_http());
    }
}
