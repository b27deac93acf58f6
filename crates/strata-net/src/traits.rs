use std::{pin::Pin, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use url::Url;

use crate::{
    error::NetError,
    retry::{DefaultRetryPolicy, RetryNet},
    timeout::TimeoutNet,
    types::{Headers, RangeSpec, RetryPolicy},
};

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, NetError>> + Send>>;

/// A streaming response: headers up front, body on demand.
pub struct NetResponse {
    pub headers: Headers,
    pub body: ByteStream,
}

impl NetResponse {
    #[must_use]
    pub fn new(headers: Headers, body: ByteStream) -> Self {
        Self { headers, body }
    }

    /// Response with no headers of interest, e.g. from tests.
    #[must_use]
    pub fn from_body(body: ByteStream) -> Self {
        Self {
            headers: Headers::new(),
            body,
        }
    }
}

/// Transport contract: everything above this crate fetches through it.
#[cfg_attr(any(test, feature = "mock"), unimock::unimock(api = NetMock))]
#[async_trait]
pub trait Net: Send + Sync {
    /// Get all bytes from a URL.
    async fn get_bytes(&self, url: Url, headers: Option<Headers>) -> Result<Bytes, NetError>;

    /// Stream bytes from a URL.
    async fn stream(&self, url: Url, headers: Option<Headers>) -> Result<NetResponse, NetError>;

    /// Stream a byte range from a URL.
    async fn get_range(
        &self,
        url: Url,
        range: RangeSpec,
        headers: Option<Headers>,
    ) -> Result<NetResponse, NetError>;

    /// Response headers of a HEAD request.
    async fn head(&self, url: Url, headers: Option<Headers>) -> Result<Headers, NetError>;
}

pub trait NetExt: Net + Sized {
    /// Add a timeout layer.
    fn with_timeout(self, timeout: Duration) -> TimeoutNet<Self> {
        TimeoutNet::new(self, timeout)
    }

    /// Add a retry layer.
    fn with_retry(self, policy: RetryPolicy) -> RetryNet<Self, DefaultRetryPolicy> {
        RetryNet::new(self, DefaultRetryPolicy::new(policy))
    }
}

impl<T: Net> NetExt for T {}
