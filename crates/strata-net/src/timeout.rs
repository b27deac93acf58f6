use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

use crate::{
    error::NetError,
    traits::{Net, NetResponse},
    types::{Headers, RangeSpec},
};

/// Timeout decorator for [`Net`] implementations.
///
/// Bounds request establishment only; an already-established body stream is
/// not cut off mid-transfer.
pub struct TimeoutNet<N> {
    inner: N,
    timeout: Duration,
}

impl<N: Net> TimeoutNet<N> {
    pub fn new(inner: N, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    async fn bounded<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, NetError>> + Send,
    ) -> Result<T, NetError> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| NetError::Timeout)?
    }
}

#[async_trait]
impl<N: Net> Net for TimeoutNet<N> {
    async fn get_bytes(&self, url: Url, headers: Option<Headers>) -> Result<Bytes, NetError> {
        self.bounded(self.inner.get_bytes(url, headers)).await
    }

    async fn stream(&self, url: Url, headers: Option<Headers>) -> Result<NetResponse, NetError> {
        self.bounded(self.inner.stream(url, headers)).await
    }

    async fn get_range(
        &self,
        url: Url,
        range: RangeSpec,
        headers: Option<Headers>,
    ) -> Result<NetResponse, NetError> {
        self.bounded(self.inner.get_range(url, range, headers)).await
    }

    async fn head(&self, url: Url, headers: Option<Headers>) -> Result<Headers, NetError> {
        self.bounded(self.inner.head(url, headers)).await
    }
}
