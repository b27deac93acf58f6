use std::{future::Future, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::time::sleep;
use url::Url;

use crate::{
    error::NetError,
    traits::{Net, NetResponse},
    types::{Headers, RangeSpec, RetryPolicy},
};

/// Decides whether and when to retry a failed request.
#[cfg_attr(any(test, feature = "mock"), unimock::unimock(api = RetryDeciderMock))]
pub trait RetryDecider: Send + Sync {
    fn should_retry(&self, error: &NetError, attempt: u32) -> bool;
    fn delay_for_attempt(&self, attempt: u32) -> Duration;
    fn max_attempts(&self) -> u32;
}

/// Default decider: [`NetError::is_retryable`] classification bounded by the
/// policy's attempt cap.
pub struct DefaultRetryPolicy {
    policy: RetryPolicy,
}

impl DefaultRetryPolicy {
    #[must_use]
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }
}

impl RetryDecider for DefaultRetryPolicy {
    fn should_retry(&self, error: &NetError, attempt: u32) -> bool {
        if attempt >= self.policy.max_retries {
            return false;
        }
        error.is_retryable()
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.policy.delay_for_attempt(attempt)
    }

    fn max_attempts(&self) -> u32 {
        self.policy.max_retries
    }
}

/// Retry decorator for [`Net`] implementations.
pub struct RetryNet<N, P> {
    inner: N,
    decider: P,
}

impl<N: Net, P: RetryDecider> RetryNet<N, P> {
    pub fn new(inner: N, decider: P) -> Self {
        Self { inner, decider }
    }

    async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, NetError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, NetError>> + Send,
    {
        let mut last_error = None;

        for attempt in 0..=self.decider.max_attempts() {
            match op().await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    if !self.decider.should_retry(&error, attempt) {
                        return Err(error);
                    }
                    last_error = Some(error);
                    sleep(self.decider.delay_for_attempt(attempt)).await;
                }
            }
        }

        Err(NetError::RetryExhausted {
            max_retries: self.decider.max_attempts(),
            source: Box::new(last_error.unwrap_or(NetError::Timeout)),
        })
    }
}

#[async_trait]
impl<N: Net, P: RetryDecider> Net for RetryNet<N, P> {
    async fn get_bytes(&self, url: Url, headers: Option<Headers>) -> Result<Bytes, NetError> {
        self.run(|| self.inner.get_bytes(url.clone(), headers.clone()))
            .await
    }

    async fn stream(&self, url: Url, headers: Option<Headers>) -> Result<NetResponse, NetError> {
        self.run(|| self.inner.stream(url.clone(), headers.clone()))
            .await
    }

    async fn get_range(
        &self,
        url: Url,
        range: RangeSpec,
        headers: Option<Headers>,
    ) -> Result<NetResponse, NetError> {
        self.run(|| self.inner.get_range(url.clone(), range, headers.clone()))
            .await
    }

    async fn head(&self, url: Url, headers: Option<Headers>) -> Result<Headers, NetError> {
        self.run(|| self.inner.head(url.clone(), headers.clone()))
            .await
    }
}
