use std::sync::Arc;

use async_trait::async_trait;
use strata_net::{BasicCredentials, Headers, Net};
use tracing::debug;
use url::Url;

use crate::{
    error::SourceResult,
    http::HttpDataSource,
    request::MediaRequest,
    traits::{DataSource, ReadOutcome},
};

/// HTTP transport for WebDAV shares: every request carries the configured
/// basic-auth credentials.
///
/// Range semantics ride on plain GET-with-Range, which WebDAV servers honor;
/// PROPFIND metadata lookups are the collaborator HTTP library's concern and
/// are not re-implemented here.
pub struct WebDavDataSource<N> {
    inner: HttpDataSource<N>,
    credentials: BasicCredentials,
}

impl<N: Net> WebDavDataSource<N> {
    #[must_use]
    pub fn new(net: Arc<N>, credentials: BasicCredentials) -> Self {
        Self {
            inner: HttpDataSource::new(net),
            credentials,
        }
    }
}

#[async_trait]
impl<N: Net> DataSource for WebDavDataSource<N> {
    async fn open(&mut self, request: &MediaRequest) -> SourceResult<Option<u64>> {
        debug!(url = %request.url, "opening WebDAV source");
        let mut authorized = Headers::new();
        authorized.insert("Authorization", self.credentials.authorization_header());
        // The request's own headers win on conflict.
        let headers = authorized.merged_with(&request.headers);

        let request = request.clone().with_headers(headers);
        self.inner.open(&request).await
    }

    async fn read(&mut self, buf: &mut [u8]) -> SourceResult<ReadOutcome> {
        self.inner.read(buf).await
    }

    async fn close(&mut self) -> SourceResult<()> {
        self.inner.close().await
    }

    fn url(&self) -> Option<&Url> {
        self.inner.url()
    }

    fn response_headers(&self) -> Headers {
        self.inner.response_headers()
    }
}
