use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use strata_net::{ByteStream, Headers, Net, RangeSpec};
use url::Url;

use crate::{
    error::{SourceError, SourceResult},
    request::{HttpMethod, MediaRequest},
    traits::{DataSource, ReadOutcome},
};

/// Generic upstream HTTP transport.
///
/// No caching; [`crate::CacheDataSource`] wraps this crate's `Net` directly
/// when write-through is wanted.
pub struct HttpDataSource<N> {
    net: Arc<N>,
    state: Option<OpenState>,
}

struct OpenState {
    url: Url,
    response_headers: Headers,
    body: Option<ByteStream>,
    pending: Bytes,
    remaining: Option<u64>,
}

impl<N: Net> HttpDataSource<N> {
    #[must_use]
    pub fn new(net: Arc<N>) -> Self {
        Self { net, state: None }
    }
}

fn request_headers(request: &MediaRequest) -> Option<Headers> {
    if request.headers.is_empty() {
        None
    } else {
        Some(request.headers.clone())
    }
}

#[async_trait]
impl<N: Net> DataSource for HttpDataSource<N> {
    async fn open(&mut self, request: &MediaRequest) -> SourceResult<Option<u64>> {
        if !request.is_http() {
            return Err(SourceError::UnsupportedScheme(
                request.url.scheme().to_string(),
            ));
        }

        let headers = request_headers(request);

        let state = match request.method {
            HttpMethod::Head => {
                let response_headers = self.net.head(request.url.clone(), headers).await?;
                let resolved = response_headers.content_length();
                OpenState {
                    url: request.url.clone(),
                    response_headers,
                    body: None,
                    pending: Bytes::new(),
                    remaining: Some(0),
                }
                .with_resolved(resolved)
            }
            HttpMethod::Get if request.range.is_empty() => OpenState {
                url: request.url.clone(),
                response_headers: Headers::new(),
                body: None,
                pending: Bytes::new(),
                remaining: Some(0),
            },
            HttpMethod::Get => {
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

                // A 206 carries the span length; a full response the total.
                let remaining = request
                    .range
                    .length
                    .or_else(|| response.headers.content_length());
                OpenState {
                    url: request.url.clone(),
                    response_headers: response.headers,
                    body: Some(response.body),
                    pending: Bytes::new(),
                    remaining,
                }
            }
        };

        let resolved = state.remaining;
        self.state = Some(state);
        Ok(resolved)
    }

    async fn read(&mut self, buf: &mut [u8]) -> SourceResult<ReadOutcome> {
        let state = self.state.as_mut().ok_or(SourceError::NotOpened)?;
        if buf.is_empty() || state.remaining == Some(0) {
            return Ok(ReadOutcome::EndOfInput);
        }

        while state.pending.is_empty() {
            let Some(body) = state.body.as_mut() else {
                return Ok(ReadOutcome::EndOfInput);
            };
            match body.next().await {
                Some(Ok(chunk)) => state.pending = chunk,
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(ReadOutcome::EndOfInput),
            }
        }

        let mut n = buf.len().min(state.pending.len());
        if let Some(remaining) = state.remaining {
            n = n.min(usize::try_from(remaining).unwrap_or(usize::MAX));
        }
        let chunk = state.pending.split_to(n);
        buf[..n].copy_from_slice(&chunk);
        if let Some(remaining) = state.remaining.as_mut() {
            *remaining -= n as u64;
        }
        Ok(ReadOutcome::Bytes(n))
    }

    async fn close(&mut self) -> SourceResult<()> {
        // Dropping the body releases the underlying connection.
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

impl OpenState {
    fn with_resolved(mut self, resolved: Option<u64>) -> Self {
        self.remaining = resolved.or(Some(0));
        self
    }
}

#[cfg(test)]
mod tests {
    use strata_core::ByteRange;
    use strata_net::{mock::NetMock, NetResponse};
    use unimock::{matching, MockFn, Unimock};

    use super::*;
    use crate::traits::read_to_end;

    fn body_of(chunks: Vec<&'static [u8]>) -> NetResponse {
        let stream = futures::stream::iter(
            chunks
                .into_iter()
                .map(|c| Ok(Bytes::from_static(c)))
                .collect::<Vec<_>>(),
        );
        NetResponse::from_body(Box::pin(stream))
    }

    #[tokio::test]
    async fn full_resource_uses_plain_stream() {
        let mock = Unimock::new(
            NetMock::stream
                .some_call(matching!(_, _))
                .answers(&|_, _, _| Ok(body_of(vec![b"hello ", b"world"]))),
        );
        let mut source = HttpDataSource::new(Arc::new(mock));

        let url = Url::parse("https://example.com/v.mp4").unwrap();
        source.open(&MediaRequest::get(url)).await.unwrap();

        let bytes = read_to_end(&mut source).await.unwrap();
        assert_eq!(bytes, b"hello world");
    }

    #[tokio::test]
    async fn ranged_request_sends_range_header() {
        let mock = Unimock::new(
            NetMock::get_range
                .some_call(matching!((_, range, _) if *range == RangeSpec::with_length(100, 50)))
                .answers(&|_, _, _, _| Ok(body_of(vec![&[0u8; 50]]))),
        );
        let mut source = HttpDataSource::new(Arc::new(mock));

        let url = Url::parse("https://example.com/v.mp4").unwrap();
        let request = MediaRequest::get(url).with_range(ByteRange::new(100, Some(50)));
        let resolved = source.open(&request).await.unwrap();
        assert_eq!(resolved, Some(50));

        let bytes = read_to_end(&mut source).await.unwrap();
        assert_eq!(bytes.len(), 50);
    }

    #[tokio::test]
    async fn resolved_length_from_content_length() {
        let mock = Unimock::new(NetMock::stream.some_call(matching!(_, _)).answers(
            &|_, _, _| {
                let mut headers = Headers::new();
                headers.insert("content-length", "11");
                let stream =
                    futures::stream::iter(vec![Ok(Bytes::from_static(b"hello world"))]);
                Ok(NetResponse::new(headers, Box::pin(stream)))
            },
        ));
        let mut source = HttpDataSource::new(Arc::new(mock));

        let url = Url::parse("https://example.com/v.mp4").unwrap();
        let resolved = source.open(&MediaRequest::get(url)).await.unwrap();
        assert_eq!(resolved, Some(11));
        assert_eq!(source.response_headers().content_length(), Some(11));
    }

    #[tokio::test]
    async fn head_reads_nothing() {
        let mock = Unimock::new(
            NetMock::head
                .some_call(matching!(_, _))
                .returns(Ok(Headers::new())),
        );
        let mut source = HttpDataSource::new(Arc::new(mock));

        let url = Url::parse("https://example.com/v.mp4").unwrap();
        let request = MediaRequest::get(url).with_method(HttpMethod::Head);
        source.open(&request).await.unwrap();

        let mut buf = [0u8; 8];
        assert_eq!(
            source.read(&mut buf).await.unwrap(),
            ReadOutcome::EndOfInput
        );
    }

    #[tokio::test]
    async fn empty_range_never_hits_the_network() {
        let mock = Unimock::new(());
        let mut source = HttpDataSource::new(Arc::new(mock));

        let url = Url::parse("https://example.com/v.mp4").unwrap();
        let request = MediaRequest::get(url).with_range(ByteRange::new(10, Some(0)));
        assert_eq!(source.open(&request).await.unwrap(), Some(0));

        let mut buf = [0u8; 8];
        assert_eq!(
            source.read(&mut buf).await.unwrap(),
            ReadOutcome::EndOfInput
        );
    }

    #[tokio::test]
    async fn stream_error_propagates() {
        let mock = Unimock::new(NetMock::stream.some_call(matching!(_, _)).answers(
            &|_, _, _| {
                let stream = futures::stream::iter(vec![
                    Ok(Bytes::from_static(b"ok")),
                    Err(strata_net::NetError::Timeout),
                ]);
                Ok(NetResponse::from_body(Box::pin(stream)))
            },
        ));
        let mut source = HttpDataSource::new(Arc::new(mock));

        let url = Url::parse("https://example.com/v.mp4").unwrap();
        source.open(&MediaRequest::get(url)).await.unwrap();

        let result = read_to_end(&mut source).await;
        assert!(matches!(result, Err(SourceError::Net(_))));
    }

    #[tokio::test]
    async fn non_http_scheme_is_rejected() {
        let mock = Unimock::new(());
        let mut source = HttpDataSource::new(Arc::new(mock));

        let url = Url::parse("file:///tmp/v.mp4").unwrap();
        let result = source.open(&MediaRequest::get(url)).await;
        assert!(matches!(result, Err(SourceError::UnsupportedScheme(_))));
    }
}
