use async_trait::async_trait;
use strata_net::Headers;
use url::Url;

use crate::{error::SourceResult, request::MediaRequest};

/// Result of one `read` call.
///
/// `EndOfInput` is a sentinel, not an error: it distinguishes "no more bytes"
/// from a zero-length read into an empty buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    Bytes(usize),
    EndOfInput,
}

impl ReadOutcome {
    /// Bytes delivered, `None` at end of input.
    #[must_use]
    pub fn bytes(self) -> Option<usize> {
        match self {
            Self::Bytes(n) => Some(n),
            Self::EndOfInput => None,
        }
    }

    #[must_use]
    pub fn is_end_of_input(self) -> bool {
        matches!(self, Self::EndOfInput)
    }
}

/// Capability consumed by the playback engine.
///
/// Lifecycle: `open` resolves the request and returns the resolved length
/// (`None` when unknown), `read` delivers bytes strictly sequentially, and
/// `close` releases network connections and temp files on every exit path.
/// One open handle is never read concurrently.
#[async_trait]
pub trait DataSource: Send {
    /// Open the source for `request`; returns the resolved length in bytes,
    /// or `None` when it cannot be determined up front.
    async fn open(&mut self, request: &MediaRequest) -> SourceResult<Option<u64>>;

    /// Read into `buf`. Returns [`ReadOutcome::EndOfInput`] once exhausted.
    async fn read(&mut self, buf: &mut [u8]) -> SourceResult<ReadOutcome>;

    /// Release all resources. Idempotent.
    async fn close(&mut self) -> SourceResult<()>;

    /// URL currently being served, if open.
    fn url(&self) -> Option<&Url>;

    /// Response headers of the current open, when a network transport is
    /// involved; empty otherwise.
    fn response_headers(&self) -> Headers;
}

/// Convenience: drain a source to completion, returning all bytes.
///
/// Test and prefetch helper; foreground playback reads incrementally.
///
/// # Errors
///
/// Propagates the first read failure.
pub async fn read_to_end(source: &mut dyn DataSource) -> SourceResult<Vec<u8>> {
    let mut out = Vec::new();
    let mut buf = [0u8; 8 * 1024];
    loop {
        match source.read(&mut buf).await? {
            ReadOutcome::Bytes(n) => out.extend_from_slice(&buf[..n]),
            ReadOutcome::EndOfInput => return Ok(out),
        }
    }
}
