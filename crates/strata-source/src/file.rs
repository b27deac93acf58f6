use async_trait::async_trait;
use strata_net::Headers;
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt, SeekFrom},
};
use url::Url;

use crate::{
    error::{SourceError, SourceResult},
    request::MediaRequest,
    traits::{DataSource, ReadOutcome},
};

/// Pass-through transport for `file://` URLs.
pub struct FileDataSource {
    state: Option<OpenState>,
}

struct OpenState {
    url: Url,
    file: File,
    remaining: u64,
}

impl FileDataSource {
    #[must_use]
    pub fn new() -> Self {
        Self { state: None }
    }
}

impl Default for FileDataSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DataSource for FileDataSource {
    async fn open(&mut self, request: &MediaRequest) -> SourceResult<Option<u64>> {
        let path = request
            .url
            .to_file_path()
            .map_err(|()| SourceError::UnsupportedScheme(request.url.scheme().to_string()))?;

        let mut file = File::open(&path).await?;
        let file_len = file.metadata().await?.len();

        if request.range.position > file_len {
            return Err(SourceError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "read position past end of file",
            )));
        }
        file.seek(SeekFrom::Start(request.range.position)).await?;

        let available = file_len - request.range.position;
        let remaining = match request.range.length {
            Some(len) => len.min(available),
            None => available,
        };

        self.state = Some(OpenState {
            url: request.url.clone(),
            file,
            remaining,
        });
        Ok(Some(remaining))
    }

    async fn read(&mut self, buf: &mut [u8]) -> SourceResult<ReadOutcome> {
        let state = self.state.as_mut().ok_or(SourceError::NotOpened)?;
        if state.remaining == 0 || buf.is_empty() {
            return Ok(ReadOutcome::EndOfInput);
        }

        let cap = buf
            .len()
            .min(usize::try_from(state.remaining).unwrap_or(usize::MAX));
        let n = state.file.read(&mut buf[..cap]).await?;
        if n == 0 {
            return Ok(ReadOutcome::EndOfInput);
        }
        state.remaining -= n as u64;
        Ok(ReadOutcome::Bytes(n))
    }

    async fn close(&mut self) -> SourceResult<()> {
        self.state = None;
        Ok(())
    }

    fn url(&self) -> Option<&Url> {
        self.state.as_ref().map(|s| &s.url)
    }

    fn response_headers(&self) -> Headers {
        Headers::new()
    }
}
