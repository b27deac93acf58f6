use thiserror::Error;

/// Result type used by `strata-cache`.
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors produced by the disk cache.
///
/// Reads never fail on a miss; a miss is `Ok(None)`. Write failures abort
/// the write (the partial file is deleted) and surface here so the caller can
/// fall back to uncached delivery.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache write failed: {0}")]
    WriteFailed(String),
}

impl CacheError {
    pub fn write_failed<S: Into<String>>(msg: S) -> Self {
        Self::WriteFailed(msg.into())
    }
}
