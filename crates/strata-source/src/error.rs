use thiserror::Error;

/// Result type used by `strata-source`.
pub type SourceResult<T> = Result<T, SourceError>;

/// Errors surfaced on the foreground open/read/close path.
///
/// Background prefetch swallows these (logged, never propagated); foreground
/// reads hand them to the player, whose own retry/error-reporting takes over.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("invalid request: {0}")]
    Core(#[from] strata_core::CoreError),

    #[error("network failure: {0}")]
    Net(#[from] strata_net::NetError),

    #[error("cache failure: {0}")]
    Cache(#[from] strata_cache::CacheError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("source not opened")]
    NotOpened,
}
