use thiserror::Error;

/// Result type used by `strata-dash`.
pub type DashResult<T> = Result<T, DashError>;

/// DASH prefetch errors.
///
/// All of these are swallowed by the prefetcher (speculative work only); the
/// taxonomy exists so logs say what was skipped and why.
#[derive(Debug, Error, Clone)]
pub enum DashError {
    #[error("manifest unavailable: {0}")]
    ManifestUnavailable(String),

    #[error("segment index unavailable: {0}")]
    SegmentIndexUnavailable(String),

    #[error("invalid segment template: {0}")]
    InvalidTemplate(String),

    #[error("invalid url: {0}")]
    InvalidUrl(String),
}
