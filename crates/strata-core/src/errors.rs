use thiserror::Error;

/// Result type used by `strata-core`.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors produced by the key/range model.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Malformed request input (empty URL, empty explicit key).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// URL is missing a component required for canonicalization.
    #[error("url missing component: {0}")]
    MissingComponent(String),
}
