use thiserror::Error;

/// Result type used by `strata-net`.
pub type NetResult<T> = Result<T, NetError>;

/// Errors produced by the transport layer.
#[derive(Debug, Error, Clone)]
pub enum NetError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("HTTP {status} for URL: {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Timeout")]
    Timeout,

    #[error("Invalid range header: {0}")]
    InvalidRange(String),

    #[error("Request failed after {max_retries} retries: {source}")]
    RetryExhausted {
        max_retries: u32,
        source: Box<NetError>,
    },
}

impl NetError {
    pub fn http<S: Into<String>>(msg: S) -> Self {
        Self::Http(msg.into())
    }

    #[must_use]
    pub fn http_status(status: u16, url: String) -> Self {
        Self::HttpStatus { status, url }
    }

    /// Whether a retry has a chance of succeeding.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            NetError::Timeout => true,
            NetError::HttpStatus { status, .. } => {
                *status >= 500 || *status == 429 || *status == 408
            }
            NetError::Http(msg) => {
                msg.contains("timeout") || msg.contains("connection") || msg.contains("network")
            }
            NetError::InvalidRange(_) | NetError::RetryExhausted { .. } => false,
        }
    }

    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, NetError::Timeout)
    }

    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            NetError::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for NetError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            return Self::Timeout;
        }
        Self::Http(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(NetError::Timeout, true)]
    #[case(NetError::http_status(500, "http://x".into()), true)]
    #[case(NetError::http_status(503, "http://x".into()), true)]
    #[case(NetError::http_status(429, "http://x".into()), true)]
    #[case(NetError::http_status(404, "http://x".into()), false)]
    #[case(NetError::http_status(400, "http://x".into()), false)]
    #[case(NetError::Http("connection reset".into()), true)]
    #[case(NetError::Http("bad body".into()), false)]
    #[case(NetError::InvalidRange("x".into()), false)]
    fn retryability(#[case] error: NetError, #[case] expected: bool) {
        assert_eq!(error.is_retryable(), expected);
    }

    #[test]
    fn status_code_extraction() {
        assert_eq!(
            NetError::http_status(206, "http://x".into()).status_code(),
            Some(206)
        );
        assert_eq!(NetError::Timeout.status_code(), None);
    }
}
