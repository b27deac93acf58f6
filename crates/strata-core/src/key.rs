use sha2::{Digest, Sha256};
use url::Url;

use crate::{
    canonicalization::canonicalize_for_key,
    errors::{CoreError, CoreResult},
};

/// Stable identifier for a cached resource.
///
/// The key value is the canonical URL string (or a caller-supplied explicit
/// key, taken verbatim). The file stem is `hex(sha256(value))`, computed once
/// at construction, so any key is safe to use as an on-disk name and the same
/// logical resource maps to the same file across process restarts.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    value: String,
    stem: String,
}

impl CacheKey {
    /// Derive a key from a URL via canonicalization.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MissingComponent`] for URLs without a host.
    pub fn for_url(url: &Url) -> CoreResult<CacheKey> {
        let canonical = canonicalize_for_key(url)?;
        Ok(Self::from_value(canonical))
    }

    /// Use a caller-supplied key verbatim.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidRequest`] for an empty key.
    pub fn explicit(key: &str) -> CoreResult<CacheKey> {
        if key.is_empty() {
            return Err(CoreError::InvalidRequest("empty cache key".to_string()));
        }
        Ok(Self::from_value(key.to_string()))
    }

    fn from_value(value: String) -> CacheKey {
        let stem = hex::encode(Sha256::digest(value.as_bytes()));
        CacheKey { value, stem }
    }

    /// The opaque key string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// Filesystem-safe stem used to name cache entries.
    #[must_use]
    pub fn file_stem(&self) -> &str {
        &self.stem
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.value)
    }
}

/// Derive the cache key for a request: explicit key wins, else the canonical
/// URL.
///
/// # Errors
///
/// Returns [`CoreError::InvalidRequest`] for an empty explicit key and
/// [`CoreError::MissingComponent`] for URLs without a host.
pub fn derive_key(url: &Url, explicit: Option<&str>) -> CoreResult<CacheKey> {
    match explicit {
        Some(key) => CacheKey::explicit(key),
        None => CacheKey::for_url(url),
    }
}
