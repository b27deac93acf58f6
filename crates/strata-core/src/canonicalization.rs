use url::Url;

use crate::errors::{CoreError, CoreResult};

/// Canonicalizes a URL for cache-key derivation.
///
/// Normalizes so that URLs naming the same resource produce the same key:
/// - removes query parameters and fragments
/// - lowercases scheme and host
/// - removes default ports (80 for HTTP, 443 for HTTPS)
///
/// # Errors
///
/// Returns [`CoreError::MissingComponent`] if the URL lacks a host.
pub fn canonicalize_for_key(url: &Url) -> CoreResult<String> {
    if url.host().is_none() {
        return Err(CoreError::MissingComponent("host".to_string()));
    }

    let mut canonical = url.clone();

    canonical.set_fragment(None);
    canonical.set_query(None);

    let scheme_lower = canonical.scheme().to_lowercase();
    if canonical.scheme() != scheme_lower {
        let _ = canonical.set_scheme(&scheme_lower);
    }

    if let Some(host) = canonical.host_str() {
        let host_lower = host.to_lowercase();
        if host != host_lower {
            let _ = canonical.set_host(Some(&host_lower));
        }
    }

    match (canonical.scheme(), canonical.port()) {
        ("https", Some(443)) | ("http", Some(80)) => {
            let _ = canonical.set_port(None);
        }
        _ => {}
    }

    Ok(canonical.to_string())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(
        "https://example.com/video.mp4?token=123&quality=high#t=30",
        "https://example.com/video.mp4"
    )]
    #[case("HTTPS://EXAMPLE.COM/video.mp4", "https://example.com/video.mp4")]
    #[case("https://example.com:443/video.mp4", "https://example.com/video.mp4")]
    #[case("http://example.com:80/video.mp4", "http://example.com/video.mp4")]
    #[case(
        "https://example.com:8443/video.mp4",
        "https://example.com:8443/video.mp4"
    )]
    fn canonical_form(#[case] input: &str, #[case] expected: &str) {
        let url = Url::parse(input).unwrap();
        assert_eq!(canonicalize_for_key(&url).unwrap(), expected);
    }

    #[test]
    fn errors_on_missing_host() {
        let url = Url::parse("file:///path/to/video.mp4").unwrap();
        let result = canonicalize_for_key(&url);
        assert!(matches!(result, Err(CoreError::MissingComponent(c)) if c == "host"));
    }
}
