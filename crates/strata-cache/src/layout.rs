//! On-disk naming for cache spans.

/// Suffix carried by in-flight writes. Files with this suffix are never read
/// as entries and never counted by eviction.
pub const PART_SUFFIX: &str = ".part";

const SPAN_MARKER: &str = ".p";

/// File name for the span of `stem` starting at `position`.
///
/// Position 0 uses the bare stem (the whole-resource layout); later spans get
/// a numeric byte-offset suffix.
pub(crate) fn span_file_name(stem: &str, position: u64) -> String {
    if position == 0 {
        stem.to_string()
    } else {
        format!("{stem}{SPAN_MARKER}{position}")
    }
}

/// Parse a committed-span file name back into `(stem, position)`.
///
/// Returns `None` for `.part` files and anything else that is not a span.
pub(crate) fn parse_span_name(file_name: &str) -> Option<(&str, u64)> {
    if file_name.ends_with(PART_SUFFIX) {
        return None;
    }
    match file_name.rsplit_once(SPAN_MARKER) {
        Some((stem, suffix)) => {
            let position = suffix.parse().ok()?;
            Some((stem, position))
        }
        None => Some((file_name, 0)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_resource_uses_bare_stem() {
        assert_eq!(span_file_name("abc123", 0), "abc123");
    }

    #[test]
    fn span_name_roundtrip() {
        let name = span_file_name("abc123", 2048);
        assert_eq!(name, "abc123.p2048");
        assert_eq!(parse_span_name(&name), Some(("abc123", 2048)));
    }

    #[test]
    fn bare_stem_parses_as_position_zero() {
        assert_eq!(parse_span_name("abc123"), Some(("abc123", 0)));
    }

    #[test]
    fn part_files_are_not_spans() {
        assert_eq!(parse_span_name("abc123.part"), None);
        assert_eq!(parse_span_name("abc123.p2048.part"), None);
    }

    #[test]
    fn non_numeric_suffix_is_not_a_span() {
        assert_eq!(parse_span_name("abc123.pxyz"), None);
    }
}
