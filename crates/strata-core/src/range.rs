use std::ops::Range;

/// Requested byte span of a resource.
///
/// `length == None` means "to end of resource, possibly unknown".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ByteRange {
    pub position: u64,
    pub length: Option<u64>,
}

impl ByteRange {
    #[must_use]
    pub fn new(position: u64, length: Option<u64>) -> Self {
        Self { position, length }
    }

    /// Open-ended range starting at `position`.
    #[must_use]
    pub fn from_position(position: u64) -> Self {
        Self {
            position,
            length: None,
        }
    }

    /// The whole resource.
    #[must_use]
    pub fn full() -> Self {
        Self {
            position: 0,
            length: None,
        }
    }

    /// Exclusive end position, when the length is bounded.
    #[must_use]
    pub fn end(&self) -> Option<u64> {
        self.length.map(|len| self.position.saturating_add(len))
    }

    /// True for a bounded zero-length range.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.length == Some(0)
    }

    /// Whether the whole resource was requested (position 0, unbounded).
    #[must_use]
    pub fn is_full_resource(&self) -> bool {
        self.position == 0 && self.length.is_none()
    }

    /// Whether a stored entry of `content_length` bytes can serve this range.
    ///
    /// - Bounded range: the stored length must cover `position + length`.
    /// - Open-ended range: the stored length must exceed `position`.
    /// - Unknown stored length: never servable (nothing to verify against).
    #[must_use]
    pub fn is_servable(&self, content_length: Option<u64>) -> bool {
        let Some(total) = content_length else {
            return false;
        };
        match self.end() {
            Some(end) => end <= total,
            None => self.position < total,
        }
    }

    /// Concrete `start..end` once a resolved end position is known.
    #[must_use]
    pub fn resolve(&self, resolved_end: u64) -> Range<u64> {
        let end = match self.end() {
            Some(end) => end.min(resolved_end),
            None => resolved_end,
        };
        self.position..end.max(self.position)
    }
}

impl std::fmt::Display for ByteRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.length {
            Some(len) => write!(f, "[{}, +{})", self.position, len),
            None => write!(f, "[{}, ..)", self.position),
        }
    }
}
