use std::time::Duration;

use url::Url;

use crate::index::SegmentIndex;

/// Track classes relevant to prefetch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackType {
    Video,
    Audio,
    Other,
}

/// Format of the track a player is currently loading, as reported by its
/// load events.
#[derive(Clone, Debug)]
pub struct TrackFormat {
    pub id: Option<String>,
    pub track_type: TrackType,
    pub bitrate: Option<u32>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub language: Option<String>,
}

impl TrackFormat {
    #[must_use]
    pub fn video(height: u32, bitrate: u32) -> Self {
        Self {
            id: None,
            track_type: TrackType::Video,
            bitrate: Some(bitrate),
            width: None,
            height: Some(height),
            language: None,
        }
    }

    #[must_use]
    pub fn audio(language: Option<&str>, bitrate: u32) -> Self {
        Self {
            id: None,
            track_type: TrackType::Audio,
            bitrate: Some(bitrate),
            width: None,
            height: None,
            language: language.map(str::to_string),
        }
    }

    #[must_use]
    pub fn with_id<S: Into<String>>(mut self, id: S) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// One encoded rendition of a track.
///
/// `inline_index` is present when the manifest itself declares the segment
/// timing (segment templates); otherwise the index needs a network fetch
/// through the loader.
#[derive(Clone, Debug)]
pub struct Representation {
    pub id: String,
    pub bitrate: Option<u32>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub language: Option<String>,
    pub base_url: Url,
    pub inline_index: Option<SegmentIndex>,
}

/// Set of interchangeable representations of one track.
#[derive(Clone, Debug)]
pub struct AdaptationSet {
    pub track_type: TrackType,
    pub language: Option<String>,
    pub representations: Vec<Representation>,
}

#[derive(Clone, Debug)]
pub struct Period {
    pub duration: Option<Duration>,
    pub adaptation_sets: Vec<AdaptationSet>,
}

/// Parsed representation tree handed over by the manifest collaborator.
#[derive(Clone, Debug)]
pub struct MediaManifest {
    pub periods: Vec<Period>,
}
