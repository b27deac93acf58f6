use std::sync::Arc;

use tokio::sync::OnceCell;
use url::Url;

use crate::{
    error::DashResult,
    index::SegmentIndex,
    loader::ManifestLoader,
    model::{MediaManifest, Representation, TrackType},
};

/// Per-representation prefetch state.
///
/// The segment index is memoized: the first successful load fills the cell,
/// concurrent callers wait on it rather than fetching twice.
pub struct RepresentationState {
    pub period_index: usize,
    pub track_type: TrackType,
    pub representation: Representation,
    index: OnceCell<SegmentIndex>,
}

impl RepresentationState {
    #[must_use]
    pub fn new(
        period_index: usize,
        track_type: TrackType,
        representation: Representation,
    ) -> Self {
        let index = OnceCell::new();
        if let Some(inline) = representation.inline_index.clone() {
            // Manifest-declared index: no network fetch will ever be needed.
            let _ = index.set(inline);
        }
        Self {
            period_index,
            track_type,
            representation,
            index,
        }
    }

    /// The memoized segment index, loading it on first use.
    ///
    /// # Errors
    ///
    /// Propagates the loader's failure; the cell stays empty so a later
    /// call retries.
    pub async fn segment_index<L: ManifestLoader>(
        &self,
        loader: &L,
    ) -> DashResult<&SegmentIndex> {
        self.index
            .get_or_try_init(|| loader.load_segment_index(self.representation.clone()))
            .await
    }
}

/// Parsed manifest plus its representation states; replaced wholesale when
/// the manifest URL changes, never mutated in place.
pub struct ManifestState {
    pub manifest_url: Url,
    pub manifest: MediaManifest,
    pub representations: Vec<Arc<RepresentationState>>,
}

impl ManifestState {
    /// Build the state for a freshly loaded manifest: one
    /// [`RepresentationState`] per video/audio representation across all
    /// periods.
    #[must_use]
    pub fn build(manifest_url: Url, manifest: MediaManifest) -> Self {
        let mut representations = Vec::new();
        for (period_index, period) in manifest.periods.iter().enumerate() {
            for set in &period.adaptation_sets {
                if !matches!(set.track_type, TrackType::Video | TrackType::Audio) {
                    continue;
                }
                for representation in &set.representations {
                    representations.push(Arc::new(RepresentationState::new(
                        period_index,
                        set.track_type,
                        representation.clone(),
                    )));
                }
            }
        }
        Self {
            manifest_url,
            manifest,
            representations,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use unimock::{matching, MockFn, Unimock};

    use super::*;
    use crate::{
        mock::ManifestLoaderMock,
        model::{AdaptationSet, Period},
    };

    fn representation(id: &str) -> Representation {
        Representation {
            id: id.to_string(),
            bitrate: Some(1_000_000),
            width: None,
            height: Some(720),
            language: None,
            base_url: Url::parse("https://cdn.example.com/v/").unwrap(),
            inline_index: None,
        }
    }

    fn index() -> SegmentIndex {
        SegmentIndex::bounded(1, 10, Duration::from_secs(4), "seg_$Number$.m4s")
    }

    #[test]
    fn build_flattens_video_and_audio_only() {
        let manifest = MediaManifest {
            periods: vec![Period {
                duration: Some(Duration::from_secs(600)),
                adaptation_sets: vec![
                    AdaptationSet {
                        track_type: TrackType::Video,
                        language: None,
                        representations: vec![representation("v1"), representation("v2")],
                    },
                    AdaptationSet {
                        track_type: TrackType::Other,
                        language: None,
                        representations: vec![representation("text")],
                    },
                    AdaptationSet {
                        track_type: TrackType::Audio,
                        language: Some("en".to_string()),
                        representations: vec![representation("a1")],
                    },
                ],
            }],
        };

        let state = ManifestState::build(
            Url::parse("https://example.com/stream.mpd").unwrap(),
            manifest,
        );
        let ids: Vec<&str> = state
            .representations
            .iter()
            .map(|r| r.representation.id.as_str())
            .collect();
        assert_eq!(ids, vec!["v1", "v2", "a1"]);
    }

    #[tokio::test]
    async fn segment_index_loads_once() {
        let loader = Unimock::new(
            ManifestLoaderMock::load_segment_index
                .next_call(matching!(_))
                .returns(Ok(index())),
        );
        let state = RepresentationState::new(0, TrackType::Video, representation("v1"));

        let first = state.segment_index(&loader).await.unwrap().clone();
        // Second call must hit the cell, not the loader (the mock would
        // panic on an unexpected second call).
        let second = state.segment_index(&loader).await.unwrap();
        assert_eq!(first.first_number, second.first_number);
    }

    #[tokio::test]
    async fn inline_index_needs_no_loader() {
        let mut rep = representation("v1");
        rep.inline_index = Some(index());
        let state = RepresentationState::new(0, TrackType::Video, rep);

        // No expectations: any loader call would panic.
        let loader = Unimock::new(());
        let idx = state.segment_index(&loader).await.unwrap();
        assert_eq!(idx.count, Some(10));
    }

    #[tokio::test]
    async fn failed_index_load_retries_later() {
        let loader = Unimock::new((
            ManifestLoaderMock::load_segment_index
                .next_call(matching!(_))
                .returns(Err(crate::DashError::SegmentIndexUnavailable(
                    "offline".to_string(),
                ))),
            ManifestLoaderMock::load_segment_index
                .next_call(matching!(_))
                .returns(Ok(index())),
        ));
        let state = RepresentationState::new(0, TrackType::Video, representation("v1"));

        assert!(state.segment_index(&loader).await.is_err());
        assert!(state.segment_index(&loader).await.is_ok());
    }
}
