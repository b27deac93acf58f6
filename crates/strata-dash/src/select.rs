use std::sync::Arc;

use crate::{
    model::{TrackFormat, TrackType},
    state::RepresentationState,
};

/// Candidates scoring this are never selected.
const DISQUALIFIED: u64 = u64::MAX;

/// Pick the representation matching the currently loading track's format.
///
/// Exact format-id match wins outright; otherwise the candidate minimizing
/// [`match_score`] is chosen, and a fully disqualified field set rules a
/// candidate out entirely.
#[must_use]
pub fn find_representation(
    representations: &[Arc<RepresentationState>],
    track_type: TrackType,
    format: &TrackFormat,
) -> Option<Arc<RepresentationState>> {
    let candidates: Vec<&Arc<RepresentationState>> = representations
        .iter()
        .filter(|state| state.track_type == track_type)
        .collect();

    if let Some(id) = format.id.as_deref().filter(|id| !id.is_empty()) {
        if let Some(exact) = candidates
            .iter()
            .find(|state| state.representation.id == id)
        {
            return Some(Arc::clone(exact));
        }
    }

    candidates
        .into_iter()
        .map(|state| (match_score(state, format), state))
        .filter(|(score, _)| *score < DISQUALIFIED)
        .min_by_key(|(score, _)| *score)
        .map(|(_, state)| Arc::clone(state))
}

/// Distance between a candidate representation and the target format; lower
/// is better, [`DISQUALIFIED`] excludes.
fn match_score(state: &RepresentationState, target: &TrackFormat) -> u64 {
    let candidate = &state.representation;
    match state.track_type {
        TrackType::Video => {
            // A known height must match exactly or the candidate is out.
            if let (Some(t), Some(c)) = (target.height, candidate.height) {
                if t != c {
                    return DISQUALIFIED;
                }
            }
            match (target.bitrate, candidate.bitrate) {
                (Some(t), Some(c)) => u64::from(t.abs_diff(c)),
                _ => DISQUALIFIED / 2,
            }
        }
        TrackType::Audio => {
            let language_score = match (&target.language, &candidate.language) {
                (Some(t), Some(c)) if t == c => 0,
                _ => 10_000,
            };
            let bitrate_score = match (target.bitrate, candidate.bitrate) {
                (Some(t), Some(c)) => u64::from(t.abs_diff(c)),
                _ => 50_000,
            };
            language_score + bitrate_score
        }
        TrackType::Other => DISQUALIFIED,
    }
}

#[cfg(test)]
mod tests {
    use url::Url;

    use super::*;
    use crate::model::Representation;

    fn video_rep(id: &str, height: u32, bitrate: u32) -> Arc<RepresentationState> {
        Arc::new(RepresentationState::new(
            0,
            TrackType::Video,
            Representation {
                id: id.to_string(),
                bitrate: Some(bitrate),
                width: None,
                height: Some(height),
                language: None,
                base_url: Url::parse("https://cdn.example.com/v/").unwrap(),
                inline_index: None,
            },
        ))
    }

    fn audio_rep(id: &str, language: Option<&str>, bitrate: u32) -> Arc<RepresentationState> {
        Arc::new(RepresentationState::new(
            0,
            TrackType::Audio,
            Representation {
                id: id.to_string(),
                bitrate: Some(bitrate),
                width: None,
                height: None,
                language: language.map(str::to_string),
                base_url: Url::parse("https://cdn.example.com/a/").unwrap(),
                inline_index: None,
            },
        ))
    }

    #[test]
    fn exact_id_match_wins_regardless_of_bitrate() {
        // Heights 480/720/1080; the loading format names representation #2
        // by id while its metrics are closer to #3.
        let reps = vec![
            video_rep("v1", 480, 1_000_000),
            video_rep("v2", 720, 2_500_000),
            video_rep("v3", 1080, 6_000_000),
        ];
        let format = TrackFormat::video(720, 5_900_000).with_id("v2");

        let found = find_representation(&reps, TrackType::Video, &format).unwrap();
        assert_eq!(found.representation.id, "v2");
    }

    #[test]
    fn height_mismatch_disqualifies() {
        let reps = vec![video_rep("v1", 480, 1_000_000), video_rep("v2", 1080, 900_000)];
        let format = TrackFormat::video(720, 1_000_000);

        assert!(find_representation(&reps, TrackType::Video, &format).is_none());
    }

    #[test]
    fn closest_bitrate_wins_at_equal_height() {
        let reps = vec![
            video_rep("low", 720, 1_000_000),
            video_rep("mid", 720, 2_500_000),
            video_rep("high", 720, 6_000_000),
        ];
        let format = TrackFormat::video(720, 2_400_000);

        let found = find_representation(&reps, TrackType::Video, &format).unwrap();
        assert_eq!(found.representation.id, "mid");
    }

    #[test]
    fn audio_language_outweighs_bitrate() {
        let reps = vec![
            audio_rep("en-hi", Some("en"), 256_000),
            audio_rep("de-lo", Some("de"), 96_000),
        ];
        // Target: German at a bitrate much closer to the English rendition.
        let format = TrackFormat::audio(Some("de"), 255_000);

        let found = find_representation(&reps, TrackType::Audio, &format).unwrap();
        assert_eq!(found.representation.id, "de-lo");
    }

    #[test]
    fn track_type_filter_applies() {
        let reps = vec![
            video_rep("v1", 720, 1_000_000),
            audio_rep("a1", Some("en"), 128_000),
        ];
        let format = TrackFormat::audio(Some("en"), 128_000);

        let found = find_representation(&reps, TrackType::Audio, &format).unwrap();
        assert_eq!(found.representation.id, "a1");
    }

    #[test]
    fn unknown_id_falls_back_to_scoring() {
        let reps = vec![
            video_rep("v1", 720, 1_000_000),
            video_rep("v2", 720, 3_000_000),
        ];
        let format = TrackFormat::video(720, 2_900_000).with_id("nonexistent");

        let found = find_representation(&reps, TrackType::Video, &format).unwrap();
        assert_eq!(found.representation.id, "v2");
    }
}
