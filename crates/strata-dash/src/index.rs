use std::{
    sync::OnceLock,
    time::{Duration, SystemTime},
};

use regex::Regex;
use url::Url;

use crate::error::{DashError, DashResult};

/// Segment timing and addressing for one representation.
///
/// Bounded indexes (VOD) know their segment count up front; unbounded
/// indexes (live) derive availability from the wall clock against the
/// stream's availability start.
#[derive(Clone, Debug)]
pub struct SegmentIndex {
    pub first_number: u64,
    pub segment_duration: Duration,
    /// `None` for unbounded/live indexes.
    pub count: Option<u64>,
    /// When segment `first_number` became available (live only).
    pub availability_start: Option<SystemTime>,
    /// Media URL template; `$Number$` or `$Number%0Nd$` is substituted.
    pub media_template: String,
}

impl SegmentIndex {
    /// Bounded (VOD) index.
    #[must_use]
    pub fn bounded(
        first_number: u64,
        count: u64,
        segment_duration: Duration,
        media_template: impl Into<String>,
    ) -> Self {
        Self {
            first_number,
            segment_duration,
            count: Some(count),
            availability_start: None,
            media_template: media_template.into(),
        }
    }

    /// Unbounded (live) index anchored at `availability_start`.
    #[must_use]
    pub fn unbounded(
        first_number: u64,
        segment_duration: Duration,
        availability_start: SystemTime,
        media_template: impl Into<String>,
    ) -> Self {
        Self {
            first_number,
            segment_duration,
            count: None,
            availability_start: Some(availability_start),
            media_template: media_template.into(),
        }
    }

    /// Segment number containing `position` in media time.
    #[must_use]
    pub fn segment_for(&self, position: Duration) -> u64 {
        if self.segment_duration.is_zero() {
            return self.first_number;
        }
        let elapsed = position.as_micros() / self.segment_duration.as_micros();
        self.first_number + u64::try_from(elapsed).unwrap_or(u64::MAX)
    }

    /// Highest segment number currently available, or `None` when nothing
    /// is.
    ///
    /// Bounded: `first + count - 1`. Unbounded: the last segment fully
    /// produced by `now` per the availability anchor.
    #[must_use]
    pub fn max_available(&self, now: SystemTime) -> Option<u64> {
        match self.count {
            Some(0) => None,
            Some(count) => Some(self.first_number + count - 1),
            None => {
                let start = self.availability_start?;
                let elapsed = now.duration_since(start).ok()?;
                if self.segment_duration.is_zero() {
                    return None;
                }
                let produced =
                    u64::try_from(elapsed.as_micros() / self.segment_duration.as_micros())
                        .unwrap_or(u64::MAX);
                if produced == 0 {
                    return None;
                }
                Some(self.first_number + produced - 1)
            }
        }
    }

    /// Resolve the media URL of segment `number` against `base_url`.
    ///
    /// # Errors
    ///
    /// [`DashError::InvalidTemplate`] when the template carries no number
    /// placeholder, [`DashError::InvalidUrl`] when the substituted result
    /// does not resolve.
    pub fn url_for(&self, base_url: &Url, number: u64) -> DashResult<Url> {
        let substituted = substitute_number(&self.media_template, number)?;
        base_url
            .join(&substituted)
            .map_err(|e| DashError::InvalidUrl(format!("{substituted}: {e}")))
    }
}

fn number_placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$Number(?:%0(\d+)d)?\$").expect("valid regex"))
}

fn substitute_number(template: &str, number: u64) -> DashResult<String> {
    let re = number_placeholder_regex();
    let Some(captures) = re.captures(template) else {
        return Err(DashError::InvalidTemplate(template.to_string()));
    };

    let rendered = match captures.get(1) {
        Some(width) => {
            let width: usize = width
                .as_str()
                .parse()
                .map_err(|_| DashError::InvalidTemplate(template.to_string()))?;
            format!("{number:0width$}")
        }
        None => number.to_string(),
    };
    Ok(re.replace(template, rendered.as_str()).into_owned())
}
