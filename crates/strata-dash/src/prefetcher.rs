use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use parking_lot::RwLock;
use strata_net::Net;
use strata_source::{MediaRequest, SegmentPrefetcher};
use tokio::sync::Mutex;
use tracing::{debug, trace};
use url::Url;

use crate::{
    error::{DashError, DashResult},
    loader::ManifestLoader,
    model::{TrackFormat, TrackType},
    select::find_representation,
    state::ManifestState,
};

/// One relevant load event from the player's analytics surface: a video or
/// audio media segment started loading.
#[derive(Clone, Debug)]
pub struct LoadEvent {
    pub manifest_url: Url,
    pub format: TrackFormat,
    /// Media time at which the loading segment starts.
    pub start: Duration,
}

type Clock = Arc<dyn Fn() -> SystemTime + Send + Sync>;

/// Watches playback load events and warms the cache for the next segments
/// of the representation being consumed.
///
/// Manifest state is loaded once per manifest URL (double-checked: fast read
/// outside the lock, recheck inside) and replaced wholesale when the URL
/// changes. Every failure here is swallowed; prefetch is a latency
/// optimization, playback never depends on it.
pub struct DashManifestPrefetcher<N, L> {
    loader: Arc<L>,
    prefetcher: SegmentPrefetcher<N>,
    concurrency: u32,
    state: RwLock<Option<Arc<ManifestState>>>,
    load_lock: Mutex<()>,
    clock: Clock,
}

impl<N: Net + 'static, L: ManifestLoader> DashManifestPrefetcher<N, L> {
    #[must_use]
    pub fn new(loader: Arc<L>, prefetcher: SegmentPrefetcher<N>, concurrency: u32) -> Self {
        Self {
            loader,
            prefetcher,
            concurrency,
            state: RwLock::new(None),
            load_lock: Mutex::new(()),
            clock: Arc::new(SystemTime::now),
        }
    }

    /// Replace the wall clock (live-edge computation in tests).
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Handle a load-start event; silent no-op on any failure.
    pub async fn on_load_started(&self, event: LoadEvent) {
        if self.concurrency <= 1 {
            return;
        }
        if !matches!(event.format.track_type, TrackType::Video | TrackType::Audio) {
            return;
        }
        if let Err(e) = self.prefetch_upcoming(&event).await {
            debug!(manifest = %event.manifest_url, error = %e, "dash prefetch cycle skipped");
        }
    }

    async fn prefetch_upcoming(&self, event: &LoadEvent) -> DashResult<()> {
        let state = self.manifest_state(&event.manifest_url).await?;

        let representation =
            find_representation(&state.representations, event.format.track_type, &event.format)
                .ok_or_else(|| {
                    DashError::ManifestUnavailable("no matching representation".to_string())
                })?;

        let index = representation.segment_index(self.loader.as_ref()).await?;

        let current = index.segment_for(event.start);
        let Some(max_available) = index.max_available((self.clock)()) else {
            return Ok(());
        };

        for i in 1..u64::from(self.concurrency) {
            let next = current + i;
            if next > max_available {
                // Never past the live edge or the manifest end.
                break;
            }
            let url = index.url_for(&representation.representation.base_url, next)?;
            trace!(segment = next, url = %url, "queueing dash segment prefetch");
            self.prefetcher.prefetch(MediaRequest::get(url));
        }
        Ok(())
    }

    /// Resolve or reuse the manifest state for `manifest_url`.
    async fn manifest_state(&self, manifest_url: &Url) -> DashResult<Arc<ManifestState>> {
        // Fast path outside the lock.
        if let Some(state) = self.state.read().as_ref() {
            if state.manifest_url == *manifest_url {
                return Ok(Arc::clone(state));
            }
        }

        let _guard = self.load_lock.lock().await;
        // Recheck: a concurrent caller may have loaded it while we waited.
        if let Some(state) = self.state.read().as_ref() {
            if state.manifest_url == *manifest_url {
                return Ok(Arc::clone(state));
            }
        }

        let manifest = self.loader.load_manifest(manifest_url.clone()).await?;
        let state = Arc::new(ManifestState::build(manifest_url.clone(), manifest));
        *self.state.write() = Some(Arc::clone(&state));
        Ok(state)
    }
}
