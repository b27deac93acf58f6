use async_trait::async_trait;
use url::Url;

use crate::{
    error::DashResult,
    index::SegmentIndex,
    model::{MediaManifest, Representation},
};

/// External collaborator that fetches and parses DASH metadata.
///
/// The manifest format is opaque to this crate: implementations fetch the
/// XML, run it through whatever parser the application embeds, and hand back
/// the representation tree. Segment indexes may need a further network fetch
/// (e.g. a SIDX box); that is also the loader's concern.
#[cfg_attr(any(test, feature = "mock"), unimock::unimock(api = ManifestLoaderMock))]
#[async_trait]
pub trait ManifestLoader: Send + Sync {
    /// Fetch and parse the manifest at `url`.
    async fn load_manifest(&self, url: Url) -> DashResult<MediaManifest>;

    /// Resolve the segment index of `representation` when the manifest did
    /// not carry one inline.
    async fn load_segment_index(
        &self,
        representation: Representation,
    ) -> DashResult<SegmentIndex>;
}
