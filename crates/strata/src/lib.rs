#![forbid(unsafe_code)]

//! Adaptive media data layer: disk caching, range-segmented reads, and
//! speculative prefetch behind one [`DataSource`] capability.
//!
//! [`StreamCache`] wires the pieces together from a
//! [`StreamCacheOptions`]; embedders needing finer control compose the
//! sub-crates directly.

mod factory;
mod playlist;

pub use factory::StreamCache;
pub use playlist::{MediaItem, Playlist, PlaylistEvent, Subscription};

pub use strata_cache::{DiskCacheStore, EvictionPolicy, OldestModifiedFirst};
pub use strata_core::{derive_key, ByteRange, CacheKey, CoreError};
pub use strata_dash::{
    DashManifestPrefetcher, LoadEvent, ManifestLoader, MediaManifest, SegmentIndex,
    TrackFormat, TrackType,
};
pub use strata_net::{BasicCredentials, HttpClient, Net, NetOptions};
pub use strata_source::{
    DataSource, FlatCacheOptions, HttpMethod, MediaRequest, PrefetchPool,
    PrefetchingDiskCacheDataSource, RangeSegmentingSource, ReadOutcome, SegmentPrefetcher,
    SmartCachingDataSource, SourceError, StreamCacheOptions, WebDavDataSource,
};
