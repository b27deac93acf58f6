#![forbid(unsafe_code)]

//! Data-source strategies consumed by the playback engine.
//!
//! A [`DataSource`] is opened per request, read sequentially, and closed.
//! [`SmartCachingDataSource`] picks a strategy per open: pass-through
//! transports, cache-wrapped HTTP, or the chunked [`RangeSegmentingSource`]
//! with look-ahead prefetch. Background warming goes through
//! [`SegmentPrefetcher`] on a bounded, cancellable [`PrefetchPool`].

mod cached;
mod error;
mod file;
mod flat;
mod http;
mod options;
mod pool;
mod prefetch;
mod request;
mod segmenting;
mod smart;
mod traits;
mod webdav;

pub use cached::CacheDataSource;
pub use error::{SourceError, SourceResult};
pub use file::FileDataSource;
pub use flat::{FlatCacheOptions, PrefetchingDiskCacheDataSource};
pub use http::HttpDataSource;
pub use options::{StreamCacheOptions, UrlPredicate};
pub use pool::PrefetchPool;
pub use prefetch::SegmentPrefetcher;
pub use request::{HttpMethod, MediaRequest};
pub use segmenting::RangeSegmentingSource;
pub use smart::SmartCachingDataSource;
pub use traits::{read_to_end, DataSource, ReadOutcome};
pub use webdav::WebDavDataSource;
