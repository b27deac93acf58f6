#![forbid(unsafe_code)]

//! Bounded, content-addressed disk cache.
//!
//! One file per committed span, named by cache-key stem (plus a `.p<position>`
//! suffix for range spans); `.part` files while a write is in flight. Presence
//! is derived purely from the directory listing; there is no index file.
//! Writes are two-phase: stream into the `.part` file, then an atomic rename
//! on [`WriteHandle::commit`], so a reader sees a fully committed span or
//! nothing.

mod error;
mod evict;
mod layout;
mod store;
mod write;

pub use error::{CacheError, CacheResult};
pub use evict::{EvictionPolicy, OldestModifiedFirst};
pub use layout::PART_SUFFIX;
pub use store::{DiskCacheStore, SpanInfo, SpanReader};
pub use write::WriteHandle;
