use crate::store::SpanInfo;

/// Ordering policy for the eviction scan.
///
/// Implementations sort candidates most-evictable-first; the store then
/// deletes from the front until the byte budget is met.
pub trait EvictionPolicy: Send + Sync {
    fn order(&self, candidates: &mut Vec<SpanInfo>);
}

/// Default policy: oldest-modified spans go first.
///
/// Modification time, not read time: a best-effort LRU that never rewrites
/// entries on access. Ties keep enumeration order.
pub struct OldestModifiedFirst;

impl EvictionPolicy for OldestModifiedFirst {
    fn order(&self, candidates: &mut Vec<SpanInfo>) {
        candidates.sort_by_key(|span| span.modified);
    }
}
