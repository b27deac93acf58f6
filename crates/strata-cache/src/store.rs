use std::{
    collections::{HashMap, HashSet},
    fs::File,
    io::{Read, Seek, SeekFrom},
    path::{Path, PathBuf},
    sync::Arc,
    time::SystemTime,
};

use parking_lot::RwLock;
use rangemap::RangeSet;
use strata_core::{ByteRange, CacheKey};
use tracing::{debug, trace, warn};

use crate::{
    error::CacheResult,
    evict::{EvictionPolicy, OldestModifiedFirst},
    layout::{parse_span_name, span_file_name, PART_SUFFIX},
    write::WriteHandle,
};

/// One committed span on disk.
#[derive(Clone, Debug)]
pub struct SpanInfo {
    pub path: PathBuf,
    pub position: u64,
    pub len: u64,
    pub modified: SystemTime,
}

impl SpanInfo {
    fn end(&self) -> u64 {
        self.position + self.len
    }
}

struct StoreInner {
    root: PathBuf,
    max_bytes: u64,
    policy: Box<dyn EvictionPolicy>,
    /// Known total content length per key stem. In-memory only, relearned
    /// from response headers after a restart.
    lengths: RwLock<HashMap<String, u64>>,
}

/// Bounded content-addressed disk store, shared by handle.
///
/// Cheap to clone; every clone addresses the same cache directory and
/// content-length registry. Individual spans are keyed uniquely per resource,
/// so cross-entry contention is limited to the eviction scan.
#[derive(Clone)]
pub struct DiskCacheStore {
    inner: Arc<StoreInner>,
}

impl DiskCacheStore {
    /// Open (creating if needed) a cache rooted at `root` with a byte budget.
    ///
    /// `max_bytes == 0` disables eviction.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the root directory cannot be created.
    pub fn open(root: impl Into<PathBuf>, max_bytes: u64) -> CacheResult<Self> {
        Self::with_policy(root, max_bytes, Box::new(OldestModifiedFirst))
    }

    /// Open with a custom eviction ordering.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the root directory cannot be created.
    pub fn with_policy(
        root: impl Into<PathBuf>,
        max_bytes: u64,
        policy: Box<dyn EvictionPolicy>,
    ) -> CacheResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            inner: Arc::new(StoreInner {
                root,
                max_bytes,
                policy,
                lengths: RwLock::new(HashMap::new()),
            }),
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    /// Record the total content length of a resource, once learned from a
    /// response.
    pub fn set_content_length(&self, key: &CacheKey, len: u64) {
        self.inner
            .lengths
            .write()
            .insert(key.file_stem().to_string(), len);
    }

    /// Known total content length of a resource, if any.
    #[must_use]
    pub fn content_length(&self, key: &CacheKey) -> Option<u64> {
        self.inner.lengths.read().get(key.file_stem()).copied()
    }

    /// Whether committed spans fully cover `range`.
    ///
    /// An open-ended range is resolved against the known content length;
    /// with no known length there is nothing to verify, so the answer is
    /// `false` (callers proceed to fetch).
    #[must_use]
    pub fn is_cached(&self, key: &CacheKey, range: ByteRange) -> bool {
        let length = match range.length {
            Some(len) => len,
            None => match self.content_length(key) {
                Some(total) => total.saturating_sub(range.position),
                None => return false,
            },
        };
        if length == 0 {
            return true;
        }
        let want = range.position..range.position + length;

        let mut covered: RangeSet<u64> = RangeSet::new();
        for span in self.spans_of(key.file_stem()) {
            if span.len > 0 {
                covered.insert(span.position..span.end());
            }
        }
        covered.gaps(&want).next().is_none()
    }

    /// Open cached bytes for `range`, if a single committed span covers it.
    ///
    /// Misses are `Ok(None)`, never an error: a race with eviction between
    /// listing and opening also degrades to a miss.
    ///
    /// # Errors
    ///
    /// Currently none; the signature leaves room for callers that must
    /// distinguish real I/O faults from misses.
    pub fn read(&self, key: &CacheKey, range: ByteRange) -> CacheResult<Option<SpanReader>> {
        let spans = self.spans_of(key.file_stem());

        let covering = spans.into_iter().find(|span| {
            if range.position < span.position || range.position >= span.end() {
                return false;
            }
            match range.end() {
                Some(end) => end <= span.end(),
                // Open-ended reads are served to the span end.
                None => true,
            }
        });
        let Some(span) = covering else {
            return Ok(None);
        };

        let mut file = match File::open(&span.path) {
            Ok(file) => file,
            Err(e) => {
                warn!(path = %span.path.display(), error = %e, "cached span vanished, treating as miss");
                return Ok(None);
            }
        };
        if let Err(e) = file.seek(SeekFrom::Start(range.position - span.position)) {
            warn!(path = %span.path.display(), error = %e, "seek in cached span failed, treating as miss");
            return Ok(None);
        }

        let remaining = match range.length {
            Some(len) => len,
            None => span.end() - range.position,
        };
        trace!(
            key = %key,
            range = %range,
            span_position = span.position,
            bytes = remaining,
            "cache hit"
        );
        Ok(Some(SpanReader { file, remaining }))
    }

    /// Start a two-phase write for the span of `key` at `position`.
    ///
    /// # Errors
    ///
    /// [`crate::CacheError::WriteFailed`] when the partial file cannot be
    /// created, including when another writer already has this span in
    /// flight.
    pub fn begin_write(&self, key: &CacheKey, position: u64) -> CacheResult<WriteHandle> {
        let final_path = self
            .inner
            .root
            .join(span_file_name(key.file_stem(), position));
        let part_path = part_path_for(&final_path);
        WriteHandle::create(self.clone(), part_path, final_path)
    }

    /// Delete spans oldest-first (per policy) until the committed total fits
    /// the byte budget. Runs after every successful commit; best-effort.
    pub fn evict_if_over_budget(&self) {
        if self.inner.max_bytes == 0 {
            return;
        }

        let mut spans = self.all_spans();
        let mut total: u64 = spans.iter().map(|s| s.len).sum();
        if total <= self.inner.max_bytes {
            return;
        }

        self.inner.policy.order(&mut spans);

        let mut removed = 0usize;
        for span in &spans {
            if total <= self.inner.max_bytes {
                break;
            }
            match std::fs::remove_file(&span.path) {
                Ok(()) => {
                    total -= span.len;
                    removed += 1;
                }
                Err(e) => {
                    trace!(path = %span.path.display(), error = %e, "eviction skip");
                }
            }
        }

        if removed > 0 {
            debug!(removed, total, budget = self.inner.max_bytes, "cache evicted");
            self.forget_lengths_without_spans();
        }
    }

    /// Sum of all committed span sizes.
    #[must_use]
    pub fn total_committed_bytes(&self) -> u64 {
        self.all_spans().iter().map(|s| s.len).sum()
    }

    /// Remove every span of `key` and its metadata.
    pub fn remove(&self, key: &CacheKey) {
        for span in self.spans_of(key.file_stem()) {
            let _ = std::fs::remove_file(&span.path);
        }
        self.inner.lengths.write().remove(key.file_stem());
    }

    /// Remove every committed span and all metadata. In-flight `.part` files
    /// are left behind; they are never read and their writers fail on commit.
    pub fn clear(&self) {
        for span in self.all_spans() {
            let _ = std::fs::remove_file(&span.path);
        }
        self.inner.lengths.write().clear();
    }

    fn spans_of(&self, stem: &str) -> Vec<SpanInfo> {
        self.list_spans(Some(stem))
    }

    fn all_spans(&self) -> Vec<SpanInfo> {
        self.list_spans(None)
    }

    fn list_spans(&self, stem: Option<&str>) -> Vec<SpanInfo> {
        let entries = match std::fs::read_dir(&self.inner.root) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(root = %self.inner.root.display(), error = %e, "cache dir unreadable");
                return Vec::new();
            }
        };

        let mut spans = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some((entry_stem, position)) = parse_span_name(name) else {
                continue;
            };
            if stem.is_some_and(|s| s != entry_stem) {
                continue;
            }
            let Ok(meta) = entry.metadata() else { continue };
            if !meta.is_file() {
                continue;
            }
            spans.push(SpanInfo {
                path: entry.path(),
                position,
                len: meta.len(),
                modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            });
        }
        spans
    }

    fn forget_lengths_without_spans(&self) {
        let surviving: HashSet<String> = self
            .all_spans()
            .iter()
            .filter_map(|span| {
                let name = span.path.file_name()?.to_str()?;
                parse_span_name(name).map(|(stem, _)| stem.to_string())
            })
            .collect();
        self.inner
            .lengths
            .write()
            .retain(|stem, _| surviving.contains(stem));
    }
}

impl std::fmt::Debug for DiskCacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskCacheStore")
            .field("root", &self.inner.root)
            .field("max_bytes", &self.inner.max_bytes)
            .finish_non_exhaustive()
    }
}

/// Positioned, length-limited reader over one committed span.
pub struct SpanReader {
    file: File,
    remaining: u64,
}

impl SpanReader {
    /// Bytes left to read.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.remaining
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.remaining == 0
    }
}

impl Read for SpanReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.remaining == 0 {
            return Ok(0);
        }
        let cap = buf.len().min(usize::try_from(self.remaining).unwrap_or(usize::MAX));
        let n = self.file.read(&mut buf[..cap])?;
        self.remaining -= n as u64;
        Ok(n)
    }
}

fn part_path_for(final_path: &Path) -> PathBuf {
    let mut name = final_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(PART_SUFFIX);
    final_path.with_file_name(name)
}
