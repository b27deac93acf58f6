use std::{
    fs::{File, OpenOptions},
    io::Write,
    path::PathBuf,
};

use tracing::{debug, trace};

use crate::{
    error::{CacheError, CacheResult},
    store::DiskCacheStore,
};

/// Exclusive append handle for one in-flight span write.
///
/// Bytes stream into `<final>.part`; [`commit`](Self::commit) atomically
/// renames onto the final name, [`abort`](Self::abort) deletes the partial.
/// Dropping an uncommitted handle behaves like `abort`, so a crashed or
/// abandoned write never becomes visible as a committed entry.
pub struct WriteHandle {
    store: DiskCacheStore,
    part_path: PathBuf,
    final_path: PathBuf,
    file: Option<File>,
    written: u64,
    finished: bool,
}

impl WriteHandle {
    pub(crate) fn create(
        store: DiskCacheStore,
        part_path: PathBuf,
        final_path: PathBuf,
    ) -> CacheResult<Self> {
        // create_new: a second writer racing on the same span loses here and
        // falls back to uncached delivery.
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&part_path)
            .map_err(|e| CacheError::write_failed(format!("open {}: {e}", part_path.display())))?;

        Ok(Self {
            store,
            part_path,
            final_path,
            file: Some(file),
            written: 0,
            finished: false,
        })
    }

    /// Append bytes to the partial file.
    ///
    /// # Errors
    ///
    /// [`CacheError::WriteFailed`] on any I/O error; the caller should drop
    /// the handle (deleting the partial) and continue uncached.
    pub fn write(&mut self, data: &[u8]) -> CacheResult<()> {
        let Some(file) = self.file.as_mut() else {
            return Err(CacheError::write_failed("write after commit/abort"));
        };
        file.write_all(data)
            .map_err(|e| CacheError::write_failed(format!("write: {e}")))?;
        self.written += data.len() as u64;
        Ok(())
    }

    /// Bytes written so far.
    #[must_use]
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Flush, atomically promote the partial to its final name, and run the
    /// eviction pass.
    ///
    /// # Errors
    ///
    /// [`CacheError::WriteFailed`] if the flush or rename fails; the partial
    /// is deleted in that case.
    pub fn commit(mut self) -> CacheResult<()> {
        let Some(mut file) = self.file.take() else {
            return Err(CacheError::write_failed("commit after commit/abort"));
        };

        let result = file
            .flush()
            .map_err(|e| CacheError::write_failed(format!("flush: {e}")))
            .and_then(|()| {
                std::fs::rename(&self.part_path, &self.final_path)
                    .map_err(|e| CacheError::write_failed(format!("rename: {e}")))
            });
        drop(file);

        if let Err(e) = result {
            let _ = std::fs::remove_file(&self.part_path);
            self.finished = true;
            return Err(e);
        }

        self.finished = true;
        debug!(
            path = %self.final_path.display(),
            bytes = self.written,
            "cache span committed"
        );
        self.store.evict_if_over_budget();
        Ok(())
    }

    /// Discard the write and delete the partial file.
    pub fn abort(mut self) {
        self.discard();
    }

    fn discard(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.file.take();
        if std::fs::remove_file(&self.part_path).is_ok() {
            trace!(path = %self.part_path.display(), "partial cache write discarded");
        }
    }
}

impl Drop for WriteHandle {
    fn drop(&mut self) {
        self.discard();
    }
}
