//! Disk cache for derived artifacts.

use crate::cache::path::cache_path;
use crate::cache::types::CacheError;
use crate::identity::FileId;
use crate::metrics::{MetricsSink, NullMetricsSink};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Disk cache mapping a [`FileId`] to a file under the cache root.
///
/// Entries are write-once: re-producing an entry under the same key
/// overwrites it with identical content. The cache owns no in-memory index -
/// the filesystem is the source of truth, which lets the [`super::Cleaner`]
/// delete files concurrently. Consumers must treat a file vanishing between
/// [`DiskCache::check`] and [`DiskCache::open`] as an ordinary
/// [`CacheError::Miss`].
pub struct DiskCache {
    /// Cache directory root
    root: PathBuf,
    /// Telemetry sink for hit/miss/error counters
    metrics: Arc<dyn MetricsSink>,
}

impl DiskCache {
    /// Create a new disk cache rooted at `root`.
    ///
    /// The root directory itself is created lazily by the first write.
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            metrics: Arc::new(NullMetricsSink),
        }
    }

    /// Attach a metrics sink for hit/miss/error counters.
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Cache directory root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Check whether an entry is cached, without reading its content.
    pub fn check(&self, id: &FileId) -> Result<(), CacheError> {
        let path = cache_path(&self.root, id);

        match fs::metadata(&path) {
            Ok(_) => {
                self.metrics.cache_hit();
                Ok(())
            }
            Err(err) => Err(self.classify(err)),
        }
    }

    /// Open a cached entry for reading.
    ///
    /// Returns [`CacheError::Miss`] if the entry is absent; any other
    /// filesystem error is surfaced as [`CacheError::Io`].
    pub fn open(&self, id: &FileId) -> Result<fs::File, CacheError> {
        let path = cache_path(&self.root, id);

        match fs::File::open(&path) {
            Ok(file) => {
                self.metrics.cache_hit();
                Ok(file)
            }
            Err(err) => Err(self.classify(err)),
        }
    }

    /// Return the path an entry must be written to, creating all parent
    /// directories. The caller writes the file directly.
    pub fn path_for_write(&self, id: &FileId) -> Result<PathBuf, CacheError> {
        let path = cache_path(&self.root, id);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).inspect_err(|_| self.metrics.cache_error())?;
        }
        Ok(path)
    }

    /// Copy all bytes from `reader` into the entry, creating parent
    /// directories and truncating any previous content. Returns the number of
    /// bytes written. A copy error can leave a partial file behind; callers
    /// must [`DiskCache::remove`] the entry in that case.
    pub fn write(&self, id: &FileId, reader: &mut impl io::Read) -> Result<u64, CacheError> {
        let path = self.path_for_write(id)?;

        let result = (|| -> io::Result<u64> {
            let mut file = fs::File::create(&path)?;
            let written = io::copy(reader, &mut file)?;
            file.sync_all()?;
            Ok(written)
        })();

        match result {
            Ok(written) => Ok(written),
            Err(err) => {
                self.metrics.cache_error();
                Err(CacheError::Io(err))
            }
        }
    }

    /// Remove an entry. Removing an absent entry is an error; eviction over
    /// time is the [`super::Cleaner`]'s job, manual removal is only for
    /// rolling back a failed production.
    pub fn remove(&self, id: &FileId) -> Result<(), CacheError> {
        let path = cache_path(&self.root, id);
        fs::remove_file(&path).map_err(|err| self.classify(err))
    }

    fn classify(&self, err: io::Error) -> CacheError {
        if err.kind() == io::ErrorKind::NotFound {
            self.metrics.cache_miss();
            CacheError::Miss
        } else {
            self.metrics.cache_error();
            CacheError::Io(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::AtomicMetricsSink;
    use tempfile::TempDir;

    fn create_temp_cache() -> (DiskCache, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let cache = DiskCache::new(temp_dir.path().to_path_buf());
        (cache, temp_dir)
    }

    fn test_id(path: &str) -> FileId {
        FileId::new(path, 1_700_000_000, 5)
    }

    #[test]
    fn test_write_then_open() {
        let (cache, _temp) = create_temp_cache();
        let id = test_id("/photos/cat.jpg");

        let written = cache.write(&id, &mut &b"hello"[..]).unwrap();
        assert_eq!(written, 5);

        let mut content = String::new();
        io::Read::read_to_string(&mut cache.open(&id).unwrap(), &mut content).unwrap();
        assert_eq!(content, "hello");
    }

    #[test]
    fn test_open_missing_entry_is_miss() {
        let (cache, _temp) = create_temp_cache();
        let err = cache.open(&test_id("/absent.jpg")).unwrap_err();
        assert!(err.is_miss());
    }

    #[test]
    fn test_check_missing_then_present() {
        let (cache, _temp) = create_temp_cache();
        let id = test_id("/photos/cat.jpg");

        assert!(cache.check(&id).unwrap_err().is_miss());
        cache.write(&id, &mut &b"hello"[..]).unwrap();
        cache.check(&id).unwrap();
    }

    #[test]
    fn test_path_for_write_creates_parent_dirs() {
        let (cache, temp) = create_temp_cache();
        let id = test_id("/photos/cat.jpg");

        let path = cache.path_for_write(&id).unwrap();
        assert!(path.parent().unwrap().is_dir());
        assert!(path.starts_with(temp.path()));
        assert!(!path.exists());
    }

    #[test]
    fn test_remove() {
        let (cache, _temp) = create_temp_cache();
        let id = test_id("/photos/cat.jpg");

        cache.write(&id, &mut &b"hello"[..]).unwrap();
        cache.remove(&id).unwrap();
        assert!(cache.check(&id).unwrap_err().is_miss());
    }

    #[test]
    fn test_remove_missing_entry_fails() {
        let (cache, _temp) = create_temp_cache();
        assert!(cache.remove(&test_id("/absent.jpg")).is_err());
    }

    #[test]
    fn test_write_overwrites_existing_entry() {
        let (cache, _temp) = create_temp_cache();
        let id = test_id("/photos/cat.jpg");

        cache.write(&id, &mut &b"first"[..]).unwrap();
        cache.write(&id, &mut &b"newer"[..]).unwrap();

        let mut content = String::new();
        io::Read::read_to_string(&mut cache.open(&id).unwrap(), &mut content).unwrap();
        assert_eq!(content, "newer");
    }

    #[test]
    fn test_metrics_hits_and_misses() {
        let temp_dir = TempDir::new().unwrap();
        let sink = Arc::new(AtomicMetricsSink::new());
        let cache = DiskCache::new(temp_dir.path().to_path_buf()).with_metrics(sink.clone());

        let id = test_id("/photos/cat.jpg");
        let _ = cache.open(&id);
        cache.write(&id, &mut &b"hello"[..]).unwrap();
        let _ = cache.open(&id);
        let _ = cache.check(&id);

        let snapshot = sink.snapshot();
        assert_eq!(snapshot.cache_misses, 1);
        assert_eq!(snapshot.cache_hits, 2);
        assert_eq!(snapshot.cache_errors, 0);
    }

    #[test]
    fn test_distinct_ids_are_distinct_entries() {
        let (cache, _temp) = create_temp_cache();
        let a = test_id("/a/1.jpg");
        let b = test_id("/b/1.jpg");

        cache.write(&a, &mut &b"aaa"[..]).unwrap();
        assert!(cache.check(&b).unwrap_err().is_miss());
    }
}
