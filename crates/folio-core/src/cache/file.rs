use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, warn};

use super::{CacheRecord, ListingCache, MemoryCache};
use crate::error::{CoreError, CoreResult};

/// Quiet period used by [`JsonFileCache::open`].
pub const DEFAULT_SAVE_DELAY: Duration = Duration::from_secs(1);

/// A [`MemoryCache`] mirrored to a JSON file.
///
/// Mutations only mark the cache dirty. Inside a tokio runtime the file is
/// rewritten once per quiet period on the blocking pool, so a burst of writes
/// costs a single save and never stalls an async worker. Outside a runtime
/// the file is rewritten straight away. Pending changes are written when the
/// last handle is dropped.
///
/// A file that cannot be parsed, or an individual record that cannot be
/// decoded, is treated as a cache miss.
#[derive(Debug)]
pub struct JsonFileCache {
    inner: Arc<Backing>,
    save_delay: Duration,
}

#[derive(Debug)]
struct Backing {
    memory: MemoryCache,
    file: PathBuf,
    save_lock: Mutex<()>,
    dirty: AtomicBool,
    scheduled: AtomicBool,
}

impl JsonFileCache {
    /// Opens the cache stored at `file`. A missing or corrupt file yields an
    /// empty cache.
    pub fn open(file: impl Into<PathBuf>, cap: usize) -> Self {
        Self::open_with(file, MemoryCache::new(cap), DEFAULT_SAVE_DELAY)
    }

    /// Opens the cache stored at `file` on top of `memory`, which decides the
    /// per-folder cap and folder bound.
    pub fn open_with(file: impl Into<PathBuf>, memory: MemoryCache, save_delay: Duration) -> Self {
        let file = file.into();

        match std::fs::read_to_string(&file) {
            Ok(contents) => match serde_json::from_str::<HashMap<String, serde_json::Value>>(&contents)
            {
                Ok(raw) => {
                    for (key, value) in raw {
                        match decode_record(value) {
                            Ok(record) => memory.restore(key, record),
                            Err(e) => debug!(key = %key, error = %e, "skipping cache record"),
                        }
                    }
                }
                Err(e) => warn!(path = %file.display(), error = %e, "cache file unreadable, starting empty"),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %file.display(), error = %e, "cannot open cache file"),
        }

        Self {
            inner: Arc::new(Backing {
                memory,
                file,
                save_lock: Mutex::new(()),
                dirty: AtomicBool::new(false),
                scheduled: AtomicBool::new(false),
            }),
            save_delay,
        }
    }

    /// Path of the backing file.
    pub fn file(&self) -> &Path {
        &self.inner.file
    }

    /// Number of folders currently cached.
    pub fn len(&self) -> usize {
        self.inner.memory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes the current contents to disk now, creating parent directories
    /// as needed.
    pub fn save(&self) -> CoreResult<()> {
        self.inner.save()
    }

    fn changed(&self) {
        self.inner.dirty.store(true, Ordering::Release);
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            self.inner.persist();
            return;
        };
        if self.inner.scheduled.swap(true, Ordering::AcqRel) {
            return;
        }
        let inner = Arc::clone(&self.inner);
        let delay = self.save_delay;
        runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            inner.scheduled.store(false, Ordering::Release);
            if let Err(e) = tokio::task::spawn_blocking(move || inner.persist()).await {
                warn!(error = %e, "listing cache save task failed");
            }
        });
    }
}

impl Backing {
    fn save(&self) -> CoreResult<()> {
        let _guard = self.save_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.dirty.store(false, Ordering::Release);
        let result = self.write_snapshot();
        if result.is_err() {
            self.dirty.store(true, Ordering::Release);
        }
        result
    }

    fn write_snapshot(&self) -> CoreResult<()> {
        let snapshot: HashMap<String, Arc<CacheRecord>> = self.memory.snapshot();
        if let Some(parent) = self.file.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CoreError::from_io(e, parent))?;
        }
        let plain: HashMap<&str, &CacheRecord> = snapshot
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_ref()))
            .collect();
        let json = serde_json::to_string(&plain)
            .map_err(|e| CoreError::CacheCorrupt(e.to_string()))?;
        std::fs::write(&self.file, json).map_err(|e| CoreError::from_io(e, &self.file))
    }

    /// Saves when something changed since the last save.
    fn persist(&self) {
        if !self.dirty.load(Ordering::Acquire) {
            return;
        }
        if let Err(e) = self.save() {
            warn!(path = %self.file.display(), error = %e, "failed to persist listing cache");
        }
    }
}

impl Drop for Backing {
    fn drop(&mut self) {
        self.persist();
    }
}

fn decode_record(value: serde_json::Value) -> CoreResult<CacheRecord> {
    serde_json::from_value(value).map_err(|e| CoreError::CacheCorrupt(e.to_string()))
}

impl ListingCache for JsonFileCache {
    fn read(&self, path: &Path) -> Option<Arc<CacheRecord>> {
        self.inner.memory.read(path)
    }

    fn write(&self, path: &Path, record: CacheRecord) {
        self.inner.memory.write(path, record);
        self.changed();
    }

    fn invalidate(&self, path: &Path) {
        self.inner.memory.invalidate(path);
        self.changed();
    }

    fn evict(&self, path: &Path, gone: &[PathBuf]) {
        self.inner.memory.evict(path, gone);
        self.changed();
    }

    fn cap(&self) -> usize {
        self.inner.memory.cap()
    }

    fn flush(&self) {
        self.inner.persist();
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::record;
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn survives_reopen() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("nested").join("listing.json");

        let cache = JsonFileCache::open(&file, 32);
        cache.write(Path::new("/a"), record("/a", 4));
        drop(cache);

        let reopened = JsonFileCache::open(&file, 32);
        let rec = reopened.read(Path::new("/a")).unwrap();
        assert_eq!(rec.entries.len(), 4);
        assert_eq!(rec.folder.item_count, 4);
    }

    #[test]
    fn corrupt_file_is_a_miss() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("listing.json");
        std::fs::write(&file, "{ not json").unwrap();

        let cache = JsonFileCache::open(&file, 32);
        assert!(cache.read(Path::new("/a")).is_none());
    }

    #[test]
    fn corrupt_record_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("listing.json");
        let good = serde_json::to_value(record("/good", 2)).unwrap();
        let json = serde_json::json!({ "/good": good, "/bad": { "path": 7 } });
        std::fs::write(&file, json.to_string()).unwrap();

        let cache = JsonFileCache::open(&file, 32);
        assert!(cache.read(Path::new("/good")).is_some());
        assert!(cache.read(Path::new("/bad")).is_none());
    }

    #[test]
    fn invalidate_is_persisted() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("listing.json");
        let cache = JsonFileCache::open(&file, 32);
        cache.write(Path::new("/a"), record("/a", 1));
        cache.invalidate(Path::new("/a"));

        let reopened = JsonFileCache::open(&file, 32);
        assert!(reopened.read(Path::new("/a")).is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn burst_of_writes_is_saved_once_after_quiet_period() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("listing.json");
        let cache = JsonFileCache::open_with(&file, MemoryCache::new(32), Duration::from_millis(150));

        for i in 0..5 {
            let dir = format!("/d{i}");
            cache.write(Path::new(&dir), record(&dir, 2));
        }
        assert!(!file.exists());

        tokio::time::sleep(Duration::from_millis(800)).await;
        let reopened = JsonFileCache::open(&file, 32);
        assert_eq!(reopened.len(), 5);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn flush_writes_pending_changes() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("listing.json");
        let cache = JsonFileCache::open_with(&file, MemoryCache::new(32), Duration::from_secs(60));
        cache.write(Path::new("/a"), record("/a", 3));
        assert!(!file.exists());

        cache.flush();
        let reopened = JsonFileCache::open(&file, 32);
        assert_eq!(reopened.read(Path::new("/a")).unwrap().entries.len(), 3);
    }

    #[test]
    fn folder_bound_applies_to_file_cache() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("listing.json");
        let cache = JsonFileCache::open_with(&file, MemoryCache::new(32).with_capacity(2), DEFAULT_SAVE_DELAY);
        let mut a = record("/a", 1);
        a.written_at -= Duration::from_secs(30);
        cache.write(Path::new("/a"), a);
        cache.write(Path::new("/b"), record("/b", 1));
        cache.write(Path::new("/c"), record("/c", 1));
        assert_eq!(cache.len(), 2);
        assert!(cache.read(Path::new("/a")).is_none());
    }
}
