use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use super::{normalize_key, CacheRecord, ListingCache, DEFAULT_CAP};

/// In-process [`ListingCache`].
///
/// Records live behind a `RwLock<HashMap>`; every mutation builds a new
/// record and swaps the `Arc`, so readers holding an old one are unaffected.
#[derive(Debug)]
pub struct MemoryCache {
    records: RwLock<HashMap<String, Arc<CacheRecord>>>,
    cap: usize,
    max_folders: Option<usize>,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAP)
    }
}

impl MemoryCache {
    pub fn new(cap: usize) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            cap,
            max_folders: None,
        }
    }

    /// Bounds the number of folders; the oldest-written one is dropped first.
    pub fn with_capacity(self, max_folders: usize) -> Self {
        Self {
            max_folders: Some(max_folders),
            ..self
        }
    }

    /// Number of folders currently cached.
    pub fn len(&self) -> usize {
        self.records.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clones the current map; used for persistence.
    pub(super) fn snapshot(&self) -> HashMap<String, Arc<CacheRecord>> {
        self.records.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Inserts an already-normalized record without touching `written_at`.
    pub(super) fn restore(&self, key: String, record: CacheRecord) {
        let record = record.truncated(self.cap);
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        records.insert(key, Arc::new(record));
    }
}

impl ListingCache for MemoryCache {
    fn read(&self, path: &Path) -> Option<Arc<CacheRecord>> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        records.get(&normalize_key(path)).cloned()
    }

    fn write(&self, path: &Path, record: CacheRecord) {
        let key = normalize_key(path);
        let record = Arc::new(record.truncated(self.cap));
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        records.insert(key.clone(), record);

        if let Some(max) = self.max_folders {
            while records.len() > max {
                let oldest = records
                    .iter()
                    .filter(|(k, _)| **k != key)
                    .min_by_key(|(_, r)| r.written_at)
                    .map(|(k, _)| k.clone());
                match oldest {
                    Some(k) => {
                        records.remove(&k);
                    }
                    None => break,
                }
            }
        }
    }

    fn invalidate(&self, path: &Path) {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        records.remove(&normalize_key(path));
    }

    fn evict(&self, path: &Path, gone: &[PathBuf]) {
        if gone.is_empty() {
            return;
        }
        let key = normalize_key(path);
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        let Some(current) = records.get(&key) else {
            return;
        };
        let entries = current
            .entries
            .iter()
            .filter(|e| !gone.iter().any(|g| g == e.path()))
            .cloned()
            .collect();
        let replaced = CacheRecord {
            entries,
            ..CacheRecord::clone(current)
        };
        records.insert(key, Arc::new(replaced));
    }

    fn cap(&self) -> usize {
        self.cap
    }
}
