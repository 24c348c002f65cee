//! Recent-listing cache used to paint a folder before enumeration finishes.
//!
//! A [`CacheRecord`] is a hint, never authoritative: it holds at most `cap`
//! entries and is replaced wholesale on every write. Records are shared as
//! immutable `Arc`s so readers never observe a half-written record.

mod file;
mod memory;

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::fs::entry::{Entry, SyncStatus};

pub use file::JsonFileCache;
pub use memory::MemoryCache;

/// Default number of entries kept per folder.
pub const DEFAULT_CAP: usize = 32;

/// Folder-level facts stored next to the cached entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderInfo {
    pub display_name: String,
    pub sync_status: Option<SyncStatus>,
    /// Number of visible items at the time of the write (not capped).
    pub item_count: usize,
}

/// A capped snapshot of one folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub path: PathBuf,
    pub entries: Vec<Entry>,
    pub folder: FolderInfo,
    pub written_at: SystemTime,
}

impl CacheRecord {
    pub fn new(path: PathBuf, entries: Vec<Entry>, folder: FolderInfo) -> Self {
        Self {
            path,
            entries,
            folder,
            written_at: SystemTime::now(),
        }
    }

    /// Returns a copy limited to the first `cap` entries.
    pub fn truncated(self, cap: usize) -> Self {
        let mut entries = self.entries;
        entries.truncate(cap);
        Self { entries, ..self }
    }

    /// Returns `true` when the record is young enough to be shown as a first
    /// draft. A zero `max_age` means any age is accepted.
    pub fn is_fresh(&self, max_age: Duration, now: SystemTime) -> bool {
        if max_age.is_zero() {
            return true;
        }
        match now.duration_since(self.written_at) {
            Ok(age) => age <= max_age,
            // Written "in the future" (clock moved back); treat as fresh.
            Err(_) => true,
        }
    }
}

/// Storage for [`CacheRecord`]s, keyed by [`normalize_key`].
///
/// Implementations must tolerate concurrent readers and writers.
pub trait ListingCache: Send + Sync {
    fn read(&self, path: &Path) -> Option<Arc<CacheRecord>>;

    /// Stores `record` for `path`, truncated to [`ListingCache::cap`].
    fn write(&self, path: &Path, record: CacheRecord);

    /// Drops the record for `path`.
    fn invalidate(&self, path: &Path);

    /// Removes the given entry paths from the record for `path`, if any.
    fn evict(&self, path: &Path, gone: &[PathBuf]);

    /// Maximum entries kept per folder.
    fn cap(&self) -> usize;

    /// Writes pending changes to backing storage. In-memory caches have
    /// nothing to do.
    fn flush(&self) {}
}

/// Normalizes a folder path into a cache key.
///
/// Trailing separators are stripped (except for the root), `.` components
/// are collapsed, and on Windows the key is lower-cased.
pub fn normalize_key(path: &Path) -> String {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            other => normalized.push(other.as_os_str()),
        }
    }
    if normalized.as_os_str().is_empty() {
        normalized.push(".");
    }
    let key = normalized.to_string_lossy().into_owned();
    if cfg!(windows) {
        key.to_lowercase()
    } else {
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::entry::EntryKind;

    pub(super) fn record(dir: &str, count: usize) -> CacheRecord {
        let entries = (0..count)
            .map(|i| Entry::new(PathBuf::from(dir).join(format!("f{i}")), EntryKind::File))
            .collect();
        CacheRecord::new(
            PathBuf::from(dir),
            entries,
            FolderInfo {
                display_name: "dir".to_string(),
                sync_status: None,
                item_count: count,
            },
        )
    }

    #[test]
    fn truncated_respects_cap() {
        let rec = record("/a", 40).truncated(DEFAULT_CAP);
        assert_eq!(rec.entries.len(), 32);
        assert_eq!(rec.folder.item_count, 40);
    }

    #[cfg(unix)]
    #[test]
    fn normalize_strips_trailing_separator_and_dots() {
        assert_eq!(normalize_key(Path::new("/home/user/")), "/home/user");
        assert_eq!(normalize_key(Path::new("/home/./user")), "/home/user");
        assert_eq!(normalize_key(Path::new("/")), "/");
    }

    #[test]
    fn freshness_window() {
        let rec = record("/a", 1);
        let later = rec.written_at + Duration::from_secs(120);
        assert!(rec.is_fresh(Duration::ZERO, later));
        assert!(rec.is_fresh(Duration::from_secs(300), later));
        assert!(!rec.is_fresh(Duration::from_secs(60), later));
    }
}
