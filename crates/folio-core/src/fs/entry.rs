//! Directory entry representation.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

/// What kind of filesystem object an [`Entry`] stands for.
///
/// The kind is fixed at construction; there is no setter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    File,
    Folder,
    /// A named data stream attached to a file (NTFS alternate data stream).
    AlternateStream,
    /// An item that has no direct filesystem counterpart (trash, network host).
    Synthetic,
}

/// Placeholder / sync state reported for cloud-backed folders.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncStatus {
    #[default]
    Unknown,
    NotSynced,
    Synced,
    Syncing,
    /// Cloud-only placeholder; content is not on disk.
    Offline,
    Excluded,
    Error,
}

impl SyncStatus {
    /// Returns `true` when the status says the folder is cloud-managed at all.
    pub fn is_sync_bearing(self) -> bool {
        !matches!(self, SyncStatus::Unknown | SyncStatus::NotSynced)
    }
}

/// Identifies which enumeration provider produced an entry, so that
/// provider-specific behaviour can be dispatched without subtyping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderTag {
    #[default]
    Local,
    Trash,
    Network,
    /// A remote protocol provider, keyed by URL scheme (`ftp`, `sftp`, ...).
    Remote(String),
    Archive,
}

/// A single entry in a directory listing.
///
/// Entries are built once by an enumeration source (or by the live update
/// pipeline) and only their mutable metadata is ever refreshed afterwards,
/// through [`Entry::refresh_from`]. Sizes are only kept for
/// [`EntryKind::File`].
///
/// # Examples
///
/// ```
/// use folio_core::{Entry, EntryKind};
///
/// let entry = Entry::new("/tmp/report.pdf".into(), EntryKind::File).with_size(Some(2048));
/// assert_eq!(entry.name(), "report.pdf");
/// assert_eq!(entry.size(), Some(2048));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    path: PathBuf,
    name: String,
    kind: EntryKind,
    size: Option<u64>,
    created: Option<SystemTime>,
    modified: Option<SystemTime>,
    deleted: Option<SystemTime>,
    is_hidden: bool,
    is_system: bool,
    is_symlink: bool,
    sync_status: Option<SyncStatus>,
    sort_index: Option<u32>,
    type_name: Option<String>,
    original_location: Option<PathBuf>,
    provider: ProviderTag,
}

impl Entry {
    /// Creates a bare entry for `path`. The display name is the NFC form of
    /// the last path component.
    pub fn new(path: PathBuf, kind: EntryKind) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().nfc().collect::<String>())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());

        Self {
            path,
            name,
            kind,
            size: None,
            created: None,
            modified: None,
            deleted: None,
            is_hidden: false,
            is_system: false,
            is_symlink: false,
            sync_status: None,
            sort_index: None,
            type_name: None,
            original_location: None,
            provider: ProviderTag::Local,
        }
    }

    /// Builds an entry from local filesystem metadata.
    ///
    /// Pass metadata from `symlink_metadata` to keep symlinks as links, or
    /// from `metadata` to describe their targets.
    pub fn from_metadata(path: PathBuf, metadata: &std::fs::Metadata) -> Self {
        let kind = if metadata.is_dir() {
            EntryKind::Folder
        } else {
            EntryKind::File
        };
        let (hidden_attr, system_attr) = platform_attributes(metadata);
        let entry = Self::new(path, kind)
            .with_size(Some(metadata.len()))
            .with_modified(metadata.modified().ok())
            .with_created(metadata.created().ok());

        Self {
            is_hidden: hidden_attr,
            is_system: system_attr,
            is_symlink: metadata.is_symlink(),
            ..entry
        }
    }

    pub fn with_name(self, name: impl Into<String>) -> Self {
        let name: String = name.into();
        Self {
            name: name.nfc().collect(),
            ..self
        }
    }

    /// Sets the size. Ignored for anything that is not a file.
    pub fn with_size(self, size: Option<u64>) -> Self {
        let size = if self.kind == EntryKind::File {
            size
        } else {
            None
        };
        Self { size, ..self }
    }

    pub fn with_created(self, created: Option<SystemTime>) -> Self {
        Self { created, ..self }
    }

    pub fn with_modified(self, modified: Option<SystemTime>) -> Self {
        Self { modified, ..self }
    }

    pub fn with_deleted(self, deleted: Option<SystemTime>) -> Self {
        Self { deleted, ..self }
    }

    pub fn with_hidden(self, is_hidden: bool) -> Self {
        Self { is_hidden, ..self }
    }

    pub fn with_system(self, is_system: bool) -> Self {
        Self { is_system, ..self }
    }

    pub fn with_sync_status(self, sync_status: Option<SyncStatus>) -> Self {
        Self {
            sync_status,
            ..self
        }
    }

    pub fn with_sort_index(self, sort_index: Option<u32>) -> Self {
        Self { sort_index, ..self }
    }

    pub fn with_type_name(self, type_name: Option<String>) -> Self {
        Self { type_name, ..self }
    }

    pub fn with_original_location(self, original_location: Option<PathBuf>) -> Self {
        Self {
            original_location,
            ..self
        }
    }

    pub fn with_provider(self, provider: ProviderTag) -> Self {
        Self { provider, ..self }
    }

    /// Copies the mutable metadata (timestamps, size, sync status) of
    /// `fresh` into `self`. Returns `true` if anything changed.
    ///
    /// Identity fields (path, name, kind, provider) are never touched.
    pub fn refresh_from(&mut self, fresh: &Entry) -> bool {
        let size = if self.kind == EntryKind::File {
            fresh.size
        } else {
            None
        };
        let sync_status = fresh.sync_status.or(self.sync_status);

        let changed = self.size != size
            || self.modified != fresh.modified
            || self.created != fresh.created
            || self.sync_status != sync_status;

        self.size = size;
        self.modified = fresh.modified;
        self.created = fresh.created;
        self.sync_status = sync_status;
        changed
    }

    /// Returns the full path of this entry.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    /// Returns `true` for [`EntryKind::Folder`] entries.
    pub fn is_folder(&self) -> bool {
        self.kind == EntryKind::Folder
    }

    /// Size in bytes. Always `None` unless this is a file.
    pub fn size(&self) -> Option<u64> {
        self.size
    }

    pub fn created(&self) -> Option<SystemTime> {
        self.created
    }

    pub fn modified(&self) -> Option<SystemTime> {
        self.modified
    }

    /// Time the item was moved to the trash, if it lives there.
    pub fn deleted(&self) -> Option<SystemTime> {
        self.deleted
    }

    /// Returns `true` if the entry carries the hidden attribute. Dot names
    /// are reported separately by [`Entry::is_dot_file`].
    pub fn is_hidden(&self) -> bool {
        self.is_hidden
    }

    pub fn is_system(&self) -> bool {
        self.is_system
    }

    /// Returns `true` if the name starts with `.`.
    pub fn is_dot_file(&self) -> bool {
        self.name.starts_with('.')
    }

    /// Returns `true` if this entry is a symbolic link.
    pub fn is_symlink(&self) -> bool {
        self.is_symlink
    }

    pub fn sync_status(&self) -> Option<SyncStatus> {
        self.sync_status
    }

    /// Explicit ordering/group override set by a provider.
    pub fn sort_index(&self) -> Option<u32> {
        self.sort_index
    }

    /// Human-readable type description (only filled by the rich walk).
    pub fn type_name(&self) -> Option<&str> {
        self.type_name.as_deref()
    }

    /// Where a trashed item used to live.
    pub fn original_location(&self) -> Option<&Path> {
        self.original_location.as_deref()
    }

    pub fn provider(&self) -> &ProviderTag {
        &self.provider
    }

    /// Lower-cased extension of a file name, empty for folders and
    /// extension-less names.
    pub fn extension_lower(&self) -> String {
        if self.kind == EntryKind::Folder {
            return String::new();
        }
        Path::new(&self.name)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default()
    }
}

#[cfg(windows)]
fn platform_attributes(metadata: &std::fs::Metadata) -> (bool, bool) {
    use std::os::windows::fs::MetadataExt;

    const FILE_ATTRIBUTE_HIDDEN: u32 = 0x2;
    const FILE_ATTRIBUTE_SYSTEM: u32 = 0x4;
    let attrs = metadata.file_attributes();
    (
        attrs & FILE_ATTRIBUTE_HIDDEN != 0,
        attrs & FILE_ATTRIBUTE_SYSTEM != 0,
    )
}

#[cfg(not(windows))]
fn platform_attributes(_metadata: &std::fs::Metadata) -> (bool, bool) {
    (false, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn entry_from_regular_file() {
        let tmp = TempDir::new().unwrap();
        let file_path = tmp.path().join("test.txt");
        fs::write(&file_path, "hello").unwrap();

        let metadata = fs::metadata(&file_path).unwrap();
        let entry = Entry::from_metadata(file_path.clone(), &metadata);

        assert_eq!(entry.name(), "test.txt");
        assert_eq!(entry.size(), Some(5));
        assert_eq!(entry.kind(), EntryKind::File);
        assert!(!entry.is_hidden());
        assert!(!entry.is_symlink());
        assert_eq!(entry.path(), file_path);
        assert!(entry.modified().is_some());
        assert_eq!(entry.provider(), &ProviderTag::Local);
    }

    #[test]
    fn entry_from_directory_has_no_size() {
        let tmp = TempDir::new().unwrap();
        let dir_path = tmp.path().join("subdir");
        fs::create_dir(&dir_path).unwrap();
        fs::write(dir_path.join("a.txt"), "data").unwrap();

        let metadata = fs::metadata(&dir_path).unwrap();
        let entry = Entry::from_metadata(dir_path, &metadata);

        assert_eq!(entry.name(), "subdir");
        assert!(entry.is_folder());
        assert_eq!(entry.size(), None);
    }

    #[test]
    fn dot_name_is_not_the_hidden_attribute() {
        let tmp = TempDir::new().unwrap();
        let file_path = tmp.path().join(".hidden");
        fs::write(&file_path, "secret").unwrap();

        let metadata = fs::metadata(&file_path).unwrap();
        let entry = Entry::from_metadata(file_path, &metadata);

        assert!(!entry.is_hidden());
        assert!(entry.is_dot_file());
        assert_eq!(entry.size(), Some(6));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_metadata_keeps_link() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("target.txt");
        fs::write(&target, "data").unwrap();
        let link = tmp.path().join("link.txt");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let metadata = fs::symlink_metadata(&link).unwrap();
        let entry = Entry::from_metadata(link, &metadata);

        assert!(entry.is_symlink());
        assert_eq!(entry.name(), "link.txt");
    }

    #[test]
    fn unicode_name_is_nfc() {
        // "가" written as decomposed jamo
        let decomposed = "\u{1100}\u{1161}.txt";
        let entry = Entry::new(PathBuf::from("/x").join(decomposed), EntryKind::File);
        assert_eq!(entry.name(), "가.txt");
    }

    #[test]
    fn size_ignored_for_non_files() {
        let folder = Entry::new("/a/docs".into(), EntryKind::Folder).with_size(Some(9999));
        assert_eq!(folder.size(), None);

        let synthetic = Entry::new("network://host".into(), EntryKind::Synthetic).with_size(Some(1));
        assert_eq!(synthetic.size(), None);
    }

    #[test]
    fn refresh_from_updates_mutable_fields_only() {
        let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(10);
        let t1 = SystemTime::UNIX_EPOCH + Duration::from_secs(20);
        let mut entry = Entry::new("/a/b.txt".into(), EntryKind::File)
            .with_size(Some(1))
            .with_modified(Some(t0));
        let fresh = Entry::new("/a/b.txt".into(), EntryKind::File)
            .with_name("ignored")
            .with_size(Some(2))
            .with_modified(Some(t1))
            .with_sync_status(Some(SyncStatus::Synced));

        assert!(entry.refresh_from(&fresh));
        assert_eq!(entry.size(), Some(2));
        assert_eq!(entry.modified(), Some(t1));
        assert_eq!(entry.sync_status(), Some(SyncStatus::Synced));
        assert_eq!(entry.name(), "b.txt");

        assert!(!entry.refresh_from(&fresh), "second refresh is a no-op");
    }

    #[test]
    fn refresh_keeps_sync_status_when_fresh_has_none() {
        let mut entry = Entry::new("/a/b.txt".into(), EntryKind::File)
            .with_sync_status(Some(SyncStatus::Offline));
        let fresh = Entry::new("/a/b.txt".into(), EntryKind::File);
        entry.refresh_from(&fresh);
        assert_eq!(entry.sync_status(), Some(SyncStatus::Offline));
    }

    #[test]
    fn extension_lower() {
        let file = Entry::new("/a/Photo.JPG".into(), EntryKind::File);
        assert_eq!(file.extension_lower(), "jpg");
        let folder = Entry::new("/a/v1.2".into(), EntryKind::Folder);
        assert_eq!(folder.extension_lower(), "");
    }

    #[test]
    fn sync_bearing_statuses() {
        assert!(!SyncStatus::Unknown.is_sync_bearing());
        assert!(!SyncStatus::NotSynced.is_sync_bearing());
        assert!(SyncStatus::Synced.is_sync_bearing());
        assert!(SyncStatus::Offline.is_sync_bearing());
    }

    #[test]
    fn serde_roundtrip_keeps_identity() {
        let entry = Entry::new("/r/x.bin".into(), EntryKind::File)
            .with_size(Some(3))
            .with_provider(ProviderTag::Remote("ftp".to_string()));
        let json = serde_json::to_string(&entry).unwrap();
        let back: Entry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);
    }
}
