//! Enumeration sources: the ways a folder's entries can be produced.
//!
//! Every source implements [`EnumerationSource`] and hands back a lazy
//! iterator, so the orchestrator can flush batches while the walk is still
//! running. [`SourceRegistry`] decides which source serves a given path.

mod fast;
mod provider;
mod rich;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::CoreResult;
use crate::fs::entry::{Entry, ProviderTag, SyncStatus};

pub use fast::FastWalk;
pub use provider::{
    ProviderChannel, ProviderItem, ProviderRequest, ProviderResponse, ProviderStatus,
    VirtualSource, ENUMERATE_MESSAGE, ITEMS_KEY, PATH_KEY,
};
pub use rich::RichWalk;

/// Lazy sequence of entries; per-item failures are yielded, not fatal.
pub type EntryIter = Box<dyn Iterator<Item = CoreResult<Entry>> + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    FastWalk,
    RichWalk,
    Virtual,
}

/// Something that can list the entries of a folder.
pub trait EnumerationSource: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Whether results trickle in and are worth flushing in batches.
    fn supports_batching(&self) -> bool {
        true
    }

    /// Opens `path` for enumeration.
    ///
    /// Failing to open the folder is an error; failures on individual
    /// entries are yielded by the iterator. The iterator stops early once
    /// `token` is cancelled.
    fn enumerate(&self, path: &Path, token: &CancellationToken) -> CoreResult<EntryIter>;
}

/// Per-item sync status lookup for cloud-backed folders.
pub trait SyncStatusProbe: Send + Sync {
    fn status(&self, path: &Path) -> Option<SyncStatus>;
}

/// Reports and unlocks encrypted volumes.
#[async_trait]
pub trait VolumeLockProbe: Send + Sync {
    fn is_locked(&self, path: &Path) -> bool;

    /// Asks the user (or the OS) to unlock the volume holding `path`.
    /// Returns once the request was handled, whatever its result.
    async fn request_unlock(&self, path: &Path);
}

/// A lock probe for systems without volume encryption.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoVolumeLock;

#[async_trait]
impl VolumeLockProbe for NoVolumeLock {
    fn is_locked(&self, _path: &Path) -> bool {
        false
    }

    async fn request_unlock(&self, _path: &Path) {}
}

const ARCHIVE_EXTENSIONS: &[&str] = &["zip", "7z", "rar", "tar", "gz"];

/// Classifies a path by its shape.
///
/// URL-like prefixes select remote and shell providers; a path with an
/// archive component is served by the archive provider. Everything else is
/// [`ProviderTag::Local`].
pub fn classify_path(path: &Path) -> ProviderTag {
    let text = path.to_string_lossy();
    let lower = text.to_lowercase();
    if lower.starts_with("trash://") {
        return ProviderTag::Trash;
    }
    if lower.starts_with("network://") {
        return ProviderTag::Network;
    }
    for scheme in ["ftp", "ftps", "sftp"] {
        if lower.starts_with(&format!("{scheme}://")) {
            return ProviderTag::Remote(scheme.to_string());
        }
    }
    let is_archive = path.components().any(|c| {
        let name = c.as_os_str().to_string_lossy().to_lowercase();
        ARCHIVE_EXTENSIONS
            .iter()
            .any(|ext| name.ends_with(&format!(".{ext}")))
    });
    if is_archive {
        ProviderTag::Archive
    } else {
        ProviderTag::Local
    }
}

/// The source picked for a path, plus the one to retry with.
#[derive(Clone)]
pub struct Selection {
    pub source: Arc<dyn EnumerationSource>,
    pub fallback: Option<Arc<dyn EnumerationSource>>,
    pub provider: ProviderTag,
}

impl std::fmt::Debug for Selection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Selection")
            .field("source", &self.source.kind())
            .field("fallback", &self.fallback.as_ref().map(|s| s.kind()))
            .field("provider", &self.provider)
            .finish()
    }
}

/// Maps path shapes to enumeration sources.
pub struct SourceRegistry {
    fast: Arc<dyn EnumerationSource>,
    rich: Arc<dyn EnumerationSource>,
    providers: HashMap<ProviderTag, Arc<dyn EnumerationSource>>,
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self {
            fast: Arc::new(FastWalk),
            rich: Arc::new(RichWalk::default()),
            providers: HashMap::new(),
        }
    }

    pub fn with_rich_walk(self, rich: Arc<dyn EnumerationSource>) -> Self {
        Self { rich, ..self }
    }

    /// Registers the source serving paths classified as `tag`.
    pub fn with_provider(mut self, tag: ProviderTag, source: Arc<dyn EnumerationSource>) -> Self {
        self.providers.insert(tag, source);
        self
    }

    /// Picks the source for `path`. Local paths under one of
    /// `rich_walk_prefixes` always use the rich walk. Returns `None` for a
    /// virtual path whose provider is not registered.
    pub fn select(&self, path: &Path, rich_walk_prefixes: &[PathBuf]) -> Option<Selection> {
        let provider = classify_path(path);
        if provider != ProviderTag::Local {
            return self.providers.get(&provider).map(|source| Selection {
                source: Arc::clone(source),
                fallback: None,
                provider,
            });
        }

        if rich_walk_prefixes.iter().any(|p| path.starts_with(p)) {
            return Some(Selection {
                source: Arc::clone(&self.rich),
                fallback: None,
                provider,
            });
        }

        Some(Selection {
            source: Arc::clone(&self.fast),
            fallback: Some(Arc::clone(&self.rich)),
            provider,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_shapes() {
        assert_eq!(classify_path(Path::new("trash://")), ProviderTag::Trash);
        assert_eq!(classify_path(Path::new("network://host")), ProviderTag::Network);
        assert_eq!(
            classify_path(Path::new("sftp://example.com/home")),
            ProviderTag::Remote("sftp".to_string())
        );
        assert_eq!(
            classify_path(Path::new("/home/u/backup.ZIP/inner")),
            ProviderTag::Archive
        );
        assert_eq!(classify_path(Path::new("/home/u/docs")), ProviderTag::Local);
    }

    #[test]
    fn local_path_uses_fast_walk_with_rich_fallback() {
        let registry = SourceRegistry::new();
        let selection = registry.select(Path::new("/tmp"), &[]).unwrap();
        assert_eq!(selection.source.kind(), SourceKind::FastWalk);
        assert_eq!(
            selection.fallback.map(|s| s.kind()),
            Some(SourceKind::RichWalk)
        );
    }

    #[test]
    fn rich_walk_prefix_forces_rich_walk() {
        let registry = SourceRegistry::new();
        let prefixes = [PathBuf::from("/mnt/cloud")];
        let selection = registry
            .select(Path::new("/mnt/cloud/photos"), &prefixes)
            .unwrap();
        assert_eq!(selection.source.kind(), SourceKind::RichWalk);
        assert!(selection.fallback.is_none());
    }

    #[test]
    fn unregistered_provider_selects_nothing() {
        let registry = SourceRegistry::new();
        assert!(registry.select(Path::new("trash://"), &[]).is_none());
    }

    #[test]
    fn registered_provider_is_selected() {
        let registry = SourceRegistry::new().with_provider(ProviderTag::Trash, Arc::new(FastWalk));
        let selection = registry.select(Path::new("trash://"), &[]).unwrap();
        assert_eq!(selection.provider, ProviderTag::Trash);
        assert!(selection.fallback.is_none());
    }
}
