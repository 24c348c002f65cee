//! Shared services for every open view.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::info;

use crate::cache::{JsonFileCache, ListingCache, MemoryCache};
use crate::config::settings::CacheConfig;
use crate::config::SettingsHandle;
use crate::fs::entry::ProviderTag;
use crate::source::{
    NoVolumeLock, ProviderChannel, SourceRegistry, VirtualSource, VolumeLockProbe,
};

/// Everything a [`crate::listing::DirectoryView`] needs besides its own
/// state: the listing cache, the enumeration sources, the lock probe and the
/// live settings.
///
/// Built once at startup and shared by `Arc`.
pub struct ListingContext {
    cache: Mutex<CacheSlot>,
    sources: SourceRegistry,
    lock_probe: Arc<dyn VolumeLockProbe>,
    settings: SettingsHandle,
}

impl std::fmt::Debug for ListingContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListingContext")
            .field(
                "cache_cap",
                &self.cache.lock().unwrap_or_else(|e| e.into_inner()).cache.cap(),
            )
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl ListingContext {
    /// Creates a context whose cache follows the `[cache]` settings: a JSON
    /// file cache when `cache.file` is set, an in-memory cache otherwise.
    ///
    /// When the cap, folder bound, file or save delay change at runtime the
    /// cache is rebuilt on next use; the old one is flushed first so a file
    /// cache carries its records over.
    pub fn new(settings: SettingsHandle) -> Self {
        let layout = CacheLayout::of(&settings.current().cache);
        Self {
            cache: Mutex::new(CacheSlot::build(layout)),
            sources: SourceRegistry::new(),
            lock_probe: Arc::new(NoVolumeLock),
            settings,
        }
    }

    /// Uses `cache` as is; it no longer follows the `[cache]` settings.
    pub fn with_cache(self, cache: Arc<dyn ListingCache>) -> Self {
        Self {
            cache: Mutex::new(CacheSlot {
                cache,
                layout: None,
            }),
            ..self
        }
    }

    pub fn with_sources(self, sources: SourceRegistry) -> Self {
        Self { sources, ..self }
    }

    pub fn with_lock_probe(self, lock_probe: Arc<dyn VolumeLockProbe>) -> Self {
        Self { lock_probe, ..self }
    }

    /// Registers a provider process for paths classified as `tag`, using the
    /// configured provider timeout.
    pub fn with_provider(self, tag: ProviderTag, channel: Arc<dyn ProviderChannel>) -> Self {
        let timeout = self.settings.current().listing.provider_timeout();
        let source = Arc::new(VirtualSource::new(tag.clone(), channel, timeout));
        Self {
            sources: self.sources.with_provider(tag, source),
            ..self
        }
    }

    pub fn cache(&self) -> Arc<dyn ListingCache> {
        let mut slot = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        if slot.layout.is_some() {
            let wanted = CacheLayout::of(&self.settings.current().cache);
            if slot.layout.as_ref() != Some(&wanted) {
                info!(
                    cap = wanted.cap,
                    max_folders = wanted.max_folders,
                    "cache settings changed, rebuilding listing cache"
                );
                slot.cache.flush();
                *slot = CacheSlot::build(wanted);
            }
        }
        Arc::clone(&slot.cache)
    }

    pub fn sources(&self) -> &SourceRegistry {
        &self.sources
    }

    pub fn lock_probe(&self) -> &Arc<dyn VolumeLockProbe> {
        &self.lock_probe
    }

    pub fn settings(&self) -> &SettingsHandle {
        &self.settings
    }
}

/// The cache settings a built cache depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CacheLayout {
    cap: usize,
    max_folders: usize,
    file: Option<PathBuf>,
    save_delay: Duration,
}

impl CacheLayout {
    fn of(config: &CacheConfig) -> Self {
        Self {
            cap: config.cap_per_folder,
            max_folders: config.max_folders,
            file: config.file.clone(),
            save_delay: config.save_delay(),
        }
    }
}

struct CacheSlot {
    cache: Arc<dyn ListingCache>,
    /// `None` for a cache supplied through [`ListingContext::with_cache`].
    layout: Option<CacheLayout>,
}

impl CacheSlot {
    fn build(layout: CacheLayout) -> Self {
        let memory = MemoryCache::new(layout.cap).with_capacity(layout.max_folders);
        let cache: Arc<dyn ListingCache> = match &layout.file {
            Some(file) => Arc::new(JsonFileCache::open_with(file, memory, layout.save_delay)),
            None => Arc::new(memory),
        };
        Self {
            cache,
            layout: Some(layout),
        }
    }
}
