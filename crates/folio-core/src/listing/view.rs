//! A single folder view: the observable listing plus the machinery that
//! keeps it current.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::loader::{self, Loaded};
use super::pipeline::{self, PipelineHandle};
use super::{arrange, Generation, LoadOutcome, Shared};
use crate::cache::{CacheRecord, FolderInfo};
use crate::collection::BulkCollection;
use crate::config::{Config, SettingsChange};
use crate::context::ListingContext;
use crate::event::{Event, LoadStatus};
use crate::fs::entry::{Entry, EntryKind, ProviderTag};
use crate::nav::group::EntryGroup;
use crate::source::{EnumerationSource, FastWalk};
use crate::watch::{ChangeWatcher, WatchFilter, WatchState};

/// Watcher and pipeline attached to the committed generation.
struct LiveUpdates {
    watcher: ChangeWatcher,
    pipeline: PipelineHandle,
}

/// Shows one folder at a time.
///
/// At most one load runs at once. Starting a new load cancels the one in
/// flight; the superseded load reports [`LoadOutcome::Cancelled`] and the
/// collection rolls back to the last committed [`Generation`].
pub struct DirectoryView {
    shared: Arc<Shared>,
    permit: Semaphore,
    current_token: Mutex<CancellationToken>,
    next_id: AtomicU64,
    live: Mutex<Option<LiveUpdates>>,
    settings_task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for DirectoryView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryView")
            .field("path", &self.current_path())
            .field("loading", &self.is_loading())
            .finish_non_exhaustive()
    }
}

impl DirectoryView {
    pub fn new(ctx: Arc<ListingContext>, events: UnboundedSender<Event>) -> Arc<Self> {
        Arc::new(Self {
            shared: Arc::new(Shared::new(ctx, events)),
            permit: Semaphore::new(1),
            current_token: Mutex::new(CancellationToken::new()),
            next_id: AtomicU64::new(1),
            live: Mutex::new(None),
            settings_task: Mutex::new(None),
        })
    }

    /// Reacts to settings changes until the view is dropped: ordering
    /// changes re-sort in place, visibility changes reload the folder.
    pub fn follow_settings(self: &Arc<Self>) {
        let mut rx = self.shared.ctx.settings().subscribe();
        let weak: Weak<Self> = Arc::downgrade(self);
        let task = tokio::spawn(async move {
            let mut previous = rx.borrow_and_update().clone();
            while rx.changed().await.is_ok() {
                let next = rx.borrow_and_update().clone();
                let change = SettingsChange::between(&previous, &next);
                previous = next;
                let Some(view) = weak.upgrade() else { break };
                match change {
                    SettingsChange::None => {}
                    SettingsChange::Reorder => view.reorder(),
                    SettingsChange::Reload => {
                        let outcome = view.refresh().await;
                        debug!(?outcome, "reloaded after settings change");
                    }
                }
            }
        });
        let mut slot = self.settings_task.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(old) = slot.replace(task) {
            old.abort();
        }
    }

    pub fn collection(&self) -> &Arc<BulkCollection<Entry>> {
        &self.shared.collection
    }

    /// The last committed listing.
    pub fn generation(&self) -> Generation {
        self.shared.state().generation.clone()
    }

    pub fn current_path(&self) -> Option<PathBuf> {
        let state = self.shared.state();
        (state.generation.id != 0).then(|| state.generation.path.clone())
    }

    pub fn groups(&self) -> Vec<EntryGroup> {
        self.shared.state().groups.clone()
    }

    pub fn folder_info(&self) -> FolderInfo {
        self.shared.state().folder.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.shared.state().loading
    }

    /// State of the watcher on the committed folder, if any.
    pub fn watcher_state(&self) -> Option<WatchState> {
        self.live
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|live| live.watcher.state())
    }

    /// Loads `path`, superseding any load in flight.
    pub async fn load_directory(&self, path: impl AsRef<Path>, use_cache: bool) -> LoadOutcome {
        self.load_directory_with(path, use_cache, CancellationToken::new())
            .await
    }

    /// Like [`load_directory`](Self::load_directory), with a caller-owned
    /// cancellation token.
    pub async fn load_directory_with(
        &self,
        path: impl AsRef<Path>,
        use_cache: bool,
        token: CancellationToken,
    ) -> LoadOutcome {
        let path = path.as_ref();
        {
            let mut current = self.current_token.lock().unwrap_or_else(|e| e.into_inner());
            current.cancel();
            *current = token.clone();
        }

        let _permit = tokio::select! {
            biased;
            _ = token.cancelled() => return LoadOutcome::Cancelled,
            permit = self.permit.acquire() => match permit {
                Ok(permit) => permit,
                Err(_) => return LoadOutcome::Cancelled,
            },
        };
        if token.is_cancelled() {
            return LoadOutcome::Cancelled;
        }

        self.shared.state().loading = true;
        self.shared.emit(Event::LoadStatus {
            path: path.to_path_buf(),
            status: LoadStatus::Starting,
        });
        info!(path = %path.display(), use_cache, "loading folder");

        match loader::load(&self.shared, path, use_cache, &token).await {
            Ok(loaded) => {
                self.commit(path, loaded, &token).await;
                LoadOutcome::Complete
            }
            Err(LoadOutcome::Cancelled) => {
                debug!(path = %path.display(), "load cancelled");
                self.shared.ctx.cache().invalidate(path);
                self.roll_back();
                LoadOutcome::Cancelled
            }
            Err(outcome) => {
                warn!(path = %path.display(), ?outcome, "load failed");
                self.roll_back();
                self.shared.emit(Event::LoadFailed {
                    path: path.to_path_buf(),
                    outcome,
                });
                outcome
            }
        }
    }

    /// Enumerates the current folder again without the cache.
    pub async fn refresh(&self) -> LoadOutcome {
        match self.current_path() {
            Some(path) => self.load_directory(path, false).await,
            None => LoadOutcome::Complete,
        }
    }

    /// Re-sorts and regroups the committed listing with the current
    /// settings. Ignored while a load owns the collection.
    pub fn reorder(&self) {
        let config = self.shared.ctx.settings().current();
        let mut state = self.shared.state();
        if state.loading || state.generation.id == 0 {
            return;
        }
        let arranged = arrange(&state.generation.entries, &config);
        state.generation.entries = arranged.entries;
        state.groups = arranged.groups;
        self.shared.collection.publish(&state.generation.entries);
        let path = state.generation.path.clone();
        let count = state.generation.entries.len();
        drop(state);
        self.shared.emit(Event::ItemsLoaded {
            path,
            count,
            from_cache: false,
        });
    }

    /// Cancels any load and stops live updates.
    pub async fn close(&self) {
        self.current_token
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .cancel();
        if let Some(task) = self
            .settings_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            task.abort();
        }
        self.stop_live().await;
    }

    async fn stop_live(&self) {
        let live = self.live.lock().unwrap_or_else(|e| e.into_inner()).take();
        let Some(LiveUpdates {
            mut watcher,
            pipeline,
        }) = live
        else {
            return;
        };
        // Joining the watcher thread blocks.
        if let Err(e) = tokio::task::spawn_blocking(move || watcher.close()).await {
            warn!(error = %e, "failed to close watcher");
        }
        pipeline.stop().await;
    }

    /// Puts the committed listing back after a load that produced none.
    fn roll_back(&self) {
        let mut state = self.shared.state();
        state.loading = false;
        self.shared.collection.publish(&state.generation.entries);
    }

    async fn commit(&self, path: &Path, loaded: Loaded, token: &CancellationToken) {
        self.stop_live().await;

        let config = self.shared.ctx.settings().current();
        let Loaded {
            entries,
            groups,
            folder,
            provider,
            draft,
        } = loaded;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        {
            let mut state = self.shared.state();
            state.generation = Generation::new(id, path.to_path_buf(), entries.clone());
            state.groups = groups;
            state.folder = folder.clone();
            state.loading = false;
        }

        if config.cache.enabled {
            self.reconcile_cache(path, &entries, &folder, &draft);
        }

        if config.watch.enabled && provider == ProviderTag::Local {
            self.start_live(path, id, &folder);
        }

        self.shared.emit(Event::DirectoryInfoUpdated {
            path: path.to_path_buf(),
            info: folder,
        });
        self.shared.emit(Event::LoadStatus {
            path: path.to_path_buf(),
            status: LoadStatus::Complete,
        });

        if config.listing.select_readme {
            if let Some(readme) = find_readme(&entries) {
                self.shared.emit(Event::SelectionRequested {
                    path: path.to_path_buf(),
                    item: readme.path().to_path_buf(),
                });
            }
        }

        if config.cache.enabled && config.cache.preemptive && provider == ProviderTag::Local {
            self.warm_subfolders(&entries, &config, token.child_token());
        }
    }

    /// Replaces the folder's record; entries that were only in the cached
    /// draft are dropped by the overwrite.
    fn reconcile_cache(&self, path: &Path, entries: &[Entry], folder: &FolderInfo, draft: &[PathBuf]) {
        let stale = draft
            .iter()
            .filter(|p| !entries.iter().any(|e| e.path() == p.as_path()))
            .count();
        if stale > 0 {
            debug!(path = %path.display(), count = stale, "dropping stale cached entries");
        }
        self.shared.ctx.cache().write(
            path,
            CacheRecord::new(path.to_path_buf(), entries.to_vec(), folder.clone()),
        );
    }

    fn start_live(&self, path: &Path, id: u64, folder: &FolderInfo) {
        let (tx, rx) = unbounded_channel();
        match ChangeWatcher::watch(path, WatchFilter::for_folder(folder.sync_status), tx) {
            Ok(watcher) => {
                let pipeline = pipeline::spawn(Arc::clone(&self.shared), id, rx);
                *self.live.lock().unwrap_or_else(|e| e.into_inner()) =
                    Some(LiveUpdates { watcher, pipeline });
            }
            Err(e) => warn!(path = %path.display(), error = %e, "live updates unavailable"),
        }
    }

    /// Fills the cache for the first few subfolders that have no record yet.
    fn warm_subfolders(&self, entries: &[Entry], config: &Config, token: CancellationToken) {
        let cache = self.shared.ctx.cache();
        let targets: Vec<PathBuf> = entries
            .iter()
            .filter(|e| e.kind() == EntryKind::Folder)
            .filter(|e| cache.read(e.path()).is_none())
            .take(config.cache.preemptive_folder_limit)
            .map(|e| e.path().to_path_buf())
            .collect();
        if targets.is_empty() {
            return;
        }

        let visibility = config.visibility();
        let sort = config.sort_options();
        tokio::task::spawn_blocking(move || {
            let walk = FastWalk;
            for dir in targets {
                if token.is_cancelled() {
                    return;
                }
                let iter = match walk.enumerate(&dir, &token) {
                    Ok(iter) => iter,
                    Err(e) => {
                        debug!(path = %dir.display(), error = %e, "skipping subfolder");
                        continue;
                    }
                };
                let entries: Vec<Entry> = iter
                    .filter_map(Result::ok)
                    .filter(|e| visibility.is_visible(e))
                    .collect();
                if token.is_cancelled() {
                    return;
                }
                let entries = crate::nav::sort::sort_entries(&entries, sort);
                let folder = FolderInfo {
                    display_name: super::display_name(&dir),
                    sync_status: None,
                    item_count: entries.len(),
                };
                cache.write(&dir, CacheRecord::new(dir.clone(), entries, folder));
            }
        });
    }
}

impl Drop for DirectoryView {
    fn drop(&mut self) {
        self.current_token
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .cancel();
        if let Some(task) = self
            .settings_task
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            task.abort();
        }
        if let Some(live) = self.live.get_mut().unwrap_or_else(|e| e.into_inner()).take() {
            live.pipeline.abort();
            // The watcher closes itself on drop.
        }
    }
}

fn find_readme(entries: &[Entry]) -> Option<&Entry> {
    entries
        .iter()
        .find(|e| e.kind() == EntryKind::File && e.name().to_lowercase().contains("readme"))
}
