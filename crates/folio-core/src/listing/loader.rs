//! One enumeration pass over a folder.
//!
//! The pass reads the cache first (published as a draft), then streams the
//! chosen source in batches into the collection. The caller decides what to
//! do with the result: commit it as a new generation or roll back.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{arrange, display_name, LoadOutcome, Shared};
use crate::cache::FolderInfo;
use crate::config::Config;
use crate::error::CoreError;
use crate::event::{Event, LoadStatus};
use crate::fs::entry::{Entry, ProviderTag};
use crate::fs::ops::probe_directory;
use crate::nav::filter::Visibility;
use crate::nav::group::EntryGroup;
use crate::source::{classify_path, Selection};

/// Result of a finished pass.
pub(crate) struct Loaded {
    pub(crate) entries: Vec<Entry>,
    pub(crate) groups: Vec<EntryGroup>,
    pub(crate) folder: FolderInfo,
    pub(crate) provider: ProviderTag,
    /// Paths shown in the cached draft, for reconciliation.
    pub(crate) draft: Vec<PathBuf>,
}

/// Runs one pass over `path`.
///
/// Returns `Err` with the outcome to report when the pass produced no
/// listing (including cancellation).
pub(crate) async fn load(
    shared: &Arc<Shared>,
    path: &Path,
    use_cache: bool,
    token: &CancellationToken,
) -> Result<Loaded, LoadOutcome> {
    let config = shared.ctx.settings().current();
    let provider = classify_path(path);

    if provider == ProviderTag::Local {
        check_lock(shared, path).await?;
        let probe_path = path.to_path_buf();
        let probed = tokio::task::spawn_blocking(move || probe_directory(&probe_path))
            .await
            .map_err(|_| LoadOutcome::Cancelled)?;
        if let Err(e) = probed {
            return Err(outcome_for(&e, path));
        }
    }
    if token.is_cancelled() {
        return Err(LoadOutcome::Cancelled);
    }

    let draft = if use_cache && config.cache.enabled {
        publish_draft(shared, path, &config)
    } else {
        Vec::new()
    };

    let selection = shared
        .ctx
        .sources()
        .select(path, &config.listing.rich_walk_prefixes);
    let entries = match selection {
        Some(selection) => stream(shared, path, selection, &config, token).await?,
        None => {
            warn!(path = %path.display(), provider = ?provider, "no provider registered, showing empty folder");
            Vec::new()
        }
    };

    if token.is_cancelled() {
        return Err(LoadOutcome::Cancelled);
    }

    let arranged = arrange(&entries, &config);
    shared.collection.publish(&arranged.entries);
    shared.emit(Event::ItemsLoaded {
        path: path.to_path_buf(),
        count: arranged.entries.len(),
        from_cache: false,
    });

    let folder = FolderInfo {
        display_name: display_name(path),
        sync_status: None,
        item_count: arranged.entries.len(),
    };
    info!(path = %path.display(), count = arranged.entries.len(), "folder loaded");

    Ok(Loaded {
        entries: arranged.entries,
        groups: arranged.groups,
        folder,
        provider,
        draft,
    })
}

async fn check_lock(shared: &Shared, path: &Path) -> Result<(), LoadOutcome> {
    let probe = shared.ctx.lock_probe();
    if !probe.is_locked(path) {
        return Ok(());
    }
    info!(path = %path.display(), "volume locked, requesting unlock");
    probe.request_unlock(path).await;
    if probe.is_locked(path) {
        Err(LoadOutcome::Locked)
    } else {
        Ok(())
    }
}

/// Maps a failure to open a folder to the outcome shown to the user.
pub(crate) fn outcome_for(err: &CoreError, path: &Path) -> LoadOutcome {
    match err {
        CoreError::NotFound(_) => LoadOutcome::NotFound,
        CoreError::NotADirectory(_) => LoadOutcome::NotADirectory,
        CoreError::PermissionDenied(_) => LoadOutcome::Unauthorized,
        CoreError::Locked(_) => LoadOutcome::Locked,
        CoreError::Cancelled => LoadOutcome::Cancelled,
        other => {
            warn!(path = %path.display(), error = %other, "cannot open folder");
            LoadOutcome::Unauthorized
        }
    }
}

/// Publishes the cached record for `path`, if usable, and returns the paths
/// it showed.
fn publish_draft(shared: &Shared, path: &Path, config: &Config) -> Vec<PathBuf> {
    let Some(record) = shared.ctx.cache().read(path) else {
        return Vec::new();
    };
    if record.entries.is_empty()
        || !record.is_fresh(config.cache.draft_max_age(), std::time::SystemTime::now())
    {
        return Vec::new();
    }

    let visible = config.visibility().filter(&record.entries);
    let arranged = arrange(&visible, config);
    debug!(path = %path.display(), count = arranged.entries.len(), "publishing cached draft");
    shared.collection.publish(&arranged.entries);
    shared.emit(Event::ItemsLoaded {
        path: path.to_path_buf(),
        count: arranged.entries.len(),
        from_cache: true,
    });
    shared.emit(Event::DirectoryInfoUpdated {
        path: path.to_path_buf(),
        info: record.folder.clone(),
    });
    record.entries.iter().map(|e| e.path().to_path_buf()).collect()
}

/// Runs the source on a blocking thread and folds its batches into the
/// collection as they arrive.
async fn stream(
    shared: &Shared,
    path: &Path,
    selection: Selection,
    config: &Config,
    token: &CancellationToken,
) -> Result<Vec<Entry>, LoadOutcome> {
    let (tx, mut rx) = unbounded_channel::<Vec<Entry>>();
    let batching = selection.source.supports_batching();
    let walk = Walk {
        path: path.to_path_buf(),
        visibility: config.visibility(),
        batch_size: config.listing.batch_size.max(1),
        interval: config.listing.batch_interval(),
        token: token.clone(),
    };
    let handle = tokio::task::spawn_blocking(move || walk.run(selection, tx));

    let mut entries: Vec<Entry> = Vec::new();
    let mut announced = false;
    while let Some(batch) = rx.recv().await {
        entries.extend(batch);
        if token.is_cancelled() {
            continue;
        }
        if batching {
            let arranged = arrange(&entries, config);
            shared.collection.publish(&arranged.entries);
            shared.emit(Event::ItemsLoaded {
                path: path.to_path_buf(),
                count: arranged.entries.len(),
                from_cache: false,
            });
            if !announced {
                announced = true;
                shared.emit(Event::LoadStatus {
                    path: path.to_path_buf(),
                    status: LoadStatus::InProgress,
                });
            }
        }
    }

    match handle.await {
        Ok(Ok(())) => Ok(entries),
        Ok(Err(e)) => Err(outcome_for(&e, path)),
        Err(join_err) => {
            warn!(path = %path.display(), error = %join_err, "enumeration task failed");
            Err(LoadOutcome::Cancelled)
        }
    }
}

/// The blocking half of [`stream`].
struct Walk {
    path: PathBuf,
    visibility: Visibility,
    batch_size: usize,
    interval: std::time::Duration,
    token: CancellationToken,
}

impl Walk {
    fn run(self, selection: Selection, tx: UnboundedSender<Vec<Entry>>) -> Result<(), CoreError> {
        let iter = match selection.source.enumerate(&self.path, &self.token) {
            Ok(iter) => iter,
            Err(e) if e.is_fast_walk_fallback() => match &selection.fallback {
                Some(fallback) => {
                    info!(path = %self.path.display(), error = %e, "fast walk refused, using rich walk");
                    fallback.enumerate(&self.path, &self.token)?
                }
                None => return Err(e),
            },
            Err(e) => return Err(e),
        };

        let mut pending = Vec::new();
        let mut count = 0usize;
        let mut last_flush = Instant::now();
        for item in iter {
            if self.token.is_cancelled() {
                return Err(CoreError::Cancelled);
            }
            match item {
                Ok(entry) if self.visibility.is_visible(&entry) => {
                    pending.push(entry);
                    count += 1;
                }
                Ok(_) => {}
                Err(e) => debug!(path = %self.path.display(), error = %e, "skipping entry"),
            }
            if !pending.is_empty()
                && (count == self.batch_size || last_flush.elapsed() >= self.interval)
            {
                if tx.send(std::mem::take(&mut pending)).is_err() {
                    return Err(CoreError::Cancelled);
                }
                last_flush = Instant::now();
            }
        }
        if self.token.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        if !pending.is_empty() {
            let _ = tx.send(pending);
        }
        Ok(())
    }
}
