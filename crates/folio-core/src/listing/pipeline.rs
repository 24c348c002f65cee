//! Applies watcher events to the committed listing.
//!
//! One task per watched folder collects [`PendingOp`]s. The first event
//! after a quiet spell opens a `wake_interval` window; everything that
//! arrives before the window closes is applied as one batch and published
//! once. Modified items left over from a batch reopen the window.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{arrange, Shared};
use crate::event::Event;
use crate::fs::entry::Entry;
use crate::fs::ops::read_entry;
use crate::nav::group::{flatten, patch, regroup, GroupChanges, GroupOption};
use crate::nav::sort::{compare_entries, SortOptions};
use crate::watch::{ChangeAction, PendingOp};

/// Handle to a running pipeline task.
#[derive(Debug)]
pub struct PipelineHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl PipelineHandle {
    /// Signals the task to stop without waiting for it.
    pub(crate) fn abort(&self) {
        self.token.cancel();
    }

    /// Cancels the task, drops queued events unprocessed, and waits for it.
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "pipeline task failed");
        }
    }
}

/// Modified paths waiting for a metadata refresh, without duplicates.
#[derive(Debug, Default)]
struct UpdateQueue {
    order: VecDeque<PathBuf>,
    queued: HashSet<PathBuf>,
}

impl UpdateQueue {
    fn push(&mut self, path: PathBuf) {
        if self.queued.insert(path.clone()) {
            self.order.push_back(path);
        }
    }

    fn forget(&mut self, path: &Path) {
        if self.queued.remove(path) {
            self.order.retain(|p| p != path);
        }
    }

    fn take(&mut self, max: usize) -> Vec<PathBuf> {
        let n = max.min(self.order.len());
        let batch: Vec<PathBuf> = self.order.drain(..n).collect();
        for p in &batch {
            self.queued.remove(p);
        }
        batch
    }

    fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Members of the watched generation, each with the entry it was placed
/// under.
///
/// Lets the pipeline skip paths it never listed and find the rest by binary
/// search when the listing is a single sorted run.
#[derive(Debug, Default)]
struct PathIndex {
    generation: u64,
    placed: HashMap<PathBuf, Entry>,
}

impl PathIndex {
    fn sync(&mut self, generation: u64, entries: &[Entry]) {
        if self.generation == generation {
            return;
        }
        self.generation = generation;
        self.placed = entries
            .iter()
            .map(|e| (e.path().to_path_buf(), e.clone()))
            .collect();
    }

    fn contains(&self, path: &Path) -> bool {
        self.placed.contains_key(path)
    }

    /// Position of `path` in `entries`. `sorted` is the order `entries` is
    /// kept in, if it is a single sorted run.
    fn locate(&self, entries: &[Entry], path: &Path, sorted: Option<SortOptions>) -> Option<usize> {
        let placed = self.placed.get(path)?;
        if let Some(sort) = sorted {
            if let Ok(i) = entries.binary_search_by(|e| compare_entries(e, placed, sort)) {
                if entries[i].path() == path {
                    return Some(i);
                }
            }
        }
        entries.iter().position(|e| e.path() == path)
    }

    fn insert(&mut self, entry: Entry) {
        self.placed.insert(entry.path().to_path_buf(), entry);
    }

    fn remove(&mut self, path: &Path) {
        self.placed.remove(path);
    }
}

/// Per-task bookkeeping carried between batches.
#[derive(Debug, Default)]
struct Tracker {
    updates: UpdateQueue,
    index: PathIndex,
}

/// Starts the pipeline for generation `generation` of the view.
pub(crate) fn spawn(
    shared: Arc<Shared>,
    generation: u64,
    mut rx: UnboundedReceiver<PendingOp>,
) -> PipelineHandle {
    let token = CancellationToken::new();
    let task_token = token.clone();
    let task = tokio::spawn(async move {
        let mut tracker = Tracker::default();
        let mut pending: Vec<PendingOp> = Vec::new();
        let mut window: Option<Instant> = None;
        loop {
            tokio::select! {
                biased;
                _ = task_token.cancelled() => break,
                _ = sleep_until(window.unwrap_or_else(Instant::now)), if window.is_some() => {}
                op = rx.recv() => match op {
                    Some(op) => pending.push(op),
                    None => break,
                },
            }
            while let Ok(op) = rx.try_recv() {
                pending.push(op);
            }
            if window.is_none() && !pending.is_empty() {
                window = Some(Instant::now() + wake_interval(&shared));
            }
            match window {
                Some(due) if Instant::now() >= due => {}
                _ => continue,
            }

            let batch = std::mem::take(&mut pending);
            let task_shared = Arc::clone(&shared);
            let mut carried = std::mem::take(&mut tracker);
            let applied = tokio::task::spawn_blocking(move || {
                apply_batch(&task_shared, generation, batch, &mut carried);
                carried
            })
            .await;
            match applied {
                Ok(carried) => tracker = carried,
                Err(e) => warn!(error = %e, "failed to apply folder changes"),
            }
            window = if tracker.updates.is_empty() {
                None
            } else {
                Some(Instant::now() + wake_interval(&shared))
            };
        }
        rx.close();
        let dropped = pending.len() + std::iter::from_fn(|| rx.try_recv().ok()).count();
        debug!(dropped, "pipeline stopped");
    });
    PipelineHandle { token, task }
}

fn wake_interval(shared: &Shared) -> std::time::Duration {
    shared.ctx.settings().current().watch.wake_interval()
}

/// Applies one burst of operations. Returns `true` if the listing changed.
fn apply_batch(
    shared: &Shared,
    generation: u64,
    ops: Vec<PendingOp>,
    tracker: &mut Tracker,
) -> bool {
    let config = shared.ctx.settings().current();
    let visibility = config.visibility();
    let sort = config.sort_options();
    let flat = config.listing.group == GroupOption::None;
    let sorted = flat.then_some(sort);
    let Tracker { updates, index } = tracker;

    // Metadata is read before taking the state lock.
    let resolved: Vec<(PendingOp, Option<Entry>)> = ops
        .into_iter()
        .map(|op| {
            let entry = match op.action {
                ChangeAction::Added | ChangeAction::RenamedTo => match read_entry(&op.path) {
                    Ok(entry) if visibility.is_visible(&entry) => Some(entry),
                    Ok(_) => None,
                    Err(e) => {
                        debug!(path = %op.path.display(), error = %e, "added item vanished");
                        None
                    }
                },
                _ => None,
            };
            (op, entry)
        })
        .collect();

    let mut changes = GroupChanges::default();
    let mut selection: Option<PathBuf> = None;
    let mut structural = false;
    let mut refreshed = false;

    {
        let mut state = shared.state();
        if state.generation.id != generation {
            return false;
        }
        index.sync(generation, &state.generation.entries);

        for (op, entry) in resolved {
            let entries = &mut state.generation.entries;
            match op.action {
                ChangeAction::Added | ChangeAction::RenamedTo => {
                    let Some(entry) = entry else { continue };
                    match index.locate(entries, entry.path(), sorted) {
                        Some(i) => {
                            if entries[i].refresh_from(&entry) {
                                refreshed = true;
                                changes.updated.push(entries[i].clone());
                            }
                        }
                        None => {
                            let at = if flat {
                                entries
                                    .binary_search_by(|e| compare_entries(e, &entry, sort))
                                    .unwrap_or_else(|i| i)
                            } else {
                                entries.len()
                            };
                            entries.insert(at, entry.clone());
                            index.insert(entry.clone());
                            changes.added.push(entry);
                            structural = true;
                        }
                    }
                }
                ChangeAction::Removed | ChangeAction::RenamedFrom => {
                    updates.forget(&op.path);
                    let Some(i) = index.locate(entries, &op.path, sorted) else {
                        continue;
                    };
                    entries.remove(i);
                    index.remove(&op.path);
                    selection = entries
                        .get(i)
                        .or_else(|| i.checked_sub(1).and_then(|j| entries.get(j)))
                        .map(|e| e.path().to_path_buf());
                    changes.removed.push(op.path);
                    structural = true;
                }
                ChangeAction::Modified => {
                    if index.contains(&op.path) {
                        updates.push(op.path);
                    }
                }
            }
        }
    }

    // Refresh a bounded number of modified items per pass.
    let due = updates.take(config.watch.update_batch_size.max(1));
    let fresh: Vec<Entry> = due
        .iter()
        .filter_map(|path| match read_entry(path) {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "modified item unreadable");
                None
            }
        })
        .collect();

    let mut state = shared.state();
    if state.generation.id != generation {
        return false;
    }
    for entry in fresh {
        let entries = &mut state.generation.entries;
        if let Some(i) = index.locate(entries, entry.path(), sorted) {
            if entries[i].refresh_from(&entry) {
                refreshed = true;
                changes.updated.push(entries[i].clone());
            }
        }
    }

    if !structural && !refreshed {
        return false;
    }

    // Flat listings were edited in order above; metadata refreshes alone
    // keep their position.
    if structural && !flat {
        if state.groups.is_empty() {
            let arranged = arrange(&state.generation.entries, &config);
            state.generation.entries = arranged.entries;
            state.groups = arranged.groups;
        } else {
            let mut groups = std::mem::take(&mut state.groups);
            regroup(
                &mut groups,
                &changes,
                config.group_options(),
                sort,
                SystemTime::now(),
            );
            state.generation.entries = flatten(&groups);
            state.groups = groups;
        }
    } else if !structural {
        patch(&mut state.groups, &changes.updated);
    }

    let dir = state.generation.path.clone();
    let count = state.generation.entries.len();
    let selection = selection.filter(|p| index.contains(p));
    let publish = !state.loading;
    if publish {
        shared.collection.publish(&state.generation.entries);
    }
    drop(state);

    if config.cache.enabled && !changes.removed.is_empty() {
        shared.ctx.cache().evict(&dir, &changes.removed);
    }
    if publish {
        shared.emit(Event::ItemsLoaded {
            path: dir.clone(),
            count,
            from_cache: false,
        });
        if let Some(item) = selection {
            shared.emit(Event::SelectionRequested { path: dir, item });
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::CollectionChanged;
    use crate::config::SettingsHandle;
    use crate::context::ListingContext;
    use crate::fs::entry::EntryKind;
    use crate::listing::Generation;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::mpsc::unbounded_channel;

    fn setup(dir: &Path, names: &[&str]) -> (Arc<Shared>, UnboundedReceiver<Event>) {
        let (tx, rx) = unbounded_channel();
        let ctx = Arc::new(ListingContext::new(SettingsHandle::default()));
        let shared = Arc::new(Shared::new(ctx, tx));
        let entries: Vec<Entry> = names
            .iter()
            .map(|n| {
                let path = dir.join(n);
                fs::write(&path, "").unwrap();
                Entry::from_metadata(path.clone(), &fs::symlink_metadata(&path).unwrap())
            })
            .collect();
        shared.collection.publish(&entries);
        shared.state().generation = Generation::new(1, dir.to_path_buf(), entries);
        (shared, rx)
    }

    fn op(action: ChangeAction, path: PathBuf) -> PendingOp {
        PendingOp { action, path }
    }

    fn names(shared: &Shared) -> Vec<String> {
        shared
            .collection
            .snapshot()
            .iter()
            .map(|e| e.name().to_string())
            .collect()
    }

    fn selections(rx: &mut UnboundedReceiver<Event>) -> Vec<PathBuf> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let Event::SelectionRequested { item, .. } = event {
                out.push(item);
            }
        }
        out
    }

    #[test]
    fn added_file_is_inserted_in_order() {
        let tmp = TempDir::new().unwrap();
        let (shared, _rx) = setup(tmp.path(), &["a", "c"]);
        fs::write(tmp.path().join("b"), "").unwrap();

        let mut tracker = Tracker::default();
        assert!(apply_batch(
            &shared,
            1,
            vec![op(ChangeAction::Added, tmp.path().join("b"))],
            &mut tracker
        ));
        assert_eq!(names(&shared), vec!["a", "b", "c"]);
    }

    #[test]
    fn duplicate_added_does_not_duplicate() {
        let tmp = TempDir::new().unwrap();
        let (shared, _rx) = setup(tmp.path(), &["a"]);
        fs::write(tmp.path().join("b"), "").unwrap();
        let added = || op(ChangeAction::Added, tmp.path().join("b"));

        let mut tracker = Tracker::default();
        apply_batch(&shared, 1, vec![added(), added()], &mut tracker);
        apply_batch(&shared, 1, vec![added()], &mut tracker);
        assert_eq!(names(&shared), vec!["a", "b"]);
    }

    #[test]
    fn removing_middle_selects_following() {
        let tmp = TempDir::new().unwrap();
        let (shared, mut rx) = setup(tmp.path(), &["A", "B", "C"]);
        let mut tracker = Tracker::default();
        apply_batch(
            &shared,
            1,
            vec![op(ChangeAction::Removed, tmp.path().join("B"))],
            &mut tracker,
        );
        assert_eq!(names(&shared), vec!["A", "C"]);
        assert_eq!(selections(&mut rx), vec![tmp.path().join("C")]);
    }

    #[test]
    fn removing_last_selects_preceding() {
        let tmp = TempDir::new().unwrap();
        let (shared, mut rx) = setup(tmp.path(), &["A", "B", "C"]);
        let mut tracker = Tracker::default();
        apply_batch(
            &shared,
            1,
            vec![op(ChangeAction::Removed, tmp.path().join("C"))],
            &mut tracker,
        );
        assert_eq!(selections(&mut rx), vec![tmp.path().join("B")]);
    }

    #[test]
    fn rename_moves_entry() {
        let tmp = TempDir::new().unwrap();
        let (shared, _rx) = setup(tmp.path(), &["a", "b"]);
        fs::rename(tmp.path().join("a"), tmp.path().join("z")).unwrap();
        let mut tracker = Tracker::default();
        apply_batch(
            &shared,
            1,
            vec![
                op(ChangeAction::RenamedFrom, tmp.path().join("a")),
                op(ChangeAction::RenamedTo, tmp.path().join("z")),
            ],
            &mut tracker,
        );
        assert_eq!(names(&shared), vec!["b", "z"]);
    }

    #[test]
    fn modified_refreshes_in_place() {
        let tmp = TempDir::new().unwrap();
        let (shared, _rx) = setup(tmp.path(), &["a", "b"]);
        fs::write(tmp.path().join("a"), "grown").unwrap();

        let mut tracker = Tracker::default();
        let changed = apply_batch(
            &shared,
            1,
            vec![
                op(ChangeAction::Modified, tmp.path().join("a")),
                op(ChangeAction::Modified, tmp.path().join("a")),
            ],
            &mut tracker,
        );
        assert!(changed);
        assert!(tracker.updates.is_empty());
        assert_eq!(shared.collection.get(0).unwrap().size(), Some(5));
    }

    #[test]
    fn hidden_added_file_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let (shared, _rx) = setup(tmp.path(), &["a"]);
        fs::write(tmp.path().join(".secret"), "").unwrap();
        let mut tracker = Tracker::default();
        let changed = apply_batch(
            &shared,
            1,
            vec![op(ChangeAction::Added, tmp.path().join(".secret"))],
            &mut tracker,
        );
        assert!(!changed);
        assert_eq!(names(&shared), vec!["a"]);
    }

    #[test]
    fn stale_generation_is_ignored() {
        let tmp = TempDir::new().unwrap();
        let (shared, _rx) = setup(tmp.path(), &["a"]);
        fs::write(tmp.path().join("b"), "").unwrap();
        let mut tracker = Tracker::default();
        assert!(!apply_batch(
            &shared,
            7,
            vec![op(ChangeAction::Added, tmp.path().join("b"))],
            &mut tracker
        ));
    }

    #[test]
    fn loading_updates_state_without_publishing() {
        let tmp = TempDir::new().unwrap();
        let (shared, _rx) = setup(tmp.path(), &["a"]);
        shared.state().loading = true;
        fs::write(tmp.path().join("b"), "").unwrap();
        let mut tracker = Tracker::default();
        apply_batch(
            &shared,
            1,
            vec![op(ChangeAction::Added, tmp.path().join("b"))],
            &mut tracker,
        );
        assert_eq!(names(&shared), vec!["a"]);
        assert_eq!(shared.state().generation.entries().len(), 2);
    }

    async fn wait_for_len(shared: &Shared, len: usize) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while shared.collection.len() < len && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn trickling_events_publish_once_per_window() {
        let tmp = TempDir::new().unwrap();
        let (shared, _rx) = setup(tmp.path(), &["a"]);
        shared
            .ctx
            .settings()
            .update(|c| c.watch.wake_interval_ms = 300);
        let mut changes = shared.collection.subscribe();
        let (tx, rx) = unbounded_channel();
        let handle = spawn(Arc::clone(&shared), 1, rx);

        for i in 0..10 {
            let path = tmp.path().join(format!("f{i}"));
            fs::write(&path, "").unwrap();
            tx.send(op(ChangeAction::Added, path)).unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        wait_for_len(&shared, 11).await;
        handle.stop().await;

        let mut received = Vec::new();
        while let Ok(change) = changes.try_recv() {
            received.push(change);
        }
        assert_eq!(received, vec![CollectionChanged::Reset]);
        assert_eq!(shared.collection.len(), 11);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn leftover_updates_reopen_the_window() {
        let tmp = TempDir::new().unwrap();
        let (shared, _rx) = setup(tmp.path(), &["a", "b", "c"]);
        shared.ctx.settings().update(|c| {
            c.watch.wake_interval_ms = 20;
            c.watch.update_batch_size = 1;
        });
        for name in ["a", "b", "c"] {
            fs::write(tmp.path().join(name), "grown").unwrap();
        }
        let (tx, rx) = unbounded_channel();
        let handle = spawn(Arc::clone(&shared), 1, rx);
        for name in ["a", "b", "c"] {
            tx.send(op(ChangeAction::Modified, tmp.path().join(name))).unwrap();
        }

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while shared.collection.snapshot().iter().any(|e| e.size() != Some(5))
            && tokio::time::Instant::now() < deadline
        {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        handle.stop().await;
        assert!(shared.collection.snapshot().iter().all(|e| e.size() == Some(5)));
    }

    #[test]
    fn removal_evicts_cached_entry() {
        let tmp = TempDir::new().unwrap();
        let (shared, _rx) = setup(tmp.path(), &["a", "b"]);
        let entries = shared.state().generation.entries().to_vec();
        shared.ctx.cache().write(
            tmp.path(),
            crate::cache::CacheRecord::new(tmp.path().to_path_buf(), entries, Default::default()),
        );

        let mut tracker = Tracker::default();
        apply_batch(
            &shared,
            1,
            vec![op(ChangeAction::Removed, tmp.path().join("a"))],
            &mut tracker,
        );
        let record = shared.ctx.cache().read(tmp.path()).unwrap();
        let cached: Vec<&str> = record.entries.iter().map(|e| e.name()).collect();
        assert_eq!(cached, vec!["b"]);
    }

    #[test]
    fn unlisted_paths_are_ignored() {
        let tmp = TempDir::new().unwrap();
        let (shared, mut rx) = setup(tmp.path(), &["a"]);
        let mut tracker = Tracker::default();
        let changed = apply_batch(
            &shared,
            1,
            vec![
                op(ChangeAction::Removed, tmp.path().join("ghost")),
                op(ChangeAction::Modified, tmp.path().join("ghost")),
            ],
            &mut tracker,
        );
        assert!(!changed);
        assert!(tracker.updates.is_empty());
        assert!(selections(&mut rx).is_empty());
    }

    #[test]
    fn large_flat_listing_stays_sorted() {
        let tmp = TempDir::new().unwrap();
        let file_names: Vec<String> = (0..200).map(|i| format!("f{i:03}")).collect();
        let refs: Vec<&str> = file_names.iter().map(String::as_str).collect();
        let (shared, _rx) = setup(tmp.path(), &refs);
        let mut ops = Vec::new();
        for i in (0..200).step_by(7) {
            ops.push(op(ChangeAction::Removed, tmp.path().join(format!("f{i:03}"))));
        }
        for i in 0..20 {
            let path = tmp.path().join(format!("f{i:03}x"));
            fs::write(&path, "").unwrap();
            ops.push(op(ChangeAction::Added, path));
        }

        let mut tracker = Tracker::default();
        apply_batch(&shared, 1, ops, &mut tracker);
        let listed = names(&shared);
        let mut expected = listed.clone();
        expected.sort_by(|a, b| crate::nav::sort::natural_cmp(a, b));
        assert_eq!(listed, expected);
        assert_eq!(listed.len(), 200 - 29 + 20);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stop_drops_queued_events() {
        let tmp = TempDir::new().unwrap();
        let (shared, _rx) = setup(tmp.path(), &["a"]);
        let (tx, rx) = unbounded_channel();
        let handle = spawn(Arc::clone(&shared), 1, rx);
        handle.stop().await;

        fs::write(tmp.path().join("late"), "").unwrap();
        assert!(tx.send(op(ChangeAction::Added, tmp.path().join("late"))).is_err());
        assert_eq!(names(&shared), vec!["a"]);
    }

    #[test]
    fn update_queue_dedupes() {
        let mut queue = UpdateQueue::default();
        queue.push(PathBuf::from("/a"));
        queue.push(PathBuf::from("/a"));
        queue.push(PathBuf::from("/b"));
        queue.forget(Path::new("/b"));
        assert_eq!(queue.take(10), vec![PathBuf::from("/a")]);
        assert!(queue.is_empty());
    }

    #[test]
    fn entry_kind_is_preserved_on_refresh() {
        let tmp = TempDir::new().unwrap();
        let (shared, _rx) = setup(tmp.path(), &[]);
        let sub = tmp.path().join("sub");
        fs::create_dir(&sub).unwrap();
        let mut tracker = Tracker::default();
        apply_batch(&shared, 1, vec![op(ChangeAction::Added, sub.clone())], &mut tracker);
        apply_batch(&shared, 1, vec![op(ChangeAction::Modified, sub)], &mut tracker);
        assert_eq!(shared.collection.get(0).unwrap().kind(), EntryKind::Folder);
    }
}
