//! Per-folder change watcher.
//!
//! A [`ChangeWatcher`] owns one non-recursive OS subscription and one
//! dedicated thread. The thread blocks on the next notification (with a
//! bounded timeout), turns it into [`PendingOp`]s and pushes them into the
//! live update pipeline's queue.

mod record;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use notify::event::{DataChange, MetadataKind, ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::error::{CoreError, CoreResult};
use crate::fs::entry::SyncStatus;

pub use record::{decode_records, DecodedRecords};
#[cfg(test)]
pub(crate) use record::encode_records;

/// Upper bound on how long the watcher thread sleeps between checks.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// What happened to a child of the watched folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeAction {
    Added,
    Removed,
    Modified,
    /// Old name of a renamed item.
    RenamedFrom,
    /// New name of a renamed item.
    RenamedTo,
}

impl ChangeAction {
    /// Maps a native action code (1 added .. 5 renamed-new) to an action.
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(Self::Added),
            2 => Some(Self::Removed),
            3 => Some(Self::Modified),
            4 => Some(Self::RenamedFrom),
            5 => Some(Self::RenamedTo),
            _ => None,
        }
    }
}

/// A change waiting to be applied by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingOp {
    pub action: ChangeAction,
    pub path: PathBuf,
}

/// Which kinds of modification are reported. Name changes, creation and
/// deletion are always reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchFilter {
    pub last_write: bool,
    pub size: bool,
    pub attributes: bool,
}

impl Default for WatchFilter {
    fn default() -> Self {
        Self {
            last_write: true,
            size: true,
            attributes: false,
        }
    }
}

impl WatchFilter {
    /// Default filter, plus attribute changes for cloud-managed folders.
    pub fn for_folder(sync_status: Option<SyncStatus>) -> Self {
        Self {
            attributes: sync_status.is_some_and(SyncStatus::is_sync_bearing),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WatchState {
    Idle = 0,
    Watching = 1,
    Cancelling = 2,
    Closed = 3,
}

impl WatchState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Idle,
            1 => Self::Watching,
            2 => Self::Cancelling,
            _ => Self::Closed,
        }
    }
}

enum Notification {
    Event(notify::Result<notify::Event>),
    Records(Vec<u8>),
    Shutdown,
}

/// Handle used by an out-of-process notifier to deliver raw record buffers
/// to a watcher created with [`ChangeWatcher::from_records`].
#[derive(Clone)]
pub struct RecordFeed {
    tx: mpsc::Sender<Notification>,
}

impl RecordFeed {
    /// Queues one buffer. Returns `false` once the watcher is closed.
    pub fn push(&self, buf: Vec<u8>) -> bool {
        self.tx.send(Notification::Records(buf)).is_ok()
    }
}

/// A live subscription to one folder.
pub struct ChangeWatcher {
    path: PathBuf,
    state: Arc<AtomicU8>,
    wake: mpsc::Sender<Notification>,
    os_watcher: Option<RecommendedWatcher>,
    thread: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for ChangeWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeWatcher")
            .field("path", &self.path)
            .field("state", &self.state())
            .finish()
    }
}

impl ChangeWatcher {
    /// Starts watching the direct children of `path`.
    ///
    /// # Errors
    ///
    /// [`CoreError::Watch`] if the OS subscription cannot be opened.
    pub fn watch(
        path: &Path,
        filter: WatchFilter,
        sender: UnboundedSender<PendingOp>,
    ) -> CoreResult<Self> {
        let (wake, rx) = mpsc::channel();
        let events = wake.clone();
        let mut os_watcher = notify::recommended_watcher(move |res| {
            let _ = events.send(Notification::Event(res));
        })
        .map_err(|e| CoreError::Watch(e.to_string()))?;
        os_watcher
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(|e| CoreError::Watch(format!("{}: {e}", path.display())))?;

        let mut watcher = Self::spawn(path, filter, sender, wake, rx)?;
        watcher.os_watcher = Some(os_watcher);
        info!(path = %path.display(), "watching folder");
        Ok(watcher)
    }

    /// Runs the same decode loop over raw record buffers pushed through the
    /// returned [`RecordFeed`].
    pub fn from_records(
        path: &Path,
        filter: WatchFilter,
        sender: UnboundedSender<PendingOp>,
    ) -> CoreResult<(Self, RecordFeed)> {
        let (wake, rx) = mpsc::channel();
        let feed = RecordFeed { tx: wake.clone() };
        let watcher = Self::spawn(path, filter, sender, wake, rx)?;
        Ok((watcher, feed))
    }

    fn spawn(
        path: &Path,
        filter: WatchFilter,
        sender: UnboundedSender<PendingOp>,
        wake: mpsc::Sender<Notification>,
        rx: mpsc::Receiver<Notification>,
    ) -> CoreResult<Self> {
        let state = Arc::new(AtomicU8::new(WatchState::Idle as u8));
        let worker = Worker {
            dir: path.to_path_buf(),
            canonical: std::fs::canonicalize(path).ok(),
            filter,
            state: Arc::clone(&state),
            sender,
        };
        state.store(WatchState::Watching as u8, Ordering::SeqCst);
        let thread = std::thread::Builder::new()
            .name("folio-watch".to_string())
            .spawn(move || worker.run(rx))
            .map_err(|e| CoreError::Watch(e.to_string()))?;

        Ok(Self {
            path: path.to_path_buf(),
            state,
            wake,
            os_watcher: None,
            thread: Some(thread),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> WatchState {
        WatchState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Stops the subscription and joins the watcher thread. Nothing is
    /// pushed into the queue after this returns.
    pub fn close(&mut self) {
        if self.state() == WatchState::Closed {
            return;
        }
        self.state
            .store(WatchState::Cancelling as u8, Ordering::SeqCst);
        self.os_watcher = None;
        let _ = self.wake.send(Notification::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!(path = %self.path.display(), "watcher thread panicked");
            }
        }
        self.state.store(WatchState::Closed as u8, Ordering::SeqCst);
        info!(path = %self.path.display(), "stopped watching folder");
    }
}

impl Drop for ChangeWatcher {
    fn drop(&mut self) {
        self.close();
    }
}

struct Worker {
    dir: PathBuf,
    canonical: Option<PathBuf>,
    filter: WatchFilter,
    state: Arc<AtomicU8>,
    sender: UnboundedSender<PendingOp>,
}

impl Worker {
    fn is_watching(&self) -> bool {
        self.state.load(Ordering::SeqCst) == WatchState::Watching as u8
    }

    fn run(self, rx: mpsc::Receiver<Notification>) {
        while self.is_watching() {
            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(Notification::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {}
                Ok(Notification::Event(Ok(event))) => {
                    let ops = translate_event(&event, &self.filter);
                    self.forward(ops);
                }
                Ok(Notification::Event(Err(e))) => {
                    warn!(path = %self.dir.display(), error = %e, "watch error");
                }
                Ok(Notification::Records(buf)) => {
                    let decoded = decode_records(&buf, &self.dir);
                    for e in &decoded.skipped {
                        warn!(path = %self.dir.display(), error = %e, "skipping malformed record");
                    }
                    if let Some(e) = &decoded.truncated {
                        warn!(path = %self.dir.display(), error = %e, "notification buffer cut short");
                    }
                    self.forward(decoded.ops);
                }
            }
        }
        debug!(path = %self.dir.display(), "watcher thread exiting");
    }

    fn forward(&self, ops: Vec<PendingOp>) {
        for op in ops {
            if !self.is_watching() {
                return;
            }
            let Some(path) = self.rebase(&op.path) else {
                debug!(path = %op.path.display(), "ignoring event outside watched folder");
                continue;
            };
            if self
                .sender
                .send(PendingOp {
                    action: op.action,
                    path,
                })
                .is_err()
            {
                return;
            }
        }
    }

    /// Maps `path` onto the watched folder as given by the caller, or
    /// `None` if it is not a direct child.
    fn rebase(&self, path: &Path) -> Option<PathBuf> {
        let parent = path.parent()?;
        let name = path.file_name()?;
        let matches = parent == self.dir || self.canonical.as_deref() == Some(parent);
        matches.then(|| self.dir.join(name))
    }
}

/// Converts one `notify` event into pending operations.
fn translate_event(event: &notify::Event, filter: &WatchFilter) -> Vec<PendingOp> {
    let op = |action, path: &PathBuf| PendingOp {
        action,
        path: path.clone(),
    };
    let first = event.paths.first();

    match &event.kind {
        EventKind::Create(_) => event.paths.iter().map(|p| op(ChangeAction::Added, p)).collect(),
        EventKind::Remove(_) => event
            .paths
            .iter()
            .map(|p| op(ChangeAction::Removed, p))
            .collect(),
        EventKind::Modify(ModifyKind::Name(mode)) => match (mode, event.paths.as_slice()) {
            (RenameMode::From, [from, ..]) => vec![op(ChangeAction::RenamedFrom, from)],
            (RenameMode::To, [to, ..]) => vec![op(ChangeAction::RenamedTo, to)],
            (RenameMode::Both, [from, to, ..]) => vec![
                op(ChangeAction::RenamedFrom, from),
                op(ChangeAction::RenamedTo, to),
            ],
            (RenameMode::Any | RenameMode::Other, [path, ..]) => {
                if path.exists() {
                    vec![op(ChangeAction::RenamedTo, path)]
                } else {
                    vec![op(ChangeAction::RenamedFrom, path)]
                }
            }
            _ => {
                debug!(paths = ?event.paths, "rename event without enough paths");
                Vec::new()
            }
        },
        EventKind::Modify(kind) => {
            let wanted = match kind {
                ModifyKind::Data(DataChange::Size) => filter.size,
                ModifyKind::Data(_) => filter.last_write || filter.size,
                ModifyKind::Metadata(MetadataKind::WriteTime) => filter.last_write,
                ModifyKind::Metadata(_) => filter.attributes,
                _ => filter.last_write,
            };
            match (wanted, first) {
                (true, Some(path)) => vec![op(ChangeAction::Modified, path)],
                _ => Vec::new(),
            }
        }
        _ => Vec::new(),
    }
}
