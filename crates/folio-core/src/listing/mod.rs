//! Loading and live maintenance of one folder listing.
//!
//! - [`loader`] runs one enumeration pass (cache draft, batched streaming).
//! - [`pipeline`] applies watcher events to the committed listing.
//! - [`view`] ties both to a [`crate::collection::BulkCollection`] and
//!   enforces single-flight loading.

mod loader;
mod pipeline;
mod view;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;

use tokio::sync::mpsc::UnboundedSender;

use crate::cache::FolderInfo;
use crate::collection::BulkCollection;
use crate::config::Config;
use crate::context::ListingContext;
use crate::event::Event;
use crate::fs::entry::Entry;
use crate::nav::group::{flatten, group_entries, EntryGroup, GroupOption};
use crate::nav::sort::sort_entries;

pub use pipeline::PipelineHandle;
pub use view::DirectoryView;

/// How a load ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Complete,
    /// Superseded by a newer request or cancelled by the caller.
    Cancelled,
    Unauthorized,
    NotFound,
    /// The folder lives on a locked volume that was not unlocked.
    Locked,
    NotADirectory,
}

/// The committed listing of a view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Generation {
    id: u64,
    path: PathBuf,
    entries: Vec<Entry>,
}

impl Generation {
    pub(crate) fn new(id: u64, path: PathBuf, entries: Vec<Entry>) -> Self {
        Self { id, path, entries }
    }

    /// Monotonic per view; `0` before the first successful load.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Entries in display order.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }
}

/// Mutable state of a view, guarded by one mutex.
#[derive(Debug, Default)]
pub(crate) struct ViewState {
    pub(crate) generation: Generation,
    pub(crate) groups: Vec<EntryGroup>,
    pub(crate) folder: FolderInfo,
    /// A load currently owns the collection.
    pub(crate) loading: bool,
}

/// State shared between the view, its loads and its pipeline task.
pub(crate) struct Shared {
    pub(crate) ctx: Arc<ListingContext>,
    pub(crate) collection: Arc<BulkCollection<Entry>>,
    pub(crate) events: UnboundedSender<Event>,
    state: Mutex<ViewState>,
}

impl Shared {
    pub(crate) fn new(ctx: Arc<ListingContext>, events: UnboundedSender<Event>) -> Self {
        Self {
            ctx,
            collection: Arc::new(BulkCollection::new()),
            events,
            state: Mutex::new(ViewState::default()),
        }
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, ViewState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn emit(&self, event: Event) {
        // A closed receiver only means nobody is listening anymore.
        let _ = self.events.send(event);
    }
}

/// A listing put in display order, plus its groups.
pub(crate) struct Arranged {
    pub(crate) entries: Vec<Entry>,
    pub(crate) groups: Vec<EntryGroup>,
}

/// Orders `entries` by the configured sort and grouping.
pub(crate) fn arrange(entries: &[Entry], config: &Config) -> Arranged {
    let groups_opt = config.group_options();
    if groups_opt.option == GroupOption::None {
        return Arranged {
            entries: sort_entries(entries, config.sort_options()),
            groups: Vec::new(),
        };
    }
    let groups = group_entries(entries, groups_opt, config.sort_options(), SystemTime::now());
    Arranged {
        entries: flatten(&groups),
        groups,
    }
}

/// Display name of a folder path.
pub(crate) fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| crate::nfc_string(&n.to_string_lossy()))
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}
