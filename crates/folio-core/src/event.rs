//! Notifications the core sends to the presentation layer.
//!
//! Events flow **Core → UI** over an unbounded channel handed to the
//! [`crate::listing::DirectoryView`]. The listing itself is observed through
//! the view's [`crate::collection::BulkCollection`]; events carry everything
//! else (progress, folder facts, selection hints, failures).

use std::path::PathBuf;

use crate::cache::FolderInfo;
use crate::listing::LoadOutcome;

/// Progress of a load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    Starting,
    /// At least one batch has been published.
    InProgress,
    Complete,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    LoadStatus {
        path: PathBuf,
        status: LoadStatus,
    },
    /// The collection now shows `count` entries for `path`.
    ItemsLoaded {
        path: PathBuf,
        count: usize,
        /// `true` when the entries are a cached first draft.
        from_cache: bool,
    },
    DirectoryInfoUpdated {
        path: PathBuf,
        info: FolderInfo,
    },
    /// The UI should move the selection to `item`.
    SelectionRequested {
        path: PathBuf,
        item: PathBuf,
    },
    /// The load ended without a listing (missing, unauthorized, locked,
    /// not a directory).
    LoadFailed {
        path: PathBuf,
        outcome: LoadOutcome,
    },
}
