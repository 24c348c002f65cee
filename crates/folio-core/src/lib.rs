//! Folio core library: the directory-listing engine of a file manager.
//!
//! `folio-core` turns a folder path into a live, observable listing. It is
//! decoupled from any UI; frontends subscribe to a
//! [`collection::BulkCollection`] and an [`Event`] channel.
//!
//! # Modules
//!
//! - [`fs`]: the [`Entry`] model and stat helpers.
//! - [`nav`]: ordering, grouping and visibility rules.
//! - [`cache`]: per-folder listing cache (memory or JSON file).
//! - [`source`]: enumeration sources and their selection.
//! - [`watch`]: OS change notifications turned into pending operations.
//! - [`collection`]: the observable list with bulk updates.
//! - [`listing`]: loading, live updates and the [`DirectoryView`].
//! - [`config`]: TOML settings and the shared [`SettingsHandle`].
//! - [`event`]: notifications for the UI.
//! - [`error`]: unified error type ([`CoreError`]) and result alias ([`CoreResult`]).

pub mod cache;
pub mod collection;
pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod fs;
pub mod listing;
pub mod nav;
pub mod source;
pub mod watch;

pub use cache::{CacheRecord, FolderInfo, JsonFileCache, ListingCache, MemoryCache};
pub use collection::{BulkCollection, CollectionChanged};
pub use config::{Config, SettingsChange, SettingsHandle};
pub use context::ListingContext;
pub use error::{CoreError, CoreResult};
pub use event::{Event, LoadStatus};
pub use fs::entry::{Entry, EntryKind, ProviderTag, SyncStatus};
pub use listing::{DirectoryView, Generation, LoadOutcome};
pub use nav::filter::Visibility;
pub use nav::group::{EntryGroup, GroupOption, GroupOptions};
pub use nav::sort::{sort_entries, SortDirection, SortField, SortOptions};
pub use source::{
    classify_path, EnumerationSource, FastWalk, ProviderChannel, RichWalk, SourceKind,
    SourceRegistry, VirtualSource, VolumeLockProbe,
};
pub use watch::{ChangeAction, ChangeWatcher, PendingOp, WatchFilter, WatchState};

/// Normalises a string to NFC (composed) form.
///
/// macOS stores filenames in NFD (decomposed), which makes composed
/// characters such as Hangul syllables show up as separate Jamo.
pub fn nfc_string(s: &str) -> String {
    use unicode_normalization::UnicodeNormalization;
    s.nfc().collect()
}
