//! Visibility filtering of entries.

use crate::fs::entry::Entry;

/// Which entries a listing shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Visibility {
    /// Show entries carrying the hidden attribute.
    pub show_hidden: bool,
    /// Keep hidden entries that also carry the system attribute out of the
    /// listing, even when hidden ones are shown.
    pub hide_system: bool,
    /// Show dot-prefixed names, independently of `show_hidden`.
    pub show_dot_files: bool,
}

impl Visibility {
    /// The system attribute only matters on hidden entries; a plain
    /// system file is always listed.
    pub fn is_visible(&self, entry: &Entry) -> bool {
        let attribute_ok = !entry.is_hidden()
            || (self.show_hidden && (!entry.is_system() || !self.hide_system));
        let dot_ok = !entry.is_dot_file() || self.show_dot_files;
        attribute_ok && dot_ok
    }

    /// Returns a **new** vec holding only the visible entries.
    pub fn filter(&self, entries: &[Entry]) -> Vec<Entry> {
        entries
            .iter()
            .filter(|e| self.is_visible(e))
            .cloned()
            .collect()
    }
}
