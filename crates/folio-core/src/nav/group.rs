//! Partitioning of a sorted listing into labelled groups.
//!
//! Groups are ordered by a bucket index first (so "Today" precedes
//! "Yesterday" regardless of spelling) and by their label second. Entries
//! inside each group follow the regular [`SortOptions`] order.

use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use super::sort::{natural_cmp, sort_in_place, SortDirection, SortOptions};
use crate::fs::entry::{Entry, EntryKind};

const DAY: Duration = Duration::from_secs(24 * 60 * 60);
const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;
const GIB: u64 = 1024 * MIB;

/// How entries are partitioned into groups.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupOption {
    #[default]
    None,
    /// First letter of the name; everything non-alphabetic shares `#`.
    Name,
    Kind,
    /// File extension.
    Type,
    Size,
    DateModified,
    DateCreated,
    DateDeleted,
    OriginalFolder,
}

/// Grouping settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct GroupOptions {
    pub option: GroupOption,
    /// Order of the groups themselves.
    pub direction: SortDirection,
}

/// One labelled group of entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryGroup {
    key: String,
    order: u32,
    entries: Vec<Entry>,
    is_sorted: bool,
}

impl EntryGroup {
    fn new(key: String, order: u32) -> Self {
        Self {
            key,
            order,
            entries: Vec::new(),
            is_sorted: true,
        }
    }

    /// Display label of the group.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `false` while the group holds entries that have not been re-sorted.
    pub fn is_sorted(&self) -> bool {
        self.is_sorted
    }

    fn sort(&mut self, sort: SortOptions) {
        sort_in_place(&mut self.entries, sort);
        self.is_sorted = true;
    }
}

/// Incremental edits applied by [`regroup`].
#[derive(Debug, Clone, Default)]
pub struct GroupChanges {
    pub added: Vec<Entry>,
    pub removed: Vec<PathBuf>,
    /// Entries whose metadata changed; they may move to another group.
    pub updated: Vec<Entry>,
}

impl GroupChanges {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.updated.is_empty()
    }
}

/// Returns the `(bucket index, label)` an entry belongs to.
pub fn group_key(entry: &Entry, option: GroupOption, now: SystemTime) -> (u32, String) {
    match option {
        GroupOption::None => (0, String::new()),
        GroupOption::Name => match entry.name().chars().next() {
            Some(c) if c.is_alphabetic() => (1, c.to_uppercase().collect()),
            _ => (0, "#".to_string()),
        },
        GroupOption::Kind => match entry.kind() {
            EntryKind::Folder => (0, "Folders".to_string()),
            EntryKind::File => (1, "Files".to_string()),
            EntryKind::AlternateStream => (2, "Streams".to_string()),
            EntryKind::Synthetic => (3, "Items".to_string()),
        },
        GroupOption::Type => {
            if entry.is_folder() {
                return (0, "Folder".to_string());
            }
            let ext = entry.extension_lower();
            if ext.is_empty() {
                (2, "File".to_string())
            } else {
                (1, ext.to_uppercase())
            }
        }
        GroupOption::Size => size_bucket(entry),
        GroupOption::DateModified => date_bucket(entry.modified(), now),
        GroupOption::DateCreated => date_bucket(entry.created(), now),
        GroupOption::DateDeleted => date_bucket(entry.deleted(), now),
        GroupOption::OriginalFolder => match entry.original_location() {
            Some(loc) => (0, loc.to_string_lossy().into_owned()),
            None => (1, "Unknown".to_string()),
        },
    }
}

fn size_bucket(entry: &Entry) -> (u32, String) {
    if entry.is_folder() {
        return (0, "Folders".to_string());
    }
    let (order, label) = match entry.size() {
        Some(s) if s < 16 * KIB => (1, "Tiny"),
        Some(s) if s < MIB => (2, "Small"),
        Some(s) if s < 128 * MIB => (3, "Medium"),
        Some(s) if s < GIB => (4, "Large"),
        Some(_) => (5, "Huge"),
        None => (6, "Unknown"),
    };
    (order, label.to_string())
}

fn date_bucket(time: Option<SystemTime>, now: SystemTime) -> (u32, String) {
    let Some(time) = time else {
        return (6, "Unknown".to_string());
    };
    // Timestamps in the future count as today.
    let age = now.duration_since(time).unwrap_or(Duration::ZERO);
    let (order, label) = if age < DAY {
        (0, "Today")
    } else if age < 2 * DAY {
        (1, "Yesterday")
    } else if age < 7 * DAY {
        (2, "Earlier this week")
    } else if age < 30 * DAY {
        (3, "Earlier this month")
    } else if age < 365 * DAY {
        (4, "Earlier this year")
    } else {
        (5, "Older")
    };
    (order, label.to_string())
}

/// Partitions `entries` into sorted groups.
///
/// With [`GroupOption::None`] the result is a single unlabelled group (or
/// nothing, for an empty listing).
pub fn group_entries(
    entries: &[Entry],
    groups: GroupOptions,
    sort: SortOptions,
    now: SystemTime,
) -> Vec<EntryGroup> {
    let mut result: Vec<EntryGroup> = Vec::new();
    for entry in entries {
        insert_into(&mut result, entry.clone(), groups.option, now);
    }
    for group in &mut result {
        group.sort(sort);
    }
    order_groups(&mut result, groups.direction);
    result
}

/// Applies `changes` to existing groups and re-sorts only the groups that
/// were touched. Groups left empty are dropped.
pub fn regroup(
    groups: &mut Vec<EntryGroup>,
    changes: &GroupChanges,
    options: GroupOptions,
    sort: SortOptions,
    now: SystemTime,
) {
    if changes.is_empty() {
        return;
    }

    for path in &changes.removed {
        remove_path(groups, path);
    }

    for entry in &changes.updated {
        let (order, key) = group_key(entry, options.option, now);
        let current = groups
            .iter()
            .position(|g| g.entries.iter().any(|e| e.path() == entry.path()));
        match current {
            Some(gi) if groups[gi].key == key && groups[gi].order == order => {
                let group = &mut groups[gi];
                if let Some(slot) = group.entries.iter_mut().find(|e| e.path() == entry.path()) {
                    *slot = entry.clone();
                }
                group.is_sorted = false;
            }
            Some(_) => {
                remove_path(groups, entry.path());
                insert_into(groups, entry.clone(), options.option, now);
            }
            None => insert_into(groups, entry.clone(), options.option, now),
        }
    }

    for entry in &changes.added {
        if groups
            .iter()
            .any(|g| g.entries.iter().any(|e| e.path() == entry.path()))
        {
            continue;
        }
        insert_into(groups, entry.clone(), options.option, now);
    }

    groups.retain(|g| !g.is_empty());
    for group in groups.iter_mut().filter(|g| !g.is_sorted) {
        group.sort(sort);
    }
    order_groups(groups, options.direction);
}

/// Replaces entries by path, keeping their position and group.
pub fn patch(groups: &mut [EntryGroup], updated: &[Entry]) {
    for entry in updated {
        let slot = groups
            .iter_mut()
            .find_map(|g| g.entries.iter_mut().find(|e| e.path() == entry.path()));
        if let Some(slot) = slot {
            *slot = entry.clone();
        }
    }
}

/// Flattens groups back into a single ordered listing.
pub fn flatten(groups: &[EntryGroup]) -> Vec<Entry> {
    groups.iter().flat_map(|g| g.entries.iter().cloned()).collect()
}

fn insert_into(groups: &mut Vec<EntryGroup>, entry: Entry, option: GroupOption, now: SystemTime) {
    let (order, key) = group_key(&entry, option, now);
    let index = match groups
        .iter()
        .position(|g| g.order == order && g.key == key)
    {
        Some(i) => i,
        None => {
            groups.push(EntryGroup::new(key, order));
            groups.len() - 1
        }
    };
    let group = &mut groups[index];
    group.entries.push(entry);
    group.is_sorted = false;
}

fn remove_path(groups: &mut [EntryGroup], path: &std::path::Path) {
    for group in groups.iter_mut() {
        group.entries.retain(|e| e.path() != path);
    }
}

fn order_groups(groups: &mut [EntryGroup], direction: SortDirection) {
    groups.sort_by(|a, b| {
        let ord = a
            .order
            .cmp(&b.order)
            .then_with(|| natural_cmp(&a.key, &b.key));
        match direction {
            SortDirection::Ascending => ord,
            SortDirection::Descending => ord.reverse(),
        }
    });
}
