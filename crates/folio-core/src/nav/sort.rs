//! Ordering of directory entries.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::fs::entry::Entry;

/// The field by which entries are compared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    /// Natural, case-insensitive name order ("file2" before "file10").
    #[default]
    Name,
    /// Last-modified time.
    Modified,
    /// Creation time.
    Created,
    /// File extension (case-insensitive).
    Type,
    /// File size in bytes.
    Size,
    /// Original folder of a trashed item.
    OriginalLocation,
    /// Time an item was trashed.
    DateDeleted,
}

/// Sort order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    /// Smallest / earliest / A–Z first.
    #[default]
    Ascending,
    /// Largest / latest / Z–A first.
    Descending,
}

impl SortDirection {
    fn apply(self, ord: Ordering) -> Ordering {
        match self {
            SortDirection::Ascending => ord,
            SortDirection::Descending => ord.reverse(),
        }
    }
}

/// Everything the ordering engine needs to know to order a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SortOptions {
    pub field: SortField,
    pub direction: SortDirection,
    /// Folders come before everything else, whatever the direction.
    pub folders_first: bool,
}

impl Default for SortOptions {
    fn default() -> Self {
        Self {
            field: SortField::Name,
            direction: SortDirection::Ascending,
            folders_first: true,
        }
    }
}

/// Sorts a list of entries and returns a **new** `Vec<Entry>`; the input
/// slice is never mutated.
///
/// Ordering dimensions, in priority order:
/// 1. folders before non-folders when `folders_first` is set,
/// 2. provider-assigned [`Entry::sort_index`] (pinned items first),
/// 3. the primary field in the requested direction,
/// 4. natural name order in the same direction,
/// 5. the full path, so the result is deterministic.
pub fn sort_entries(entries: &[Entry], options: SortOptions) -> Vec<Entry> {
    let mut sorted = entries.to_vec();
    sort_in_place(&mut sorted, options);
    sorted
}

/// In-place variant of [`sort_entries`] used on the authoritative list.
pub fn sort_in_place(entries: &mut [Entry], options: SortOptions) {
    entries.sort_by(|a, b| compare_entries(a, b, options));
}

/// Total order used by [`sort_entries`].
pub fn compare_entries(a: &Entry, b: &Entry, options: SortOptions) -> Ordering {
    if options.folders_first {
        let folder_cmp = b.is_folder().cmp(&a.is_folder());
        if folder_cmp != Ordering::Equal {
            return folder_cmp;
        }
    }

    let pinned = match (a.sort_index(), b.sort_index()) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    if pinned != Ordering::Equal {
        return pinned;
    }

    options
        .direction
        .apply(compare_by_field(a, b, options.field))
        .then_with(|| options.direction.apply(natural_cmp(a.name(), b.name())))
        .then_with(|| a.path().cmp(b.path()))
}

fn compare_by_field(a: &Entry, b: &Entry, field: SortField) -> Ordering {
    match field {
        SortField::Name => natural_cmp(a.name(), b.name()),
        SortField::Modified => a.modified().cmp(&b.modified()),
        SortField::Created => a.created().cmp(&b.created()),
        SortField::Type => a.extension_lower().cmp(&b.extension_lower()),
        SortField::Size => a.size().cmp(&b.size()),
        SortField::OriginalLocation => a.original_location().cmp(&b.original_location()),
        SortField::DateDeleted => a.deleted().cmp(&b.deleted()),
    }
}

/// Compares two names using natural (alphanumeric) order, case-insensitive.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    alphanumeric_sort::compare_str(a.to_lowercase(), b.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::entry::EntryKind;
    use std::path::PathBuf;
    use std::time::{Duration, SystemTime};

    fn file(name: &str) -> Entry {
        Entry::new(PathBuf::from("/t").join(name), EntryKind::File)
    }

    fn folder(name: &str) -> Entry {
        Entry::new(PathBuf::from("/t").join(name), EntryKind::Folder)
    }

    fn names(entries: &[Entry]) -> Vec<&str> {
        entries.iter().map(|e| e.name()).collect()
    }

    fn by_name(folders_first: bool) -> SortOptions {
        SortOptions {
            field: SortField::Name,
            direction: SortDirection::Ascending,
            folders_first,
        }
    }

    #[test]
    fn natural_order_puts_numbers_in_value_order() {
        let entries = vec![file("b.txt"), file("a2.txt"), file("a10.txt")];
        let sorted = sort_entries(&entries, by_name(true));
        assert_eq!(names(&sorted), vec!["a2.txt", "a10.txt", "b.txt"]);
    }

    #[test]
    fn folders_first_agreeing_with_name_order() {
        let entries = vec![file("b.txt"), folder("a")];
        assert_eq!(names(&sort_entries(&entries, by_name(true))), vec!["a", "b.txt"]);
        assert_eq!(names(&sort_entries(&entries, by_name(false))), vec!["a", "b.txt"]);
    }

    #[test]
    fn folders_first_disagreeing_with_name_order() {
        let entries = vec![file("1.txt"), folder("z")];
        assert_eq!(names(&sort_entries(&entries, by_name(true))), vec!["z", "1.txt"]);
        assert_eq!(names(&sort_entries(&entries, by_name(false))), vec!["1.txt", "z"]);
    }

    #[test]
    fn folders_stay_first_when_descending() {
        let entries = vec![file("a.txt"), folder("docs"), file("z.txt"), folder("src")];
        let options = SortOptions {
            direction: SortDirection::Descending,
            ..by_name(true)
        };
        assert_eq!(
            names(&sort_entries(&entries, options)),
            vec!["src", "docs", "z.txt", "a.txt"]
        );
    }

    #[test]
    fn name_sort_is_case_insensitive() {
        let entries = vec![file("Banana"), file("apple"), file("Cherry")];
        assert_eq!(
            names(&sort_entries(&entries, by_name(false))),
            vec!["apple", "Banana", "Cherry"]
        );
    }

    #[test]
    fn size_sort_breaks_ties_by_name() {
        let entries = vec![
            file("c").with_size(Some(10)),
            file("b").with_size(Some(5)),
            file("a").with_size(Some(10)),
        ];
        let options = SortOptions {
            field: SortField::Size,
            ..by_name(true)
        };
        assert_eq!(names(&sort_entries(&entries, options)), vec!["b", "a", "c"]);
    }

    #[test]
    fn modified_sort_missing_times_first_ascending() {
        let t = |s| Some(SystemTime::UNIX_EPOCH + Duration::from_secs(s));
        let entries = vec![
            file("new").with_modified(t(300)),
            file("unknown"),
            file("old").with_modified(t(100)),
        ];
        let options = SortOptions {
            field: SortField::Modified,
            ..by_name(true)
        };
        assert_eq!(
            names(&sort_entries(&entries, options)),
            vec!["unknown", "old", "new"]
        );

        let desc = SortOptions {
            direction: SortDirection::Descending,
            ..options
        };
        assert_eq!(
            names(&sort_entries(&entries, desc)),
            vec!["new", "old", "unknown"]
        );
    }

    #[test]
    fn type_sort_groups_extensions() {
        let entries = vec![file("b.txt"), file("a.rs"), file("c.md"), file("d.rs")];
        let options = SortOptions {
            field: SortField::Type,
            ..by_name(true)
        };
        assert_eq!(
            names(&sort_entries(&entries, options)),
            vec!["c.md", "a.rs", "d.rs", "b.txt"]
        );
    }

    #[test]
    fn trash_keys_sort_by_deletion_and_origin() {
        let t = |s| Some(SystemTime::UNIX_EPOCH + Duration::from_secs(s));
        let entries = vec![
            file("x").with_deleted(t(50)).with_original_location(Some("/home/b".into())),
            file("y").with_deleted(t(10)).with_original_location(Some("/home/a".into())),
        ];
        let deleted = SortOptions {
            field: SortField::DateDeleted,
            ..by_name(true)
        };
        assert_eq!(names(&sort_entries(&entries, deleted)), vec!["y", "x"]);

        let origin = SortOptions {
            field: SortField::OriginalLocation,
            ..by_name(true)
        };
        assert_eq!(names(&sort_entries(&entries, origin)), vec!["y", "x"]);
    }

    #[test]
    fn pinned_entries_come_first() {
        let entries = vec![
            file("a"),
            file("z").with_sort_index(Some(1)),
            file("m").with_sort_index(Some(0)),
        ];
        assert_eq!(
            names(&sort_entries(&entries, by_name(true))),
            vec!["m", "z", "a"]
        );
    }

    #[test]
    fn sort_does_not_mutate_input() {
        let entries = vec![file("b"), file("a")];
        let _ = sort_entries(&entries, by_name(true));
        assert_eq!(names(&entries), vec!["b", "a"]);
    }

    #[test]
    fn sort_empty_entries() {
        assert!(sort_entries(&[], by_name(true)).is_empty());
    }

    #[test]
    fn identical_names_fall_back_to_path() {
        let a = Entry::new("/x/same".into(), EntryKind::File);
        let b = Entry::new("/a/same".into(), EntryKind::File);
        let sorted = sort_entries(&[a, b], by_name(true));
        assert_eq!(sorted[0].path(), std::path::Path::new("/a/same"));
    }
}
