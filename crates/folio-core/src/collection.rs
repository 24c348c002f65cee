//! Observable list handed to the presentation layer.
//!
//! [`BulkCollection`] notifies subscribers of every individual edit, except
//! while a bulk operation is open: edits made between
//! [`BulkCollection::begin_bulk`] and [`BulkCollection::end_bulk`] are
//! silent, and closing the bulk sends a single [`CollectionChanged::Reset`].

use std::ops::Range;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// Change notification sent to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionChanged<T> {
    /// `items` were appended at the end.
    Added { index: usize, items: Vec<T> },
    /// `items` were inserted at `index`.
    Inserted { index: usize, items: Vec<T> },
    Removed { index: usize, count: usize },
    Replaced { index: usize, items: Vec<T> },
    /// The contents changed wholesale; re-read everything.
    Reset,
}

struct Inner<T> {
    items: Vec<T>,
    bulk_depth: u32,
    subscribers: Vec<UnboundedSender<CollectionChanged<T>>>,
}

impl<T: Clone> Inner<T> {
    fn notify(&mut self, change: CollectionChanged<T>) {
        if self.bulk_depth > 0 {
            return;
        }
        self.subscribers.retain(|s| s.send(change.clone()).is_ok());
    }
}

/// Thread-safe list with bulk-update support.
pub struct BulkCollection<T> {
    inner: Mutex<Inner<T>>,
}

impl<T: Clone + PartialEq> Default for BulkCollection<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for BulkCollection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BulkCollection").finish_non_exhaustive()
    }
}

impl<T: Clone + PartialEq> BulkCollection<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: Vec::new(),
                bulk_depth: 0,
                subscribers: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Registers a new listener.
    pub fn subscribe(&self) -> UnboundedReceiver<CollectionChanged<T>> {
        let (tx, rx) = unbounded_channel();
        self.lock().subscribers.push(tx);
        rx
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    /// Copies the current contents.
    pub fn snapshot(&self) -> Vec<T> {
        self.lock().items.clone()
    }

    pub fn get(&self, index: usize) -> Option<T> {
        self.lock().items.get(index).cloned()
    }

    pub fn is_bulk(&self) -> bool {
        self.lock().bulk_depth > 0
    }

    pub fn push(&self, item: T) {
        let mut inner = self.lock();
        let index = inner.items.len();
        inner.items.push(item.clone());
        inner.notify(CollectionChanged::Added {
            index,
            items: vec![item],
        });
    }

    /// Inserts `items` at `index` (clamped to the length).
    pub fn insert_range(&self, index: usize, items: Vec<T>) {
        if items.is_empty() {
            return;
        }
        let mut inner = self.lock();
        let index = index.min(inner.items.len());
        inner.items.splice(index..index, items.iter().cloned());
        inner.notify(CollectionChanged::Inserted { index, items });
    }

    /// Removes `range` (clamped to the length).
    pub fn remove_range(&self, range: Range<usize>) {
        let mut inner = self.lock();
        let end = range.end.min(inner.items.len());
        let start = range.start.min(end);
        if start == end {
            return;
        }
        inner.items.drain(start..end);
        inner.notify(CollectionChanged::Removed {
            index: start,
            count: end - start,
        });
    }

    /// Overwrites the items starting at `index`; items past the end are
    /// appended.
    pub fn replace_range(&self, index: usize, items: Vec<T>) {
        if items.is_empty() {
            return;
        }
        let mut inner = self.lock();
        let index = index.min(inner.items.len());
        let end = (index + items.len()).min(inner.items.len());
        inner.items.splice(index..end, items.iter().cloned());
        inner.notify(CollectionChanged::Replaced { index, items });
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        if inner.items.is_empty() {
            return;
        }
        inner.items.clear();
        inner.notify(CollectionChanged::Reset);
    }

    /// Opens a bulk operation. Bulk operations nest.
    pub fn begin_bulk(&self) {
        self.lock().bulk_depth += 1;
    }

    /// Closes a bulk operation; the outermost close sends one `Reset`.
    pub fn end_bulk(&self) {
        let mut inner = self.lock();
        if inner.bulk_depth == 0 {
            return;
        }
        inner.bulk_depth -= 1;
        if inner.bulk_depth == 0 {
            inner.notify(CollectionChanged::Reset);
        }
    }

    /// Edits the contents into `target` with range operations: runs of
    /// differing items are replaced, the tail is appended or removed.
    ///
    /// The whole diff runs under one lock, so readers see either the old or
    /// the new contents. Outside a bulk operation every range edit is
    /// notified; see [`Self::publish`] for the single-`Reset` form.
    pub fn apply_diff(&self, target: &[T]) {
        let mut inner = self.lock();
        let shared = inner.items.len().min(target.len());
        let mut i = 0;
        while i < shared {
            if inner.items[i] == target[i] {
                i += 1;
                continue;
            }
            let start = i;
            while i < shared && inner.items[i] != target[i] {
                i += 1;
            }
            inner.items[start..i].clone_from_slice(&target[start..i]);
            inner.notify(CollectionChanged::Replaced {
                index: start,
                items: target[start..i].to_vec(),
            });
        }

        let current = inner.items.len();
        if target.len() > current {
            inner.items.extend_from_slice(&target[current..]);
            inner.notify(CollectionChanged::Inserted {
                index: current,
                items: target[current..].to_vec(),
            });
        } else if current > target.len() {
            inner.items.truncate(target.len());
            inner.notify(CollectionChanged::Removed {
                index: target.len(),
                count: current - target.len(),
            });
        }
    }

    /// Replaces the contents with `target` in one step: no per-item
    /// notifications, exactly one `Reset` (deferred to the outermost
    /// [`Self::end_bulk`] when a bulk operation is open).
    pub fn publish(&self, target: &[T]) {
        let mut inner = self.lock();
        inner.items.clear();
        inner.items.extend_from_slice(target);
        inner.notify(CollectionChanged::Reset);
    }
}
