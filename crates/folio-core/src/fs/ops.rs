//! Stat helpers for single paths.

use std::path::Path;

use crate::error::{CoreError, CoreResult};
use crate::fs::entry::Entry;

/// Checks that `path` exists and is a readable directory before a walk.
///
/// # Errors
///
/// - [`CoreError::NotFound`]: the path does not exist.
/// - [`CoreError::NotADirectory`]: the path is not a directory.
/// - [`CoreError::PermissionDenied`]: stat access is denied.
pub fn probe_directory(path: &Path) -> CoreResult<()> {
    let metadata = std::fs::metadata(path).map_err(|e| CoreError::from_io(e, path))?;
    if !metadata.is_dir() {
        return Err(CoreError::NotADirectory(path.to_path_buf()));
    }
    Ok(())
}

/// Reads a single entry without following symlinks.
///
/// Used when the watcher reports a new or changed path and the pipeline
/// needs fresh metadata for it.
///
/// # Errors
///
/// - [`CoreError::NotFound`] if the path vanished in the meantime.
/// - [`CoreError::PermissionDenied`] if it cannot be stat'ed.
pub fn read_entry(path: &Path) -> CoreResult<Entry> {
    let metadata = std::fs::symlink_metadata(path).map_err(|e| CoreError::from_io(e, path))?;
    Ok(Entry::from_metadata(path.to_path_buf(), &metadata))
}

/// Like [`read_entry`] but follows symlinks, falling back to the link
/// itself when the target is dangling.
pub fn read_entry_followed(path: &Path) -> CoreResult<Entry> {
    match std::fs::metadata(path) {
        Ok(metadata) => Ok(Entry::from_metadata(path.to_path_buf(), &metadata)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => read_entry(path),
        Err(e) => Err(CoreError::from_io(e, path)),
    }
}
