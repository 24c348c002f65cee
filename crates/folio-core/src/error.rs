//! Error types for `folio-core`.
//!
//! All fallible operations in the core library return [`CoreResult<T>`],
//! which is an alias for `Result<T, CoreError>`. Conditions the UI should
//! show to the user (unauthorized, missing, locked) are turned into a
//! [`crate::listing::LoadOutcome`] at the view boundary rather than being
//! propagated as errors.

use std::path::{Path, PathBuf};

/// Unified error type for all core operations.
///
/// Each variant captures just enough context for the caller to display
/// a meaningful message or take corrective action.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The target path does not exist.
    #[error("path not found: {0}")]
    NotFound(PathBuf),

    /// The process lacks permission to access the path.
    #[error("permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// A directory was expected but the path points to a file.
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),

    /// The volume holding the path is locked (e.g. encrypted and not unlocked).
    #[error("volume locked: {0}")]
    Locked(PathBuf),

    /// Failed to parse a TOML configuration file.
    #[error("config parse error: {0}")]
    ConfigParse(String),

    /// The operation was superseded or explicitly cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// An enumeration provider failed or answered with an unusable payload.
    #[error("provider error: {0}")]
    Provider(String),

    /// The change watcher could not be started or failed while running.
    #[error("watch error: {0}")]
    Watch(String),

    /// A cache record could not be decoded.
    #[error("cache record corrupt: {0}")]
    CacheCorrupt(String),

    /// A native change-notification buffer was malformed.
    #[error("malformed notification record: {0}")]
    Decode(String),

    /// An I/O error that doesn't fit a more specific variant.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Maps an I/O error on `path` to the most specific variant.
    pub fn from_io(err: std::io::Error, path: &Path) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => CoreError::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => CoreError::PermissionDenied(path.to_path_buf()),
            _ => CoreError::Io(err),
        }
    }

    /// Returns `true` for failures that should make the orchestrator retry
    /// with the rich walk instead of giving up.
    pub fn is_fast_walk_fallback(&self) -> bool {
        match self {
            CoreError::PermissionDenied(_) => true,
            CoreError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::Unsupported | std::io::ErrorKind::InvalidInput
            ),
            _ => false,
        }
    }
}

/// Convenience alias used throughout `folio-core`.
pub type CoreResult<T> = Result<T, CoreError>;
