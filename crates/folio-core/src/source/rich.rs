use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::{EntryIter, EnumerationSource, SourceKind, SyncStatusProbe};
use crate::error::{CoreError, CoreResult};
use crate::fs::entry::Entry;
use crate::fs::ops::read_entry_followed;

/// Slower walk that follows symlinks and fills type names and sync status.
///
/// Used where the fast walk is refused (access-restricted or unusual
/// filesystems) and for folders configured as cloud-backed.
#[derive(Default, Clone)]
pub struct RichWalk {
    sync_probe: Option<Arc<dyn SyncStatusProbe>>,
}

impl std::fmt::Debug for RichWalk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RichWalk")
            .field("sync_probe", &self.sync_probe.is_some())
            .finish()
    }
}

impl RichWalk {
    pub fn with_sync_probe(self, probe: Arc<dyn SyncStatusProbe>) -> Self {
        Self {
            sync_probe: Some(probe),
        }
    }

    fn describe(&self, path: &Path) -> CoreResult<Entry> {
        let entry = read_entry_followed(path)?;
        let type_name = if entry.is_folder() {
            "Folder".to_string()
        } else {
            mime_guess::from_path(path)
                .first_or_octet_stream()
                .essence_str()
                .to_string()
        };
        let sync_status = self.sync_probe.as_ref().and_then(|p| p.status(path));
        Ok(entry
            .with_type_name(Some(type_name))
            .with_sync_status(sync_status))
    }
}

impl EnumerationSource for RichWalk {
    fn kind(&self) -> SourceKind {
        SourceKind::RichWalk
    }

    fn enumerate(&self, path: &Path, token: &CancellationToken) -> CoreResult<EntryIter> {
        let reader = std::fs::read_dir(path).map_err(|e| CoreError::from_io(e, path))?;
        let token = token.clone();
        let walker = self.clone();
        let iter = reader
            .take_while(move |_| !token.is_cancelled())
            .map(move |item| -> CoreResult<Entry> {
                let dir_entry = item?;
                walker.describe(&dir_entry.path())
            });
        Ok(Box::new(iter))
    }
}
