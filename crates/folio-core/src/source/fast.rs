use std::path::Path;

use tokio_util::sync::CancellationToken;

use super::{EntryIter, EnumerationSource, SourceKind};
use crate::error::{CoreError, CoreResult};
use crate::fs::entry::Entry;

/// Plain `read_dir` walk. Symlinks are reported as links, not followed.
#[derive(Debug, Default, Clone, Copy)]
pub struct FastWalk;

impl EnumerationSource for FastWalk {
    fn kind(&self) -> SourceKind {
        SourceKind::FastWalk
    }

    fn enumerate(&self, path: &Path, token: &CancellationToken) -> CoreResult<EntryIter> {
        let reader = std::fs::read_dir(path).map_err(|e| CoreError::from_io(e, path))?;
        let token = token.clone();
        let iter = reader
            .take_while(move |_| !token.is_cancelled())
            .map(|item| -> CoreResult<Entry> {
                let dir_entry = item?;
                let metadata = dir_entry.metadata()?;
                Ok(Entry::from_metadata(dir_entry.path(), &metadata))
            });
        Ok(Box::new(iter))
    }
}
