//! Virtual folders served by an out-of-process provider (trash, network
//! hosts, remote protocols, archives).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{EntryIter, EnumerationSource, SourceKind};
use crate::error::{CoreError, CoreResult};
use crate::fs::entry::{Entry, EntryKind, ProviderTag};

/// Message name sent to list a virtual folder.
pub const ENUMERATE_MESSAGE: &str = "Enumerate";
/// Request payload key carrying the folder path.
pub const PATH_KEY: &str = "path";
/// Response payload key carrying the JSON item array.
pub const ITEMS_KEY: &str = "items";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderRequest {
    pub message: String,
    pub payload: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderStatus {
    Success,
    /// The collaborator is not running or refused the connection.
    Unavailable,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderResponse {
    pub status: ProviderStatus,
    pub payload: BTreeMap<String, String>,
}

/// Request/response link to a provider process.
#[async_trait]
pub trait ProviderChannel: Send + Sync {
    async fn request(&self, request: ProviderRequest) -> CoreResult<ProviderResponse>;
}

fn default_kind() -> EntryKind {
    EntryKind::File
}

/// One item as described by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderItem {
    pub path: PathBuf,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_kind")]
    pub kind: EntryKind,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub created: Option<SystemTime>,
    #[serde(default)]
    pub modified: Option<SystemTime>,
    #[serde(default)]
    pub deleted: Option<SystemTime>,
    #[serde(default)]
    pub original_location: Option<PathBuf>,
    #[serde(default)]
    pub sort_index: Option<u32>,
    #[serde(default)]
    pub type_name: Option<String>,
    #[serde(default)]
    pub hidden: bool,
}

impl ProviderItem {
    pub fn into_entry(self, provider: ProviderTag) -> Entry {
        let entry = Entry::new(self.path, self.kind);
        let entry = match self.name {
            Some(name) => entry.with_name(name),
            None => entry,
        };
        let is_hidden = entry.is_hidden() || self.hidden;
        entry
            .with_size(self.size)
            .with_created(self.created)
            .with_modified(self.modified)
            .with_deleted(self.deleted)
            .with_original_location(self.original_location)
            .with_sort_index(self.sort_index)
            .with_type_name(self.type_name)
            .with_hidden(is_hidden)
            .with_provider(provider)
    }
}

/// An [`EnumerationSource`] backed by a [`ProviderChannel`].
///
/// Must be enumerated from inside a tokio runtime context (for example a
/// `spawn_blocking` task). If the provider is unavailable, fails, or does
/// not answer within the timeout, the folder is reported as empty.
pub struct VirtualSource {
    tag: ProviderTag,
    channel: Arc<dyn ProviderChannel>,
    timeout: Duration,
}

impl std::fmt::Debug for VirtualSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualSource")
            .field("tag", &self.tag)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl VirtualSource {
    pub fn new(tag: ProviderTag, channel: Arc<dyn ProviderChannel>, timeout: Duration) -> Self {
        Self {
            tag,
            channel,
            timeout,
        }
    }

    async fn fetch(&self, path: &Path, token: &CancellationToken) -> CoreResult<Vec<Entry>> {
        let mut payload = BTreeMap::new();
        payload.insert(PATH_KEY.to_string(), path.to_string_lossy().into_owned());
        let request = ProviderRequest {
            message: ENUMERATE_MESSAGE.to_string(),
            payload,
        };

        let response = tokio::select! {
            _ = token.cancelled() => return Err(CoreError::Cancelled),
            res = tokio::time::timeout(self.timeout, self.channel.request(request)) => {
                res.map_err(|_| CoreError::Provider(format!("timed out after {:?}", self.timeout)))??
            }
        };

        if response.status != ProviderStatus::Success {
            return Err(CoreError::Provider(format!("status {:?}", response.status)));
        }
        let Some(raw) = response.payload.get(ITEMS_KEY) else {
            return Ok(Vec::new());
        };
        let items: Vec<ProviderItem> =
            serde_json::from_str(raw).map_err(|e| CoreError::Provider(e.to_string()))?;
        debug!(count = items.len(), tag = ?self.tag, "provider returned items");
        Ok(items
            .into_iter()
            .map(|item| item.into_entry(self.tag.clone()))
            .collect())
    }
}

impl EnumerationSource for VirtualSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Virtual
    }

    fn supports_batching(&self) -> bool {
        false
    }

    fn enumerate(&self, path: &Path, token: &CancellationToken) -> CoreResult<EntryIter> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| CoreError::Provider(e.to_string()))?;
        match handle.block_on(self.fetch(path, token)) {
            Ok(entries) => Ok(Box::new(entries.into_iter().map(Ok))),
            Err(CoreError::Cancelled) => Err(CoreError::Cancelled),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "provider enumeration failed, showing empty folder");
                Ok(Box::new(std::iter::empty()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(ProviderResponse);

    #[async_trait]
    impl ProviderChannel for Fixed {
        async fn request(&self, request: ProviderRequest) -> CoreResult<ProviderResponse> {
            assert_eq!(request.message, ENUMERATE_MESSAGE);
            assert!(request.payload.contains_key(PATH_KEY));
            Ok(self.0.clone())
        }
    }

    struct Silent;

    #[async_trait]
    impl ProviderChannel for Silent {
        async fn request(&self, _request: ProviderRequest) -> CoreResult<ProviderResponse> {
            std::future::pending().await
        }
    }

    fn items_response(json: &str) -> ProviderResponse {
        let mut payload = BTreeMap::new();
        payload.insert(ITEMS_KEY.to_string(), json.to_string());
        ProviderResponse {
            status: ProviderStatus::Success,
            payload,
        }
    }

    async fn run(source: VirtualSource) -> CoreResult<Vec<Entry>> {
        tokio::task::spawn_blocking(move || {
            let token = CancellationToken::new();
            source
                .enumerate(Path::new("trash://"), &token)
                .map(|iter| iter.filter_map(Result::ok).collect())
        })
        .await
        .unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn decodes_provider_items() {
        let json = r#"[
            {"path": "trash://a.txt", "size": 4, "original_location": "/home/u"},
            {"path": "trash://docs", "kind": "Folder", "sort_index": 0}
        ]"#;
        let source = VirtualSource::new(
            ProviderTag::Trash,
            Arc::new(Fixed(items_response(json))),
            Duration::from_secs(1),
        );
        let entries = run(source).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].original_location(), Some(Path::new("/home/u")));
        assert_eq!(entries[0].provider(), &ProviderTag::Trash);
        assert!(entries[1].is_folder());
        assert_eq!(entries[1].sort_index(), Some(0));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unavailable_provider_is_empty() {
        let source = VirtualSource::new(
            ProviderTag::Trash,
            Arc::new(Fixed(ProviderResponse {
                status: ProviderStatus::Unavailable,
                payload: BTreeMap::new(),
            })),
            Duration::from_secs(1),
        );
        assert!(run(source).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn malformed_items_are_empty() {
        let source = VirtualSource::new(
            ProviderTag::Network,
            Arc::new(Fixed(items_response("not json"))),
            Duration::from_secs(1),
        );
        assert!(run(source).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn timeout_is_empty() {
        let source = VirtualSource::new(
            ProviderTag::Network,
            Arc::new(Silent),
            Duration::from_millis(20),
        );
        assert!(run(source).await.unwrap().is_empty());
    }

    #[test]
    fn outside_runtime_is_an_error() {
        let source = VirtualSource::new(
            ProviderTag::Trash,
            Arc::new(Silent),
            Duration::from_millis(20),
        );
        let token = CancellationToken::new();
        assert!(matches!(
            source.enumerate(Path::new("trash://"), &token),
            Err(CoreError::Provider(_))
        ));
    }
}
