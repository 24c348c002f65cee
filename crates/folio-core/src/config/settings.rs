//! Listing configuration loaded from a TOML file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::nav::filter::Visibility;
use crate::nav::group::{GroupOption, GroupOptions};
use crate::nav::sort::{SortDirection, SortField, SortOptions};

/// Top-level configuration.
///
/// Every field has a default, so an empty or partial file is valid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub listing: ListingConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub watch: WatchConfig,
}

impl Config {
    /// Loads configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// - [`CoreError::NotFound`] if the file does not exist.
    /// - [`CoreError::PermissionDenied`] if the file is not readable.
    /// - [`CoreError::ConfigParse`] if the TOML is malformed.
    pub fn load(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| CoreError::from_io(e, path))?;
        Self::parse(&content)
    }

    /// Parses configuration from TOML text.
    pub fn parse(content: &str) -> CoreResult<Self> {
        toml::from_str(content).map_err(|e| CoreError::ConfigParse(e.to_string()))
    }

    pub fn visibility(&self) -> Visibility {
        Visibility {
            show_hidden: self.listing.show_hidden,
            hide_system: self.listing.hide_system,
            show_dot_files: self.listing.show_dot_files,
        }
    }

    pub fn sort_options(&self) -> SortOptions {
        SortOptions {
            field: self.listing.sort,
            direction: self.listing.sort_direction,
            folders_first: !self.listing.folders_alongside_files,
        }
    }

    pub fn group_options(&self) -> GroupOptions {
        GroupOptions {
            option: self.listing.group,
            direction: self.listing.group_direction,
        }
    }
}

/// What a listing shows and how it is ordered and streamed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingConfig {
    #[serde(default)]
    pub show_hidden: bool,
    #[serde(default = "default_true")]
    pub hide_system: bool,
    #[serde(default)]
    pub show_dot_files: bool,
    #[serde(default)]
    pub sort: SortField,
    #[serde(default)]
    pub sort_direction: SortDirection,
    #[serde(default)]
    pub group: GroupOption,
    #[serde(default)]
    pub group_direction: SortDirection,
    /// Mix folders with files instead of listing them first.
    #[serde(default)]
    pub folders_alongside_files: bool,
    /// Suggest a README file for selection after a load.
    #[serde(default)]
    pub select_readme: bool,
    /// Items read before the first flush.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_batch_interval_ms")]
    pub batch_interval_ms: u64,
    #[serde(default = "default_provider_timeout_ms")]
    pub provider_timeout_ms: u64,
    /// Folders that are always listed with the rich walk.
    #[serde(default)]
    pub rich_walk_prefixes: Vec<PathBuf>,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            show_hidden: false,
            hide_system: true,
            show_dot_files: false,
            sort: SortField::default(),
            sort_direction: SortDirection::default(),
            group: GroupOption::default(),
            group_direction: SortDirection::default(),
            folders_alongside_files: false,
            select_readme: false,
            batch_size: default_batch_size(),
            batch_interval_ms: default_batch_interval_ms(),
            provider_timeout_ms: default_provider_timeout_ms(),
            rich_walk_prefixes: Vec::new(),
        }
    }
}

impl ListingConfig {
    pub fn batch_interval(&self) -> Duration {
        Duration::from_millis(self.batch_interval_ms)
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }
}

/// Listing cache behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_cap_per_folder")]
    pub cap_per_folder: usize,
    /// Warm the cache for subfolders after a load.
    #[serde(default)]
    pub preemptive: bool,
    #[serde(default = "default_preemptive_folder_limit")]
    pub preemptive_folder_limit: usize,
    /// Records older than this are not shown as a first draft; 0 disables
    /// the check.
    #[serde(default)]
    pub draft_max_age_secs: u64,
    /// Folders kept before the oldest-written record is dropped.
    #[serde(default = "default_max_folders")]
    pub max_folders: usize,
    /// Persist the cache to this JSON file instead of keeping it in memory.
    #[serde(default)]
    pub file: Option<PathBuf>,
    /// Quiet period before a changed file cache is written back.
    #[serde(default = "default_save_delay_ms")]
    pub save_delay_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cap_per_folder: default_cap_per_folder(),
            preemptive: false,
            preemptive_folder_limit: default_preemptive_folder_limit(),
            draft_max_age_secs: 0,
            max_folders: default_max_folders(),
            file: None,
            save_delay_ms: default_save_delay_ms(),
        }
    }
}

impl CacheConfig {
    pub fn draft_max_age(&self) -> Duration {
        Duration::from_secs(self.draft_max_age_secs)
    }

    pub fn save_delay(&self) -> Duration {
        Duration::from_millis(self.save_delay_ms)
    }
}

/// Live update settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_wake_interval_ms")]
    pub wake_interval_ms: u64,
    /// Modified items refreshed per pass.
    #[serde(default = "default_update_batch_size")]
    pub update_batch_size: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            wake_interval_ms: default_wake_interval_ms(),
            update_batch_size: default_update_batch_size(),
        }
    }
}

impl WatchConfig {
    pub fn wake_interval(&self) -> Duration {
        Duration::from_millis(self.wake_interval_ms)
    }
}

fn default_true() -> bool {
    true
}

fn default_batch_size() -> usize {
    32
}

fn default_batch_interval_ms() -> u64 {
    500
}

fn default_provider_timeout_ms() -> u64 {
    5_000
}

fn default_cap_per_folder() -> usize {
    crate::cache::DEFAULT_CAP
}

fn default_max_folders() -> usize {
    256
}

fn default_save_delay_ms() -> u64 {
    1_000
}

fn default_preemptive_folder_limit() -> usize {
    8
}

fn default_wake_interval_ms() -> u64 {
    200
}

fn default_update_batch_size() -> usize {
    32
}
