//! Configuration management.
//!
//! Preferences ([`settings::Config`]) are stored as TOML and loaded at
//! startup. At runtime they are shared through a [`SettingsHandle`] so open
//! views can react when the user changes them.

pub mod settings;

use std::sync::Arc;

use tokio::sync::watch;

pub use settings::Config;

/// How a view has to react to a settings change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SettingsChange {
    None,
    /// Ordering or grouping changed: re-sort and republish.
    Reorder,
    /// Visibility or source selection changed: enumerate again.
    Reload,
}

impl SettingsChange {
    pub fn between(old: &Config, new: &Config) -> Self {
        if old.visibility() != new.visibility()
            || old.listing.rich_walk_prefixes != new.listing.rich_walk_prefixes
        {
            return SettingsChange::Reload;
        }
        if old.sort_options() != new.sort_options() || old.group_options() != new.group_options()
        {
            return SettingsChange::Reorder;
        }
        SettingsChange::None
    }
}

/// Shared, observable settings.
#[derive(Debug, Clone)]
pub struct SettingsHandle {
    tx: Arc<watch::Sender<Config>>,
}

impl Default for SettingsHandle {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl SettingsHandle {
    pub fn new(config: Config) -> Self {
        let (tx, _rx) = watch::channel(config);
        Self { tx: Arc::new(tx) }
    }

    /// Returns a copy of the current settings.
    pub fn current(&self) -> Config {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Config> {
        self.tx.subscribe()
    }

    /// Edits the settings in place and notifies subscribers.
    pub fn update(&self, edit: impl FnOnce(&mut Config)) {
        self.tx.send_modify(edit);
    }

    pub fn replace(&self, config: Config) {
        self.tx.send_replace(config);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nav::sort::SortField;

    #[test]
    fn change_classification() {
        let base = Config::default();

        let mut hidden = base.clone();
        hidden.listing.show_hidden = true;
        assert_eq!(SettingsChange::between(&base, &hidden), SettingsChange::Reload);

        let mut sorted = base.clone();
        sorted.listing.sort = SortField::Size;
        assert_eq!(SettingsChange::between(&base, &sorted), SettingsChange::Reorder);

        let mut cache = base.clone();
        cache.cache.cap_per_folder = 4;
        assert_eq!(SettingsChange::between(&base, &cache), SettingsChange::None);
    }

    #[tokio::test]
    async fn subscribers_see_updates() {
        let handle = SettingsHandle::default();
        let mut rx = handle.subscribe();
        handle.update(|c| c.listing.show_hidden = true);
        rx.changed().await.unwrap();
        assert!(rx.borrow().listing.show_hidden);
        assert!(handle.current().listing.show_hidden);
    }
}
