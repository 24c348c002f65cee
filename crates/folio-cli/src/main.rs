//! Folio: prints a folder listing and follows it live.
//!
//! ```text
//! folio [--config FILE] [PATH]
//! ```
//!
//! Logs go to stderr; set `FOLIO_LOG` to change the filter.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use folio_core::{
    CollectionChanged, Config, DirectoryView, Entry, EntryKind, Event, ListingContext, LoadOutcome,
    LoadStatus, SettingsHandle,
};

#[derive(Debug, PartialEq, Eq)]
struct Args {
    config: Option<PathBuf>,
    path: Option<PathBuf>,
}

impl Args {
    fn parse(mut args: impl Iterator<Item = String>) -> anyhow::Result<Self> {
        let mut parsed = Args {
            config: None,
            path: None,
        };
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" | "-c" => {
                    let file = args.next().context("--config needs a file")?;
                    parsed.config = Some(PathBuf::from(file));
                }
                flag if flag.starts_with('-') => bail!("unknown option: {flag}"),
                _ if parsed.path.is_some() => bail!("only one folder can be shown"),
                _ => parsed.path = Some(PathBuf::from(arg)),
            }
        }
        Ok(parsed)
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env("FOLIO_LOG")
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_config(file: Option<&PathBuf>) -> anyhow::Result<Config> {
    match file {
        Some(file) => Config::load(file).with_context(|| format!("loading {}", file.display())),
        None => Ok(Config::default()),
    }
}

fn format_entry(entry: &Entry) -> String {
    let marker = match entry.kind() {
        EntryKind::Folder => 'd',
        EntryKind::AlternateStream => ':',
        EntryKind::Synthetic => '*',
        EntryKind::File if entry.is_symlink() => 'l',
        EntryKind::File => '-',
    };
    let size = entry
        .size()
        .map(|s| s.to_string())
        .unwrap_or_else(|| "-".to_string());
    format!("{marker} {size:>12}  {}", entry.name())
}

fn print_listing(entries: &[Entry]) {
    for entry in entries {
        println!("{}", format_entry(entry));
    }
}

fn describe(event: &Event) -> Option<String> {
    match event {
        Event::LoadStatus {
            path,
            status: LoadStatus::Complete,
        } => Some(format!("loaded {}", path.display())),
        Event::LoadStatus { .. } => None,
        Event::ItemsLoaded {
            count, from_cache, ..
        } => from_cache.then(|| format!("{count} items from cache")),
        Event::DirectoryInfoUpdated { .. } => None,
        Event::SelectionRequested { item, .. } => Some(format!("select {}", item.display())),
        Event::LoadFailed { path, outcome } => {
            Some(format!("cannot open {}: {outcome:?}", path.display()))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = Args::parse(std::env::args().skip(1))?;
    let config = load_config(args.config.as_ref())?;
    let path = match args.path {
        Some(path) => path,
        None => std::env::current_dir().context("failed to get current directory")?,
    };

    let settings = SettingsHandle::new(config);
    let ctx = Arc::new(ListingContext::new(settings));
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let view = DirectoryView::new(ctx, events_tx);
    view.follow_settings();
    let mut changes = view.collection().subscribe();

    let outcome = view.load_directory(&path, true).await;
    if outcome != LoadOutcome::Complete {
        bail!("cannot open {}: {outcome:?}", path.display());
    }
    while changes.try_recv().is_ok() {}
    while let Ok(event) = events_rx.try_recv() {
        if let Some(line) = describe(&event) {
            eprintln!("{line}");
        }
    }
    print_listing(&view.collection().snapshot());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            Some(change) = changes.recv() => {
                if change == CollectionChanged::Reset {
                    println!("--- {}", path.display());
                    print_listing(&view.collection().snapshot());
                }
            }
            Some(event) = events_rx.recv() => {
                if let Some(line) = describe(&event) {
                    eprintln!("{line}");
                }
            }
        }
    }

    view.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    fn args(list: &[&str]) -> anyhow::Result<Args> {
        Args::parse(list.iter().map(|s| s.to_string()))
    }

    #[test]
    fn parses_path_and_config() {
        let parsed = args(&["--config", "folio.toml", "/tmp"]).unwrap();
        assert_eq!(parsed.config, Some(PathBuf::from("folio.toml")));
        assert_eq!(parsed.path, Some(PathBuf::from("/tmp")));
    }

    #[test]
    fn rejects_unknown_flags_and_extra_paths() {
        assert!(args(&["--verbose"]).is_err());
        assert!(args(&["a", "b"]).is_err());
        assert!(args(&["--config"]).is_err());
    }

    #[test]
    fn formats_files_and_folders() {
        let file = Entry::new("/d/notes.txt".into(), EntryKind::File)
            .with_size(Some(42))
            .with_modified(Some(UNIX_EPOCH + Duration::from_secs(1)));
        let folder = Entry::new("/d/sub".into(), EntryKind::Folder);
        assert!(format_entry(&file).starts_with('-'));
        assert!(format_entry(&file).ends_with("42  notes.txt"));
        assert!(format_entry(&folder).starts_with("d            -"));
    }

    #[test]
    fn config_file_is_loaded() {
        let tmp = tempfile::TempDir::new().unwrap();
        let file = tmp.path().join("folio.toml");
        std::fs::write(&file, "[listing]\nshow_hidden = true\n").unwrap();
        let config = load_config(Some(&file)).unwrap();
        assert!(config.listing.show_hidden);
    }
}
