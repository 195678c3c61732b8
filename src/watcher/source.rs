//! Recursive directory watcher producing [`RawEvent`]s.
//!
//! Wraps either the platform's native notify backend or notify's polling
//! backend and translates its events into the closed [`RawEventKind`] set.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::event::{CreateKind, MetadataKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Config, Event, EventKind, PollWatcher, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::{WatchBackend, WatchConfig};

use super::error::WatchError;
use super::event::{RawEvent, RawEventKind};

/// Stream of translated events, or backend faults.
pub type EventStream = mpsc::Receiver<Result<RawEvent, WatchError>>;

/// How the source watcher observes the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceOptions {
    pub backend: WatchBackend,
    pub poll_interval: Duration,
    /// Bound on undelivered events. A full channel blocks the backend.
    pub channel_capacity: usize,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self::from(&WatchConfig::default())
    }
}

impl From<&WatchConfig> for SourceOptions {
    fn from(config: &WatchConfig) -> Self {
        Self {
            backend: config.backend,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            channel_capacity: config.channel_capacity,
        }
    }
}

enum NotifyBackend {
    Native(RecommendedWatcher),
    Poll(PollWatcher),
}

impl NotifyBackend {
    fn watch(&mut self, path: &Path) -> notify::Result<()> {
        match self {
            Self::Native(watcher) => watcher.watch(path, RecursiveMode::Recursive),
            Self::Poll(watcher) => watcher.watch(path, RecursiveMode::Recursive),
        }
    }

    fn unwatch(&mut self, path: &Path) -> notify::Result<()> {
        match self {
            Self::Native(watcher) => watcher.unwatch(path),
            Self::Poll(watcher) => watcher.unwatch(path),
        }
    }
}

/// Owns the OS watch handle for one root directory.
///
/// The handle is released by [`SourceWatcher::stop`] or on drop.
pub struct SourceWatcher {
    root: PathBuf,
    backend: Option<NotifyBackend>,
}

impl SourceWatcher {
    /// Start watching `root` recursively.
    ///
    /// Blocks while the backend registers the tree, so call it off the
    /// async executor (the watch loop uses `spawn_blocking`).
    pub fn start(root: &Path, options: &SourceOptions) -> Result<(Self, EventStream), WatchError> {
        let (tx, rx) = mpsc::channel(options.channel_capacity.max(1));

        let handler = move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if event.need_rescan() {
                    tracing::warn!("[watcher] backend dropped events, some changes may be missed");
                }
                for raw in translate(&event) {
                    // Receiver gone means the loop is shutting down
                    if tx.blocking_send(Ok(raw)).is_err() {
                        return;
                    }
                }
            }
            Err(e) => {
                let _ = tx.blocking_send(Err(WatchError::EventError {
                    details: e.to_string(),
                }));
            }
        };

        let mut backend = match options.backend {
            WatchBackend::Native => {
                NotifyBackend::Native(RecommendedWatcher::new(handler, Config::default())?)
            }
            WatchBackend::Poll => NotifyBackend::Poll(PollWatcher::new(
                handler,
                Config::default().with_poll_interval(options.poll_interval),
            )?),
        };

        backend
            .watch(root)
            .map_err(|e| WatchError::PathWatchFailed {
                path: root.to_path_buf(),
                reason: e.to_string(),
            })?;

        crate::log_event!(
            "watcher",
            "watching",
            "{} ({:?} backend)",
            root.display(),
            options.backend
        );

        Ok((
            Self {
                root: root.to_path_buf(),
                backend: Some(backend),
            },
            rx,
        ))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Stop watching and release the backend handle.
    pub fn stop(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(mut backend) = self.backend.take() {
            if let Err(e) = backend.unwatch(&self.root) {
                // Expected when the root itself is gone
                crate::debug_event!("watcher", "unwatch failed", "{e}");
            }
            drop(backend);
            crate::log_event!("watcher", "stopped", "{}", self.root.display());
        }
    }
}

impl Drop for SourceWatcher {
    fn drop(&mut self) {
        self.release();
    }
}

/// Translate one notify event into zero or more raw events.
pub fn translate(event: &Event) -> Vec<RawEvent> {
    let paths = &event.paths;

    match event.kind {
        EventKind::Create(kind) => {
            let hint = match kind {
                CreateKind::Folder => Some(true),
                CreateKind::File => Some(false),
                _ => None,
            };
            each(paths, RawEventKind::Created, hint)
        }

        EventKind::Remove(kind) => {
            let hint = match kind {
                RemoveKind::Folder => Some(true),
                RemoveKind::File => Some(false),
                _ => None,
            };
            each(paths, RawEventKind::Deleted, hint)
        }

        EventKind::Modify(ModifyKind::Name(mode)) => match mode {
            RenameMode::From => each(paths, RawEventKind::MovedFrom, None),
            RenameMode::To => each(paths, RawEventKind::MovedTo, None),
            // Backends that pair a rename (inotify) also report its two halves
            RenameMode::Both => Vec::new(),
            // Backends that cannot tell the two sides apart
            RenameMode::Any | RenameMode::Other => paths
                .iter()
                .map(|path| {
                    if path.exists() {
                        RawEvent::new(path, RawEventKind::MovedTo, path.is_dir())
                    } else {
                        RawEvent::new(path, RawEventKind::MovedFrom, false)
                    }
                })
                .collect(),
        },

        EventKind::Modify(ModifyKind::Metadata(MetadataKind::AccessTime)) => Vec::new(),
        EventKind::Modify(_) => each(paths, RawEventKind::Modified, None),

        EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
    }
}

fn each(paths: &[PathBuf], kind: RawEventKind, is_directory: Option<bool>) -> Vec<RawEvent> {
    paths
        .iter()
        .map(|path| RawEvent::new(path, kind, is_directory.unwrap_or_else(|| path.is_dir())))
        .collect()
}
