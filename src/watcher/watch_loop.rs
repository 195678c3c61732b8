//! The watch loop: source watcher -> classifier -> dispatcher.
//!
//! A worker task consumes the event stream and dispatches one event at a
//! time. The task that calls [`WatchLoop::run`] only waits for the stop
//! signal, checks that the root still exists, and tears everything down.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

use super::classifier::classify;
use super::dispatcher::{ActionConfig, ActionDispatcher};
use super::error::WatchError;
use super::event::{RawEvent, RawEventKind};
use super::report::ActionReporter;
use super::source::{EventStream, SourceOptions, SourceWatcher};

/// Lifecycle of a [`WatchLoop`]. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
    Stopped,
}

/// Watches one directory tree and dispatches actions until stopped.
pub struct WatchLoop {
    root: PathBuf,
    config: Arc<ActionConfig>,
    reporter: Arc<dyn ActionReporter>,
    source_options: SourceOptions,
    health_check: Duration,
    state: LoopState,
}

impl WatchLoop {
    pub fn new(root: PathBuf, config: ActionConfig, reporter: Arc<dyn ActionReporter>) -> Self {
        Self {
            root,
            config: Arc::new(config),
            reporter,
            source_options: SourceOptions::default(),
            health_check: Duration::from_secs(1),
            state: LoopState::Idle,
        }
    }

    /// Set the source watcher backend options.
    pub fn source_options(mut self, options: SourceOptions) -> Self {
        self.source_options = options;
        self
    }

    /// Set how often the root directory is checked for existence.
    pub fn health_check_interval(mut self, every: Duration) -> Self {
        self.health_check = every.max(Duration::from_millis(10));
        self
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Watch until `shutdown` completes or the watcher fails.
    ///
    /// Actions already running when `shutdown` fires are allowed to finish.
    /// The source watcher is released on every exit path before this returns.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<(), WatchError>
    where
        F: Future<Output = ()>,
    {
        if self.state != LoopState::Idle {
            return Err(WatchError::InitFailed {
                reason: format!("watch loop is {:?}, not Idle", self.state),
            });
        }

        let root = self.root.clone();
        let options = self.source_options.clone();
        let started = tokio::task::spawn_blocking(move || SourceWatcher::start(&root, &options))
            .await
            .unwrap_or_else(|e| {
                Err(WatchError::InitFailed {
                    reason: format!("source watcher task failed: {e}"),
                })
            });

        let (source, events) = match started {
            Ok(started) => started,
            Err(e) => {
                self.state = LoopState::Stopped;
                return Err(e);
            }
        };

        let result = self.drive(events, shutdown).await;

        if let Err(e) = tokio::task::spawn_blocking(move || source.stop()).await {
            tracing::warn!("[watcher] failed to stop cleanly: {e}");
        }
        self.state = LoopState::Stopped;

        result
    }

    /// Consume `events` on a worker task until shutdown or a fault.
    async fn drive<F>(&mut self, events: EventStream, shutdown: F) -> Result<(), WatchError>
    where
        F: Future<Output = ()>,
    {
        self.state = LoopState::Running;

        let cancel = CancellationToken::new();
        let worker = Worker {
            root: self.root.clone(),
            dispatcher: ActionDispatcher::new(self.config.clone(), self.reporter.clone()),
        };
        let mut handle = tokio::spawn(worker.run(events, cancel.clone()));

        crate::log_event!(
            "watcher",
            "started",
            "{} mode",
            if self.config.is_sync() { "sync" } else { "async" }
        );

        let mut ticker = interval(self.health_check);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        let exit = loop {
            tokio::select! {
                _ = &mut shutdown => {
                    crate::log_event!("watcher", "stop requested");
                    break Exit::Shutdown;
                }

                joined = &mut handle => {
                    break Exit::WorkerDone(flatten(joined));
                }

                _ = ticker.tick() => {
                    if !self.root.is_dir() {
                        break Exit::Fault(WatchError::RootUnavailable {
                            path: self.root.clone(),
                        });
                    }
                }
            }
        };

        // No new events are classified past this point
        cancel.cancel();

        match exit {
            Exit::WorkerDone(result) => result,
            Exit::Shutdown => flatten(handle.await),
            Exit::Fault(fault) => {
                if let Err(e) = flatten(handle.await) {
                    crate::debug_event!("watcher", "worker ended", "{e}");
                }
                Err(fault)
            }
        }
    }
}

enum Exit {
    Shutdown,
    Fault(WatchError),
    WorkerDone(Result<(), WatchError>),
}

fn flatten(joined: Result<Result<(), WatchError>, tokio::task::JoinError>) -> Result<(), WatchError> {
    joined.unwrap_or_else(|e| {
        Err(WatchError::EventError {
            details: format!("event worker failed: {e}"),
        })
    })
}

/// Classifies and dispatches events one at a time.
struct Worker {
    root: PathBuf,
    dispatcher: ActionDispatcher,
}

impl Worker {
    async fn run(self, mut events: EventStream, cancel: CancellationToken) -> Result<(), WatchError> {
        loop {
            let item = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                item = events.recv() => item,
            };

            match item {
                Some(Ok(event)) => {
                    if self.is_root_removal(&event) {
                        return Err(WatchError::RootUnavailable {
                            path: self.root.clone(),
                        });
                    }
                    self.handle(event).await;
                }
                Some(Err(fault)) => {
                    if !self.root.is_dir() {
                        return Err(WatchError::RootUnavailable {
                            path: self.root.clone(),
                        });
                    }
                    tracing::error!("[watcher] {fault}");
                }
                None => return Err(WatchError::ChannelClosed),
            }
        }
    }

    fn is_root_removal(&self, event: &RawEvent) -> bool {
        matches!(event.kind, RawEventKind::Deleted | RawEventKind::MovedFrom)
            && event.path == self.root
            && !self.root.is_dir()
    }

    async fn handle(&self, event: RawEvent) {
        match classify(&event, self.dispatcher.config()) {
            Some(decision) => {
                crate::log_event!("watcher", event.kind.label(), "{}", event.path.display());
                self.dispatcher.dispatch(&decision).await;
            }
            None => {
                crate::debug_event!(
                    "watcher",
                    "ignored",
                    "{:?} {}{}",
                    event.kind,
                    event.path.display(),
                    if event.is_directory { " (directory)" } else { "" }
                );
            }
        }
    }
}
