//! Watch command - validate settings and run the watch loop until signalled.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use crate::config::{Settings, resolve_root};
use crate::watcher::{ActionConfig, SourceOptions, TracingReporter, WatchLoop};

/// Run the watch command.
///
/// Returns once a stop signal has been handled, or with an error when the
/// configuration is invalid or the watcher fails.
pub async fn run(directory: &Path, settings: &Settings) -> anyhow::Result<()> {
    let root = resolve_root(directory)?;

    let actions = &settings.actions;
    let config = ActionConfig::new(actions.insert.clone(), actions.delete.clone(), actions.sync)?
        .with_max_concurrent(Some(actions.max_concurrent));

    crate::log_event!(
        "watchpuppy",
        "starting",
        "{} (insert: {}, delete: {})",
        root.display(),
        display_program(config.insert_program()),
        display_program(config.delete_program())
    );

    let mut watch = WatchLoop::new(root, config, Arc::new(TracingReporter))
        .source_options(SourceOptions::from(&settings.watch))
        .health_check_interval(Duration::from_millis(settings.watch.health_check_ms));

    watch
        .run(shutdown_signal())
        .await
        .with_context(|| format!("watching {} failed", watch.root().display()))?;

    crate::log_event!("watchpuppy", "stopped");
    Ok(())
}

fn display_program(program: Option<&Path>) -> String {
    program
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Resolves on SIGINT (ctrl+c) or, on unix, SIGTERM.
pub async fn shutdown_signal() {
    tokio::select! {
        _ = ctrl_c() => {}
        _ = terminate() => {}
    }
    crate::log_event!("watchpuppy", "received shutdown signal");
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("[watchpuppy] cannot listen for ctrl+c: {e}");
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            term.recv().await;
        }
        Err(e) => {
            tracing::warn!("[watchpuppy] cannot listen for SIGTERM: {e}");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}
