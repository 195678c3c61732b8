//! Error types for the watcher and action dispatch.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from the watch mechanism itself.
///
/// These are the only errors that can end a [`WatchLoop`](super::WatchLoop).
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Failed to initialize watcher: {reason}")]
    InitFailed { reason: String },

    #[error("Cannot watch path {path}: {reason}")]
    PathWatchFailed { path: PathBuf, reason: String },

    #[error("File system event error: {details}")]
    EventError { details: String },

    #[error("Watched root {path} is no longer available")]
    RootUnavailable { path: PathBuf },

    #[error("Channel closed unexpectedly")]
    ChannelClosed,
}

impl From<notify::Error> for WatchError {
    fn from(e: notify::Error) -> Self {
        WatchError::InitFailed {
            reason: e.to_string(),
        }
    }
}

/// Failure of a single action invocation.
///
/// Never propagated past the dispatcher; handed to the reporter instead.
#[derive(Error, Debug)]
pub enum ActionError {
    #[error("Failed to launch {program} for {path}: {source}")]
    Launch {
        program: PathBuf,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} failed for {path}: {reason}")]
    Execution {
        program: PathBuf,
        path: PathBuf,
        code: Option<i32>,
        reason: String,
        stderr: Option<String>,
    },
}

impl ActionError {
    /// Exit code of the failed child, when it exited normally.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ActionError::Launch { .. } => None,
            ActionError::Execution { code, .. } => *code,
        }
    }

    /// The action program involved.
    pub fn program(&self) -> &PathBuf {
        match self {
            ActionError::Launch { program, .. } | ActionError::Execution { program, .. } => program,
        }
    }

    /// The file the action was invoked for.
    pub fn path(&self) -> &PathBuf {
        match self {
            ActionError::Launch { path, .. } | ActionError::Execution { path, .. } => path,
        }
    }
}
