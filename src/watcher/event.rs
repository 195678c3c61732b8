//! Raw filesystem events and the dispatch decisions derived from them.

use std::fmt;
use std::path::PathBuf;

/// Kind of a raw filesystem notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RawEventKind {
    Created,
    Modified,
    Deleted,
    /// Source side of a rename.
    MovedFrom,
    /// Destination side of a rename.
    MovedTo,
}

impl RawEventKind {
    /// Short label used in log lines.
    pub fn label(&self) -> &'static str {
        match self {
            RawEventKind::Created => "new file",
            RawEventKind::Modified => "file modified",
            RawEventKind::Deleted => "file deleted",
            RawEventKind::MovedFrom => "file moved away",
            RawEventKind::MovedTo => "file moved in",
        }
    }
}

/// One notification from the source watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub path: PathBuf,
    pub kind: RawEventKind,
    pub is_directory: bool,
}

impl RawEvent {
    pub fn new(path: impl Into<PathBuf>, kind: RawEventKind, is_directory: bool) -> Self {
        Self {
            path: path.into(),
            kind,
            is_directory,
        }
    }

    /// Shorthand for a file (non-directory) event.
    pub fn file(path: impl Into<PathBuf>, kind: RawEventKind) -> Self {
        Self::new(path, kind, false)
    }
}

/// Logical action selected for a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Insert,
    Delete,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Insert => "insert",
            Action::Delete => "delete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An action to run for one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchDecision {
    pub action: Action,
    pub path: PathBuf,
}

impl DispatchDecision {
    pub fn insert(path: impl Into<PathBuf>) -> Self {
        Self {
            action: Action::Insert,
            path: path.into(),
        }
    }

    pub fn delete(path: impl Into<PathBuf>) -> Self {
        Self {
            action: Action::Delete,
            path: path.into(),
        }
    }
}
