//! Reporting of action outcomes.
//!
//! The dispatcher never returns failures to its caller. Everything it
//! observes about an action goes through an [`ActionReporter`], which is
//! constructed once at startup and shared by reference.

use std::path::Path;

use super::dispatcher::ActionOutcome;
use super::error::ActionError;
use super::event::Action;

/// Sink for action lifecycle reports.
pub trait ActionReporter: Send + Sync {
    /// An async action program was started.
    fn launched(&self, action: Action, program: &Path, path: &Path);

    /// A sync action program exited with code 0.
    fn succeeded(&self, action: Action, program: &Path, path: &Path, outcome: &ActionOutcome);

    /// An action program could not be started or exited unsuccessfully.
    fn failed(&self, action: Action, error: &ActionError);
}

/// Reporter that writes through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ActionReporter for TracingReporter {
    fn launched(&self, action: Action, program: &Path, path: &Path) {
        crate::debug_event!(
            action,
            "launched",
            "['{}' '{}']",
            program.display(),
            path.display()
        );
    }

    fn succeeded(&self, action: Action, program: &Path, path: &Path, outcome: &ActionOutcome) {
        crate::log_event!(
            action,
            "succeeded",
            "['{}' '{}']",
            program.display(),
            path.display()
        );
        if let Some(stderr) = outcome.stderr.as_deref() {
            tracing::warn!("[{action}] stderr from {}: {}", program.display(), stderr.trim_end());
        }
    }

    fn failed(&self, action: Action, error: &ActionError) {
        match error {
            ActionError::Execution {
                stderr: Some(stderr),
                ..
            } => {
                tracing::error!("[{action}] {error}\n{}", stderr.trim_end());
            }
            _ => {
                tracing::error!("[{action}] {error}");
            }
        }
    }
}
