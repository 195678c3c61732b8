//! Runs the configured action program for a dispatch decision.
//!
//! In sync mode the dispatcher waits for the child and reports its exit
//! status. In async mode it returns as soon as the child is spawned; the
//! child is reaped on a background task so it never lingers as a zombie.
//!
//! Failures never leave this module. They are handed to the
//! [`ActionReporter`] and `dispatch` returns normally.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use tokio::process::Command;
use tokio::sync::Semaphore;

use crate::config::ConfigError;

use super::error::ActionError;
use super::event::{Action, DispatchDecision};
use super::report::ActionReporter;

/// Which programs to run and how to run them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionConfig {
    insert_program: Option<PathBuf>,
    delete_program: Option<PathBuf>,
    sync: bool,
    max_concurrent: Option<usize>,
}

impl ActionConfig {
    /// Create a config. At least one program must be given.
    pub fn new(
        insert_program: Option<PathBuf>,
        delete_program: Option<PathBuf>,
        sync: bool,
    ) -> Result<Self, ConfigError> {
        if insert_program.is_none() && delete_program.is_none() {
            return Err(ConfigError::NoActionConfigured);
        }

        Ok(Self {
            insert_program,
            delete_program,
            sync,
            max_concurrent: None,
        })
    }

    /// Cap the number of live async children. `0` means unbounded.
    ///
    /// Caps above [`Semaphore::MAX_PERMITS`] are clamped to it.
    pub fn with_max_concurrent(mut self, limit: Option<usize>) -> Self {
        self.max_concurrent = limit
            .filter(|n| *n > 0)
            .map(|n| n.min(Semaphore::MAX_PERMITS));
        self
    }

    pub fn insert_program(&self) -> Option<&Path> {
        self.insert_program.as_deref()
    }

    pub fn delete_program(&self) -> Option<&Path> {
        self.delete_program.as_deref()
    }

    pub fn is_sync(&self) -> bool {
        self.sync
    }

    pub fn max_concurrent(&self) -> Option<usize> {
        self.max_concurrent
    }

    /// Program configured for the given action, if any.
    pub fn program_for(&self, action: Action) -> Option<&Path> {
        match action {
            Action::Insert => self.insert_program(),
            Action::Delete => self.delete_program(),
        }
    }
}

/// Result of a completed action program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutcome {
    /// `None` when the child was terminated by a signal.
    pub exit_code: Option<i32>,
    /// Captured diagnostic output, if the child wrote any.
    pub stderr: Option<String>,
    pub failure_reason: Option<String>,
}

impl ActionOutcome {
    fn from_status(status: ExitStatus, stderr: Option<String>) -> Self {
        let failure_reason = (!status.success()).then(|| describe_status(status));
        Self {
            exit_code: status.code(),
            stderr,
            failure_reason,
        }
    }

    pub fn is_success(&self) -> bool {
        self.failure_reason.is_none()
    }

    fn into_error(self, program: &Path, path: &Path) -> ActionError {
        ActionError::Execution {
            program: program.to_path_buf(),
            path: path.to_path_buf(),
            code: self.exit_code,
            reason: self
                .failure_reason
                .unwrap_or_else(|| "unknown failure".to_string()),
            stderr: self.stderr,
        }
    }
}

fn describe_status(status: ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("exited with code {code}");
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return format!("terminated by signal {signal}");
        }
    }

    "terminated without an exit code".to_string()
}

/// Executes dispatch decisions against an [`ActionConfig`].
pub struct ActionDispatcher {
    config: Arc<ActionConfig>,
    reporter: Arc<dyn ActionReporter>,
    /// Bounds live async children when a cap is configured.
    limiter: Option<Arc<Semaphore>>,
}

impl ActionDispatcher {
    pub fn new(config: Arc<ActionConfig>, reporter: Arc<dyn ActionReporter>) -> Self {
        let limiter = config
            .max_concurrent()
            .map(|n| Arc::new(Semaphore::new(n)));

        Self {
            config,
            reporter,
            limiter,
        }
    }

    pub fn config(&self) -> &ActionConfig {
        &self.config
    }

    /// Run the program selected by `decision`.
    ///
    /// Returns after the child exits (sync) or after it is spawned (async).
    pub async fn dispatch(&self, decision: &DispatchDecision) {
        let action = decision.action;
        let Some(program) = self.config.program_for(action) else {
            crate::debug_event!(action, "no program configured", "{}", decision.path.display());
            return;
        };

        crate::debug_event!(
            action,
            "running",
            "['{}' '{}']",
            program.display(),
            decision.path.display()
        );

        if self.config.is_sync() {
            match run_to_completion(program, &decision.path).await {
                Ok(outcome) => {
                    self.reporter
                        .succeeded(action, program, &decision.path, &outcome);
                }
                Err(e) => self.reporter.failed(action, &e),
            }
        } else {
            self.launch_detached(action, program, &decision.path).await;
        }
    }

    async fn launch_detached(&self, action: Action, program: &Path, path: &Path) {
        // Wait for a free slot before spawning when a cap is configured
        let permit = match &self.limiter {
            Some(limiter) => Arc::clone(limiter).acquire_owned().await.ok(),
            None => None,
        };

        let mut child = match Command::new(program)
            .arg(path)
            .stdin(Stdio::null())
            .spawn()
        {
            Ok(child) => child,
            Err(source) => {
                self.reporter.failed(
                    action,
                    &ActionError::Launch {
                        program: program.to_path_buf(),
                        path: path.to_path_buf(),
                        source,
                    },
                );
                return;
            }
        };

        self.reporter.launched(action, program, path);

        let reporter = Arc::clone(&self.reporter);
        let program = program.to_path_buf();
        let path = path.to_path_buf();

        tokio::spawn(async move {
            let _permit = permit;
            match child.wait().await {
                Ok(status) => {
                    let outcome = ActionOutcome::from_status(status, None);
                    if outcome.is_success() {
                        crate::debug_event!(action, "exited", "{}", path.display());
                    } else {
                        reporter.failed(action, &outcome.into_error(&program, &path));
                    }
                }
                Err(e) => {
                    tracing::warn!("[{action}] failed to reap {}: {e}", program.display());
                }
            }
        });
    }
}

/// Run `program path` and wait for it, capturing stderr.
async fn run_to_completion(program: &Path, path: &Path) -> Result<ActionOutcome, ActionError> {
    let output = Command::new(program)
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|source| ActionError::Launch {
            program: program.to_path_buf(),
            path: path.to_path_buf(),
            source,
        })?;

    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    let stderr = (!stderr.trim().is_empty()).then_some(stderr);

    let outcome = ActionOutcome::from_status(output.status, stderr);
    if outcome.is_success() {
        Ok(outcome)
    } else {
        Err(outcome.into_error(program, path))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq)]
    enum Report {
        Launched(Action, PathBuf),
        Succeeded(Action, PathBuf, ActionOutcome),
        Failed(Action, Option<i32>, String),
    }

    #[derive(Default)]
    struct RecordingReporter {
        reports: Mutex<Vec<Report>>,
    }

    impl RecordingReporter {
        fn reports(&self) -> Vec<Report> {
            self.reports.lock().clone()
        }

        fn failures(&self) -> Vec<Report> {
            self.reports()
                .into_iter()
                .filter(|r| matches!(r, Report::Failed(..)))
                .collect()
        }
    }

    impl ActionReporter for RecordingReporter {
        fn launched(&self, action: Action, _program: &Path, path: &Path) {
            self.reports
                .lock()
                .push(Report::Launched(action, path.to_path_buf()));
        }

        fn succeeded(&self, action: Action, _program: &Path, path: &Path, outcome: &ActionOutcome) {
            self.reports.lock().push(Report::Succeeded(
                action,
                path.to_path_buf(),
                outcome.clone(),
            ));
        }

        fn failed(&self, action: Action, error: &ActionError) {
            self.reports
                .lock()
                .push(Report::Failed(action, error.exit_code(), error.to_string()));
        }
    }

    /// Writes a shell script that `/bin/sh` runs when given its path.
    fn script(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, format!("{body}\n")).unwrap();
        path
    }

    fn dispatcher(
        insert: Option<&str>,
        delete: Option<&str>,
        sync: bool,
    ) -> (ActionDispatcher, Arc<RecordingReporter>) {
        let config = ActionConfig::new(insert.map(PathBuf::from), delete.map(PathBuf::from), sync)
            .unwrap();
        dispatcher_with(config)
    }

    fn dispatcher_with(config: ActionConfig) -> (ActionDispatcher, Arc<RecordingReporter>) {
        let reporter = Arc::new(RecordingReporter::default());
        let dispatcher = ActionDispatcher::new(Arc::new(config), reporter.clone());
        (dispatcher, reporter)
    }

    async fn wait_for_failures(reporter: &RecordingReporter, count: usize) -> Vec<Report> {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let failures = reporter.failures();
            if failures.len() >= count || Instant::now() > deadline {
                return failures;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    #[test]
    fn test_config_requires_an_action() {
        let result = ActionConfig::new(None, None, true);
        assert!(matches!(result, Err(ConfigError::NoActionConfigured)));
    }

    #[test]
    fn test_zero_cap_means_unbounded() {
        let config = ActionConfig::new(Some("/bin/true".into()), None, false)
            .unwrap()
            .with_max_concurrent(Some(0));
        assert_eq!(config.max_concurrent(), None);
    }

    #[tokio::test]
    async fn test_huge_cap_is_clamped() {
        let config = ActionConfig::new(Some("/bin/true".into()), None, false)
            .unwrap()
            .with_max_concurrent(Some(usize::MAX));
        assert_eq!(config.max_concurrent(), Some(Semaphore::MAX_PERMITS));

        let (dispatcher, reporter) = dispatcher_with(config);
        dispatcher.dispatch(&DispatchDecision::insert("/tmp/x")).await;
        assert_eq!(
            reporter.reports(),
            vec![Report::Launched(Action::Insert, PathBuf::from("/tmp/x"))]
        );
    }

    #[tokio::test]
    async fn test_sync_success_returns_after_exit() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("done");
        let body = format!("sleep 0.3\ntouch '{}'", marker.display());
        let action = script(&dir, "slow_ok.sh", &body);

        let (dispatcher, reporter) = dispatcher(Some("/bin/sh"), None, true);

        let start = Instant::now();
        dispatcher.dispatch(&DispatchDecision::insert(&action)).await;

        assert!(start.elapsed() >= Duration::from_millis(300));
        assert!(marker.exists(), "dispatch returned before the action finished");
        assert!(reporter.failures().is_empty());

        let reports = reporter.reports();
        assert_eq!(reports.len(), 1);
        match &reports[0] {
            Report::Succeeded(Action::Insert, path, outcome) => {
                assert_eq!(path, &action);
                assert_eq!(outcome.exit_code, Some(0));
                assert!(outcome.is_success());
            }
            other => panic!("unexpected report: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_sync_nonzero_exit_is_reported() {
        let dir = TempDir::new().unwrap();
        let failing = script(&dir, "fail.sh", "echo boom >&2\nexit 3");

        let (dispatcher, reporter) = dispatcher(Some("/bin/sh"), Some("/bin/sh"), true);

        dispatcher.dispatch(&DispatchDecision::delete(&failing)).await;

        let failures = reporter.failures();
        assert_eq!(failures.len(), 1);
        match &failures[0] {
            Report::Failed(Action::Delete, code, message) => {
                assert_eq!(*code, Some(3));
                assert!(message.contains("exited with code 3"), "{message}");
            }
            other => panic!("unexpected report: {other:?}"),
        }

        // The dispatcher keeps working after a failure
        let ok = script(&dir, "ok.sh", "exit 0");
        dispatcher.dispatch(&DispatchDecision::insert(&ok)).await;
        assert!(matches!(
            reporter.reports().last(),
            Some(Report::Succeeded(Action::Insert, _, _))
        ));
    }

    #[tokio::test]
    async fn test_sync_captures_stderr() {
        let dir = TempDir::new().unwrap();
        let failing = script(&dir, "noisy.sh", "echo 'disk full' >&2\nexit 1");

        let config = ActionConfig::new(Some("/bin/sh".into()), None, true).unwrap();
        let reporter = Arc::new(RecordingReporter::default());
        let dispatcher = ActionDispatcher::new(Arc::new(config), reporter.clone());

        let error = run_to_completion(Path::new("/bin/sh"), &failing)
            .await
            .unwrap_err();
        match error {
            ActionError::Execution { code, stderr, .. } => {
                assert_eq!(code, Some(1));
                assert_eq!(stderr.as_deref().map(str::trim), Some("disk full"));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        // Zero exit with stderr output is still a success
        let chatty = script(&dir, "chatty.sh", "echo 'note' >&2");
        dispatcher.dispatch(&DispatchDecision::insert(&chatty)).await;
        match reporter.reports().as_slice() {
            [Report::Succeeded(_, _, outcome)] => {
                assert_eq!(outcome.stderr.as_deref().map(str::trim), Some("note"));
            }
            other => panic!("unexpected reports: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_program_is_a_launch_failure() {
        for sync in [true, false] {
            let (dispatcher, reporter) =
                dispatcher(Some("/nonexistent/watchpuppy-action"), None, sync);

            dispatcher
                .dispatch(&DispatchDecision::insert("/tmp/watch/a.txt"))
                .await;

            let failures = reporter.failures();
            assert_eq!(failures.len(), 1, "sync={sync}");
            match &failures[0] {
                Report::Failed(Action::Insert, None, message) => {
                    assert!(message.contains("Failed to launch"), "{message}");
                    assert!(message.contains("/nonexistent/watchpuppy-action"));
                }
                other => panic!("unexpected report: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_async_returns_before_slow_action_finishes() {
        // `sleep` receives the decision path as its duration
        let (dispatcher, reporter) = dispatcher(Some("/bin/sleep"), None, false);

        let start = Instant::now();
        dispatcher.dispatch(&DispatchDecision::insert("5")).await;

        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(
            reporter.reports(),
            vec![Report::Launched(Action::Insert, PathBuf::from("5"))]
        );
    }

    #[tokio::test]
    async fn test_async_nonzero_exit_is_reaped_and_reported() {
        let dir = TempDir::new().unwrap();
        let failing = script(&dir, "fail.sh", "exit 4");

        let (dispatcher, reporter) = dispatcher(None, Some("/bin/sh"), false);
        dispatcher.dispatch(&DispatchDecision::delete(&failing)).await;

        let failures = wait_for_failures(&reporter, 1).await;
        assert_eq!(failures.len(), 1);
        assert!(matches!(failures[0], Report::Failed(Action::Delete, Some(4), _)));
    }

    #[tokio::test]
    async fn test_concurrency_cap_applies_backpressure() {
        let config = ActionConfig::new(Some("/bin/sleep".into()), None, false)
            .unwrap()
            .with_max_concurrent(Some(1));
        let (dispatcher, _reporter) = dispatcher_with(config);

        let start = Instant::now();
        dispatcher.dispatch(&DispatchDecision::insert("0.4")).await;
        assert!(start.elapsed() < Duration::from_millis(300));

        // Second launch waits for the first child to be reaped
        dispatcher.dispatch(&DispatchDecision::insert("0.1")).await;
        assert!(start.elapsed() >= Duration::from_millis(350));
    }

    #[tokio::test]
    async fn test_unconfigured_action_is_skipped() {
        let (dispatcher, reporter) = dispatcher(Some("/bin/true"), None, true);

        dispatcher
            .dispatch(&DispatchDecision::delete("/tmp/watch/a.txt"))
            .await;

        assert!(reporter.reports().is_empty());
    }
}
