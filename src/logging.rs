//! Logging setup.
//!
//! Provides compact timestamped logging with per-module level configuration.
//!
//! # Configuration
//!
//! ```toml
//! [logging]
//! default = "info"
//!
//! [logging.modules]
//! "watchpuppy::watcher" = "debug"
//! ```
//!
//! # Environment Variables
//!
//! Checked in order, the first one set wins over the config:
//! ```bash
//! RUST_LOG=watchpuppy=trace watchpuppy ./inbox --insert-action ./ingest.sh
//! WATCHPUPPY_LOG_LEVEL=debug watchpuppy ./inbox --insert-action ./ingest.sh
//! LOG_LEVEL=warn watchpuppy ./inbox --insert-action ./ingest.sh
//! ```

use std::sync::Once;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;

static INIT: Once = Once::new();

/// Plain level variables, checked after `RUST_LOG`.
const LEVEL_VARS: [&str; 2] = ["WATCHPUPPY_LOG_LEVEL", "LOG_LEVEL"];

/// Compact time format: HH:MM:SS.mmm
struct CompactTime;

impl FormatTime for CompactTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%H:%M:%S%.3f"))
    }
}

/// Initialize logging with configuration.
///
/// Call once at startup. Later calls are ignored.
pub fn init_with_config(config: &LoggingConfig) {
    INIT.call_once(|| {
        let directives = filter_directives(config, |name| std::env::var(name).ok());
        let filter = EnvFilter::try_new(&directives).unwrap_or_else(|e| {
            eprintln!("Invalid log filter '{directives}': {e}, falling back to info");
            EnvFilter::new("info")
        });

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_timer(CompactTime)
            .with_level(true)
            .with_filter(filter);

        tracing_subscriber::registry().with(fmt_layer).init();
    });
}

/// Build the filter string from the environment and config.
fn filter_directives(config: &LoggingConfig, env: impl Fn(&str) -> Option<String>) -> String {
    if let Some(rust_log) = env("RUST_LOG").filter(|v| !v.trim().is_empty()) {
        return rust_log;
    }

    let level = LEVEL_VARS
        .iter()
        .find_map(|name| env(name).filter(|v| !v.trim().is_empty()))
        .map(|v| v.trim().to_lowercase())
        .unwrap_or_else(|| config.default.clone());

    let mut directives = level;
    for (module, level) in &config.modules {
        directives.push_str(&format!(",{module}={level}"));
    }
    directives
}

/// Log an event with component context.
///
/// # Examples
/// ```ignore
/// log_event!("watcher", "watching", "{}", root.display());
/// log_event!("watcher", "started");
/// ```
#[macro_export]
macro_rules! log_event {
    ($component:expr, $event:expr) => {
        tracing::info!("[{}] {}", $component, $event)
    };
    ($component:expr, $event:expr, $($arg:tt)*) => {
        tracing::info!("[{}] {}: {}", $component, $event, format!($($arg)*))
    };
}

/// Debug-only event logging.
///
/// # Examples
/// ```ignore
/// debug_event!("classifier", "ignored", "{}", path.display());
/// ```
#[macro_export]
macro_rules! debug_event {
    ($component:expr, $event:expr) => {
        tracing::debug!("[{}] {}", $component, $event)
    };
    ($component:expr, $event:expr, $($arg:tt)*) => {
        tracing::debug!("[{}] {}: {}", $component, $event, format!($($arg)*))
    };
}
