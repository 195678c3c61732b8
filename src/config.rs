//! Layered configuration for watchpuppy.
//!
//! Sources, later ones win:
//! - Default values
//! - TOML configuration file (`--config <file>` or `./watchpuppy.toml`)
//! - Environment variables
//! - CLI argument overrides (applied by the caller)
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `WATCHPUPPY_` and use double
//! underscores to separate nested levels:
//! - `WATCHPUPPY_WATCH__BACKEND=poll` sets `watch.backend`
//! - `WATCHPUPPY_ACTIONS__SYNC=true` sets `actions.sync`
//! - `WATCHPUPPY_LOGGING__DEFAULT=debug` sets `logging.default`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Settings file picked up from the working directory when present.
pub const DEFAULT_CONFIG_FILE: &str = "watchpuppy.toml";

const ENV_PREFIX: &str = "WATCHPUPPY_";

/// Invalid startup configuration. Fatal before the watcher is built.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Directory {0} does not exist")]
    MissingDirectory(PathBuf),

    #[error("{0} is not a directory")]
    NotADirectory(PathBuf),

    #[error("At least one of --insert-action or --delete-action must be provided")]
    NoActionConfigured,

    #[error("Config file {0} does not exist")]
    MissingConfigFile(PathBuf),

    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct Settings {
    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Filesystem watching settings
    #[serde(default)]
    pub watch: WatchConfig,

    /// Action programs
    #[serde(default)]
    pub actions: ActionsConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Default level for all targets
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-target overrides, e.g. `watchpuppy::watcher = "debug"`
    #[serde(default)]
    pub modules: BTreeMap<String, String>,
}

/// Which notify backend observes the tree.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum WatchBackend {
    /// inotify, FSEvents, ReadDirectoryChangesW, ...
    #[default]
    Native,
    /// Periodic rescans. Works on network mounts where native events are unreliable.
    Poll,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct WatchConfig {
    #[serde(default)]
    pub backend: WatchBackend,

    /// Rescan period for the poll backend
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Maximum queued events before the backend is throttled
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// How often the watch loop verifies the root still exists
    #[serde(default = "default_health_check_ms")]
    pub health_check_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct ActionsConfig {
    /// Program run for created, modified and moved-in files
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insert: Option<PathBuf>,

    /// Program run for deleted and moved-out files
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete: Option<PathBuf>,

    /// Wait for each action to finish before handling the next event
    #[serde(default)]
    pub sync: bool,

    /// Cap on concurrently running async actions (0 = unbounded)
    #[serde(default)]
    pub max_concurrent: usize,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_poll_interval_ms() -> u64 {
    1000
}
fn default_channel_capacity() -> usize {
    100
}
fn default_health_check_ms() -> u64 {
    1000
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: BTreeMap::new(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            backend: WatchBackend::default(),
            poll_interval_ms: default_poll_interval_ms(),
            channel_capacity: default_channel_capacity(),
            health_check_ms: default_health_check_ms(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources.
    ///
    /// An explicit `config_path` must exist; otherwise `./watchpuppy.toml`
    /// is used when present.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match config_path {
            Some(path) if !path.exists() => {
                return Err(ConfigError::MissingConfigFile(path.to_path_buf()));
            }
            Some(path) => Some(path.to_path_buf()),
            None => Some(PathBuf::from(DEFAULT_CONFIG_FILE)).filter(|p| p.exists()),
        };

        Self::figment(file.as_deref())
            .extract()
            .map_err(|e| ConfigError::Load(Box::new(e)))
    }

    fn figment(file: Option<&Path>) -> Figment {
        let mut figment = Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Settings::default()));

        if let Some(file) = file {
            figment = figment.merge(Toml::file(file));
        }

        // Double underscore (__) separates nested levels,
        // single underscore stays within field names
        figment.merge(Env::prefixed(ENV_PREFIX).map(|key| {
            key.as_str().to_lowercase().replace("__", ".").into()
        }))
    }

    /// Render the settings as TOML.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

/// Resolve and validate the directory to watch.
///
/// Returns the canonical path so event paths and the root compare equal.
pub fn resolve_root(path: &Path) -> Result<PathBuf, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::MissingDirectory(path.to_path_buf()));
    }
    if !path.is_dir() {
        return Err(ConfigError::NotADirectory(path.to_path_buf()));
    }

    path.canonicalize()
        .map_err(|_| ConfigError::MissingDirectory(path.to_path_buf()))
}
