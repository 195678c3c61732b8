pub mod cli;
pub mod config;
pub mod logging;
pub mod watcher;

pub use config::{ConfigError, Settings, WatchBackend};
pub use watcher::{
    Action, ActionConfig, ActionDispatcher, ActionReporter, DispatchDecision, LoopState, RawEvent,
    RawEventKind, TracingReporter, WatchError, WatchLoop, classify,
};
