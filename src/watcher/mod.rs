//! Directory watcher that runs action programs for file changes.
//!
//! # Architecture
//!
//! ```text
//! WatchLoop
//!   - SourceWatcher (notify backend, recursive)
//!         |  RawEvent over a bounded channel
//!         v
//!   worker task
//!     classify()      -> Option<DispatchDecision>
//!     ActionDispatcher -> child process (sync or async)
//!         |
//!   ActionReporter (success / failure reports)
//! ```

mod classifier;
mod dispatcher;
mod error;
mod event;
mod report;
mod source;
mod watch_loop;

pub use classifier::classify;
pub use dispatcher::{ActionConfig, ActionDispatcher, ActionOutcome};
pub use error::{ActionError, WatchError};
pub use event::{Action, DispatchDecision, RawEvent, RawEventKind};
pub use report::{ActionReporter, TracingReporter};
pub use source::{EventStream, SourceOptions, SourceWatcher, translate};
pub use watch_loop::{LoopState, WatchLoop};
