//! Maps raw filesystem notifications to insert/delete decisions.

use super::dispatcher::ActionConfig;
use super::event::{DispatchDecision, RawEvent, RawEventKind};

/// Decide what, if anything, to run for a raw event.
///
/// Directory events never dispatch. Creates, modifications and the
/// destination side of a rename become inserts; deletions and the source
/// side of a rename become deletes. A decision is only produced when the
/// matching program is configured.
pub fn classify(event: &RawEvent, config: &ActionConfig) -> Option<DispatchDecision> {
    if event.is_directory {
        return None;
    }

    match event.kind {
        RawEventKind::Created | RawEventKind::Modified | RawEventKind::MovedTo => config
            .insert_program()
            .map(|_| DispatchDecision::insert(&event.path)),
        RawEventKind::Deleted | RawEventKind::MovedFrom => config
            .delete_program()
            .map(|_| DispatchDecision::delete(&event.path)),
    }
}
