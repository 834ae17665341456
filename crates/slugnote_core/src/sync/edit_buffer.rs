//! Optimistic note state plus the uncommitted field diff.

use crate::model::note::{Note, NotePatch};

/// Holds the always-current view of a note and the fields changed since the
/// last commit started.
///
/// `apply_update` is synchronous and never fails; the view reflects edits
/// immediately regardless of what later happens to the commit.
#[derive(Debug, Clone)]
pub struct EditBuffer {
    current: Note,
    pending: NotePatch,
}

impl EditBuffer {
    pub fn new(note: Note) -> Self {
        Self {
            current: note,
            pending: NotePatch::default(),
        }
    }

    /// Merges `update` into both the view state and the pending diff.
    pub fn apply_update(&mut self, update: NotePatch) {
        self.current.apply_patch(&update);
        self.pending.merge(update);
    }

    /// Latest optimistic note state.
    pub fn current(&self) -> &Note {
        &self.current
    }

    pub fn pending(&self) -> &NotePatch {
        &self.pending
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Snapshots and clears the pending diff in one step.
    pub fn take_pending(&mut self) -> NotePatch {
        std::mem::take(&mut self.pending)
    }
}
