//! Per-request note access policy.
//!
//! # Responsibility
//! - Decide read/write eligibility for a `(note, caller)` pair.
//! - Collapse "denied" and "missing" into one indistinguishable outcome.
//!
//! # Invariants
//! - Every predicate here is pure: no I/O, no logging, no errors.
//! - A public note is visible to everyone; this check runs first.
//! - Admin status never grants inline editing by itself.

use crate::identity::SessionId;
use crate::model::note::Note;
use serde::Serialize;

/// Identity of the party asking for a note.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Caller {
    pub session_id: Option<SessionId>,
    /// Whether an authenticated admin session is attached.
    pub is_admin: bool,
}

impl Caller {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_session(session_id: SessionId) -> Self {
        Self {
            session_id: Some(session_id),
            is_admin: false,
        }
    }

    pub fn admin(mut self) -> Self {
        self.is_admin = true;
        self
    }

    fn owns(&self, note: &Note) -> bool {
        note.is_owned_by(self.session_id.as_ref())
    }
}

/// Read access: public, then admin, then exact session match.
pub fn can_view(note: &Note, caller: &Caller) -> bool {
    if note.public {
        return true;
    }
    if caller.is_admin {
        return true;
    }
    caller.owns(note)
}

/// Inline edit eligibility: exact session match only.
pub fn can_edit_inline(note: &Note, caller: &Caller) -> bool {
    caller.owns(note)
}

/// Eligibility for the explicit "save" action.
pub fn can_explicit_save(note: &Note, caller: &Caller) -> bool {
    caller.owns(note) || (note.public && caller.is_admin)
}

/// Eligibility for the visibility toggle, which the store does not re-check.
pub fn can_toggle_visibility(note: &Note, caller: &Caller) -> bool {
    caller.is_admin && caller.owns(note)
}

/// Named permission set computed for a visible note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NotePermissions {
    pub edit_inline: bool,
    pub explicit_save: bool,
    pub toggle_visibility: bool,
}

impl NotePermissions {
    pub fn for_caller(note: &Note, caller: &Caller) -> Self {
        Self {
            edit_inline: can_edit_inline(note, caller),
            explicit_save: can_explicit_save(note, caller),
            toggle_visibility: can_toggle_visibility(note, caller),
        }
    }
}

/// Outcome of resolving a slug for a caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoteAccess {
    Visible {
        note: Note,
        permissions: NotePermissions,
    },
    /// Missing or denied. Deliberately carries no reason.
    Unavailable,
}

impl NoteAccess {
    pub fn is_visible(&self) -> bool {
        matches!(self, Self::Visible { .. })
    }

    pub fn into_note(self) -> Option<Note> {
        match self {
            Self::Visible { note, .. } => Some(note),
            Self::Unavailable => None,
        }
    }
}

/// Applies the read policy to a lookup result.
pub fn resolve_access(found: Option<Note>, caller: &Caller) -> NoteAccess {
    match found {
        Some(note) if can_view(&note, caller) => {
            let permissions = NotePermissions::for_caller(&note, caller);
            NoteAccess::Visible { note, permissions }
        }
        _ => NoteAccess::Unavailable,
    }
}
