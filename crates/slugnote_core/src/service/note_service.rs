//! Note use-case service.
//!
//! # Responsibility
//! - Create notes with creation defaults for an owning session.
//! - Resolve a requested slug through the access policy.
//! - Derive page metadata without leaking private note existence.
//!
//! # Invariants
//! - Page reads and metadata reads share one access resolution path.
//! - A denied note and a missing note produce identical results.

use crate::access::{resolve_access, Caller, NoteAccess};
use crate::identity::SessionId;
use crate::model::note::{normalize_slug, Note, DEFAULT_NOTE_EMOJI};
use crate::repo::note_repo::{NoteRepository, RepoError, RepoResult};
use log::{debug, info};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};

/// Title shown for missing and inaccessible notes.
pub const NOT_FOUND_TITLE: &str = "Note not found";
const UNTITLED_NOTE_TITLE: &str = "new note";

/// Service error for note use-cases.
#[derive(Debug)]
pub enum NoteServiceError {
    /// Persistence-layer failure.
    Repo(RepoError),
    /// Internal consistency mismatch between write and read-back.
    InconsistentState(&'static str),
}

impl Display for NoteServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Repo(err) => write!(f, "{err}"),
            Self::InconsistentState(details) => write!(f, "inconsistent note state: {details}"),
        }
    }
}

impl Error for NoteServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            Self::InconsistentState(_) => None,
        }
    }
}

impl From<RepoError> for NoteServiceError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// Page metadata for a note route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NoteMetadata {
    pub title: String,
    /// OpenGraph preview image path; absent for unavailable notes.
    pub og_image: Option<String>,
}

/// Note service facade over repository implementations.
pub struct NoteService<R: NoteRepository> {
    repo: R,
}

impl<R: NoteRepository> NoteService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Creates a private note owned by `session_id`.
    pub fn create_note(&self, session_id: Option<SessionId>) -> Result<Note, NoteServiceError> {
        let note = Note::new_owned(session_id, now_epoch_ms());
        let note_id = self.repo.insert_note(&note)?;
        info!(
            "event=note_create module=service status=ok note_id={} slug={}",
            note_id, note.slug
        );
        self.repo
            .fetch_note(note_id)?
            .ok_or(NoteServiceError::InconsistentState(
                "created note not found in read-back",
            ))
    }

    /// Resolves a requested slug for `caller`.
    pub fn open_note(&self, raw_slug: &str, caller: &Caller) -> RepoResult<NoteAccess> {
        let slug = normalize_slug(raw_slug);
        let found = self.repo.fetch_note_by_slug(slug)?;
        let access = resolve_access(found, caller);
        debug!(
            "event=note_open module=service status={} slug={}",
            if access.is_visible() { "ok" } else { "unavailable" },
            slug
        );
        Ok(access)
    }

    /// Builds page metadata, falling back to the not-found title.
    pub fn note_metadata(
        &self,
        raw_slug: &str,
        caller: &Caller,
        site_title: &str,
    ) -> RepoResult<NoteMetadata> {
        Ok(match self.open_note(raw_slug, caller)?.into_note() {
            Some(note) => metadata_for(&note, site_title),
            None => NoteMetadata {
                title: NOT_FOUND_TITLE.to_string(),
                og_image: None,
            },
        })
    }

    /// Slugs of public notes, for precomputed routes.
    pub fn list_public_slugs(&self) -> RepoResult<Vec<String>> {
        self.repo.list_public_note_slugs()
    }

    /// Notes owned by `session_id`, newest first.
    pub fn list_session_notes(
        &self,
        session_id: &SessionId,
        limit: Option<u32>,
    ) -> RepoResult<Vec<Note>> {
        self.repo.list_session_notes(session_id, limit)
    }
}

/// Derives metadata for a note the caller may see.
pub fn metadata_for(note: &Note, site_title: &str) -> NoteMetadata {
    let title = if note.title.trim().is_empty() {
        UNTITLED_NOTE_TITLE
    } else {
        note.title.as_str()
    };
    let emoji = if note.emoji.is_empty() {
        DEFAULT_NOTE_EMOJI
    } else {
        note.emoji.as_str()
    };

    NoteMetadata {
        title: format!("{site_title} | {title}"),
        og_image: Some(format!(
            "/notes/api/og/?title={}&emoji={}",
            utf8_percent_encode(title, NON_ALPHANUMERIC),
            utf8_percent_encode(emoji, NON_ALPHANUMERIC)
        )),
    }
}

pub(crate) fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
