//! Core domain logic for slugnote.
//! This crate owns note access rules and the optimistic sync engine; the
//! HTTP server and CLI are thin shells over it.

pub mod access;
pub mod config;
pub mod content;
pub mod db;
pub mod identity;
pub mod logging;
pub mod model;
pub mod repo;
pub mod secret;
pub mod service;
pub mod sync;

pub use access::{
    can_edit_inline, can_explicit_save, can_toggle_visibility, can_view, resolve_access, Caller,
    NoteAccess, NotePermissions,
};
pub use config::{AppConfig, ConfigError};
pub use identity::{IdentityError, IdentityProvider, SessionCookie, SessionId};
pub use logging::{default_log_level, init_logging, logging_status, LogSink, LoggingError};
pub use model::note::{normalize_slug, FieldWrite, Note, NoteField, NoteId, NotePatch};
pub use repo::note_repo::{NoteRepository, RepoError, RepoResult, SqliteNoteRepository};
pub use secret::SecretToken;
pub use service::note_service::{NoteMetadata, NoteService, NoteServiceError};
pub use sync::dispatcher::{
    CacheError, CommitError, CommitReport, NoteListObserver, NoteWriter, RenderCache,
    SqliteNoteWriter, WriteDispatcher,
};
pub use sync::editor::{CommitOutcome, EditorEvent, NoteEditor, SkipReason};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
