//! Translates a committed diff into store writes and cache invalidation.
//!
//! # Responsibility
//! - Issue the visibility write first, through the unchecked store path.
//! - Then issue one ownership-checked write per changed text field,
//!   concurrently.
//! - Invalidate the cached render of the note unless visibility changed.
//!
//! # Invariants
//! - A commit succeeds only if every write succeeds; partial success is
//!   reported as failure and never rolled back.
//! - A failed visibility write aborts the commit before any text write.
//! - A diff containing `public` never triggers `invalidate`,
//!   `refresh_current_view` or list observers, whatever else it contains.
//! - Invalidation failure is logged and never fails the commit.

use crate::db::SharedConnection;
use crate::identity::SessionId;
use crate::model::note::{FieldWrite, NoteField, NoteId, NotePatch};
use crate::repo::note_repo::{NoteRepository, RepoError, RepoResult, SqliteNoteRepository};
use async_trait::async_trait;
use futures::future::join_all;
use log::{error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Instant;

/// Async write seam to the persistent store.
#[async_trait]
pub trait NoteWriter: Send + Sync {
    /// Writes one text field; the store re-validates that `session_id` owns
    /// the note.
    async fn update_note_field(
        &self,
        note_id: NoteId,
        session_id: &SessionId,
        write: &FieldWrite,
    ) -> RepoResult<()>;

    /// Writes visibility without an ownership check.
    async fn update_note_visibility(&self, note_id: NoteId, public: bool) -> RepoResult<()>;
}

/// Cached render output of notes, keyed by slug.
#[async_trait]
pub trait RenderCache: Send + Sync {
    /// Purges cached output for `slug`.
    async fn invalidate(&self, slug: &str) -> Result<(), CacheError>;
    /// Re-renders the active view from fresh data.
    async fn refresh_current_view(&self);
}

/// Listener for views that list notes and should refresh after a save.
pub trait NoteListObserver: Send + Sync {
    fn note_list_changed(&self);
}

/// Cache invalidation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheError(pub String);

impl Display for CacheError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "cache invalidation failed: {}", self.0)
    }
}

impl Error for CacheError {}

/// One failed write within a commit.
#[derive(Debug)]
pub struct FieldFailure {
    pub field: NoteField,
    pub error: RepoError,
}

/// Commit failure surfaced to the editor.
#[derive(Debug)]
pub enum CommitError {
    /// At least one write failed. Other writes of the same commit may have
    /// been applied.
    Persistence { failures: Vec<FieldFailure> },
    /// The commit task ended without reporting (runtime shutting down).
    /// Whether its writes landed is unknown.
    Interrupted {
        fields: Vec<NoteField>,
        reason: String,
    },
}

impl CommitError {
    pub fn failed_fields(&self) -> Vec<NoteField> {
        match self {
            Self::Persistence { failures } => failures.iter().map(|failure| failure.field).collect(),
            Self::Interrupted { fields, .. } => fields.clone(),
        }
    }
}

impl Display for CommitError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Persistence { failures } => {
                write!(f, "save failed for")?;
                for (idx, failure) in failures.iter().enumerate() {
                    let sep = if idx == 0 { " " } else { ", " };
                    write!(f, "{sep}{}: {}", failure.field, failure.error)?;
                }
                Ok(())
            }
            Self::Interrupted { reason, .. } => write!(f, "save interrupted: {reason}"),
        }
    }
}

impl Error for CommitError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Persistence { failures } => failures
                .first()
                .map(|failure| &failure.error as &(dyn Error + 'static)),
            Self::Interrupted { .. } => None,
        }
    }
}

/// Result of a successful commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReport {
    /// Fields written by this commit.
    pub fields: Vec<NoteField>,
    /// Whether the cached render was invalidated.
    pub revalidated: bool,
}

/// Diff-to-writes translator.
pub struct WriteDispatcher {
    writer: Arc<dyn NoteWriter>,
    cache: Arc<dyn RenderCache>,
    list_observers: Vec<Arc<dyn NoteListObserver>>,
}

impl WriteDispatcher {
    pub fn new(writer: Arc<dyn NoteWriter>, cache: Arc<dyn RenderCache>) -> Self {
        Self {
            writer,
            cache,
            list_observers: Vec::new(),
        }
    }

    /// Registers a note-listing view to notify after successful text commits.
    pub fn with_list_observer(mut self, observer: Arc<dyn NoteListObserver>) -> Self {
        self.list_observers.push(observer);
        self
    }

    /// Persists `diff` for one note.
    ///
    /// A visibility change is written first and on its own; when it fails
    /// no text write is issued. Text writes are then issued together and
    /// awaited until they settle. No timeout is applied.
    pub async fn commit(
        &self,
        note_id: NoteId,
        slug: &str,
        session_id: &SessionId,
        diff: &NotePatch,
    ) -> Result<CommitReport, CommitError> {
        let started_at = Instant::now();

        if let Some(public) = diff.public {
            if let Err(err) = self.writer.update_note_visibility(note_id, public).await {
                error!(
                    "event=note_write module=sync status=error note_id={} field=public error={}",
                    note_id, err
                );
                error!(
                    "event=note_commit module=sync status=error note_id={} failed_fields=1 skipped_fields={} duration_ms={}",
                    note_id,
                    diff.field_writes().len(),
                    started_at.elapsed().as_millis()
                );
                return Err(CommitError::Persistence {
                    failures: vec![FieldFailure {
                        field: NoteField::Public,
                        error: err,
                    }],
                });
            }
        }

        let writes = diff.field_writes();
        let results = join_all(writes.iter().map(|write| async move {
            let result = self
                .writer
                .update_note_field(note_id, session_id, write)
                .await;
            (write.field(), result)
        }))
        .await;

        let mut failures = Vec::new();
        for (field, result) in results {
            if let Err(err) = result {
                error!(
                    "event=note_write module=sync status=error note_id={} field={} error={}",
                    note_id, field, err
                );
                failures.push(FieldFailure { field, error: err });
            }
        }

        if !failures.is_empty() {
            error!(
                "event=note_commit module=sync status=error note_id={} failed_fields={} duration_ms={}",
                note_id,
                failures.len(),
                started_at.elapsed().as_millis()
            );
            return Err(CommitError::Persistence { failures });
        }

        let revalidated = if diff.touches_visibility() {
            info!(
                "event=note_revalidate module=sync status=skip note_id={} reason=visibility_changed",
                note_id
            );
            false
        } else {
            let revalidated = self.revalidate(slug).await;
            for observer in &self.list_observers {
                observer.note_list_changed();
            }
            revalidated
        };

        let fields = diff.fields();
        info!(
            "event=note_commit module=sync status=ok note_id={} fields={} revalidated={} duration_ms={}",
            note_id,
            fields
                .iter()
                .map(|field| field.as_str())
                .collect::<Vec<_>>()
                .join(","),
            revalidated,
            started_at.elapsed().as_millis()
        );
        Ok(CommitReport {
            fields,
            revalidated,
        })
    }

    async fn revalidate(&self, slug: &str) -> bool {
        match self.cache.invalidate(slug).await {
            Ok(()) => {
                self.cache.refresh_current_view().await;
                true
            }
            Err(err) => {
                // Write is durable; readers may see stale output until the next save.
                warn!(
                    "event=note_revalidate module=sync status=error slug={} error={}",
                    slug, err
                );
                false
            }
        }
    }
}

/// `NoteWriter` over a shared SQLite connection.
#[derive(Clone)]
pub struct SqliteNoteWriter {
    conn: SharedConnection,
}

impl SqliteNoteWriter {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    /// Runs `f` against the repository on the blocking pool.
    async fn with_repo<T, F>(&self, f: F) -> RepoResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&SqliteNoteRepository<'_>) -> RepoResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| RepoError::Unavailable("connection lock poisoned".to_string()))?;
            let repo = SqliteNoteRepository::try_new(&conn)?;
            f(&repo)
        })
        .await
        .map_err(|err| RepoError::Unavailable(format!("store task failed: {err}")))?
    }
}

#[async_trait]
impl NoteWriter for SqliteNoteWriter {
    async fn update_note_field(
        &self,
        note_id: NoteId,
        session_id: &SessionId,
        write: &FieldWrite,
    ) -> RepoResult<()> {
        let session_id = session_id.clone();
        let write = write.clone();
        self.with_repo(move |repo| repo.update_note_field(note_id, &session_id, &write))
            .await
    }

    async fn update_note_visibility(&self, note_id: NoteId, public: bool) -> RepoResult<()> {
        self.with_repo(move |repo| repo.update_note_visibility(note_id, public))
            .await
    }
}
