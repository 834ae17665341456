//! Note repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide slug lookup, listing and insert APIs over the `notes` table.
//! - Apply per-field text writes only when the caller owns the note.
//! - Apply visibility writes without an ownership check; callers gate them.
//!
//! # Invariants
//! - No statement in this module ever updates `id`, `slug`, `session_id` or
//!   `created_at` after insert.
//! - Ownership is checked in the same statement as the write (`WHERE id = ?
//!   AND session_id = ?`), never by a separate read.

use crate::db::DbError;
use crate::identity::SessionId;
use crate::model::note::{FieldWrite, Note, NoteId};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const NOTE_SELECT_SQL: &str = "SELECT
    id,
    slug,
    title,
    content,
    emoji,
    public,
    session_id,
    category,
    created_at,
    updated_at
FROM notes";

const SESSION_NOTES_DEFAULT_LIMIT: u32 = 50;
const SESSION_NOTES_LIMIT_MAX: u32 = 200;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for note persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    NotFound(NoteId),
    /// The note exists but the presented session does not own it.
    NotOwner(NoteId),
    DuplicateSlug(String),
    InvalidData(String),
    /// The backing store could not be reached (lock poisoned, task lost).
    Unavailable(String),
    MissingRequiredTable(&'static str),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "note not found: {id}"),
            Self::NotOwner(id) => write!(f, "session does not own note: {id}"),
            Self::DuplicateSlug(slug) => write!(f, "slug already in use: {slug}"),
            Self::InvalidData(message) => write!(f, "invalid note data: {message}"),
            Self::Unavailable(message) => write!(f, "note store unavailable: {message}"),
            Self::MissingRequiredTable(table) => write!(f, "missing required table `{table}`"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Repository interface for note operations.
pub trait NoteRepository {
    /// Inserts a new note and returns its id.
    fn insert_note(&self, note: &Note) -> RepoResult<NoteId>;
    /// Gets one note by slug.
    fn fetch_note_by_slug(&self, slug: &str) -> RepoResult<Option<Note>>;
    /// Gets one note by id.
    fn fetch_note(&self, note_id: NoteId) -> RepoResult<Option<Note>>;
    /// Slugs of all public notes, oldest first.
    fn list_public_note_slugs(&self) -> RepoResult<Vec<String>>;
    /// Notes owned by one session, newest first.
    fn list_session_notes(&self, session_id: &SessionId, limit: Option<u32>)
        -> RepoResult<Vec<Note>>;
    /// Writes one text field if `session_id` owns the note.
    fn update_note_field(
        &self,
        note_id: NoteId,
        session_id: &SessionId,
        write: &FieldWrite,
    ) -> RepoResult<()>;
    /// Writes visibility. Performs no ownership check.
    fn update_note_visibility(&self, note_id: NoteId, public: bool) -> RepoResult<()>;
}

/// SQLite-backed note repository.
pub struct SqliteNoteRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteNoteRepository<'conn> {
    /// Constructs a repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        if !table_exists(conn, "notes")? {
            return Err(RepoError::MissingRequiredTable("notes"));
        }
        Ok(Self { conn })
    }

    fn note_exists(&self, note_id: NoteId) -> RepoResult<bool> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM notes WHERE id = ?1);",
            [note_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }
}

impl NoteRepository for SqliteNoteRepository<'_> {
    fn insert_note(&self, note: &Note) -> RepoResult<NoteId> {
        validate_note(note)?;

        let inserted = self.conn.execute(
            "INSERT INTO notes (
                id,
                slug,
                title,
                content,
                emoji,
                public,
                session_id,
                category,
                created_at,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10);",
            params![
                note.id.to_string(),
                note.slug.as_str(),
                note.title.as_str(),
                note.content.as_str(),
                note.emoji.as_str(),
                bool_to_int(note.public),
                note.session_id.as_ref().map(SessionId::as_str),
                note.category.as_str(),
                note.created_at,
                note.updated_at,
            ],
        );

        match inserted {
            Ok(_) => Ok(note.id),
            Err(rusqlite::Error::SqliteFailure(failure, _))
                if failure.code == ErrorCode::ConstraintViolation =>
            {
                Err(RepoError::DuplicateSlug(note.slug.clone()))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn fetch_note_by_slug(&self, slug: &str) -> RepoResult<Option<Note>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{NOTE_SELECT_SQL} WHERE slug = ?1;"))?;
        stmt.query_row([slug], parse_note_row)
            .optional()?
            .transpose()
    }

    fn fetch_note(&self, note_id: NoteId) -> RepoResult<Option<Note>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{NOTE_SELECT_SQL} WHERE id = ?1;"))?;
        stmt.query_row([note_id.to_string()], parse_note_row)
            .optional()?
            .transpose()
    }

    fn list_public_note_slugs(&self) -> RepoResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT slug FROM notes WHERE public = 1 ORDER BY created_at ASC, id ASC;")?;
        let mut rows = stmt.query([])?;
        let mut slugs = Vec::new();
        while let Some(row) = rows.next()? {
            slugs.push(row.get("slug")?);
        }
        Ok(slugs)
    }

    fn list_session_notes(
        &self,
        session_id: &SessionId,
        limit: Option<u32>,
    ) -> RepoResult<Vec<Note>> {
        let mut stmt = self.conn.prepare(&format!(
            "{NOTE_SELECT_SQL}
             WHERE session_id = ?1
             ORDER BY created_at DESC, id ASC
             LIMIT ?2;"
        ))?;
        let limit = normalize_session_notes_limit(limit);
        let mut rows = stmt.query(params![session_id.as_str(), i64::from(limit)])?;
        let mut notes = Vec::new();
        while let Some(row) = rows.next()? {
            notes.push(parse_note_row(row)??);
        }
        Ok(notes)
    }

    fn update_note_field(
        &self,
        note_id: NoteId,
        session_id: &SessionId,
        write: &FieldWrite,
    ) -> RepoResult<()> {
        if session_id.is_empty() {
            return Err(RepoError::NotOwner(note_id));
        }

        let sql = match write {
            FieldWrite::Title(_) => {
                "UPDATE notes
                 SET title = ?1, updated_at = CAST((julianday('now') - 2440587.5) * 86400000 AS INTEGER)
                 WHERE id = ?2 AND session_id = ?3;"
            }
            FieldWrite::Emoji(_) => {
                "UPDATE notes
                 SET emoji = ?1, updated_at = CAST((julianday('now') - 2440587.5) * 86400000 AS INTEGER)
                 WHERE id = ?2 AND session_id = ?3;"
            }
            FieldWrite::Content(_) => {
                "UPDATE notes
                 SET content = ?1, updated_at = CAST((julianday('now') - 2440587.5) * 86400000 AS INTEGER)
                 WHERE id = ?2 AND session_id = ?3;"
            }
        };

        let changed = self.conn.execute(
            sql,
            params![write.value(), note_id.to_string(), session_id.as_str()],
        )?;

        if changed == 0 {
            return Err(if self.note_exists(note_id)? {
                RepoError::NotOwner(note_id)
            } else {
                RepoError::NotFound(note_id)
            });
        }

        Ok(())
    }

    fn update_note_visibility(&self, note_id: NoteId, public: bool) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE notes
             SET public = ?1, updated_at = CAST((julianday('now') - 2440587.5) * 86400000 AS INTEGER)
             WHERE id = ?2;",
            params![bool_to_int(public), note_id.to_string()],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound(note_id));
        }

        Ok(())
    }
}

/// Normalizes the session note list limit.
pub fn normalize_session_notes_limit(limit: Option<u32>) -> u32 {
    match limit {
        Some(0) | None => SESSION_NOTES_DEFAULT_LIMIT,
        Some(value) if value > SESSION_NOTES_LIMIT_MAX => SESSION_NOTES_LIMIT_MAX,
        Some(value) => value,
    }
}

fn validate_note(note: &Note) -> RepoResult<()> {
    if note.slug.trim().is_empty() {
        return Err(RepoError::InvalidData("slug must not be empty".to_string()));
    }
    if note.slug.contains('/') {
        return Err(RepoError::InvalidData(format!(
            "slug `{}` must not contain `/`",
            note.slug
        )));
    }
    if note.id.is_nil() {
        return Err(RepoError::InvalidData("note id must not be nil".to_string()));
    }
    Ok(())
}

// Outer result: row access. Inner result: semantic decoding.
fn parse_note_row(row: &Row<'_>) -> rusqlite::Result<RepoResult<Note>> {
    let id_text: String = row.get("id")?;
    let public_raw: i64 = row.get("public")?;
    let session_id: Option<String> = row.get("session_id")?;
    let note = Note {
        id: Uuid::nil(),
        slug: row.get("slug")?,
        title: row.get("title")?,
        content: row.get("content")?,
        emoji: row.get("emoji")?,
        public: false,
        session_id: session_id.map(SessionId::new),
        category: row.get("category")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    };

    Ok(decode_note(note, &id_text, public_raw))
}

fn decode_note(mut note: Note, id_text: &str, public_raw: i64) -> RepoResult<Note> {
    note.id = Uuid::parse_str(id_text)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid value `{id_text}` in notes.id")))?;
    note.public = match public_raw {
        0 => false,
        1 => true,
        other => {
            return Err(RepoError::InvalidData(format!(
                "invalid public value `{other}` in notes.public"
            )));
        }
    };
    Ok(note)
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn bool_to_int(value: bool) -> i64 {
    i64::from(value)
}
