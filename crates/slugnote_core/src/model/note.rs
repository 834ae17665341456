//! Note domain model.
//!
//! # Responsibility
//! - Define the canonical note record addressed by slug.
//! - Define `NotePatch`, the partial-note shape used both for user edits and
//!   for the accumulated uncommitted diff.
//!
//! # Invariants
//! - `id`, `slug`, `session_id` and `created_at` are never touched by a patch.
//! - `updated_at` is maintained by the store, not by patches.
//! - The owning `session_id` never leaves the process in serialized form.
//! - Merging patches is last-write-wins per field.

use crate::identity::SessionId;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable note identifier.
pub type NoteId = Uuid;

/// Slug prefix used for freshly created notes.
pub const NEW_NOTE_SLUG_PREFIX: &str = "new-note-";
/// Emoji assigned to freshly created notes.
pub const DEFAULT_NOTE_EMOJI: &str = "👋🏼";
/// Category assigned to freshly created notes.
pub const DEFAULT_NOTE_CATEGORY: &str = "today";

/// Persistent note record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: NoteId,
    /// Routing key. Immutable after creation.
    pub slug: String,
    pub title: String,
    /// Markdown body.
    pub content: String,
    pub emoji: String,
    pub public: bool,
    /// Owning session. Set once at creation, never reassigned.
    ///
    /// Never serialized: it is the owner's only credential.
    #[serde(skip_serializing, default)]
    pub session_id: Option<SessionId>,
    /// Display classification only.
    pub category: String,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    /// Unix epoch milliseconds of the last stored write; equals `created_at`
    /// until the first save.
    #[serde(default)]
    pub updated_at: i64,
}

impl Note {
    /// Builds a new private note owned by `session_id` with creation defaults.
    ///
    /// # Invariants
    /// - Slug is derived from the generated id (`new-note-<id>`).
    /// - `public` starts as `false`, `category` as `today`.
    pub fn new_owned(session_id: Option<SessionId>, created_at: i64) -> Self {
        Self::with_id(Uuid::new_v4(), session_id, created_at)
    }

    /// Same as [`Note::new_owned`] with a caller-provided id.
    pub fn with_id(id: NoteId, session_id: Option<SessionId>, created_at: i64) -> Self {
        Self {
            id,
            slug: format!("{NEW_NOTE_SLUG_PREFIX}{id}"),
            title: String::new(),
            content: String::new(),
            emoji: DEFAULT_NOTE_EMOJI.to_string(),
            public: false,
            session_id,
            category: DEFAULT_NOTE_CATEGORY.to_string(),
            created_at,
            updated_at: created_at,
        }
    }

    /// Returns whether `session_id` is the exact, non-empty owner of this note.
    pub fn is_owned_by(&self, session_id: Option<&SessionId>) -> bool {
        match (self.session_id.as_ref(), session_id) {
            (Some(owner), Some(caller)) => !caller.is_empty() && owner == caller,
            _ => false,
        }
    }

    /// Applies every field present in `patch` to this note.
    pub fn apply_patch(&mut self, patch: &NotePatch) {
        if let Some(title) = patch.title.as_ref() {
            self.title.clone_from(title);
        }
        if let Some(content) = patch.content.as_ref() {
            self.content.clone_from(content);
        }
        if let Some(emoji) = patch.emoji.as_ref() {
            self.emoji.clone_from(emoji);
        }
        if let Some(public) = patch.public {
            self.public = public;
        }
    }
}

/// Editable note fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteField {
    Title,
    Content,
    Emoji,
    Public,
}

impl NoteField {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Content => "content",
            Self::Emoji => "emoji",
            Self::Public => "public",
        }
    }
}

impl Display for NoteField {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ownership-checked text write issued to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldWrite {
    Title(String),
    Emoji(String),
    Content(String),
}

impl FieldWrite {
    pub fn field(&self) -> NoteField {
        match self {
            Self::Title(_) => NoteField::Title,
            Self::Emoji(_) => NoteField::Emoji,
            Self::Content(_) => NoteField::Content,
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Self::Title(value) | Self::Emoji(value) | Self::Content(value) => value,
        }
    }
}

/// Partial note: one optional slot per editable field.
///
/// Used for a single user edit and for the diff accumulated since the last
/// commit started.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public: Option<bool>,
}

impl NotePatch {
    pub fn title(value: impl Into<String>) -> Self {
        Self {
            title: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn content(value: impl Into<String>) -> Self {
        Self {
            content: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn emoji(value: impl Into<String>) -> Self {
        Self {
            emoji: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn public(value: bool) -> Self {
        Self {
            public: Some(value),
            ..Self::default()
        }
    }

    /// Overlays `later` on top of `self`; fields present in `later` win.
    pub fn merge(&mut self, later: NotePatch) {
        if later.title.is_some() {
            self.title = later.title;
        }
        if later.content.is_some() {
            self.content = later.content;
        }
        if later.emoji.is_some() {
            self.emoji = later.emoji;
        }
        if later.public.is_some() {
            self.public = later.public;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.content.is_none()
            && self.emoji.is_none()
            && self.public.is_none()
    }

    /// Whether this patch changes note visibility.
    pub fn touches_visibility(&self) -> bool {
        self.public.is_some()
    }

    /// Fields present in this patch, in stable order.
    pub fn fields(&self) -> Vec<NoteField> {
        let mut fields = Vec::with_capacity(4);
        if self.title.is_some() {
            fields.push(NoteField::Title);
        }
        if self.content.is_some() {
            fields.push(NoteField::Content);
        }
        if self.emoji.is_some() {
            fields.push(NoteField::Emoji);
        }
        if self.public.is_some() {
            fields.push(NoteField::Public);
        }
        fields
    }

    /// Splits the text fields into ownership-checked writes.
    pub fn field_writes(&self) -> Vec<FieldWrite> {
        let mut writes = Vec::with_capacity(3);
        if let Some(title) = self.title.as_ref() {
            writes.push(FieldWrite::Title(title.clone()));
        }
        if let Some(emoji) = self.emoji.as_ref() {
            writes.push(FieldWrite::Emoji(emoji.clone()));
        }
        if let Some(content) = self.content.as_ref() {
            writes.push(FieldWrite::Content(content.clone()));
        }
        writes
    }
}

/// Strips a leading `notes/` route prefix from a requested slug.
pub fn normalize_slug(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed.strip_prefix("notes/").unwrap_or(trimmed)
}
