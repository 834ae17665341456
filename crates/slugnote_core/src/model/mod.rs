//! Domain model for slug-addressed notes.
//!
//! # Responsibility
//! - Define the persistent `Note` record and its field-level patch shape.
//! - Keep the editable field set closed (`title`, `content`, `emoji`, `public`).
//!
//! # Invariants
//! - `Note::id` and `Note::session_id` never change after creation.
//! - A `NotePatch` can only carry editable fields.

pub mod note;
