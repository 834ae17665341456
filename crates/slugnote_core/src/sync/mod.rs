//! Optimistic batched synchronization of note edits.
//!
//! # Responsibility
//! - Buffer field-level edits with instant local state (`edit_buffer`).
//! - Debounce buffered edits into one commit (`scheduler`).
//! - Turn a committed diff into store writes and cache invalidation
//!   (`dispatcher`).
//! - Wire the three together per active view (`editor`).
//!
//! # Invariants
//! - Last-writer-wins per field; there is no merge with other editors.
//! - Once issued, a store write is never cancelled.

pub mod dispatcher;
pub mod edit_buffer;
pub mod editor;
pub mod scheduler;
