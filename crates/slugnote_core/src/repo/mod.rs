//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define use-case oriented note data access contracts.
//! - Isolate SQLite query details from service and sync orchestration.
//!
//! # Invariants
//! - Text field writes re-validate ownership inside the store.
//! - Repository APIs return semantic errors (`NotFound`, `NotOwner`) in
//!   addition to DB transport errors.

pub mod note_repo;
