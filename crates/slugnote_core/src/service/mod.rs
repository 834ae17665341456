//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls and access policy into use-case APIs.
//! - Keep HTTP/CLI layers decoupled from storage details.

pub mod note_service;
