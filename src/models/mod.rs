//! Core data models for the publish service.
//!
//! A published resource is a single immutable blob (JSON or HTML) plus a
//! small string-to-string metadata map. Rows map to the SQLite schema via
//! `sqlx::FromRow` and metadata serializes naturally as JSON via `serde`.

pub mod metadata;
pub mod resource;
