//! Represents a published resource and its content kind.

use super::metadata::Metadata;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, types::Json};

/// The two kinds of content the service accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentKind {
    Json,
    Html,
}

impl ContentKind {
    /// MIME type stored alongside the content.
    pub fn mimetype(self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Html => "text/html; charset=utf-8",
        }
    }

    /// File extension used on disk and in the published URL.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Html => "html",
        }
    }

    pub fn from_mimetype(mimetype: &str) -> Option<Self> {
        match mimetype {
            "application/json" => Some(Self::Json),
            "text/html; charset=utf-8" => Some(Self::Html),
            _ => None,
        }
    }
}

/// A single published blob, as recorded in the `resources` table.
///
/// The row stores the description of the content, not its bytes; those
/// live on disk under `filename`.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct PublishedResource {
    /// Opaque alphanumeric identifier, also the file stem.
    pub key: String,

    /// MIME type the content was published with.
    pub mimetype: String,

    /// Name of the payload file relative to the storage directory.
    pub filename: String,

    /// Size in bytes.
    pub size_bytes: i64,

    /// MD5 hex digest of the content.
    pub etag: String,

    /// Metadata returned to `GET /metadata/<key>`.
    pub metadata: Json<Metadata>,

    /// When the row was written.
    pub created_at: DateTime<Utc>,
}

/// True when `key` is a non-empty run of ASCII letters and digits.
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty() && key.bytes().all(|b| b.is_ascii_alphanumeric())
}

/// Recover the resource key from a published URL.
///
/// Published URLs end in `<key>.<ext>`; the key is the last path segment up
/// to its first dot.
pub fn key_from_url(url: &str) -> Option<&str> {
    let segment = url.trim_end_matches('/').rsplit('/').next()?;
    let key = segment.split('.').next()?;
    is_valid_key(key).then_some(key)
}
