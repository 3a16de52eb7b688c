//! src/services/storage_service.rs
//!
//! The `Storage` seam used by the request handler, and `StorageService`, its
//! durable implementation: SQLite for resource rows and metadata, local disk
//! for content payloads written flat beneath `base_path/{key}.{ext}`.
//!
//! Key-to-URL mapping: a resource with key `k` and extension `e` is published
//! at `{public_url}/{k}.{e}`, and its metadata is served at `/metadata/{k}`.
//! `models::resource::key_from_url` inverts the mapping.

use crate::models::{
    metadata::Metadata,
    resource::{ContentKind, PublishedResource, is_valid_key},
};
use bytes::Bytes;
use chrono::Utc;
use sqlx::{SqlitePool, types::Json};
use std::{
    future::Future,
    io,
    path::PathBuf,
    sync::Arc,
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid resource key `{0}`")]
    InvalidKey(String),
    #[error("mimetype `{0}` is not supported")]
    UnsupportedMimetype(String),
    #[error("could not allocate a unique key after {0} attempts")]
    KeyExhausted(usize),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// The narrow contract the request handler relies on.
///
/// Implementations own their concurrency safety: concurrent `create` calls
/// must never hand out the same key twice.
pub trait Storage: Clone + Send + Sync + 'static {
    /// Metadata for `key`, or `None` when no such resource exists.
    fn get_metadata(
        &self,
        key: &str,
    ) -> impl Future<Output = StorageResult<Option<Metadata>>> + Send;

    /// Persist `content` under a fresh key and return its published URL.
    fn create(
        &self,
        content: Bytes,
        mimetype: &str,
        metadata: Metadata,
    ) -> impl Future<Output = StorageResult<String>> + Send;
}

/// Key allocation is retried this many times on a primary-key collision.
const MAX_KEY_ATTEMPTS: usize = 3;

/// StorageService persists published resources:
/// - Create (writes the payload to disk and inserts a row into SQLite)
/// - Get metadata (reads the row from SQLite)
///
/// Rows and files are written together inside one transaction so a failed
/// create leaves neither behind.
#[derive(Clone)]
pub struct StorageService {
    /// Shared SQLite connection pool used for resource rows.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where payloads are stored.
    pub base_path: PathBuf,

    /// Public URL prefix under which `base_path` is served.
    pub public_url: String,
}

impl StorageService {
    /// Create a new StorageService backed by the provided SQLite pool, using
    /// `base_path` as the payload directory and `public_url` as its URL prefix.
    pub fn new(
        db: Arc<SqlitePool>,
        base_path: impl Into<PathBuf>,
        public_url: impl Into<String>,
    ) -> Self {
        Self {
            db,
            base_path: base_path.into(),
            public_url: public_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Apply the embedded schema migrations.
    pub async fn migrate(&self) -> StorageResult<()> {
        let sql = include_str!("../../migrations/0001_init.sql");
        let statements = sql
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        tracing::info!("Running {} migration statements...", statements.len());

        for stmt in statements {
            debug!("Executing migration SQL: {}", stmt);
            sqlx::query(stmt).execute(&*self.db).await?;
        }
        Ok(())
    }

    fn ensure_key_safe(&self, key: &str) -> StorageResult<()> {
        if is_valid_key(key) {
            Ok(())
        } else {
            Err(StorageError::InvalidKey(key.to_string()))
        }
    }

    /// Published URL for a payload file.
    pub fn url_for(&self, filename: &str) -> String {
        format!("{}/{}", self.public_url, filename)
    }

    /// Fetch the full resource row, or `None` if the key is unknown.
    pub async fn get_resource(&self, key: &str) -> StorageResult<Option<PublishedResource>> {
        self.ensure_key_safe(key)?;
        let row = sqlx::query_as::<_, PublishedResource>(
            "SELECT key, mimetype, filename, size_bytes, etag, metadata, created_at
             FROM resources WHERE key = ?",
        )
        .bind(key)
        .fetch_optional(&*self.db)
        .await?;
        Ok(row)
    }

    /// Insert the row and write the payload under a single transaction.
    ///
    /// Returns `Ok(None)` when `key` is already taken so the caller can pick
    /// another one.
    async fn try_create(
        &self,
        key: &str,
        kind: ContentKind,
        content: &Bytes,
        metadata: &Metadata,
    ) -> StorageResult<Option<PublishedResource>> {
        let filename = format!("{}.{}", key, kind.extension());
        let resource = PublishedResource {
            key: key.to_string(),
            mimetype: kind.mimetype().to_string(),
            filename: filename.clone(),
            size_bytes: content.len() as i64,
            etag: format!("{:x}", md5::compute(content)),
            metadata: Json(metadata.clone()),
            created_at: Utc::now(),
        };

        let mut tx = self.db.begin().await?;
        let inserted = sqlx::query(
            "INSERT INTO resources (key, mimetype, filename, size_bytes, etag, metadata, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&resource.key)
        .bind(&resource.mimetype)
        .bind(&resource.filename)
        .bind(resource.size_bytes)
        .bind(&resource.etag)
        .bind(&resource.metadata)
        .bind(resource.created_at)
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {}
            Err(err) if is_unique_violation(&err) => {
                debug!("key {} already taken", key);
                return Ok(None);
            }
            Err(err) => return Err(StorageError::Sqlx(err)),
        }

        self.write_payload(&filename, content).await?;
        if let Err(err) = tx.commit().await {
            let _ = fs::remove_file(self.base_path.join(&filename)).await;
            return Err(StorageError::Sqlx(err));
        }
        Ok(Some(resource))
    }

    /// Write `content` to a temp file, fsync, then rename into place.
    async fn write_payload(&self, filename: &str, content: &[u8]) -> StorageResult<()> {
        fs::create_dir_all(&self.base_path).await?;
        let file_path = self.base_path.join(filename);
        let tmp_path = self.base_path.join(format!(".tmp-{}", Uuid::new_v4()));

        let written = async {
            let mut file = File::create(&tmp_path).await?;
            file.write_all(content).await?;
            file.flush().await?;
            file.sync_all().await?;
            fs::rename(&tmp_path, &file_path).await
        }
        .await;

        if let Err(err) = written {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }
        debug!("wrote payload {}", file_path.display());
        Ok(())
    }
}

impl Storage for StorageService {
    async fn get_metadata(&self, key: &str) -> StorageResult<Option<Metadata>> {
        Ok(self
            .get_resource(key)
            .await?
            .map(|resource| resource.metadata.0))
    }

    async fn create(
        &self,
        content: Bytes,
        mimetype: &str,
        metadata: Metadata,
    ) -> StorageResult<String> {
        let kind = ContentKind::from_mimetype(mimetype)
            .ok_or_else(|| StorageError::UnsupportedMimetype(mimetype.to_string()))?;

        for _ in 0..MAX_KEY_ATTEMPTS {
            let key = Uuid::new_v4().simple().to_string();
            if let Some(resource) = self.try_create(&key, kind, &content, &metadata).await? {
                return Ok(self.url_for(&resource.filename));
            }
        }
        Err(StorageError::KeyExhausted(MAX_KEY_ATTEMPTS))
    }
}

/// Return true if SQLx error indicates a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}
