//! In-process `Storage` implementation.
//!
//! Keeps every resource in a mutex-guarded map. Nothing survives a restart,
//! which makes it suitable for tests and for embedding the handler without a
//! database.

use crate::{
    models::{metadata::Metadata, resource::ContentKind},
    services::storage_service::{Storage, StorageError, StorageResult},
};
use bytes::Bytes;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};
use uuid::Uuid;

/// A resource held by [`MemoryStorage`].
#[derive(Clone, Debug)]
pub struct StoredResource {
    pub content: Bytes,
    pub mimetype: String,
    pub metadata: Metadata,
}

#[derive(Clone)]
pub struct MemoryStorage {
    public_url: String,
    resources: Arc<Mutex<HashMap<String, StoredResource>>>,
}

impl MemoryStorage {
    pub fn new(public_url: impl Into<String>) -> Self {
        Self {
            public_url: public_url.into().trim_end_matches('/').to_string(),
            resources: Arc::default(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, StoredResource>> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.resources
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The stored resource for `key`, if any.
    pub fn get(&self, key: &str) -> Option<StoredResource> {
        self.lock().get(key).cloned()
    }

    /// Number of resources created so far.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Storage for MemoryStorage {
    async fn get_metadata(&self, key: &str) -> StorageResult<Option<Metadata>> {
        Ok(self.lock().get(key).map(|resource| resource.metadata.clone()))
    }

    async fn create(
        &self,
        content: Bytes,
        mimetype: &str,
        metadata: Metadata,
    ) -> StorageResult<String> {
        let kind = ContentKind::from_mimetype(mimetype)
            .ok_or_else(|| StorageError::UnsupportedMimetype(mimetype.to_string()))?;

        let mut resources = self.lock();
        let key = loop {
            let candidate = Uuid::new_v4().simple().to_string();
            if !resources.contains_key(&candidate) {
                break candidate;
            }
        };
        let url = format!("{}/{}.{}", self.public_url, key, kind.extension());
        resources.insert(
            key,
            StoredResource {
                content,
                mimetype: mimetype.to_string(),
                metadata,
            },
        );
        Ok(url)
    }
}
