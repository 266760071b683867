use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use stowage_core::{content_hash_hex, BlobError, BlobHandle, CustomerId};

use super::{BlobResult, BlobStore};

/// In-memory blob store.
#[derive(Debug, Default)]
pub struct InMemoryBlobStore {
    blobs: RwLock<HashMap<CustomerId, (BlobHandle, Vec<u8>)>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get count of stored blobs.
    pub fn blob_count(&self) -> usize {
        self.blobs.read().map(|m| m.len()).unwrap_or(0)
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put(
        &self,
        id: CustomerId,
        filename: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> BlobResult<BlobHandle> {
        let mut blobs = self.blobs.write().map_err(|_| BlobError::LockPoisoned)?;
        if blobs.contains_key(&id) {
            return Err(BlobError::AlreadyExists { id });
        }
        let handle = BlobHandle {
            id,
            name: filename.to_string(),
            content_type: content_type.to_string(),
            size: bytes.len() as u64,
            checksum: content_hash_hex(bytes),
            uploaded_at: Utc::now(),
        };
        blobs.insert(id, (handle.clone(), bytes.to_vec()));
        Ok(handle)
    }

    async fn get(&self, id: CustomerId) -> BlobResult<Option<BlobHandle>> {
        let blobs = self.blobs.read().map_err(|_| BlobError::LockPoisoned)?;
        Ok(blobs.get(&id).map(|(handle, _)| handle.clone()))
    }

    async fn read(&self, id: CustomerId) -> BlobResult<Option<Vec<u8>>> {
        let blobs = self.blobs.read().map_err(|_| BlobError::LockPoisoned)?;
        Ok(blobs.get(&id).map(|(_, bytes)| bytes.clone()))
    }

    async fn delete(&self, id: CustomerId) -> BlobResult<()> {
        let mut blobs = self.blobs.write().map_err(|_| BlobError::LockPoisoned)?;
        blobs
            .remove(&id)
            .map(|_| ())
            .ok_or(BlobError::NotFound { id })
    }
}
