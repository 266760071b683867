//! Filesystem blob store.
//!
//! Layout: `<root>/<id>/data` holds the content and `<root>/<id>/meta.json`
//! the [`BlobHandle`]. Both are written to temporary files and renamed into
//! place, data first, so a blob is visible only once its metadata exists.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use stowage_core::{content_hash_hex, BlobError, BlobHandle, CustomerId};
use tokio::fs;
use uuid::Uuid;

use super::{BlobResult, BlobStore};

const DATA_FILE: &str = "data";
const META_FILE: &str = "meta.json";

/// Blob store rooted at a local directory.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Open a store rooted at `root`, creating the directory if missing.
    pub async fn open(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_dir(&self, id: CustomerId) -> PathBuf {
        self.root.join(id.to_string())
    }

    /// Write `bytes` to `dest` through a uniquely named temp file.
    async fn atomic_write(id: CustomerId, dest: &Path, bytes: &[u8]) -> BlobResult<()> {
        let tmp = dest.with_extension(format!("tmp.{}", Uuid::now_v7()));
        fs::write(&tmp, bytes).await.map_err(|e| io_error(id, e))?;
        if let Err(e) = fs::rename(&tmp, dest).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(io_error(id, e));
        }
        Ok(())
    }

    async fn load_meta(&self, id: CustomerId) -> BlobResult<Option<BlobHandle>> {
        let path = self.blob_dir(id).join(META_FILE);
        let raw = match fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(id, e)),
        };
        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|e| BlobError::Metadata {
                id,
                reason: e.to_string(),
            })
    }
}

fn io_error(id: CustomerId, e: std::io::Error) -> BlobError {
    BlobError::Io {
        id,
        reason: e.to_string(),
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(
        &self,
        id: CustomerId,
        filename: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> BlobResult<BlobHandle> {
        if self.load_meta(id).await?.is_some() {
            return Err(BlobError::AlreadyExists { id });
        }

        let dir = self.blob_dir(id);
        fs::create_dir_all(&dir).await.map_err(|e| io_error(id, e))?;

        let handle = BlobHandle {
            id,
            name: filename.to_string(),
            content_type: content_type.to_string(),
            size: bytes.len() as u64,
            checksum: content_hash_hex(bytes),
            uploaded_at: Utc::now(),
        };
        let meta = serde_json::to_vec_pretty(&handle).map_err(|e| BlobError::Metadata {
            id,
            reason: e.to_string(),
        })?;

        Self::atomic_write(id, &dir.join(DATA_FILE), bytes).await?;
        Self::atomic_write(id, &dir.join(META_FILE), &meta).await?;

        tracing::debug!(%id, name = filename, size = bytes.len(), "blob stored");
        Ok(handle)
    }

    async fn get(&self, id: CustomerId) -> BlobResult<Option<BlobHandle>> {
        self.load_meta(id).await
    }

    async fn read(&self, id: CustomerId) -> BlobResult<Option<Vec<u8>>> {
        let Some(handle) = self.load_meta(id).await? else {
            return Ok(None);
        };
        let bytes = fs::read(self.blob_dir(id).join(DATA_FILE))
            .await
            .map_err(|e| io_error(id, e))?;
        if content_hash_hex(&bytes) != handle.checksum {
            return Err(BlobError::ChecksumMismatch { id });
        }
        Ok(Some(bytes))
    }

    async fn delete(&self, id: CustomerId) -> BlobResult<()> {
        let dir = self.blob_dir(id);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(BlobError::NotFound { id }),
            Err(e) => Err(io_error(id, e)),
        }
    }
}
