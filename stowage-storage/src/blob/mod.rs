//! Blob store adapter.
//!
//! Attachments are stored 1:1 against a record id, independently of the
//! cache. There is no in-place update: callers replace a blob with
//! `delete` followed by `put`, and `put` over an existing id is rejected.

mod fs;
mod memory;

pub use fs::FsBlobStore;
pub use memory::InMemoryBlobStore;

use async_trait::async_trait;
use stowage_core::{BlobError, BlobHandle, CustomerId};

/// Result alias for blob store calls.
pub type BlobResult<T> = Result<T, BlobError>;

/// Async blob store keyed by record id.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store a new blob for `id`.
    async fn put(
        &self,
        id: CustomerId,
        filename: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> BlobResult<BlobHandle>;

    /// Look up the blob metadata for `id`.
    async fn get(&self, id: CustomerId) -> BlobResult<Option<BlobHandle>>;

    /// Read the blob content for `id`, verifying its checksum.
    async fn read(&self, id: CustomerId) -> BlobResult<Option<Vec<u8>>>;

    /// Delete the blob for `id`. A missing blob is `BlobError::NotFound`.
    async fn delete(&self, id: CustomerId) -> BlobResult<()>;
}
