//! Cache backend trait and statistics.
//!
//! This module defines the capability a volatile key-value backend must
//! provide to sit behind the [`CacheEngine`](super::engine::CacheEngine).

use std::time::Duration;

use async_trait::async_trait;
use stowage_core::BackendError;

use super::key::CacheKey;

/// Result of a raw backend call, before normalization.
pub type BackendResult<T> = Result<T, BackendError>;

/// Cache backend trait for pluggable volatile stores.
///
/// Implementations report failures with a [`BackendErrorKind`](stowage_core::BackendErrorKind)
/// classification; the engine owns translation into the public taxonomy.
/// Implementations must be safe to share across concurrent requests and
/// handle their own internal synchronization.
///
/// # TTL
///
/// A TTL of `Duration::ZERO` means the entry never expires.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Fetch the raw bytes stored under `key`.
    ///
    /// A missing or expired entry is reported as `KeyNotFound`.
    async fn get(&self, key: &CacheKey) -> BackendResult<Vec<u8>>;

    /// Insert or overwrite the entry under `key`.
    async fn upsert(&self, key: &CacheKey, value: &[u8], ttl: Duration) -> BackendResult<()>;

    /// Remove the entry under `key`. A missing entry is `KeyNotFound`.
    async fn remove(&self, key: &CacheKey) -> BackendResult<()>;

    /// Append bytes to an existing entry, keeping its expiry.
    ///
    /// A missing entry is `NotStored`; append never creates entries.
    async fn append(&self, key: &CacheKey, value: &[u8]) -> BackendResult<()>;
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses (including fail-open reads).
    pub misses: u64,
    /// Number of backend failures other than not-found.
    pub errors: u64,
    /// Number of successful sets.
    pub sets: u64,
    /// Number of successful deletes.
    pub deletes: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
