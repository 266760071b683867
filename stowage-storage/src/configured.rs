//! Backends selected from [`StowageConfig`].
//!
//! `STOWAGE_CACHE_LMDB_PATH` picks LMDB over the in-memory cache and
//! `STOWAGE_BLOB_ROOT` picks the filesystem over in-memory blobs. The
//! record store is always injected by the caller.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use stowage_core::{BlobHandle, BlobSettings, CacheSettings, ConfigError, CustomerId, StowageConfig};

use crate::blob::{BlobResult, BlobStore, FsBlobStore, InMemoryBlobStore};
use crate::cache::{
    BackendResult, CacheAside, CacheAsideConfig, CacheBackend, CacheEngine, CacheKey,
    LmdbCacheBackend, MemoryCacheBackend,
};
use crate::store::RecordStore;

/// Cache backend chosen by [`CacheSettings::lmdb_path`].
pub enum ConfiguredCache {
    Memory(MemoryCacheBackend),
    Lmdb(LmdbCacheBackend),
}

impl ConfiguredCache {
    pub fn from_settings(settings: &CacheSettings) -> Result<Self, ConfigError> {
        match &settings.lmdb_path {
            None => Ok(Self::Memory(MemoryCacheBackend::new())),
            Some(path) => LmdbCacheBackend::new(path, settings.lmdb_max_mb)
                .map(Self::Lmdb)
                .map_err(|e| ConfigError::BackendInit {
                    component: "cache".to_string(),
                    reason: e.to_string(),
                }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Memory(_) => "memory",
            Self::Lmdb(_) => "lmdb",
        }
    }
}

#[async_trait]
impl CacheBackend for ConfiguredCache {
    async fn get(&self, key: &CacheKey) -> BackendResult<Vec<u8>> {
        match self {
            Self::Memory(b) => b.get(key).await,
            Self::Lmdb(b) => b.get(key).await,
        }
    }

    async fn upsert(&self, key: &CacheKey, value: &[u8], ttl: Duration) -> BackendResult<()> {
        match self {
            Self::Memory(b) => b.upsert(key, value, ttl).await,
            Self::Lmdb(b) => b.upsert(key, value, ttl).await,
        }
    }

    async fn remove(&self, key: &CacheKey) -> BackendResult<()> {
        match self {
            Self::Memory(b) => b.remove(key).await,
            Self::Lmdb(b) => b.remove(key).await,
        }
    }

    async fn append(&self, key: &CacheKey, value: &[u8]) -> BackendResult<()> {
        match self {
            Self::Memory(b) => b.append(key, value).await,
            Self::Lmdb(b) => b.append(key, value).await,
        }
    }
}

/// Blob store chosen by [`BlobSettings::root`].
pub enum ConfiguredBlobStore {
    Memory(InMemoryBlobStore),
    Fs(FsBlobStore),
}

impl ConfiguredBlobStore {
    pub async fn open(settings: &BlobSettings) -> Result<Self, ConfigError> {
        match &settings.root {
            None => Ok(Self::Memory(InMemoryBlobStore::new())),
            Some(root) => FsBlobStore::open(root)
                .await
                .map(Self::Fs)
                .map_err(|e| ConfigError::BackendInit {
                    component: "blob".to_string(),
                    reason: e.to_string(),
                }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Memory(_) => "memory",
            Self::Fs(_) => "fs",
        }
    }
}

#[async_trait]
impl BlobStore for ConfiguredBlobStore {
    async fn put(
        &self,
        id: CustomerId,
        filename: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> BlobResult<BlobHandle> {
        match self {
            Self::Memory(s) => s.put(id, filename, content_type, bytes).await,
            Self::Fs(s) => s.put(id, filename, content_type, bytes).await,
        }
    }

    async fn get(&self, id: CustomerId) -> BlobResult<Option<BlobHandle>> {
        match self {
            Self::Memory(s) => s.get(id).await,
            Self::Fs(s) => s.get(id).await,
        }
    }

    async fn read(&self, id: CustomerId) -> BlobResult<Option<Vec<u8>>> {
        match self {
            Self::Memory(s) => s.read(id).await,
            Self::Fs(s) => s.read(id).await,
        }
    }

    async fn delete(&self, id: CustomerId) -> BlobResult<()> {
        match self {
            Self::Memory(s) => s.delete(id).await,
            Self::Fs(s) => s.delete(id).await,
        }
    }
}

/// Orchestrator over configured backends.
pub type ConfiguredCacheAside<S> = CacheAside<ConfiguredCache, S, ConfiguredBlobStore>;

/// Validate `config`, open the configured backends and wire an orchestrator
/// around `store`.
pub async fn open_cache_aside<S: RecordStore>(
    store: Arc<S>,
    config: &StowageConfig,
) -> Result<ConfiguredCacheAside<S>, ConfigError> {
    config.validate()?;

    let cache = ConfiguredCache::from_settings(&config.cache)?;
    let blobs = ConfiguredBlobStore::open(&config.blob).await?;
    tracing::info!(
        cache = cache.name(),
        blobs = blobs.name(),
        op_timeout_ms = config.cache.op_timeout.as_millis() as u64,
        "opened storage backends"
    );

    Ok(CacheAside::new(
        Arc::new(CacheEngine::from_settings(cache, &config.cache)),
        store,
        Arc::new(blobs),
        CacheAsideConfig::from(&config.cache),
    ))
}
