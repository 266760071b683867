//! Stowage Storage - cache, record store and blob store.
//!
//! The record store is the source of truth. The cache holds JSON snapshots
//! of records under `<prefix>_<id>` keys and is kept coherent by the
//! [`CacheAside`] orchestrator: reads populate it, writes invalidate it.

pub mod blob;
pub mod cache;
pub mod configured;
pub mod store;
pub mod timing;

pub use blob::{BlobResult, BlobStore, FsBlobStore, InMemoryBlobStore};
pub use cache::{
    BackendResult, CacheAside, CacheAsideConfig, CacheBackend, CacheEngine, CacheKey, CacheStats,
    FetchedRecord, Listing, LmdbCacheBackend, LmdbCacheError, MemoryCacheBackend, ReadSource,
    WriteReceipt,
};
pub use configured::{open_cache_aside, ConfiguredBlobStore, ConfiguredCache, ConfiguredCacheAside};
pub use store::{InMemoryRecordStore, RecordStore, StoreResult};
