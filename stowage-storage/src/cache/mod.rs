//! Cache layer: a generic key/value cache over pluggable backends, and the
//! cache-aside orchestrator that keeps it in front of the record store.
//!
//! # Layers
//!
//! - [`CacheBackend`] is the raw backend contract. Backends report failures
//!   as [`BackendError`](stowage_core::BackendError) with a structured kind.
//! - [`CacheEngine`] validates keys and values, bounds every backend call
//!   with a deadline, and maps backend failures onto the closed
//!   [`DatastoreError`](stowage_core::DatastoreError) taxonomy. Reads fail
//!   open: any failure is reported as a miss.
//! - [`CacheAside`] orchestrates record reads and writes across the cache,
//!   the record store and the blob store.
//!
//! # Example
//!
//! ```ignore
//! let engine = CacheEngine::new(MemoryCacheBackend::new());
//! engine.set("customer_1", br#"{"id":1}"#, 1990).await?;
//! assert!(engine.get("customer_1").await.is_some());
//! ```

pub mod cache_aside;
pub mod engine;
pub mod key;
pub mod lmdb_backend;
pub mod memory_backend;
pub mod normalize;
pub mod traits;
pub mod validation;

pub use cache_aside::{CacheAside, CacheAsideConfig, FetchedRecord, Listing, ReadSource, WriteReceipt};
pub use engine::{CacheEngine, DEFAULT_OP_TIMEOUT};
pub use key::CacheKey;
pub use lmdb_backend::{LmdbCacheBackend, LmdbCacheError};
pub use memory_backend::MemoryCacheBackend;
pub use normalize::{normalize, normalize_error};
pub use traits::{BackendResult, CacheBackend, CacheStats};
pub use validation::{validate_key, validate_value};
