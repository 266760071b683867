//! Cache engine: validated, deadline-bounded access to a cache backend.
//!
//! The engine is advisory. `get` never fails: a miss, an invalid key, a
//! backend error and a deadline overrun all come back as `None`, and every
//! condition other than a genuine miss is logged. Mutating calls validate
//! their inputs before touching the backend and return the normalized
//! [`DatastoreError`] taxonomy.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use stowage_core::{BackendError, BackendErrorKind, CacheSettings, DatastoreError, MAX_TTL_SECS};

use super::key::CacheKey;
use super::normalize::normalize_error;
use super::traits::{BackendResult, CacheBackend, CacheStats};
use super::validation::{validate_key, validate_value};

/// Default per-call deadline.
pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
}

/// Cache engine over a [`CacheBackend`].
pub struct CacheEngine<B: CacheBackend> {
    backend: B,
    op_timeout: Duration,
    counters: Counters,
}

impl<B: CacheBackend> CacheEngine<B> {
    /// Create an engine with the default 100ms deadline.
    pub fn new(backend: B) -> Self {
        Self::with_timeout(backend, DEFAULT_OP_TIMEOUT)
    }

    /// Create an engine whose backend calls are abandoned after `op_timeout`.
    pub fn with_timeout(backend: B, op_timeout: Duration) -> Self {
        Self {
            backend,
            op_timeout,
            counters: Counters::default(),
        }
    }

    /// Create an engine using the configured deadline.
    pub fn from_settings(backend: B, settings: &CacheSettings) -> Self {
        Self::with_timeout(backend, settings.op_timeout)
    }

    /// Get a reference to the cache backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn op_timeout(&self) -> Duration {
        self.op_timeout
    }

    /// Look up `key`. Any failure is a miss.
    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let key = match validate_key(key) {
            Ok(key) => key,
            Err(_) => {
                tracing::warn!(key_len = key.len(), "cache get with invalid key");
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        match self.bounded("get", self.backend.get(&key)).await {
            Ok(value) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            Err(e) if e.kind == BackendErrorKind::KeyNotFound => {
                tracing::debug!(%key, "cache miss");
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(e) => {
                tracing::warn!(%key, error = %e, "cache get failed, falling through");
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store `value` under `key` for `ttl_secs` seconds (0 = no expiry).
    pub async fn set(&self, key: &str, value: &[u8], ttl_secs: u32) -> Result<(), DatastoreError> {
        let key = validate_key(key)?;
        validate_value(value)?;

        if ttl_secs > MAX_TTL_SECS {
            tracing::warn!(%key, ttl_secs, max = MAX_TTL_SECS, "cache TTL above recommended maximum");
        }

        let ttl = Duration::from_secs(u64::from(ttl_secs));
        self.finish("set", &key, self.bounded("set", self.backend.upsert(&key, value, ttl)).await)?;
        self.counters.sets.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Remove the entry under `key`. An absent entry is `NotFound`.
    pub async fn delete(&self, key: &str) -> Result<(), DatastoreError> {
        let key = validate_key(key)?;
        self.finish("delete", &key, self.bounded("delete", self.backend.remove(&key)).await)?;
        self.counters.deletes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Append `value` to an existing entry. Never creates one.
    pub async fn append(&self, key: &str, value: &[u8]) -> Result<(), DatastoreError> {
        let key = validate_key(key)?;
        validate_value(value)?;
        self.finish("append", &key, self.bounded("append", self.backend.append(&key, value)).await)
    }

    /// Snapshot of the engine counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
            sets: self.counters.sets.load(Ordering::Relaxed),
            deletes: self.counters.deletes.load(Ordering::Relaxed),
        }
    }

    /// Run a backend call under the engine deadline.
    async fn bounded<T, F>(&self, operation: &'static str, call: F) -> BackendResult<T>
    where
        F: Future<Output = BackendResult<T>>,
    {
        match tokio::time::timeout(self.op_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::new(
                BackendErrorKind::Timeout,
                format!("{operation} exceeded {}ms", self.op_timeout.as_millis()),
            )),
        }
    }

    /// Normalize a mutating call's outcome, counting and logging failures.
    fn finish(
        &self,
        operation: &'static str,
        key: &CacheKey,
        result: BackendResult<()>,
    ) -> Result<(), DatastoreError> {
        result.map_err(|e| {
            let normalized = normalize_error(e);
            if normalized != DatastoreError::NotFound {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
            }
            tracing::debug!(%key, operation, error = %normalized, "cache operation failed");
            normalized
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory_backend::MemoryCacheBackend;
    use async_trait::async_trait;

    /// Backend that never answers within any sane deadline.
    struct StalledBackend;

    #[async_trait]
    impl CacheBackend for StalledBackend {
        async fn get(&self, _key: &CacheKey) -> BackendResult<Vec<u8>> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(b"late".to_vec())
        }

        async fn upsert(&self, _key: &CacheKey, _value: &[u8], _ttl: Duration) -> BackendResult<()> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }

        async fn remove(&self, _key: &CacheKey) -> BackendResult<()> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }

        async fn append(&self, _key: &CacheKey, _value: &[u8]) -> BackendResult<()> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_set_get_roundtrip() {
        let engine = CacheEngine::new(MemoryCacheBackend::new());
        engine.set("customer_1", b"{\"id\":1}", 60).await.unwrap();
        assert_eq!(engine.get("customer_1").await.as_deref(), Some(&b"{\"id\":1}"[..]));

        let stats = engine.stats();
        assert_eq!(stats.sets, 1);
        assert_eq!(stats.hits, 1);
    }

    #[tokio::test]
    async fn test_get_miss_is_silent_none() {
        let engine = CacheEngine::new(MemoryCacheBackend::new());
        assert_eq!(engine.get("customer_404").await, None);
        let stats = engine.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.errors, 0);
    }

    #[tokio::test]
    async fn test_invalid_inputs_rejected() {
        let engine = CacheEngine::new(MemoryCacheBackend::new());
        let long = "x".repeat(251);

        assert_eq!(engine.set(&long, &[1], 60).await, Err(DatastoreError::InvalidKey));
        assert_eq!(engine.set("k", &[], 60).await, Err(DatastoreError::EmptyBody));
        assert_eq!(engine.delete("").await, Err(DatastoreError::InvalidKey));
        assert_eq!(engine.append(&long, b"x").await, Err(DatastoreError::InvalidKey));
        assert_eq!(engine.append("k", &[]).await, Err(DatastoreError::EmptyBody));
        assert_eq!(engine.get(&long).await, None);
    }

    #[tokio::test]
    async fn test_delete_twice_reports_not_found() {
        let engine = CacheEngine::new(MemoryCacheBackend::new());
        engine.set("k", b"v", 60).await.unwrap();
        assert_eq!(engine.delete("k").await, Ok(()));
        assert_eq!(engine.delete("k").await, Err(DatastoreError::NotFound));
        assert_eq!(engine.stats().errors, 0);
    }

    #[tokio::test]
    async fn test_append_semantics() {
        let engine = CacheEngine::new(MemoryCacheBackend::new());
        assert_eq!(engine.append("k", b"x").await, Err(DatastoreError::NotFound));
        assert_eq!(engine.get("k").await, None);

        engine.set("k", b"ab", 0).await.unwrap();
        engine.append("k", b"cd").await.unwrap();
        assert_eq!(engine.get("k").await, Some(b"abcd".to_vec()));
    }

    #[tokio::test]
    async fn test_backend_size_limit_normalized() {
        let engine = CacheEngine::new(MemoryCacheBackend::with_item_size_limit(2));
        assert_eq!(engine.set("k", b"abc", 60).await, Err(DatastoreError::OversizedBody));
    }

    #[tokio::test]
    async fn test_ttl_above_recommended_max_is_accepted() {
        let engine = CacheEngine::new(MemoryCacheBackend::new());
        engine.set("k", b"v", MAX_TTL_SECS + 1).await.unwrap();
        assert!(engine.get("k").await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_turns_stall_into_miss() {
        let engine = CacheEngine::with_timeout(StalledBackend, Duration::from_millis(100));
        assert_eq!(engine.get("k").await, None);
        assert_eq!(engine.stats().errors, 1);

        match engine.set("k", b"v", 60).await {
            Err(DatastoreError::Backend { kind, .. }) => assert_eq!(kind, BackendErrorKind::Timeout),
            other => panic!("expected timeout, got {other:?}"),
        }
        assert!(matches!(
            engine.delete("k").await,
            Err(DatastoreError::Backend { kind: BackendErrorKind::Timeout, .. })
        ));
    }

    #[test]
    fn test_from_settings_uses_configured_deadline() {
        let settings = CacheSettings {
            op_timeout: Duration::from_millis(250),
            ..Default::default()
        };
        let engine = CacheEngine::from_settings(MemoryCacheBackend::new(), &settings);
        assert_eq!(engine.op_timeout(), Duration::from_millis(250));
    }
}
