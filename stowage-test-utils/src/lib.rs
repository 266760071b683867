//! Stowage Test Utilities
//!
//! Shared test infrastructure for the Stowage workspace:
//! - Backend doubles for counting, failing and stalling cache calls
//! - Record and blob store doubles with switchable failures
//! - Proptest generators for keys, values and customers
//! - Fixtures for wiring an orchestrator over in-memory backends
//! - Assertions for the error taxonomy

pub use stowage_core::{
    Attachment, BackendError, BackendErrorKind, BlobError, BlobHandle, Customer, CustomerId,
    CustomerUpdate, DatastoreError, NewCustomer, StoreError, StowageError, StowageResult,
    MAX_KEY_LENGTH, MAX_VALUE_SIZE,
};
pub use stowage_storage::{
    BackendResult, BlobResult, BlobStore, CacheAside, CacheAsideConfig, CacheBackend, CacheEngine,
    CacheKey, InMemoryBlobStore, InMemoryRecordStore, MemoryCacheBackend, ReadSource, RecordStore,
    StoreResult,
};

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

// ============================================================================
// BACKEND DOUBLES
// ============================================================================

/// Per-operation call counts observed by a [`CountingBackend`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub gets: usize,
    pub upserts: usize,
    pub removes: usize,
    pub appends: usize,
}

impl CallCounts {
    pub fn total(&self) -> usize {
        self.gets + self.upserts + self.removes + self.appends
    }
}

/// Wraps a backend and counts every call that reaches it.
#[derive(Debug, Default)]
pub struct CountingBackend<B> {
    inner: B,
    gets: AtomicUsize,
    upserts: AtomicUsize,
    removes: AtomicUsize,
    appends: AtomicUsize,
}

impl<B: CacheBackend> CountingBackend<B> {
    pub fn new(inner: B) -> Self {
        Self {
            inner,
            gets: AtomicUsize::new(0),
            upserts: AtomicUsize::new(0),
            removes: AtomicUsize::new(0),
            appends: AtomicUsize::new(0),
        }
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }

    pub fn counts(&self) -> CallCounts {
        CallCounts {
            gets: self.gets.load(Ordering::SeqCst),
            upserts: self.upserts.load(Ordering::SeqCst),
            removes: self.removes.load(Ordering::SeqCst),
            appends: self.appends.load(Ordering::SeqCst),
        }
    }
}

#[async_trait]
impl<B: CacheBackend> CacheBackend for CountingBackend<B> {
    async fn get(&self, key: &CacheKey) -> BackendResult<Vec<u8>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key).await
    }

    async fn upsert(&self, key: &CacheKey, value: &[u8], ttl: Duration) -> BackendResult<()> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        self.inner.upsert(key, value, ttl).await
    }

    async fn remove(&self, key: &CacheKey) -> BackendResult<()> {
        self.removes.fetch_add(1, Ordering::SeqCst);
        self.inner.remove(key).await
    }

    async fn append(&self, key: &CacheKey, value: &[u8]) -> BackendResult<()> {
        self.appends.fetch_add(1, Ordering::SeqCst);
        self.inner.append(key, value).await
    }
}

/// Backend that fails every call with the same error kind.
#[derive(Debug, Clone)]
pub struct FailingBackend {
    kind: BackendErrorKind,
}

impl FailingBackend {
    pub fn new(kind: BackendErrorKind) -> Self {
        Self { kind }
    }

    /// A backend that behaves like an unreachable cache cluster.
    pub fn unavailable() -> Self {
        Self::new(BackendErrorKind::Unavailable)
    }

    fn fail<T>(&self, key: &CacheKey) -> BackendResult<T> {
        Err(BackendError::new(self.kind, format!("injected failure for {key}")))
    }
}

#[async_trait]
impl CacheBackend for FailingBackend {
    async fn get(&self, key: &CacheKey) -> BackendResult<Vec<u8>> {
        self.fail(key)
    }

    async fn upsert(&self, key: &CacheKey, _value: &[u8], _ttl: Duration) -> BackendResult<()> {
        self.fail(key)
    }

    async fn remove(&self, key: &CacheKey) -> BackendResult<()> {
        self.fail(key)
    }

    async fn append(&self, key: &CacheKey, _value: &[u8]) -> BackendResult<()> {
        self.fail(key)
    }
}

/// Wraps a backend and delays every call before delegating.
#[derive(Debug)]
pub struct SlowBackend<B> {
    inner: B,
    delay: Duration,
}

impl<B: CacheBackend> SlowBackend<B> {
    pub fn new(inner: B, delay: Duration) -> Self {
        Self { inner, delay }
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }
}

#[async_trait]
impl<B: CacheBackend> CacheBackend for SlowBackend<B> {
    async fn get(&self, key: &CacheKey) -> BackendResult<Vec<u8>> {
        tokio::time::sleep(self.delay).await;
        self.inner.get(key).await
    }

    async fn upsert(&self, key: &CacheKey, value: &[u8], ttl: Duration) -> BackendResult<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.upsert(key, value, ttl).await
    }

    async fn remove(&self, key: &CacheKey) -> BackendResult<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.remove(key).await
    }

    async fn append(&self, key: &CacheKey, value: &[u8]) -> BackendResult<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.append(key, value).await
    }
}

// ============================================================================
// STORE DOUBLES
// ============================================================================

/// In-memory record store that can be switched into an outage.
///
/// While unavailable, every call fails with `StoreError::Unavailable`.
#[derive(Debug)]
pub struct FailingRecordStore {
    inner: InMemoryRecordStore,
    unavailable: AtomicBool,
}

impl Default for FailingRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FailingRecordStore {
    pub fn new() -> Self {
        Self {
            inner: InMemoryRecordStore::new(),
            unavailable: AtomicBool::new(false),
        }
    }

    pub fn inner(&self) -> &InMemoryRecordStore {
        &self.inner
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable {
                reason: "injected outage".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for FailingRecordStore {
    async fn find_by_id(&self, id: CustomerId) -> StoreResult<Option<Customer>> {
        self.check()?;
        self.inner.find_by_id(id).await
    }

    async fn save(&self, customer: NewCustomer) -> StoreResult<Customer> {
        self.check()?;
        self.inner.save(customer).await
    }

    async fn update(&self, customer: &Customer, fields: &CustomerUpdate) -> StoreResult<()> {
        self.check()?;
        self.inner.update(customer, fields).await
    }

    async fn delete(&self, customer: &Customer) -> StoreResult<()> {
        self.check()?;
        self.inner.delete(customer).await
    }

    async fn find_all(&self) -> StoreResult<Vec<Customer>> {
        self.check()?;
        self.inner.find_all().await
    }
}

/// In-memory blob store with per-operation failure switches.
///
/// A switched-on operation fails with `BlobError::Io`. `read` follows the
/// `get` switch.
#[derive(Debug, Default)]
pub struct FailingBlobStore {
    inner: InMemoryBlobStore,
    fail_put: AtomicBool,
    fail_get: AtomicBool,
    fail_delete: AtomicBool,
}

impl FailingBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &InMemoryBlobStore {
        &self.inner
    }

    pub fn fail_puts(&self, fail: bool) {
        self.fail_put.store(fail, Ordering::SeqCst);
    }

    pub fn fail_gets(&self, fail: bool) {
        self.fail_get.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }

    fn check(flag: &AtomicBool, id: CustomerId, operation: &str) -> BlobResult<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(BlobError::Io {
                id,
                reason: format!("injected {operation} failure"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for FailingBlobStore {
    async fn put(
        &self,
        id: CustomerId,
        filename: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> BlobResult<BlobHandle> {
        Self::check(&self.fail_put, id, "put")?;
        self.inner.put(id, filename, content_type, bytes).await
    }

    async fn get(&self, id: CustomerId) -> BlobResult<Option<BlobHandle>> {
        Self::check(&self.fail_get, id, "get")?;
        self.inner.get(id).await
    }

    async fn read(&self, id: CustomerId) -> BlobResult<Option<Vec<u8>>> {
        Self::check(&self.fail_get, id, "read")?;
        self.inner.read(id).await
    }

    async fn delete(&self, id: CustomerId) -> BlobResult<()> {
        Self::check(&self.fail_delete, id, "delete")?;
        self.inner.delete(id).await
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for cache keys, values and customers.

    use super::*;
    use proptest::prelude::*;

    /// Generate a key that passes validation (1..=250 bytes).
    pub fn arb_valid_key() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9_:.-]{1,250}"
    }

    /// Generate a key that fails validation: empty or too long.
    pub fn arb_invalid_key() -> impl Strategy<Value = String> {
        prop_oneof![
            Just(String::new()),
            (MAX_KEY_LENGTH + 1..MAX_KEY_LENGTH + 64).prop_map(|len| "k".repeat(len)),
        ]
    }

    /// Generate a non-empty value well under the size limit.
    pub fn arb_value() -> impl Strategy<Value = Vec<u8>> {
        prop::collection::vec(any::<u8>(), 1..2048)
    }

    /// Generate a CustomerId.
    pub fn arb_customer_id() -> impl Strategy<Value = CustomerId> {
        (1u64..1_000_000).prop_map(CustomerId::new)
    }

    /// Generate a key prefix that leaves room for any record id.
    pub fn arb_key_prefix() -> impl Strategy<Value = String> {
        "[a-z]{1,32}"
    }

    /// Generate creation fields for a customer.
    pub fn arb_new_customer() -> impl Strategy<Value = NewCustomer> {
        ("[A-Z][a-z]{1,12}", "[A-Z][a-z]{1,16}", "[a-z]{1,10}@[a-z]{2,8}\\.(io|org|com)")
            .prop_map(|(first, last, email)| NewCustomer::new(first, last, email))
    }

    /// Generate a partial update, possibly empty.
    pub fn arb_customer_update() -> impl Strategy<Value = CustomerUpdate> {
        (
            proptest::option::of("[A-Z][a-z]{0,12}"),
            proptest::option::of("[A-Z][a-z]{0,16}"),
            proptest::option::of("[a-z]{1,10}@[a-z]{2,8}\\.io"),
        )
            .prop_map(|(first_name, last_name, email)| CustomerUpdate {
                first_name,
                last_name,
                email,
            })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built fixtures for common scenarios.

    use super::*;

    /// Orchestrator over in-memory backends with a counting cache.
    pub type TestOrchestrator =
        CacheAside<CountingBackend<MemoryCacheBackend>, InMemoryRecordStore, InMemoryBlobStore>;

    pub fn ada() -> NewCustomer {
        NewCustomer::new("Ada", "Lovelace", "ada@x.io")
    }

    pub fn grace() -> NewCustomer {
        NewCustomer::new("Grace", "Hopper", "grace@navy.mil")
    }

    pub fn proof_of_id() -> Attachment {
        Attachment::new("id.pdf", b"%PDF-1.7 proof".to_vec()).with_content_type("application/pdf")
    }

    /// Wire an orchestrator over the given cache backend and fresh stores.
    pub fn orchestrator_with<C: CacheBackend + 'static>(
        backend: C,
    ) -> CacheAside<C, InMemoryRecordStore, InMemoryBlobStore> {
        CacheAside::new(
            Arc::new(CacheEngine::new(backend)),
            Arc::new(InMemoryRecordStore::new()),
            Arc::new(InMemoryBlobStore::new()),
            CacheAsideConfig::default(),
        )
    }

    /// Orchestrator over in-memory backends, counting cache calls.
    pub fn orchestrator() -> TestOrchestrator {
        orchestrator_with(CountingBackend::new(MemoryCacheBackend::new()))
    }

    /// Orchestrator whose record and blob stores fail on demand.
    pub type FailingOrchestrator =
        CacheAside<CountingBackend<MemoryCacheBackend>, FailingRecordStore, FailingBlobStore>;

    pub fn failing_orchestrator() -> FailingOrchestrator {
        CacheAside::new(
            Arc::new(CacheEngine::new(CountingBackend::new(MemoryCacheBackend::new()))),
            Arc::new(FailingRecordStore::new()),
            Arc::new(FailingBlobStore::new()),
            CacheAsideConfig::default(),
        )
    }

    /// Poll the raw backend until a snapshot exists for `id`.
    ///
    /// Returns `false` if nothing shows up within `timeout`.
    pub async fn wait_for_cache_entry<C, S, B>(
        orchestrator: &CacheAside<C, S, B>,
        id: CustomerId,
        timeout: Duration,
    ) -> bool
    where
        C: CacheBackend + 'static,
        S: stowage_storage::RecordStore,
        B: stowage_storage::BlobStore,
    {
        let Ok(key) = orchestrator.cache_key(id) else {
            return false;
        };
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if orchestrator.cache().backend().get(&key).await.is_ok() {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over the error taxonomy.

    use super::*;

    /// Assert that a result is a specific datastore error.
    #[track_caller]
    pub fn assert_datastore_error<T: std::fmt::Debug>(
        result: &Result<T, DatastoreError>,
        expected: &DatastoreError,
    ) {
        match result {
            Err(e) if e == expected => {}
            other => panic!("Expected {:?}, got: {:?}", expected, other),
        }
    }

    /// Assert that a result is a validation error.
    #[track_caller]
    pub fn assert_validation_error<T: std::fmt::Debug>(result: &Result<T, DatastoreError>) {
        match result {
            Err(e) if e.is_validation() => {}
            other => panic!("Expected validation error, got: {:?}", other),
        }
    }

    /// Assert that a result is a backend passthrough of the given kind.
    #[track_caller]
    pub fn assert_backend_error<T: std::fmt::Debug>(
        result: &Result<T, DatastoreError>,
        expected: BackendErrorKind,
    ) {
        match result {
            Err(DatastoreError::Backend { kind, .. }) => {
                assert_eq!(*kind, expected, "Wrong backend error kind");
            }
            other => panic!("Expected backend error {:?}, got: {:?}", expected, other),
        }
    }

    /// Assert that an orchestrator result is a corrupt cache entry.
    #[track_caller]
    pub fn assert_corrupt_entry<T: std::fmt::Debug>(result: &StowageResult<T>) {
        match result {
            Err(StowageError::CorruptCacheEntry { .. }) => {}
            other => panic!("Expected CorruptCacheEntry, got: {:?}", other),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[tokio::test]
    async fn test_counting_backend_counts() {
        let backend = CountingBackend::new(MemoryCacheBackend::new());
        let key = CacheKey::parse("k").unwrap();

        backend.upsert(&key, b"v", Duration::ZERO).await.unwrap();
        backend.get(&key).await.unwrap();
        backend.append(&key, b"w").await.unwrap();
        backend.remove(&key).await.unwrap();

        let counts = backend.counts();
        assert_eq!(
            counts,
            CallCounts {
                gets: 1,
                upserts: 1,
                removes: 1,
                appends: 1
            }
        );
        assert_eq!(counts.total(), 4);
    }

    #[tokio::test]
    async fn test_failing_backend_fails_everything() {
        let backend = FailingBackend::new(BackendErrorKind::Other(0x86));
        let key = CacheKey::parse("k").unwrap();
        assert_eq!(backend.get(&key).await.unwrap_err().kind, BackendErrorKind::Other(0x86));
        assert!(backend.upsert(&key, b"v", Duration::ZERO).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_backend_delegates() {
        let backend = SlowBackend::new(MemoryCacheBackend::new(), Duration::from_millis(50));
        let key = CacheKey::parse("k").unwrap();
        backend.upsert(&key, b"v", Duration::ZERO).await.unwrap();
        assert_eq!(backend.get(&key).await.unwrap(), b"v".to_vec());
    }

    #[tokio::test]
    async fn test_failing_record_store_switches() {
        let store = FailingRecordStore::new();
        let saved = store.save(fixtures::ada()).await.unwrap();

        store.set_unavailable(true);
        assert!(matches!(
            store.find_by_id(saved.id).await,
            Err(StoreError::Unavailable { .. })
        ));

        store.set_unavailable(false);
        assert_eq!(store.find_by_id(saved.id).await.unwrap(), Some(saved));
    }

    #[tokio::test]
    async fn test_failing_blob_store_switches() {
        let blobs = FailingBlobStore::new();
        let id = CustomerId::new(1);

        blobs.fail_puts(true);
        assert!(matches!(blobs.put(id, "a", "text/plain", b"a").await, Err(BlobError::Io { .. })));
        assert_eq!(blobs.inner().blob_count(), 0);

        blobs.fail_puts(false);
        blobs.put(id, "a", "text/plain", b"a").await.unwrap();
        blobs.fail_deletes(true);
        assert!(blobs.delete(id).await.is_err());
        assert_eq!(blobs.inner().blob_count(), 1);
    }

    #[test]
    fn test_fixtures_are_distinct() {
        assert_ne!(fixtures::ada(), fixtures::grace());
        assert_eq!(fixtures::proof_of_id().content_type, "application/pdf");
    }

    proptest! {
        #[test]
        fn prop_valid_keys_parse(key in generators::arb_valid_key()) {
            prop_assert!(CacheKey::parse(key).is_ok());
        }

        #[test]
        fn prop_invalid_keys_rejected(key in generators::arb_invalid_key()) {
            prop_assert_eq!(CacheKey::parse(key), Err(DatastoreError::InvalidKey));
        }

        #[test]
        fn prop_record_keys_fit(prefix in generators::arb_key_prefix(), id in generators::arb_customer_id()) {
            let key = CacheKey::for_record(&prefix, id).unwrap();
            prop_assert_eq!(key.record_parts(), Some((prefix.as_str(), id)));
        }
    }
}
