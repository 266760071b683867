//! Cache-aside orchestration over the record store, blob store and cache.
//!
//! Reads try the cache first and fall through to the record store on a
//! miss, repopulating the cache in the background. Writes go to the record
//! store, then the blob store, then invalidate the cached snapshot. Cache
//! failures never fail a request; store and blob failures on the write path
//! always do.

use std::sync::Arc;
use std::time::Instant;

use stowage_core::{
    Attachment, BlobError, CacheSettings, Customer, CustomerId, CustomerUpdate, DatastoreError,
    NewCustomer, StowageError, StowageResult,
};

use super::engine::CacheEngine;
use super::key::CacheKey;
use super::traits::CacheBackend;
use crate::blob::BlobStore;
use crate::store::RecordStore;
use crate::timing::elapsed_ms;

/// Configuration for the cache-aside orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheAsideConfig {
    /// Prefix for record keys (`<prefix>_<id>`).
    pub key_prefix: String,
    /// TTL for snapshots written back after a miss.
    pub repopulate_ttl_secs: u32,
}

impl Default for CacheAsideConfig {
    fn default() -> Self {
        Self {
            key_prefix: "customer".to_string(),
            repopulate_ttl_secs: 1990,
        }
    }
}

impl CacheAsideConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the record key prefix.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Set the repopulation TTL.
    pub fn with_ttl(mut self, ttl_secs: u32) -> Self {
        self.repopulate_ttl_secs = ttl_secs;
        self
    }
}

impl From<&CacheSettings> for CacheAsideConfig {
    fn from(settings: &CacheSettings) -> Self {
        Self {
            key_prefix: settings.key_prefix.clone(),
            repopulate_ttl_secs: settings.ttl_secs,
        }
    }
}

/// Where a fetched record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadSource {
    Cache,
    Store,
}

impl ReadSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::Store => "store",
        }
    }
}

/// Result of a successful `fetch`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedRecord {
    pub record: Customer,
    pub source: ReadSource,
    /// Time spent resolving the record (cache and/or store).
    pub record_latency_ms: u64,
    /// Name of the attached blob, if any.
    pub blob_name: Option<String>,
    /// Time spent on the blob lookup, measured separately.
    pub blob_latency_ms: u64,
}

/// Result of a successful write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteReceipt {
    pub id: CustomerId,
    pub latency_ms: u64,
}

/// Result of `list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    pub records: Vec<Customer>,
    pub latency_ms: u64,
}

/// Cache-aside orchestrator.
///
/// # Type Parameters
///
/// - `C`: The cache backend behind the shared [`CacheEngine`]
/// - `S`: The record store (source of truth)
/// - `B`: The blob store for attachments
///
/// # Example
///
/// ```ignore
/// let orchestrator = CacheAside::new(engine, store, blobs, CacheAsideConfig::default());
///
/// let receipt = orchestrator.create(NewCustomer::new("Ada", "Lovelace", "ada@x.io"), None).await?;
/// let fetched = orchestrator.fetch(receipt.id).await?; // served from the store
/// let fetched = orchestrator.fetch(receipt.id).await?; // served from the cache
/// ```
pub struct CacheAside<C, S, B>
where
    C: CacheBackend + 'static,
    S: RecordStore,
    B: BlobStore,
{
    cache: Arc<CacheEngine<C>>,
    store: Arc<S>,
    blobs: Arc<B>,
    config: CacheAsideConfig,
}

impl<C, S, B> CacheAside<C, S, B>
where
    C: CacheBackend + 'static,
    S: RecordStore,
    B: BlobStore,
{
    /// Create a new orchestrator over injected backends.
    pub fn new(
        cache: Arc<CacheEngine<C>>,
        store: Arc<S>,
        blobs: Arc<B>,
        config: CacheAsideConfig,
    ) -> Self {
        Self {
            cache,
            store,
            blobs,
            config,
        }
    }

    /// Get the orchestrator configuration.
    pub fn config(&self) -> &CacheAsideConfig {
        &self.config
    }

    /// Get a reference to the cache engine.
    pub fn cache(&self) -> &CacheEngine<C> {
        &self.cache
    }

    /// Get a reference to the record store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Get a reference to the blob store.
    pub fn blobs(&self) -> &B {
        &self.blobs
    }

    /// Cache key for a record id.
    pub fn cache_key(&self, id: CustomerId) -> Result<CacheKey, DatastoreError> {
        CacheKey::for_record(&self.config.key_prefix, id)
    }

    /// Fetch a record, cache first.
    ///
    /// Returns `Ok(None)` if the record store has no such record. A cached
    /// snapshot that cannot be decoded is reported as
    /// [`StowageError::CorruptCacheEntry`] rather than treated as a miss.
    pub async fn fetch(&self, id: CustomerId) -> StowageResult<Option<FetchedRecord>> {
        let start = Instant::now();
        let key = match self.cache_key(id) {
            Ok(key) => Some(key),
            Err(e) => {
                tracing::warn!(%id, error = %e, "cannot build cache key, reading from store");
                None
            }
        };

        let cached = match &key {
            Some(key) => self.cache.get(key.as_str()).await.map(|bytes| (key, bytes)),
            None => None,
        };

        let (record, source) = match cached {
            Some((key, bytes)) => (self.decode_snapshot(key, id, &bytes)?, ReadSource::Cache),
            None => match self.store.find_by_id(id).await? {
                Some(record) => {
                    if let Some(key) = &key {
                        self.repopulate(key.clone(), &record);
                    }
                    (record, ReadSource::Store)
                }
                None => {
                    tracing::debug!(%id, "record not found");
                    return Ok(None);
                }
            },
        };
        let record_latency_ms = elapsed_ms(start);

        let blob_start = Instant::now();
        let blob_name = match self.blobs.get(id).await {
            Ok(handle) => handle.map(|h| h.name),
            Err(e) => {
                tracing::warn!(%id, error = %e, "blob lookup failed");
                None
            }
        };
        let blob_latency_ms = elapsed_ms(blob_start);

        tracing::info!(
            %id,
            source = source.as_str(),
            record_latency_ms,
            blob_latency_ms,
            "fetched record"
        );

        Ok(Some(FetchedRecord {
            record,
            source,
            record_latency_ms,
            blob_name,
            blob_latency_ms,
        }))
    }

    /// Create a record and, if given, its attachment. The cache is untouched.
    pub async fn create(
        &self,
        fields: NewCustomer,
        attachment: Option<Attachment>,
    ) -> StowageResult<WriteReceipt> {
        let start = Instant::now();
        let record = self.store.save(fields).await?;

        if let Some(attachment) = attachment {
            self.put_blob(record.id, &attachment).await?;
        }

        let latency_ms = elapsed_ms(start);
        tracing::info!(id = %record.id, latency_ms, "created record");
        Ok(WriteReceipt {
            id: record.id,
            latency_ms,
        })
    }

    /// Update a record, replace its attachment if one is given, and
    /// invalidate its cached snapshot.
    ///
    /// Returns `Ok(None)` if the record does not exist.
    pub async fn update(
        &self,
        id: CustomerId,
        fields: CustomerUpdate,
        attachment: Option<Attachment>,
    ) -> StowageResult<Option<WriteReceipt>> {
        let start = Instant::now();
        let Some(record) = self.store.find_by_id(id).await? else {
            return Ok(None);
        };

        self.store.update(&record, &fields).await?;

        let blob_result = match attachment {
            Some(attachment) => self.replace_blob(id, &attachment).await,
            None => Ok(()),
        };
        // The store has changed, so the snapshot goes even if the blob step failed.
        self.invalidate(id).await;
        blob_result?;

        let latency_ms = elapsed_ms(start);
        tracing::info!(%id, latency_ms, "updated record");
        Ok(Some(WriteReceipt { id, latency_ms }))
    }

    /// Delete a record, its attachment and its cached snapshot.
    ///
    /// Returns `Ok(None)` if the record does not exist.
    pub async fn remove(&self, id: CustomerId) -> StowageResult<Option<WriteReceipt>> {
        let start = Instant::now();
        let Some(record) = self.store.find_by_id(id).await? else {
            return Ok(None);
        };

        self.store.delete(&record).await?;
        let blob_result = self.delete_blob(id).await;
        self.invalidate(id).await;
        blob_result?;

        let latency_ms = elapsed_ms(start);
        tracing::info!(%id, latency_ms, "removed record");
        Ok(Some(WriteReceipt { id, latency_ms }))
    }

    /// List every record straight from the record store.
    pub async fn list(&self) -> StowageResult<Listing> {
        let start = Instant::now();
        let records = self.store.find_all().await?;
        let latency_ms = elapsed_ms(start);
        tracing::debug!(count = records.len(), latency_ms, "listed records");
        Ok(Listing {
            records,
            latency_ms,
        })
    }

    fn decode_snapshot(&self, key: &CacheKey, id: CustomerId, bytes: &[u8]) -> StowageResult<Customer> {
        let corrupt = |reason: String| {
            tracing::error!(%key, %reason, "corrupt cache entry");
            StowageError::CorruptCacheEntry {
                key: key.to_string(),
                reason,
            }
        };

        let record: Customer = serde_json::from_slice(bytes).map_err(|e| corrupt(e.to_string()))?;
        if record.id != id {
            return Err(corrupt(format!("snapshot holds customer {}", record.id)));
        }
        Ok(record)
    }

    /// Write a snapshot back to the cache without blocking the caller.
    fn repopulate(&self, key: CacheKey, record: &Customer) {
        let payload = match serde_json::to_vec(record) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(%key, error = %e, "could not serialize snapshot");
                return;
            }
        };

        let cache = Arc::clone(&self.cache);
        let ttl_secs = self.config.repopulate_ttl_secs;
        tokio::spawn(async move {
            match cache.set(key.as_str(), &payload, ttl_secs).await {
                Ok(()) => tracing::debug!(%key, ttl_secs, "cache repopulated"),
                Err(e) => tracing::warn!(%key, error = %e, "cache repopulation failed"),
            }
        });
    }

    /// Drop the cached snapshot for `id`. Failures are logged only.
    async fn invalidate(&self, id: CustomerId) {
        let key = match self.cache_key(id) {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!(%id, error = %e, "cannot build cache key for invalidation");
                return;
            }
        };

        match self.cache.delete(key.as_str()).await {
            Ok(()) => tracing::debug!(%key, "cache entry invalidated"),
            Err(DatastoreError::NotFound) => tracing::debug!(%key, "no cache entry to invalidate"),
            Err(e) => tracing::warn!(%key, error = %e, "cache invalidation failed"),
        }
    }

    async fn put_blob(&self, id: CustomerId, attachment: &Attachment) -> StowageResult<()> {
        self.blobs
            .put(id, &attachment.filename, &attachment.content_type, &attachment.bytes)
            .await?;
        Ok(())
    }

    async fn replace_blob(&self, id: CustomerId, attachment: &Attachment) -> StowageResult<()> {
        self.delete_blob(id).await?;
        self.put_blob(id, attachment).await
    }

    /// Delete the blob for `id`; a missing blob is not an error.
    async fn delete_blob(&self, id: CustomerId) -> StowageResult<()> {
        match self.blobs.delete(id).await {
            Ok(()) | Err(BlobError::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl<C, S, B> Clone for CacheAside<C, S, B>
where
    C: CacheBackend + 'static,
    S: RecordStore,
    B: BlobStore,
{
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
            store: Arc::clone(&self.store),
            blobs: Arc::clone(&self.blobs),
            config: self.config.clone(),
        }
    }
}
