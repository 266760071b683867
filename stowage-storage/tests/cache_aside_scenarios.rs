//! End-to-end scenarios for the cache-aside orchestrator.
//!
//! Tests verify:
//! - Full record lifecycle through cache, record store and blob store
//! - Validation happens before any backend call
//! - Backend failure classes normalize onto the public taxonomy
//! - Cache failures and deadlines never fail a record read
//! - Writes invalidate cached snapshots
//! - Store and blob failures on the write path are surfaced, and the cache
//!   still stops serving a snapshot once the store has changed

use std::sync::Arc;
use std::time::Duration;

use stowage_core::{
    BlobError, CustomerUpdate, DatastoreError, StoreError, StowageError, MAX_KEY_LENGTH,
    MAX_VALUE_SIZE,
};
use stowage_storage::{
    BlobStore, CacheAside, CacheAsideConfig, CacheEngine, FsBlobStore, InMemoryRecordStore,
    LmdbCacheBackend, MemoryCacheBackend, ReadSource, RecordStore,
};
use stowage_test_utils::assertions::*;
use stowage_test_utils::fixtures::{self, wait_for_cache_entry};
use stowage_test_utils::{BackendErrorKind, CountingBackend, CustomerId, FailingBackend, SlowBackend};
use tempfile::TempDir;

const REPOPULATE_WAIT: Duration = Duration::from_secs(2);

// ============================================================================
// RECORD LIFECYCLE
// ============================================================================

#[tokio::test]
async fn test_ada_lifecycle() {
    let orchestrator = fixtures::orchestrator();

    let created = orchestrator
        .create(fixtures::ada(), Some(fixtures::proof_of_id()))
        .await
        .unwrap();
    assert_eq!(created.id, CustomerId::new(1));

    let first = orchestrator.fetch(created.id).await.unwrap().unwrap();
    assert_eq!(first.source, ReadSource::Store);
    assert_eq!(first.record.first_name, "Ada");
    assert_eq!(first.blob_name.as_deref(), Some("id.pdf"));

    assert!(wait_for_cache_entry(&orchestrator, created.id, REPOPULATE_WAIT).await);

    let second = orchestrator.fetch(created.id).await.unwrap().unwrap();
    assert_eq!(second.source, ReadSource::Cache);
    assert_eq!(second.record, first.record);
    assert_eq!(second.blob_name.as_deref(), Some("id.pdf"));

    let update = CustomerUpdate {
        email: Some("ada@engine.org".to_string()),
        ..Default::default()
    };
    let updated = orchestrator.update(created.id, update, None).await.unwrap();
    assert!(updated.is_some());

    let third = orchestrator.fetch(created.id).await.unwrap().unwrap();
    assert_eq!(third.source, ReadSource::Store);
    assert_eq!(third.record.email, "ada@engine.org");
    assert_eq!(third.record.first_name, "Ada");
    assert!(third.record.updated_at >= third.record.created_at);

    assert!(orchestrator.remove(created.id).await.unwrap().is_some());
    assert!(orchestrator.fetch(created.id).await.unwrap().is_none());
    assert_eq!(orchestrator.blobs().blob_count(), 0);
}

#[tokio::test]
async fn test_remove_nonexistent_touches_nothing() {
    let orchestrator = fixtures::orchestrator();

    assert!(orchestrator.remove(CustomerId::new(999)).await.unwrap().is_none());
    assert_eq!(orchestrator.cache().backend().counts().total(), 0);
}

#[tokio::test]
async fn test_update_invalidates_cached_snapshot() {
    let orchestrator = fixtures::orchestrator();
    let created = orchestrator.create(fixtures::grace(), None).await.unwrap();

    orchestrator.fetch(created.id).await.unwrap();
    assert!(wait_for_cache_entry(&orchestrator, created.id, REPOPULATE_WAIT).await);

    let update = CustomerUpdate {
        last_name: Some("Murray Hopper".to_string()),
        ..Default::default()
    };
    orchestrator.update(created.id, update, None).await.unwrap();

    let counts = orchestrator.cache().backend().counts();
    assert_eq!(counts.removes, 1);
    assert!(orchestrator.cache().backend().inner().is_empty());

    let fetched = orchestrator.fetch(created.id).await.unwrap().unwrap();
    assert_eq!(fetched.source, ReadSource::Store);
    assert_eq!(fetched.record.last_name, "Murray Hopper");
}

#[tokio::test]
async fn test_list_bypasses_cache() {
    let orchestrator = fixtures::orchestrator();
    assert!(orchestrator.list().await.unwrap().records.is_empty());

    orchestrator.create(fixtures::ada(), None).await.unwrap();
    orchestrator.create(fixtures::grace(), None).await.unwrap();

    let listing = orchestrator.list().await.unwrap();
    let names: Vec<_> = listing.records.iter().map(|c| c.first_name.as_str()).collect();
    assert_eq!(names, ["Ada", "Grace"]);
    assert_eq!(orchestrator.cache().backend().counts().total(), 0);
}

#[tokio::test]
async fn test_corrupt_snapshot_surfaces() {
    let orchestrator = fixtures::orchestrator();
    let created = orchestrator.create(fixtures::ada(), None).await.unwrap();

    let key = orchestrator.cache_key(created.id).unwrap();
    orchestrator.cache().set(key.as_str(), b"{\"id\":", 60).await.unwrap();

    assert_corrupt_entry(&orchestrator.fetch(created.id).await);
}

// ============================================================================
// VALIDATION AND NORMALIZATION
// ============================================================================

#[tokio::test]
async fn test_invalid_input_never_reaches_backend() {
    let engine = CacheEngine::new(CountingBackend::new(MemoryCacheBackend::new()));
    let long_key = "k".repeat(MAX_KEY_LENGTH + 1);

    assert_datastore_error(&engine.set("", b"v", 10).await, &DatastoreError::InvalidKey);
    assert_datastore_error(&engine.set(&long_key, b"v", 10).await, &DatastoreError::InvalidKey);
    assert_datastore_error(&engine.set("k", b"", 10).await, &DatastoreError::EmptyBody);
    assert_datastore_error(
        &engine.set("k", &vec![0u8; MAX_VALUE_SIZE + 1], 10).await,
        &DatastoreError::OversizedBody,
    );
    assert_validation_error(&engine.delete("").await);
    assert_validation_error(&engine.append(&long_key, b"v").await);
    assert!(engine.get("").await.is_none());

    assert_eq!(engine.backend().counts().total(), 0);
}

#[tokio::test]
async fn test_key_at_limit_accepted() {
    let engine = CacheEngine::new(MemoryCacheBackend::new());
    let key = "k".repeat(MAX_KEY_LENGTH);

    engine.set(&key, b"v", 0).await.unwrap();
    assert_eq!(engine.get(&key).await, Some(b"v".to_vec()));
}

#[tokio::test]
async fn test_not_found_classes_normalize() {
    let engine = CacheEngine::new(MemoryCacheBackend::new());

    assert_datastore_error(&engine.delete("missing").await, &DatastoreError::NotFound);
    assert_datastore_error(&engine.append("missing", b"x").await, &DatastoreError::NotFound);
}

#[tokio::test]
async fn test_backend_size_limit_is_oversized_body() {
    let engine = CacheEngine::new(MemoryCacheBackend::with_item_size_limit(8));
    assert_datastore_error(
        &engine.set("k", b"0123456789", 10).await,
        &DatastoreError::OversizedBody,
    );
}

#[tokio::test]
async fn test_backend_kinds_normalize() {
    let cases = [
        (BackendErrorKind::KeyExists, Some(DatastoreError::KeyExists)),
        (BackendErrorKind::InvalidArguments, Some(DatastoreError::InvalidBody)),
        (BackendErrorKind::ValueTooLarge, Some(DatastoreError::OversizedBody)),
        (BackendErrorKind::NotStored, Some(DatastoreError::NotFound)),
        (BackendErrorKind::Unavailable, None),
        (BackendErrorKind::Other(0x86), None),
    ];

    for (kind, expected) in cases {
        let engine = CacheEngine::new(FailingBackend::new(kind));
        let result = engine.set("k", b"v", 10).await;
        match expected {
            Some(expected) => assert_datastore_error(&result, &expected),
            None => assert_backend_error(&result, kind),
        }
    }
}

// ============================================================================
// FAIL-OPEN BEHAVIOR
// ============================================================================

#[tokio::test]
async fn test_unavailable_cache_never_fails_requests() {
    let orchestrator = fixtures::orchestrator_with(FailingBackend::unavailable());

    let created = orchestrator
        .create(fixtures::ada(), Some(fixtures::proof_of_id()))
        .await
        .unwrap();

    for _ in 0..3 {
        let fetched = orchestrator.fetch(created.id).await.unwrap().unwrap();
        assert_eq!(fetched.source, ReadSource::Store);
        tokio::task::yield_now().await;
    }

    orchestrator
        .update(created.id, CustomerUpdate::default(), Some(fixtures::proof_of_id()))
        .await
        .unwrap()
        .unwrap();
    orchestrator.remove(created.id).await.unwrap().unwrap();

    let stats = orchestrator.cache().stats();
    assert_eq!(stats.hits, 0);
    assert!(stats.errors >= 3);
}

#[tokio::test(start_paused = true)]
async fn test_stalled_cache_reads_fall_through() {
    let slow = SlowBackend::new(MemoryCacheBackend::new(), Duration::from_secs(5));
    let orchestrator = fixtures::orchestrator_with(slow);
    let created = orchestrator.create(fixtures::ada(), None).await.unwrap();

    let fetched = orchestrator.fetch(created.id).await.unwrap().unwrap();
    assert_eq!(fetched.source, ReadSource::Store);

    assert_backend_error(
        &orchestrator.cache().set("k", b"v", 10).await,
        BackendErrorKind::Timeout,
    );
}

// ============================================================================
// STORE AND BLOB FAILURES
// ============================================================================

fn is_blob_io<T>(result: &Result<T, StowageError>) -> bool {
    matches!(result, Err(StowageError::Blob(BlobError::Io { .. })))
}

fn is_store_outage<T>(result: &Result<T, StowageError>) -> bool {
    matches!(result, Err(StowageError::Store(StoreError::Unavailable { .. })))
}

#[tokio::test]
async fn test_remove_with_failing_blob_delete_still_invalidates() {
    let orchestrator = fixtures::failing_orchestrator();
    let created = orchestrator
        .create(fixtures::ada(), Some(fixtures::proof_of_id()))
        .await
        .unwrap();
    orchestrator.fetch(created.id).await.unwrap();
    assert!(wait_for_cache_entry(&orchestrator, created.id, REPOPULATE_WAIT).await);

    orchestrator.blobs().fail_deletes(true);
    assert!(is_blob_io(&orchestrator.remove(created.id).await));

    assert!(orchestrator.store().inner().find_by_id(created.id).await.unwrap().is_none());
    assert!(orchestrator.cache().backend().inner().is_empty());
    assert!(orchestrator.fetch(created.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_update_with_failing_blob_delete_still_invalidates() {
    let orchestrator = fixtures::failing_orchestrator();
    let created = orchestrator
        .create(fixtures::ada(), Some(fixtures::proof_of_id()))
        .await
        .unwrap();
    orchestrator.fetch(created.id).await.unwrap();
    assert!(wait_for_cache_entry(&orchestrator, created.id, REPOPULATE_WAIT).await);

    orchestrator.blobs().fail_deletes(true);
    let update = CustomerUpdate {
        email: Some("ada@engine.org".to_string()),
        ..Default::default()
    };
    let result = orchestrator
        .update(created.id, update, Some(fixtures::proof_of_id()))
        .await;
    assert!(is_blob_io(&result));

    let fetched = orchestrator.fetch(created.id).await.unwrap().unwrap();
    assert_eq!(fetched.source, ReadSource::Store);
    assert_eq!(fetched.record.email, "ada@engine.org");
    assert_eq!(fetched.blob_name.as_deref(), Some("id.pdf"));
}

#[tokio::test]
async fn test_update_with_failing_blob_put_still_invalidates() {
    let orchestrator = fixtures::failing_orchestrator();
    let created = orchestrator
        .create(fixtures::ada(), Some(fixtures::proof_of_id()))
        .await
        .unwrap();
    orchestrator.fetch(created.id).await.unwrap();
    assert!(wait_for_cache_entry(&orchestrator, created.id, REPOPULATE_WAIT).await);

    orchestrator.blobs().fail_puts(true);
    let update = CustomerUpdate {
        last_name: Some("King".to_string()),
        ..Default::default()
    };
    let result = orchestrator
        .update(created.id, update, Some(fixtures::proof_of_id()))
        .await;
    assert!(is_blob_io(&result));

    // The old blob is gone and the new one never landed.
    assert_eq!(orchestrator.blobs().inner().blob_count(), 0);
    let fetched = orchestrator.fetch(created.id).await.unwrap().unwrap();
    assert_eq!(fetched.source, ReadSource::Store);
    assert_eq!(fetched.record.last_name, "King");
    assert_eq!(fetched.blob_name, None);
}

#[tokio::test]
async fn test_create_with_failing_blob_put_keeps_record() {
    let orchestrator = fixtures::failing_orchestrator();
    orchestrator.blobs().fail_puts(true);

    let result = orchestrator
        .create(fixtures::ada(), Some(fixtures::proof_of_id()))
        .await;
    assert!(is_blob_io(&result));

    assert_eq!(orchestrator.store().inner().customer_count(), 1);
    assert_eq!(orchestrator.blobs().inner().blob_count(), 0);
    assert_eq!(orchestrator.cache().backend().counts().total(), 0);
}

#[tokio::test]
async fn test_store_outage_is_not_not_found() {
    let orchestrator = fixtures::failing_orchestrator();
    let created = orchestrator.create(fixtures::ada(), None).await.unwrap();

    assert!(orchestrator.fetch(CustomerId::new(404)).await.unwrap().is_none());

    orchestrator.store().set_unavailable(true);
    assert!(is_store_outage(&orchestrator.fetch(created.id).await));
    assert!(is_store_outage(&orchestrator.fetch(CustomerId::new(404)).await));
    assert!(is_store_outage(&orchestrator.create(fixtures::grace(), None).await));
    assert!(is_store_outage(
        &orchestrator.update(created.id, CustomerUpdate::default(), None).await
    ));
    assert!(is_store_outage(&orchestrator.remove(created.id).await));
    assert!(is_store_outage(&orchestrator.list().await));

    orchestrator.store().set_unavailable(false);
    assert_eq!(
        orchestrator.fetch(created.id).await.unwrap().unwrap().record.first_name,
        "Ada"
    );
}

#[tokio::test]
async fn test_blob_lookup_failure_still_serves_record() {
    let orchestrator = fixtures::failing_orchestrator();
    let created = orchestrator
        .create(fixtures::ada(), Some(fixtures::proof_of_id()))
        .await
        .unwrap();

    orchestrator.blobs().fail_gets(true);
    let fetched = orchestrator.fetch(created.id).await.unwrap().unwrap();
    assert_eq!(fetched.record.first_name, "Ada");
    assert_eq!(fetched.blob_name, None);
}

// ============================================================================
// DURABLE BACKENDS
// ============================================================================

#[tokio::test]
async fn test_lmdb_cache_and_fs_blobs() {
    let dir = TempDir::new().unwrap();
    let cache = LmdbCacheBackend::new(dir.path().join("cache"), 16).unwrap();
    let blobs = FsBlobStore::open(dir.path().join("blobs")).await.unwrap();

    let orchestrator = CacheAside::new(
        Arc::new(CacheEngine::new(cache)),
        Arc::new(InMemoryRecordStore::new()),
        Arc::new(blobs),
        CacheAsideConfig::new().with_key_prefix("client").with_ttl(60),
    );

    let created = orchestrator
        .create(fixtures::ada(), Some(fixtures::proof_of_id()))
        .await
        .unwrap();
    assert_eq!(orchestrator.cache_key(created.id).unwrap().as_str(), "client_1");

    orchestrator.fetch(created.id).await.unwrap();
    assert!(wait_for_cache_entry(&orchestrator, created.id, REPOPULATE_WAIT).await);

    let cached = orchestrator.fetch(created.id).await.unwrap().unwrap();
    assert_eq!(cached.source, ReadSource::Cache);
    assert_eq!(cached.blob_name.as_deref(), Some("id.pdf"));

    let replacement = stowage_core::Attachment::new("passport.png", b"\x89PNG".to_vec());
    orchestrator
        .update(created.id, CustomerUpdate::default(), Some(replacement))
        .await
        .unwrap();
    assert_eq!(
        orchestrator.blobs().read(created.id).await.unwrap(),
        Some(b"\x89PNG".to_vec())
    );

    orchestrator.remove(created.id).await.unwrap();
    assert!(orchestrator.blobs().get(created.id).await.unwrap().is_none());
    assert_eq!(orchestrator.cache().backend().entry_count().unwrap(), 0);
}
