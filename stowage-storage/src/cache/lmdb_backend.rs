//! LMDB-backed cache backend.
//!
//! Uses the heed crate (Rust bindings for LMDB) to provide a memory-mapped
//! key-value store that survives process restarts but is still treated as
//! volatile: the record store stays authoritative.
//!
//! # Value Format
//!
//! Each value is stored as `[expires_at: i64 LE millis][payload]`, where an
//! `expires_at` of 0 means the entry never expires. Expired entries read as
//! not found and are removed lazily or by [`LmdbCacheBackend::purge_expired`].
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions. The backend uses:
//! - Read transactions for `get`
//! - Write transactions for `upsert`, `remove`, `append` and purging

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use stowage_core::{BackendError, BackendErrorKind, MAX_VALUE_SIZE};

use super::key::CacheKey;
use super::traits::{BackendResult, CacheBackend};

/// Length of the expiry header preceding every payload.
const HEADER_LEN: usize = 8;

/// Error type for LMDB cache setup and maintenance.
#[derive(Debug, thiserror::Error)]
pub enum LmdbCacheError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbCacheError> for BackendError {
    fn from(e: LmdbCacheError) -> Self {
        BackendError::new(BackendErrorKind::Unavailable, e.to_string())
    }
}

fn txn_error(e: heed::Error) -> BackendError {
    BackendError::new(BackendErrorKind::Unavailable, format!("lmdb: {e}"))
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Split a stored value into its expiry and payload.
fn decode(raw: &[u8]) -> Option<(i64, &[u8])> {
    if raw.len() < HEADER_LEN {
        return None;
    }
    let header: [u8; HEADER_LEN] = raw[..HEADER_LEN].try_into().ok()?;
    Some((i64::from_le_bytes(header), &raw[HEADER_LEN..]))
}

fn encode(expires_at: i64, payload: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
    bytes.extend_from_slice(&expires_at.to_le_bytes());
    bytes.extend_from_slice(payload);
    bytes
}

fn is_live(expires_at: i64, now: i64) -> bool {
    expires_at == 0 || expires_at > now
}

/// LMDB-backed cache backend.
///
/// # Example
///
/// ```ignore
/// use stowage_storage::cache::{CacheEngine, LmdbCacheBackend};
///
/// let backend = LmdbCacheBackend::new("/var/cache/stowage", 64)?;
/// let engine = CacheEngine::new(backend);
/// engine.set("customer_1", br#"{"id":1}"#, 1990).await?;
/// ```
pub struct LmdbCacheBackend {
    /// The LMDB environment.
    env: Env,
    /// The main database (single unnamed database).
    db: Database<Bytes, Bytes>,
}

impl LmdbCacheBackend {
    /// Create a new LMDB cache backend.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    pub fn new<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbCacheError> {
        std::fs::create_dir_all(&path)?;

        // SAFETY: the environment directory is owned by this backend; the
        // same path must not be opened twice within one process.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbCacheError::EnvOpen(e.to_string()))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbCacheError::DbOpen(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        Ok(Self { env, db })
    }

    /// Number of stored entries, expired ones included.
    pub fn entry_count(&self) -> Result<u64, LmdbCacheError> {
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;
        self.db
            .len(&rtxn)
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))
    }

    /// Remove every expired entry, returning how many were deleted.
    pub fn purge_expired(&self) -> Result<u64, LmdbCacheError> {
        let now = now_millis();
        let expired: Vec<Vec<u8>> = {
            let rtxn = self
                .env
                .read_txn()
                .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;
            let iter = self
                .db
                .iter(&rtxn)
                .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

            iter.filter_map(Result::ok)
                .filter(|(_, raw)| decode(raw).map_or(true, |(at, _)| !is_live(at, now)))
                .map(|(key, _)| key.to_vec())
                .collect()
        };

        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        let mut deleted = 0u64;
        for key in &expired {
            if self.db.delete(&mut wtxn, key).unwrap_or(false) {
                deleted += 1;
            }
        }

        wtxn.commit()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        if deleted > 0 {
            tracing::debug!(deleted, "purged expired cache entries");
        }
        Ok(deleted)
    }

    /// Drop an entry found expired during a read.
    fn evict(&self, key: &CacheKey) {
        let result = self.env.write_txn().and_then(|mut wtxn| {
            let raw = self.db.get(&wtxn, key.as_bytes())?;
            let still_expired = raw
                .and_then(decode)
                .is_some_and(|(at, _)| !is_live(at, now_millis()));
            if still_expired {
                self.db.delete(&mut wtxn, key.as_bytes())?;
            }
            wtxn.commit()
        });
        if let Err(e) = result {
            tracing::debug!(%key, error = %e, "lazy eviction failed");
        }
    }
}

#[async_trait]
impl CacheBackend for LmdbCacheBackend {
    async fn get(&self, key: &CacheKey) -> BackendResult<Vec<u8>> {
        let found = {
            let rtxn = self.env.read_txn().map_err(txn_error)?;
            match self.db.get(&rtxn, key.as_bytes()).map_err(txn_error)? {
                None => None,
                Some(raw) => match decode(raw) {
                    Some((at, payload)) => Some((at, payload.to_vec())),
                    None => {
                        return Err(BackendError::new(
                            BackendErrorKind::Other(0),
                            format!("entry {key} is missing its expiry header"),
                        ))
                    }
                },
            }
        };

        match found {
            Some((at, payload)) if is_live(at, now_millis()) => Ok(payload),
            Some(_) => {
                self.evict(key);
                Err(BackendError::not_found(key.as_str()))
            }
            None => Err(BackendError::not_found(key.as_str())),
        }
    }

    async fn upsert(&self, key: &CacheKey, value: &[u8], ttl: Duration) -> BackendResult<()> {
        if value.len() > MAX_VALUE_SIZE {
            return Err(BackendError::new(
                BackendErrorKind::ValueTooLarge,
                format!("item of {} bytes exceeds limit", value.len()),
            ));
        }

        let expires_at = if ttl.is_zero() {
            0
        } else {
            let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
            now_millis().saturating_add(ttl_ms)
        };

        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        self.db
            .put(&mut wtxn, key.as_bytes(), &encode(expires_at, value))
            .map_err(txn_error)?;
        wtxn.commit().map_err(txn_error)
    }

    async fn remove(&self, key: &CacheKey) -> BackendResult<()> {
        let mut wtxn = self.env.write_txn().map_err(txn_error)?;

        let was_live = self
            .db
            .get(&wtxn, key.as_bytes())
            .map_err(txn_error)?
            .and_then(decode)
            .is_some_and(|(at, _)| is_live(at, now_millis()));

        let deleted = self.db.delete(&mut wtxn, key.as_bytes()).map_err(txn_error)?;
        wtxn.commit().map_err(txn_error)?;

        if deleted && was_live {
            Ok(())
        } else {
            Err(BackendError::not_found(key.as_str()))
        }
    }

    async fn append(&self, key: &CacheKey, value: &[u8]) -> BackendResult<()> {
        let mut wtxn = self.env.write_txn().map_err(txn_error)?;

        let existing = self
            .db
            .get(&wtxn, key.as_bytes())
            .map_err(txn_error)?
            .and_then(decode)
            .filter(|(at, _)| is_live(*at, now_millis()))
            .map(|(at, payload)| (at, payload.to_vec()));

        let Some((expires_at, mut payload)) = existing else {
            return Err(BackendError::new(
                BackendErrorKind::NotStored,
                format!("no entry under {key} to append to"),
            ));
        };

        if payload.len() + value.len() > MAX_VALUE_SIZE {
            return Err(BackendError::new(
                BackendErrorKind::ValueTooLarge,
                format!("append would grow {key} past the item limit"),
            ));
        }

        payload.extend_from_slice(value);
        self.db
            .put(&mut wtxn, key.as_bytes(), &encode(expires_at, &payload))
            .map_err(txn_error)?;
        wtxn.commit().map_err(txn_error)
    }
}
