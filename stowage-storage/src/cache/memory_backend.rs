//! In-process volatile cache backend.
//!
//! Entries live in a `RwLock<HashMap>` and expire lazily: an expired entry is
//! treated as absent on access. It stays in the map until the same key is
//! overwritten or removed, or [`MemoryCacheBackend::purge_expired`] sweeps it.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use stowage_core::{BackendError, BackendErrorKind, MAX_VALUE_SIZE};

use super::key::CacheKey;
use super::traits::{BackendResult, CacheBackend};

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Volatile in-memory cache backend.
#[derive(Debug)]
pub struct MemoryCacheBackend {
    entries: RwLock<HashMap<String, Entry>>,
    item_size_limit: usize,
}

impl Default for MemoryCacheBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCacheBackend {
    /// Create a backend with the standard 20 MiB item limit.
    pub fn new() -> Self {
        Self::with_item_size_limit(MAX_VALUE_SIZE)
    }

    /// Create a backend that rejects items larger than `limit` bytes.
    pub fn with_item_size_limit(limit: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            item_size_limit: limit,
        }
    }

    /// Number of live (unexpired) entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .map(|map| map.values().filter(|e| !e.is_expired(now)).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        match self.entries.write() {
            Ok(mut map) => {
                let before = map.len();
                map.retain(|_, e| !e.is_expired(now));
                before - map.len()
            }
            Err(_) => 0,
        }
    }

    fn check_size(&self, size: usize) -> BackendResult<()> {
        if size > self.item_size_limit {
            return Err(BackendError::new(
                BackendErrorKind::ValueTooLarge,
                format!("item of {size} bytes exceeds limit of {}", self.item_size_limit),
            ));
        }
        Ok(())
    }
}

fn poisoned() -> BackendError {
    BackendError::new(BackendErrorKind::Unavailable, "cache lock poisoned")
}

#[async_trait]
impl CacheBackend for MemoryCacheBackend {
    async fn get(&self, key: &CacheKey) -> BackendResult<Vec<u8>> {
        let map = self.entries.read().map_err(|_| poisoned())?;
        match map.get(key.as_str()) {
            Some(entry) if !entry.is_expired(Instant::now()) => Ok(entry.value.clone()),
            _ => Err(BackendError::not_found(key.as_str())),
        }
    }

    async fn upsert(&self, key: &CacheKey, value: &[u8], ttl: Duration) -> BackendResult<()> {
        self.check_size(value.len())?;
        let expires_at = (!ttl.is_zero()).then(|| Instant::now() + ttl);
        let mut map = self.entries.write().map_err(|_| poisoned())?;
        map.insert(
            key.as_str().to_string(),
            Entry {
                value: value.to_vec(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> BackendResult<()> {
        let mut map = self.entries.write().map_err(|_| poisoned())?;
        match map.remove(key.as_str()) {
            Some(entry) if !entry.is_expired(Instant::now()) => Ok(()),
            _ => Err(BackendError::not_found(key.as_str())),
        }
    }

    async fn append(&self, key: &CacheKey, value: &[u8]) -> BackendResult<()> {
        let now = Instant::now();
        let mut map = self.entries.write().map_err(|_| poisoned())?;
        let entry = match map.get_mut(key.as_str()) {
            Some(entry) if !entry.is_expired(now) => entry,
            _ => {
                return Err(BackendError::new(
                    BackendErrorKind::NotStored,
                    format!("no entry under {key} to append to"),
                ))
            }
        };
        self.check_size(entry.value.len() + value.len())?;
        entry.value.extend_from_slice(value);
        Ok(())
    }
}
