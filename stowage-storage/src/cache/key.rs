//! Validated cache keys.
//!
//! A `CacheKey` can only be obtained through [`CacheKey::parse`] or
//! [`CacheKey::for_record`], so a backend never receives a key that breaks
//! the length bounds.

use std::fmt;

use stowage_core::{CustomerId, DatastoreError, MAX_KEY_LENGTH};

/// Separator between the entity prefix and the record id.
const SEPARATOR: char = '_';

/// A cache key of 1..=250 bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    /// Private inner data - cannot be constructed externally
    inner: String,
}

impl CacheKey {
    /// Validate `raw` and wrap it.
    pub fn parse(raw: impl Into<String>) -> Result<Self, DatastoreError> {
        let raw = raw.into();
        if raw.is_empty() || raw.len() > MAX_KEY_LENGTH {
            return Err(DatastoreError::InvalidKey);
        }
        Ok(Self { inner: raw })
    }

    /// Key for a record snapshot: `"<prefix>_<id>"`.
    ///
    /// This format links a durable record to its cached snapshot and must not change.
    pub fn for_record(prefix: &str, id: CustomerId) -> Result<Self, DatastoreError> {
        Self::parse(format!("{prefix}{SEPARATOR}{id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.inner
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.inner.as_bytes()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Split a record key back into its prefix and id.
    ///
    /// Returns `None` if the key does not end in `_<decimal id>`.
    pub fn record_parts(&self) -> Option<(&str, CustomerId)> {
        let (prefix, id) = self.inner.rsplit_once(SEPARATOR)?;
        if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        Some((prefix, id.parse().ok()?))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.inner
    }
}
