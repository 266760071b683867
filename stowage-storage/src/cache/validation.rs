//! Pre-flight checks run before any cache backend call.

use stowage_core::{DatastoreError, MAX_VALUE_SIZE};

use super::key::CacheKey;

/// Check key length bounds (1..=250 bytes).
pub fn validate_key(key: &str) -> Result<CacheKey, DatastoreError> {
    CacheKey::parse(key)
}

/// Check that a value is non-empty and at most 20 MiB.
pub fn validate_value(value: &[u8]) -> Result<(), DatastoreError> {
    if value.is_empty() {
        tracing::debug!("cache value is empty");
        return Err(DatastoreError::EmptyBody);
    }

    if value.len() > MAX_VALUE_SIZE {
        tracing::debug!(size = value.len(), limit = MAX_VALUE_SIZE, "cache value too large");
        return Err(DatastoreError::OversizedBody);
    }

    Ok(())
}
