//! Error types for Stowage operations

use std::fmt;
use thiserror::Error;

use crate::CustomerId;

/// Stable classification a cache backend attaches to a failure.
///
/// Backends translate their native status codes into one of these kinds;
/// message text is carried alongside for operators and is never matched on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendErrorKind {
    /// The key does not exist.
    KeyNotFound,
    /// The key exists and the operation required it not to (or a CAS mismatch).
    KeyExists,
    /// The operation needed an existing entry (append/replace) and found none.
    NotStored,
    /// The value exceeds the backend's item size limit.
    ValueTooLarge,
    /// The backend rejected the request arguments.
    InvalidArguments,
    /// The call did not complete within its deadline.
    Timeout,
    /// The backend could not be reached or is shutting down.
    Unavailable,
    /// Any other backend status, identified by its raw code.
    Other(u16),
}

impl fmt::Display for BackendErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeyNotFound => f.write_str("key_not_found"),
            Self::KeyExists => f.write_str("key_exists"),
            Self::NotStored => f.write_str("not_stored"),
            Self::ValueTooLarge => f.write_str("value_too_large"),
            Self::InvalidArguments => f.write_str("invalid_arguments"),
            Self::Timeout => f.write_str("timeout"),
            Self::Unavailable => f.write_str("unavailable"),
            Self::Other(code) => write!(f, "status_{code:#06x}"),
        }
    }
}

/// A failure reported by a cache backend, before normalization.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct BackendError {
    pub kind: BackendErrorKind,
    pub message: String,
}

impl BackendError {
    pub fn new(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(key: &str) -> Self {
        Self::new(BackendErrorKind::KeyNotFound, format!("key {key} not found"))
    }
}

/// The closed cache-layer error taxonomy.
///
/// Display strings are the wire names operators already know.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DatastoreError {
    #[error("NOT_FOUND")]
    NotFound,

    #[error("KEY_EXISTS_ERROR")]
    KeyExists,

    #[error("OVERSIZED_BODY")]
    OversizedBody,

    #[error("EMPTY_BODY")]
    EmptyBody,

    #[error("INVALID_KEY")]
    InvalidKey,

    #[error("INVALID_BODY")]
    InvalidBody,

    /// Unmapped backend condition, passed through for operator visibility.
    #[error("backend error ({kind}): {message}")]
    Backend {
        kind: BackendErrorKind,
        message: String,
    },
}

impl DatastoreError {
    /// Returns true for the validation failures detected before any backend call.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::InvalidKey | Self::EmptyBody | Self::OversizedBody)
    }
}

/// Primary record store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Customer not found: {id}")]
    NotFound { id: CustomerId },

    #[error("Insert failed: {reason}")]
    InsertFailed { reason: String },

    #[error("Update failed for customer {id}: {reason}")]
    UpdateFailed { id: CustomerId, reason: String },

    #[error("Delete failed for customer {id}: {reason}")]
    DeleteFailed { id: CustomerId, reason: String },

    #[error("Record store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Record store lock poisoned")]
    LockPoisoned,
}

/// Blob store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BlobError {
    #[error("Blob not found: {id}")]
    NotFound { id: CustomerId },

    #[error("Blob already exists: {id}")]
    AlreadyExists { id: CustomerId },

    #[error("Blob I/O failed for {id}: {reason}")]
    Io { id: CustomerId, reason: String },

    #[error("Blob metadata invalid for {id}: {reason}")]
    Metadata { id: CustomerId, reason: String },

    #[error("Blob checksum mismatch for {id}")]
    ChecksumMismatch { id: CustomerId },

    #[error("Blob store lock poisoned")]
    LockPoisoned,
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Telemetry initialization failed: {reason}")]
    TelemetryInit { reason: String },

    #[error("Failed to open {component} backend: {reason}")]
    BackendInit { component: String, reason: String },
}

/// Master error type for all Stowage errors.
#[derive(Debug, Clone, Error)]
pub enum StowageError {
    #[error("Cache error: {0}")]
    Datastore(#[from] DatastoreError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Blob error: {0}")]
    Blob(#[from] BlobError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Cached bytes under `key` could not be decoded into a record.
    #[error("Corrupt cache entry {key}: {reason}")]
    CorruptCacheEntry { key: String, reason: String },

    #[error("Serialization error: {reason}")]
    Serialization { reason: String },
}

/// Result type alias for Stowage operations.
pub type StowageResult<T> = Result<T, StowageError>;

// =============================================================================
// TESTS
// =============================================================================
