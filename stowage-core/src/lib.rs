//! Stowage Core - Record Types, Errors and Configuration
//!
//! Shared vocabulary for the Stowage data-access layer. Storage traits,
//! cache backends and the cache-aside orchestrator live in stowage-storage.

mod config;
mod entities;
mod error;
mod identity;
pub mod telemetry;

pub use config::{BlobSettings, CacheSettings, StowageConfig, TelemetryConfig};
pub use entities::{sniff_content_type, Attachment, BlobHandle, Customer, CustomerUpdate, NewCustomer};
pub use error::{
    BackendError, BackendErrorKind, BlobError, ConfigError, DatastoreError, StoreError,
    StowageError, StowageResult,
};
pub use identity::{compute_content_hash, content_hash_hex, ContentHash, CustomerId, Timestamp};
pub use telemetry::init_tracing;

// ============================================================================
// CACHE LIMITS
// ============================================================================

/// Longest accepted cache key, in bytes.
pub const MAX_KEY_LENGTH: usize = 250;

/// Largest accepted cache value, in bytes (20 MiB).
pub const MAX_VALUE_SIZE: usize = 20 * 1024 * 1024;

/// Recommended TTL ceiling (30 days). Longer TTLs are accepted but logged.
pub const MAX_TTL_SECS: u32 = 60 * 60 * 24 * 30;
