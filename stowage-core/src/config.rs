//! Configuration types
//!
//! Configuration is loaded from `STOWAGE_*` environment variables with
//! defaults suitable for development, then checked with [`StowageConfig::validate`].

use std::path::PathBuf;
use std::time::Duration;

use crate::{ConfigError, MAX_KEY_LENGTH};

/// Cache engine and cache-aside settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    /// Prefix for record cache keys (`<prefix>_<id>`).
    pub key_prefix: String,
    /// TTL applied when a read repopulates the cache.
    pub ttl_secs: u32,
    /// Deadline for each cache backend call.
    pub op_timeout: Duration,
    /// LMDB directory. `None` selects the in-memory backend.
    pub lmdb_path: Option<PathBuf>,
    /// LMDB map size in megabytes.
    pub lmdb_max_mb: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            key_prefix: "customer".to_string(),
            ttl_secs: 1990,
            op_timeout: Duration::from_millis(100),
            lmdb_path: None,
            lmdb_max_mb: 64,
        }
    }
}

/// Blob store settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlobSettings {
    /// Root directory for the filesystem blob store. `None` keeps blobs in memory.
    pub root: Option<PathBuf>,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    pub default_filter: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            default_filter: "info".to_string(),
            json: false,
        }
    }
}

/// Master configuration struct.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StowageConfig {
    pub cache: CacheSettings,
    pub blob: BlobSettings,
    pub telemetry: TelemetryConfig,
}

impl StowageConfig {
    /// Create StowageConfig from environment variables.
    ///
    /// Environment variables:
    /// - `STOWAGE_CACHE_KEY_PREFIX`: Record key prefix (default: customer)
    /// - `STOWAGE_CACHE_TTL_SECS`: Repopulation TTL in seconds (default: 1990)
    /// - `STOWAGE_CACHE_TIMEOUT_MS`: Per-call cache deadline (default: 100)
    /// - `STOWAGE_CACHE_LMDB_PATH`: LMDB directory (default: unset, in-memory cache)
    /// - `STOWAGE_CACHE_LMDB_MAX_MB`: LMDB map size (default: 64)
    /// - `STOWAGE_BLOB_ROOT`: Blob directory (default: unset, in-memory blobs)
    /// - `STOWAGE_LOG_JSON`: "true" or "false" (default: false)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let key_prefix = lookup("STOWAGE_CACHE_KEY_PREFIX")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.cache.key_prefix);

        let ttl_secs = parse_var(&lookup, "STOWAGE_CACHE_TTL_SECS")?
            .unwrap_or(defaults.cache.ttl_secs);

        let op_timeout = parse_var::<u64, _>(&lookup, "STOWAGE_CACHE_TIMEOUT_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.cache.op_timeout);

        let lmdb_path = lookup("STOWAGE_CACHE_LMDB_PATH")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        let lmdb_max_mb = parse_var(&lookup, "STOWAGE_CACHE_LMDB_MAX_MB")?
            .unwrap_or(defaults.cache.lmdb_max_mb);

        let blob_root = lookup("STOWAGE_BLOB_ROOT")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        let json = lookup("STOWAGE_LOG_JSON")
            .map(|s| matches!(s.to_lowercase().as_str(), "true" | "1"))
            .unwrap_or(false);

        let config = Self {
            cache: CacheSettings {
                key_prefix,
                ttl_secs,
                op_timeout,
                lmdb_path,
                lmdb_max_mb,
            },
            blob: BlobSettings { root: blob_root },
            telemetry: TelemetryConfig {
                json,
                ..defaults.telemetry
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// TTLs above 30 days are accepted; the cache engine logs them.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // The longest id (u64::MAX) plus separator must still fit a cache key.
        let longest_key = self.cache.key_prefix.len() + 1 + u64::MAX.to_string().len();
        if longest_key > MAX_KEY_LENGTH {
            return Err(ConfigError::InvalidValue {
                field: "cache.key_prefix".to_string(),
                value: self.cache.key_prefix.clone(),
                reason: format!("prefixed keys must fit in {MAX_KEY_LENGTH} bytes"),
            });
        }

        if self.cache.ttl_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "cache.ttl_secs".to_string(),
                value: "0".to_string(),
                reason: "ttl_secs must be greater than 0".to_string(),
            });
        }

        if self.cache.op_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "cache.op_timeout".to_string(),
                value: "0ms".to_string(),
                reason: "op_timeout must be greater than 0".to_string(),
            });
        }

        if self.cache.lmdb_max_mb == 0 {
            return Err(ConfigError::InvalidValue {
                field: "cache.lmdb_max_mb".to_string(),
                value: "0".to_string(),
                reason: "lmdb_max_mb must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                field: name.to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            }),
    }
}
