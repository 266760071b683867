//! Tracing subscriber initialization.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{ConfigError, TelemetryConfig};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `config.default_filter`. Call once at
/// startup; a second call reports `ConfigError::TelemetryInit`.
pub fn init_tracing(config: &TelemetryConfig) -> Result<(), ConfigError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.default_filter))
        .map_err(|e| ConfigError::InvalidValue {
            field: "telemetry.default_filter".to_string(),
            value: config.default_filter.clone(),
            reason: e.to_string(),
        })?;

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer()).try_init()
    };

    result.map_err(|e| ConfigError::TelemetryInit {
        reason: e.to_string(),
    })?;

    tracing::debug!(json = config.json, "tracing initialized");
    Ok(())
}
