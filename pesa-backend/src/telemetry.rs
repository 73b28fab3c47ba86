//! Tracing subscriber initialization
//!
//! Installs a `tracing-subscriber` registry with an [`EnvFilter`] and either
//! a human-readable or a JSON formatter.

use crate::error::{BackendError, BackendResult};
use pesa_core::ConfigError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Telemetry configuration from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// `EnvFilter` directives, e.g. `pesa_aggregate=debug,info`.
    pub filter: String,
    pub format: LogFormat,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl TelemetryConfig {
    /// - `RUST_LOG` (default: info)
    /// - `PESA_LOG_FORMAT`: `pretty` or `json` (default: pretty)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let filter = lookup("RUST_LOG")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        let format = match lookup("PESA_LOG_FORMAT") {
            None => LogFormat::Pretty,
            Some(raw) => match raw.trim().to_lowercase().as_str() {
                "" | "pretty" | "text" => LogFormat::Pretty,
                "json" => LogFormat::Json,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        field: "PESA_LOG_FORMAT".to_string(),
                        value: raw,
                        reason: "expected pretty or json".to_string(),
                    })
                }
            },
        };

        Ok(Self { filter, format })
    }
}

/// Install the global subscriber.
///
/// Returns `Ok(false)` when a subscriber is already installed, so repeated
/// calls are harmless.
pub fn init_tracing(config: &TelemetryConfig) -> BackendResult<bool> {
    let filter = EnvFilter::try_new(&config.filter).map_err(|e| BackendError::Telemetry {
        reason: format!("invalid log filter '{}': {}", config.filter, e),
    })?;

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match config.format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).try_init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
    };

    match installed {
        Ok(()) => {
            tracing::info!(filter = %config.filter, format = ?config.format, "Telemetry initialized");
            Ok(true)
        }
        Err(_) => Ok(false),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = TelemetryConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, TelemetryConfig::default());
    }

    #[test]
    fn test_json_format_and_filter() {
        let config = TelemetryConfig::from_lookup(lookup_from(&[
            ("RUST_LOG", "pesa_aggregate=debug,warn"),
            ("PESA_LOG_FORMAT", "JSON"),
        ]))
        .unwrap();
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.filter, "pesa_aggregate=debug,warn");
    }

    #[test]
    fn test_unknown_format_rejected() {
        let err = TelemetryConfig::from_lookup(lookup_from(&[("PESA_LOG_FORMAT", "xml")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_init_is_idempotent() {
        let config = TelemetryConfig::default();
        init_tracing(&config).unwrap();
        assert!(!init_tracing(&config).unwrap());
    }
}
