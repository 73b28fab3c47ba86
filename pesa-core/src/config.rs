//! Configuration Module
//!
//! Settings for the remote store connection and for startup reconciliation.
//! Values are read from environment variables; `from_lookup` takes any
//! key -> value function so tests never touch the process environment.

use crate::error::{ConfigError, PesaResult};
use std::fmt;
use std::time::Duration;

/// Default per-call ceiling for remote store requests.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Table used by the capability probe unless configured otherwise.
pub const DEFAULT_PROBE_TABLE: &str = "categories";

// ============================================================================
// STORE CONFIGURATION
// ============================================================================

/// Connection settings for the remote store.
#[derive(Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Base URL; statements are POSTed to `{api_url}/query`.
    pub api_url: String,
    pub api_key: String,
    /// Target database name sent with every statement.
    pub database: String,
    pub timeout: Duration,
}

impl StoreConfig {
    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            api_url: api_url.into(),
            api_key: api_key.into(),
            database: database.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Load from environment variables.
    ///
    /// - `PESADB_API_URL` (required)
    /// - `PESADB_API_KEY` (required)
    /// - `PESADB_DATABASE` (required)
    /// - `PESADB_TIMEOUT_SECS` (default: 30)
    pub fn from_env() -> PesaResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> PesaResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let timeout_secs = match lookup("PESADB_TIMEOUT_SECS") {
            Some(raw) => parse_positive_secs("PESADB_TIMEOUT_SECS", &raw)?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        let config = Self {
            api_url: lookup("PESADB_API_URL").unwrap_or_default(),
            api_key: lookup("PESADB_API_KEY").unwrap_or_default(),
            database: lookup("PESADB_DATABASE").unwrap_or_default(),
            timeout: Duration::from_secs(timeout_secs),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reports the first missing required field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("PESADB_API_URL", &self.api_url),
            ("PESADB_API_KEY", &self.api_key),
            ("PESADB_DATABASE", &self.database),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingRequired {
                    field: field.to_string(),
                });
            }
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "PESADB_TIMEOUT_SECS".to_string(),
                value: "0".to_string(),
                reason: "timeout must be positive".to_string(),
            });
        }
        Ok(())
    }

    pub fn query_url(&self) -> String {
        format!("{}/query", self.api_url.trim_end_matches('/'))
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &"[REDACTED]")
            .field("database", &self.database)
            .field("timeout", &self.timeout)
            .finish()
    }
}

// ============================================================================
// RECONCILIATION CONFIGURATION
// ============================================================================

/// Identity row inserted when startup is asked to create a default user.
///
/// The password hash comes from the authentication layer; nothing here
/// hashes.
#[derive(Clone, PartialEq, Eq)]
pub struct DefaultUserSeed {
    pub email: String,
    pub name: String,
    pub password_hash: String,
}

impl fmt::Debug for DefaultUserSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultUserSeed")
            .field("email", &self.email)
            .field("name", &self.name)
            .field("password_hash", &"[REDACTED]")
            .finish()
    }
}

/// Startup reconciliation switches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileConfig {
    /// When false a stale identity table is reported, not dropped.
    pub allow_destructive_migration: bool,
    pub seed_categories: bool,
    pub create_default_user: bool,
    /// Representative table for the capability probe.
    pub probe_table: String,
    pub default_user: Option<DefaultUserSeed>,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            allow_destructive_migration: true,
            seed_categories: true,
            create_default_user: false,
            probe_table: DEFAULT_PROBE_TABLE.to_string(),
            default_user: None,
        }
    }
}

impl ReconcileConfig {
    /// Load from environment variables.
    ///
    /// - `PESA_ALLOW_DESTRUCTIVE_MIGRATION` (default: true)
    /// - `PESA_SEED_CATEGORIES` (default: true)
    /// - `PESA_CREATE_DEFAULT_USER` (default: false)
    /// - `PESA_PROBE_TABLE` (default: categories)
    /// - `PESA_DEFAULT_USER_EMAIL`, `PESA_DEFAULT_USER_NAME`,
    ///   `PESA_DEFAULT_USER_PASSWORD_HASH` (all three, or no seed)
    pub fn from_env() -> PesaResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> PesaResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let allow_destructive_migration = bool_var(
            &lookup,
            "PESA_ALLOW_DESTRUCTIVE_MIGRATION",
            defaults.allow_destructive_migration,
        )?;
        let seed_categories = bool_var(&lookup, "PESA_SEED_CATEGORIES", defaults.seed_categories)?;
        let create_default_user = bool_var(
            &lookup,
            "PESA_CREATE_DEFAULT_USER",
            defaults.create_default_user,
        )?;

        let probe_table = lookup("PESA_PROBE_TABLE")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.probe_table);

        let email = lookup("PESA_DEFAULT_USER_EMAIL").filter(|s| !s.trim().is_empty());
        let name = lookup("PESA_DEFAULT_USER_NAME").filter(|s| !s.trim().is_empty());
        let password_hash =
            lookup("PESA_DEFAULT_USER_PASSWORD_HASH").filter(|s| !s.trim().is_empty());

        let default_user = match (email, name, password_hash) {
            (Some(email), Some(name), Some(password_hash)) => Some(DefaultUserSeed {
                email,
                name,
                password_hash,
            }),
            (None, None, None) => None,
            (email, name, _) => {
                let field = if email.is_none() {
                    "PESA_DEFAULT_USER_EMAIL"
                } else if name.is_none() {
                    "PESA_DEFAULT_USER_NAME"
                } else {
                    "PESA_DEFAULT_USER_PASSWORD_HASH"
                };
                return Err(ConfigError::MissingRequired {
                    field: field.to_string(),
                }
                .into());
            }
        };

        Ok(Self {
            allow_destructive_migration,
            seed_categories,
            create_default_user,
            probe_table,
            default_user,
        })
    }
}

fn bool_var<F>(lookup: &F, field: &str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(field) {
        None => Ok(default),
        Some(raw) => match raw.trim().to_lowercase().as_str() {
            "" => Ok(default),
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue {
                field: field.to_string(),
                value: raw,
                reason: "expected true or false".to_string(),
            }),
        },
    }
}

fn parse_positive_secs(field: &str, raw: &str) -> Result<u64, ConfigError> {
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(secs),
        _ => Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value: raw.to_string(),
            reason: "expected a positive number of seconds".to_string(),
        }),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PesaError;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const STORE_VARS: &[(&str, &str)] = &[
        ("PESADB_API_URL", "https://db.example.test/"),
        ("PESADB_API_KEY", "secret-key"),
        ("PESADB_DATABASE", "pesa"),
    ];

    #[test]
    fn test_store_config_defaults_timeout() {
        let config = StoreConfig::from_lookup(lookup_from(STORE_VARS)).unwrap();
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.query_url(), "https://db.example.test/query");
    }

    #[test]
    fn test_store_config_reports_missing_field() {
        let err = StoreConfig::from_lookup(lookup_from(&[
            ("PESADB_API_URL", "https://db.example.test"),
            ("PESADB_DATABASE", "pesa"),
        ]))
        .unwrap_err();
        assert_eq!(
            err,
            PesaError::Config(ConfigError::MissingRequired {
                field: "PESADB_API_KEY".to_string()
            })
        );
    }

    #[test]
    fn test_store_config_rejects_bad_timeout() {
        let mut vars = STORE_VARS.to_vec();
        vars.push(("PESADB_TIMEOUT_SECS", "soon"));
        let err = StoreConfig::from_lookup(lookup_from(&vars)).unwrap_err();
        assert!(matches!(
            err,
            PesaError::Config(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_store_config_debug_redacts_key() {
        let config = StoreConfig::new("https://db.example.test", "secret-key", "pesa");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("secret-key"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_reconcile_config_defaults() {
        let config = ReconcileConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, ReconcileConfig::default());
        assert!(config.allow_destructive_migration);
        assert!(!config.create_default_user);
        assert_eq!(config.probe_table, "categories");
    }

    #[test]
    fn test_reconcile_config_overrides() {
        let config = ReconcileConfig::from_lookup(lookup_from(&[
            ("PESA_ALLOW_DESTRUCTIVE_MIGRATION", "false"),
            ("PESA_CREATE_DEFAULT_USER", "1"),
            ("PESA_PROBE_TABLE", "transactions"),
            ("PESA_DEFAULT_USER_EMAIL", "demo@pesa.test"),
            ("PESA_DEFAULT_USER_NAME", "Demo"),
            ("PESA_DEFAULT_USER_PASSWORD_HASH", "$2b$12$hash"),
        ]))
        .unwrap();
        assert!(!config.allow_destructive_migration);
        assert!(config.create_default_user);
        assert_eq!(config.probe_table, "transactions");
        assert_eq!(
            config.default_user.map(|seed| seed.email),
            Some("demo@pesa.test".to_string())
        );
    }

    #[test]
    fn test_partial_default_user_is_an_error() {
        let err = ReconcileConfig::from_lookup(lookup_from(&[(
            "PESA_DEFAULT_USER_EMAIL",
            "demo@pesa.test",
        )]))
        .unwrap_err();
        assert_eq!(
            err,
            PesaError::Config(ConfigError::MissingRequired {
                field: "PESA_DEFAULT_USER_NAME".to_string()
            })
        );
    }

    #[test]
    fn test_invalid_bool_rejected() {
        let err = ReconcileConfig::from_lookup(lookup_from(&[("PESA_SEED_CATEGORIES", "maybe")]))
            .unwrap_err();
        assert!(format!("{}", err).contains("PESA_SEED_CATEGORIES"));
    }
}
