//! Error types for ledger store operations

use thiserror::Error;

/// Failures reported by (or on the way to) the remote store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// Transport failure or timeout. Never read as a capability signal.
    #[error("Remote store unreachable: {message}")]
    Connectivity { message: String },

    /// The store answered, but with a failure text.
    #[error("Remote store error: {message}")]
    Rejected { message: String },

    #[error("Invalid response from remote store: {reason}")]
    InvalidResponse { reason: String },

    #[error("Store lock poisoned")]
    LockPoisoned,
}

impl GatewayError {
    pub fn connectivity(message: impl Into<String>) -> Self {
        Self::Connectivity {
            message: message.into(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }

    pub fn invalid_response(reason: impl Into<String>) -> Self {
        Self::InvalidResponse {
            reason: reason.into(),
        }
    }

    /// The store's own failure text, if this error carries one.
    pub fn rejection_text(&self) -> Option<&str> {
        match self {
            Self::Rejected { message } => Some(message),
            _ => None,
        }
    }
}

/// Schema reconciliation errors. These are collected per table into the
/// initialization report rather than aborting sibling tables.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Table '{table}' was reported created but does not exist")]
    VerificationFailed { table: String },

    #[error("Table '{table}' uses a legacy schema (missing columns: {missing:?})")]
    MigrationRequired { table: String, missing: Vec<String> },

    #[error("Table '{table}' not created: referenced table '{dependency}' is not present")]
    MissingDependency { table: String, dependency: String },

    #[error("Table '{table}' is declared before the table it references: '{dependency}'")]
    DependencyOrder { table: String, dependency: String },

    #[error("Failed to create table '{table}': {reason}")]
    CreateFailed { table: String, reason: String },

    #[error("Migration of table '{table}' failed: {reason}")]
    MigrationFailed { table: String, reason: String },

    #[error("Table '{table}' columns differ (missing: {missing:?}, extra: {extra:?}, mistyped: {mistyped:?})")]
    ColumnMismatch {
        table: String,
        missing: Vec<String>,
        extra: Vec<String>,
        mistyped: Vec<String>,
    },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for the ledger store layer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PesaError {
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

pub type GatewayResult<T> = Result<T, GatewayError>;

pub type PesaResult<T> = Result<T, PesaError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_text_only_for_rejected() {
        assert_eq!(
            GatewayError::rejected("syntax error near COUNT").rejection_text(),
            Some("syntax error near COUNT")
        );
        assert_eq!(GatewayError::connectivity("timed out").rejection_text(), None);
        assert_eq!(GatewayError::LockPoisoned.rejection_text(), None);
    }

    #[test]
    fn test_schema_error_display() {
        let err = SchemaError::VerificationFailed {
            table: "budgets".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("budgets"));
        assert!(msg.contains("does not exist"));
    }

    #[test]
    fn test_pesa_error_from_gateway() {
        let err: PesaError = GatewayError::connectivity("refused").into();
        assert!(matches!(err, PesaError::Gateway(GatewayError::Connectivity { .. })));
        assert!(format!("{}", err).contains("refused"));
    }
}
