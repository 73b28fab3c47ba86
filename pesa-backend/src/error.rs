//! Errors surfaced at the composition root

use pesa_core::{ConfigError, GatewayError, PesaError, SchemaError};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error(transparent)]
    Pesa(#[from] PesaError),

    #[error("Telemetry initialization failed: {reason}")]
    Telemetry { reason: String },

    #[error("Startup failed: {reason}")]
    Startup { reason: String },
}

impl From<GatewayError> for BackendError {
    fn from(err: GatewayError) -> Self {
        BackendError::Pesa(err.into())
    }
}

impl From<SchemaError> for BackendError {
    fn from(err: SchemaError) -> Self {
        BackendError::Pesa(err.into())
    }
}

impl From<ConfigError> for BackendError {
    fn from(err: ConfigError) -> Self {
        BackendError::Pesa(err.into())
    }
}

pub type BackendResult<T> = Result<T, BackendError>;
