//! Pesa Core - Shared Types for the Ledger Store Layer
//!
//! Everything the aggregation and schema layers agree on lives here:
//! the tagged [`Value`]/[`Row`] model decoded once at the gateway boundary,
//! the error taxonomy, aggregate and capability descriptions, the table
//! catalogue types, SQL text builders and configuration.

pub mod aggregate;
pub mod capability;
pub mod config;
pub mod error;
pub mod schema;
pub mod sql;
pub mod value;

pub use aggregate::{Aggregate, AggregateSpec, AggregateTarget, FunctionKind};
pub use capability::{
    classify_unsupported, is_unsupported, CapabilityMap, Feature, UnsupportedSignature,
    SYNTAX_MARKERS, UNSUPPORTED_SIGNATURES,
};
pub use config::{DefaultUserSeed, ReconcileConfig, StoreConfig};
pub use error::{
    ConfigError, GatewayError, GatewayResult, PesaError, PesaResult, SchemaError,
};
pub use schema::{ColumnDef, ColumnType, MigrationDecision, TableSchema, TableState};
pub use value::{GroupKey, Row, Value};
