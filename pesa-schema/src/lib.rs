//! Pesa Schema - Startup Schema Reconciliation
//!
//! Declares the seven production tables, creates the missing ones in
//! dependency order against a store whose DDL feedback cannot be trusted,
//! replaces a legacy identity table, and seeds reference rows once.
//!
//! - [`tables`]: static catalogue and creation-order validation
//! - [`seed`]: default categories and the default user row
//! - [`SchemaReconciler`]: the startup pass producing an
//!   [`InitializationReport`]

pub mod reconciler;
pub mod seed;
pub mod tables;

pub use reconciler::{
    is_not_found, ColumnCheck, IdentitySchemaStatus, InitializationReport, SchemaReconciler,
    SeedOutcome, NOT_FOUND_PHRASES,
};
pub use seed::{default_user_row, CategorySeed, DEFAULT_CATEGORIES};
pub use tables::{table, validate_creation_order, IDENTITY_REQUIRED_COLUMNS, TABLES};
