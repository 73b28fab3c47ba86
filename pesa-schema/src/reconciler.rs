//! Schema reconciler
//!
//! The startup pass that brings the remote store in line with the table
//! catalogue. The store has no transactions and no migrations, and a CREATE
//! it reports as successful is not always persisted, so every step is
//! check-then-act and every creation is re-checked.
//!
//! Failures are caught per table and collected into the
//! [`InitializationReport`]; one table never blocks its siblings.

use crate::seed::{default_user_row, DEFAULT_CATEGORIES};
use crate::tables::{self, IDENTITY_REQUIRED_COLUMNS, TABLES};
use pesa_aggregate::AggregateEngine;
use pesa_core::sql::build_insert;
use pesa_core::{
    ConfigError, GatewayError, GatewayResult, MigrationDecision, PesaResult, ReconcileConfig,
    SchemaError, TableSchema, TableState,
};
use pesa_store::Gateway;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

/// Failure texts that mean the probed table does not exist.
pub const NOT_FOUND_PHRASES: &[&str] = &[
    "does not exist",
    "no such table",
    "table not found",
    "tablenotfound",
];

pub fn is_not_found(error: &GatewayError) -> bool {
    let text = error.to_string().to_lowercase();
    NOT_FOUND_PHRASES.iter().any(|phrase| text.contains(phrase))
}

// ============================================================================
// REPORT TYPES
// ============================================================================

/// State of the identity table as seen by the two column probes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentitySchemaStatus {
    pub exists: bool,
    pub needs_migration: bool,
    pub has_correct_schema: bool,
    pub missing_columns: Vec<String>,
}

impl IdentitySchemaStatus {
    pub fn decision(&self) -> MigrationDecision {
        if !self.exists {
            MigrationDecision::CreateFresh
        } else if self.needs_migration {
            MigrationDecision::DestructiveMigrate
        } else {
            MigrationDecision::NoAction
        }
    }

    pub fn state(&self) -> TableState {
        match (self.exists, self.has_correct_schema) {
            (false, _) => TableState::Missing,
            (true, true) => TableState::SchemaOk,
            (true, false) => TableState::SchemaStale,
        }
    }
}

/// Column verification of one table against its fetched first row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ColumnCheck {
    Verified,
    /// The table is empty, so there was no row to compare. Not a proof.
    SkippedEmpty,
    Mismatch {
        missing: Vec<String>,
        extra: Vec<String>,
        mistyped: Vec<String>,
    },
}

/// Result of one seeding pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeedOutcome {
    pub inserted: usize,
    pub already_seeded: bool,
    /// One entry per row that could not be inserted.
    pub failures: Vec<String>,
}

/// Outcome of [`SchemaReconciler::initialize`].
///
/// `success` follows `verified`: entries in `errors` from seeding or column
/// checks do not by themselves fail the startup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InitializationReport {
    pub success: bool,
    pub message: String,
    pub tables_created: usize,
    pub tables_skipped: usize,
    pub categories_seeded: usize,
    pub user_created: bool,
    pub user_id: Option<String>,
    pub migrated: bool,
    pub verified: bool,
    pub errors: Vec<String>,
    pub column_checks: BTreeMap<String, ColumnCheck>,
}

// ============================================================================
// RECONCILER
// ============================================================================

pub struct SchemaReconciler {
    gateway: Arc<dyn Gateway>,
    engine: AggregateEngine,
    config: ReconcileConfig,
    tables: &'static [TableSchema],
}

impl SchemaReconciler {
    /// Reconciler over the production catalogue.
    pub fn new(gateway: Arc<dyn Gateway>, config: ReconcileConfig) -> Result<Self, SchemaError> {
        Self::with_tables(gateway, config, TABLES)
    }

    /// Reconciler over a custom catalogue. Refuses a list in which a table
    /// precedes one it references.
    pub fn with_tables(
        gateway: Arc<dyn Gateway>,
        config: ReconcileConfig,
        tables: &'static [TableSchema],
    ) -> Result<Self, SchemaError> {
        tables::validate_creation_order(tables)?;
        Ok(Self {
            engine: AggregateEngine::new(Arc::clone(&gateway)),
            gateway,
            config,
            tables,
        })
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    // ========================================================================
    // EXISTENCE AND CREATION
    // ========================================================================

    /// Whether `table` answers a one-row probe.
    ///
    /// Failures outside [`NOT_FOUND_PHRASES`] are also reported as missing,
    /// with a warning, since they may hide a connectivity fault.
    pub async fn table_exists(&self, table: &str) -> bool {
        match self
            .gateway
            .query(&format!("SELECT * FROM {} LIMIT 1", table))
            .await
        {
            Ok(_) => true,
            Err(e) if is_not_found(&e) => {
                tracing::debug!(table = %table, "Table not found");
                false
            }
            Err(e) => {
                tracing::warn!(
                    table = %table,
                    error = %e,
                    "Existence check failed for an unexpected reason; treating table as missing"
                );
                false
            }
        }
    }

    /// Create `schema` unless it already exists.
    ///
    /// Returns [`TableState::Present`] when the table was already there and
    /// [`TableState::Verified`] when it was created and re-checked. `present`
    /// holds the tables already known to exist in this pass.
    pub async fn ensure_table(
        &self,
        schema: &TableSchema,
        present: &HashSet<&str>,
    ) -> Result<TableState, SchemaError> {
        if self.table_exists(schema.name).await {
            tracing::info!(table = %schema.name, "Table already exists");
            return Ok(TableState::Present);
        }

        if let Some(dependency) = schema.dependencies().find(|dep| !present.contains(dep)) {
            return Err(SchemaError::MissingDependency {
                table: schema.name.to_string(),
                dependency: dependency.to_string(),
            });
        }

        tracing::info!(table = %schema.name, "Creating table");
        self.gateway
            .execute(&schema.create_statement())
            .await
            .map_err(|e| SchemaError::CreateFailed {
                table: schema.name.to_string(),
                reason: e.to_string(),
            })?;

        // The store can acknowledge a CREATE it never applied.
        if !self.table_exists(schema.name).await {
            return Err(SchemaError::VerificationFailed {
                table: schema.name.to_string(),
            });
        }

        tracing::info!(table = %schema.name, "Table created");
        Ok(TableState::Verified)
    }

    // ========================================================================
    // IDENTITY TABLE MIGRATION
    // ========================================================================

    /// Probe the identity table for each required column separately.
    ///
    /// A rejected probe marks its column missing. Any other failure
    /// propagates, so a flaky connection never looks like a legacy schema.
    pub async fn identity_schema_status(&self) -> GatewayResult<IdentitySchemaStatus> {
        let users = tables::USERS;
        if !self.table_exists(users.name).await {
            return Ok(IdentitySchemaStatus {
                exists: false,
                needs_migration: false,
                has_correct_schema: false,
                missing_columns: Vec::new(),
            });
        }

        let mut missing_columns = Vec::new();
        for column in IDENTITY_REQUIRED_COLUMNS {
            let probe = format!("SELECT id, {} FROM {} LIMIT 1", column, users.name);
            match self.gateway.query(&probe).await {
                Ok(_) => {}
                Err(GatewayError::Rejected { message }) => {
                    tracing::debug!(table = %users.name, column = %column, error = %message, "Column probe rejected");
                    missing_columns.push(column.to_string());
                }
                Err(e) => return Err(e),
            }
        }

        let needs_migration = !missing_columns.is_empty();
        Ok(IdentitySchemaStatus {
            exists: true,
            needs_migration,
            has_correct_schema: !needs_migration,
            missing_columns,
        })
    }

    /// Drop the legacy identity table and create it fresh. Every existing
    /// row is deleted.
    ///
    /// With destructive migration disabled this only reports
    /// [`SchemaError::MigrationRequired`].
    pub async fn migrate_identity_table(
        &self,
        status: &IdentitySchemaStatus,
    ) -> Result<(), SchemaError> {
        let users = tables::USERS;

        if !self.config.allow_destructive_migration {
            tracing::warn!(
                table = %users.name,
                missing = ?status.missing_columns,
                "Legacy identity schema detected; destructive migration is disabled"
            );
            return Err(SchemaError::MigrationRequired {
                table: users.name.to_string(),
                missing: status.missing_columns.clone(),
            });
        }

        tracing::error!(
            table = %users.name,
            missing = ?status.missing_columns,
            "DESTRUCTIVE MIGRATION: dropping legacy table, all existing rows will be deleted"
        );

        let failed = |e: GatewayError| SchemaError::MigrationFailed {
            table: users.name.to_string(),
            reason: e.to_string(),
        };
        self.gateway
            .execute(&users.drop_statement())
            .await
            .map_err(failed)?;
        self.gateway
            .execute(&users.create_statement())
            .await
            .map_err(failed)?;

        if !self.table_exists(users.name).await {
            return Err(SchemaError::VerificationFailed {
                table: users.name.to_string(),
            });
        }

        tracing::info!(table = %users.name, "Identity table recreated with current schema");
        Ok(())
    }

    // ========================================================================
    // VERIFICATION
    // ========================================================================

    /// Compare the columns of the first row of `schema` against the
    /// catalogue, including the type of each non-null value.
    pub async fn verify_columns(&self, schema: &TableSchema) -> GatewayResult<ColumnCheck> {
        let rows = self.gateway.query(&schema.probe_statement()).await?;
        let Some(row) = rows.first() else {
            tracing::info!(table = %schema.name, "Table is empty; column verification skipped");
            return Ok(ColumnCheck::SkippedEmpty);
        };

        let missing: Vec<String> = schema
            .columns
            .iter()
            .filter(|c| row.get(c.name).is_none())
            .map(|c| c.name.to_string())
            .collect();
        let extra: Vec<String> = row
            .column_names()
            .filter(|name| !schema.has_column(name))
            .map(str::to_string)
            .collect();
        let mistyped: Vec<String> = schema
            .columns
            .iter()
            .filter(|c| row.get(c.name).is_some_and(|v| !c.column_type.accepts(v)))
            .map(|c| c.name.to_string())
            .collect();

        if missing.is_empty() && extra.is_empty() && mistyped.is_empty() {
            Ok(ColumnCheck::Verified)
        } else {
            Ok(ColumnCheck::Mismatch {
                missing,
                extra,
                mistyped,
            })
        }
    }

    // ========================================================================
    // SEEDING
    // ========================================================================

    /// Insert the default categories unless the table already has rows.
    ///
    /// Each row is inserted on its own; a failed row is recorded and the
    /// rest continue.
    pub async fn seed_categories(&self) -> GatewayResult<SeedOutcome> {
        let table = tables::CATEGORIES.name;
        let existing = self.engine.count_rows(table, None).await?;
        if existing > 0 {
            tracing::info!(table = %table, existing, "Categories already exist; skipping seed");
            return Ok(SeedOutcome {
                already_seeded: true,
                ..SeedOutcome::default()
            });
        }

        let mut outcome = SeedOutcome::default();
        for category in DEFAULT_CATEGORIES {
            match self.gateway.execute(&build_insert(table, &category.row())).await {
                Ok(()) => {
                    outcome.inserted += 1;
                    tracing::debug!(category = %category.id, "Seeded category");
                }
                Err(e) => {
                    tracing::warn!(category = %category.id, error = %e, "Failed to seed category");
                    outcome
                        .failures
                        .push(format!("Category '{}' not seeded: {}", category.id, e));
                }
            }
        }

        tracing::info!(table = %table, seeded = outcome.inserted, "Seeded default categories");
        Ok(outcome)
    }

    /// Insert the configured default user when the identity table is empty.
    ///
    /// Returns the new user's id, or `None` when users already exist. A
    /// missing seed is a configuration error.
    pub async fn create_default_user(&self) -> PesaResult<Option<String>> {
        let table = tables::USERS.name;
        let existing = self.engine.count_rows(table, None).await?;
        if existing > 0 {
            tracing::info!(table = %table, existing, "Users already exist; skipping default user");
            return Ok(None);
        }

        let seed = self
            .config
            .default_user
            .as_ref()
            .ok_or_else(|| ConfigError::MissingRequired {
                field: "PESA_DEFAULT_USER_EMAIL".to_string(),
            })?;

        let id = Uuid::new_v4().to_string();
        let row = default_user_row(seed, &id, chrono::Utc::now());
        self.gateway.execute(&build_insert(table, &row)).await?;

        tracing::info!(user_id = %id, "Default user created");
        Ok(Some(id))
    }

    // ========================================================================
    // INITIALIZATION
    // ========================================================================

    /// The full startup pass: identity migration check, creation in
    /// catalogue order, existence and column verification, then optional
    /// seeding of categories and the default user.
    pub async fn initialize(
        &self,
        seed_categories: bool,
        create_default_user: bool,
    ) -> InitializationReport {
        tracing::info!(tables = self.tables.len(), "Starting schema reconciliation");
        let mut report = InitializationReport::default();

        if self.tables.iter().any(|t| t.name == tables::USERS.name) {
            self.reconcile_identity(&mut report).await;
        }

        let mut present: HashSet<&str> = HashSet::new();
        for schema in self.tables {
            match self.ensure_table(schema, &present).await {
                Ok(TableState::Present) => {
                    report.tables_skipped += 1;
                    present.insert(schema.name);
                }
                Ok(_) => {
                    report.tables_created += 1;
                    present.insert(schema.name);
                }
                Err(e) => {
                    tracing::error!(table = %schema.name, error = %e, "Table reconciliation failed");
                    report.errors.push(e.to_string());
                }
            }
        }
        tracing::info!(
            created = report.tables_created,
            skipped = report.tables_skipped,
            "Table creation pass finished"
        );

        report.verified = self.verify(&mut report).await;
        if !report.verified {
            let message = "Database verification failed - some tables are missing".to_string();
            tracing::error!("{}", message);
            report.errors.push(message.clone());
            report.message = message;
            return report;
        }

        if seed_categories && self.tables.iter().any(|t| t.name == tables::CATEGORIES.name) {
            match self.seed_categories().await {
                Ok(outcome) => {
                    report.categories_seeded = outcome.inserted;
                    report.errors.extend(outcome.failures);
                }
                Err(e) => report.errors.push(format!("Category seeding failed: {}", e)),
            }
        }

        if create_default_user {
            match self.create_default_user().await {
                Ok(Some(id)) => {
                    report.user_created = true;
                    report.user_id = Some(id);
                }
                Ok(None) => {}
                Err(e) => report.errors.push(format!("Default user not created: {}", e)),
            }
        }

        report.success = true;
        report.message = "Database initialized successfully".to_string();
        tracing::info!(
            errors = report.errors.len(),
            "Schema reconciliation completed"
        );
        report
    }

    async fn reconcile_identity(&self, report: &mut InitializationReport) {
        let status = match self.identity_schema_status().await {
            Ok(status) => status,
            Err(e) => {
                tracing::error!(error = %e, "Identity schema check failed");
                report
                    .errors
                    .push(format!("Identity schema check failed: {}", e));
                return;
            }
        };

        if status.decision() == MigrationDecision::DestructiveMigrate {
            match self.migrate_identity_table(&status).await {
                Ok(()) => report.migrated = true,
                Err(e) => report.errors.push(e.to_string()),
            }
        }
    }

    /// Existence of every table, then column checks on the existing ones.
    async fn verify(&self, report: &mut InitializationReport) -> bool {
        let mut all_present = true;
        for schema in self.tables {
            if !self.table_exists(schema.name).await {
                tracing::error!(table = %schema.name, "Required table does not exist");
                all_present = false;
                continue;
            }

            match self.verify_columns(schema).await {
                Ok(check) => {
                    if let ColumnCheck::Mismatch {
                        missing,
                        extra,
                        mistyped,
                    } = &check
                    {
                        let error = SchemaError::ColumnMismatch {
                            table: schema.name.to_string(),
                            missing: missing.clone(),
                            extra: extra.clone(),
                            mistyped: mistyped.clone(),
                        };
                        tracing::warn!(table = %schema.name, error = %error, "Column mismatch");
                        report.errors.push(error.to_string());
                    }
                    report.column_checks.insert(schema.name.to_string(), check);
                }
                Err(e) => report
                    .errors
                    .push(format!("Column check of '{}' failed: {}", schema.name, e)),
            }
        }
        all_present
    }
}

impl std::fmt::Debug for SchemaReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaReconciler")
            .field("config", &self.config)
            .field("tables", &self.tables.len())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// TESTS
// =============================================================================
