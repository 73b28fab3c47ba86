//! Table catalogue
//!
//! One [`TableSchema`] per production table, listed in creation order: the
//! identity table first, then the tables referencing it, then their
//! dependents, then the self-referencing ledger table, then the audit tables
//! that reference nothing.

use pesa_core::ColumnType::{Bool, Int, Real, String as Text};
use pesa_core::{ColumnDef, SchemaError, TableSchema};

/// Columns whose absence marks a legacy identity table.
pub const IDENTITY_REQUIRED_COLUMNS: [&str; 2] = ["email", "password_hash"];

pub const USERS: TableSchema = TableSchema {
    name: "users",
    columns: &[
        ColumnDef::with("id", Text, "PRIMARY KEY"),
        ColumnDef::with("email", Text, "NOT NULL"),
        ColumnDef::with("password_hash", Text, "NOT NULL"),
        ColumnDef::with("name", Text, "NOT NULL"),
        ColumnDef::with("created_at", Text, "NOT NULL"),
        ColumnDef::with("preferences", Text, "DEFAULT '{}'"),
    ],
    references: &[],
};

pub const CATEGORIES: TableSchema = TableSchema {
    name: "categories",
    columns: &[
        ColumnDef::with("id", Text, "PRIMARY KEY"),
        ColumnDef::new("user_id", Text),
        ColumnDef::with("name", Text, "NOT NULL"),
        ColumnDef::with("icon", Text, "NOT NULL"),
        ColumnDef::with("color", Text, "NOT NULL"),
        ColumnDef::with("keywords", Text, "DEFAULT '[]'"),
        ColumnDef::with("is_default", Bool, "DEFAULT TRUE"),
    ],
    references: &["users"],
};

pub const BUDGETS: TableSchema = TableSchema {
    name: "budgets",
    columns: &[
        ColumnDef::with("id", Text, "PRIMARY KEY"),
        ColumnDef::with("user_id", Text, "NOT NULL"),
        ColumnDef::with("category_id", Text, "NOT NULL"),
        ColumnDef::with("amount", Real, "NOT NULL"),
        ColumnDef::with(
            "period",
            Text,
            "DEFAULT 'monthly' CHECK (period IN ('monthly', 'weekly', 'yearly'))",
        ),
        ColumnDef::with("month", Int, "NOT NULL"),
        ColumnDef::with("year", Int, "NOT NULL"),
        ColumnDef::with("created_at", Text, "NOT NULL"),
    ],
    references: &["users", "categories"],
};

pub const TRANSACTIONS: TableSchema = TableSchema {
    name: "transactions",
    columns: &[
        ColumnDef::with("id", Text, "PRIMARY KEY"),
        ColumnDef::with("user_id", Text, "NOT NULL"),
        ColumnDef::with("amount", Real, "NOT NULL"),
        ColumnDef::with("type", Text, "NOT NULL CHECK (type IN ('expense', 'income'))"),
        ColumnDef::with("category_id", Text, "NOT NULL"),
        ColumnDef::with("description", Text, "NOT NULL"),
        ColumnDef::with("date", Text, "NOT NULL"),
        ColumnDef::with(
            "source",
            Text,
            "DEFAULT 'manual' CHECK (source IN ('manual', 'sms', 'api'))",
        ),
        ColumnDef::new("mpesa_details", Text),
        ColumnDef::new("sms_metadata", Text),
        ColumnDef::with("created_at", Text, "NOT NULL"),
        ColumnDef::new("transaction_group_id", Text),
        ColumnDef::with("transaction_role", Text, "DEFAULT 'primary'"),
        ColumnDef::new("parent_transaction_id", Text),
    ],
    references: &["users", "categories", "transactions"],
};

pub const SMS_IMPORT_LOGS: TableSchema = TableSchema {
    name: "sms_import_logs",
    columns: &[
        ColumnDef::with("id", Text, "PRIMARY KEY"),
        ColumnDef::with("user_id", Text, "NOT NULL"),
        ColumnDef::with("import_session_id", Text, "NOT NULL"),
        ColumnDef::with("total_messages", Int, "DEFAULT 0"),
        ColumnDef::with("successful_imports", Int, "DEFAULT 0"),
        ColumnDef::with("duplicates_found", Int, "DEFAULT 0"),
        ColumnDef::with("parsing_errors", Int, "DEFAULT 0"),
        ColumnDef::with("transactions_created", Text, "DEFAULT '[]'"),
        ColumnDef::with("errors", Text, "DEFAULT '[]'"),
        ColumnDef::with("created_at", Text, "NOT NULL"),
    ],
    references: &[],
};

pub const DUPLICATE_LOGS: TableSchema = TableSchema {
    name: "duplicate_logs",
    columns: &[
        ColumnDef::with("id", Text, "PRIMARY KEY"),
        ColumnDef::with("user_id", Text, "NOT NULL"),
        ColumnDef::new("original_transaction_id", Text),
        ColumnDef::new("duplicate_transaction_id", Text),
        ColumnDef::new("message_hash", Text),
        ColumnDef::new("mpesa_transaction_id", Text),
        ColumnDef::new("reason", Text),
        ColumnDef::with("duplicate_reasons", Text, "DEFAULT '[]'"),
        ColumnDef::new("duplicate_confidence", Real),
        ColumnDef::new("similarity_score", Real),
        ColumnDef::with("detected_at", Text, "NOT NULL"),
        ColumnDef::new("action_taken", Text),
    ],
    references: &[],
};

pub const STATUS_CHECKS: TableSchema = TableSchema {
    name: "status_checks",
    columns: &[
        ColumnDef::with("id", Text, "PRIMARY KEY"),
        ColumnDef::with("status", Text, "NOT NULL"),
        ColumnDef::with("timestamp", Text, "NOT NULL"),
        ColumnDef::new("details", Text),
    ],
    references: &[],
};

/// Every production table, in creation order.
pub static TABLES: &[TableSchema] = &[
    USERS,
    CATEGORIES,
    BUDGETS,
    TRANSACTIONS,
    SMS_IMPORT_LOGS,
    DUPLICATE_LOGS,
    STATUS_CHECKS,
];

/// Look up a production table by name.
pub fn table(name: &str) -> Option<&'static TableSchema> {
    TABLES.iter().find(|t| t.name == name)
}

/// Check that every table comes after the tables it references.
///
/// A reference to a later table is [`SchemaError::DependencyOrder`]; a
/// reference to a table absent from the list is
/// [`SchemaError::MissingDependency`].
pub fn validate_creation_order(tables: &[TableSchema]) -> Result<(), SchemaError> {
    for (position, schema) in tables.iter().enumerate() {
        for dependency in schema.dependencies() {
            match tables.iter().position(|t| t.name == dependency) {
                Some(at) if at < position => {}
                Some(_) => {
                    return Err(SchemaError::DependencyOrder {
                        table: schema.name.to_string(),
                        dependency: dependency.to_string(),
                    })
                }
                None => {
                    return Err(SchemaError::MissingDependency {
                        table: schema.name.to_string(),
                        dependency: dependency.to_string(),
                    })
                }
            }
        }
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_order_is_valid() {
        assert_eq!(TABLES.len(), 7);
        assert_eq!(validate_creation_order(TABLES), Ok(()));
    }

    #[test]
    fn test_dependent_before_target_is_rejected() {
        let tables = [USERS, BUDGETS, CATEGORIES];
        assert_eq!(
            validate_creation_order(&tables),
            Err(SchemaError::DependencyOrder {
                table: "budgets".to_string(),
                dependency: "categories".to_string(),
            })
        );
    }

    #[test]
    fn test_unlisted_reference_is_rejected() {
        let tables = [CATEGORIES];
        assert!(matches!(
            validate_creation_order(&tables),
            Err(SchemaError::MissingDependency { .. })
        ));
    }

    #[test]
    fn test_self_reference_is_allowed() {
        assert!(TRANSACTIONS.is_self_referencing());
        assert_eq!(validate_creation_order(&[USERS, CATEGORIES, TRANSACTIONS]), Ok(()));
    }

    #[test]
    fn test_identity_table_declares_required_columns() {
        for column in IDENTITY_REQUIRED_COLUMNS {
            assert!(USERS.has_column(column));
        }
        assert_eq!(TABLES[0].name, "users");
    }

    #[test]
    fn test_lookup() {
        assert_eq!(table("budgets").map(|t| t.columns.len()), Some(8));
        assert!(table("ledger").is_none());
    }

    #[test]
    fn test_duplicate_logs_columns() {
        let names = DUPLICATE_LOGS.column_names();
        assert_eq!(names.len(), 12);
        assert_eq!(names.first(), Some(&"id"));
        assert_eq!(names.last(), Some(&"action_taken"));
    }
}
