//! Table catalogue types
//!
//! A [`TableSchema`] is a static description of one production table: its
//! ordered columns with their expected types, and the tables it references.

use crate::value::Value;
use serde::{Deserialize, Serialize};

/// Column storage types understood by the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColumnType {
    String,
    Real,
    Int,
    Bool,
}

impl ColumnType {
    pub const fn sql(self) -> &'static str {
        match self {
            ColumnType::String => "STRING",
            ColumnType::Real => "REAL",
            ColumnType::Int => "INT",
            ColumnType::Bool => "BOOL",
        }
    }

    /// Whether a decoded value is acceptable for this column. Null always is.
    pub fn accepts(self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (ColumnType::String, Value::Text(_)) => true,
            (ColumnType::Real, Value::Int(_) | Value::Float(_)) => true,
            (ColumnType::Int, Value::Int(_)) => true,
            (ColumnType::Int, Value::Float(f)) => f.fract() == 0.0,
            (ColumnType::Bool, Value::Bool(_)) => true,
            (ColumnType::Bool, Value::Int(i)) => *i == 0 || *i == 1,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: &'static str,
    pub column_type: ColumnType,
    /// Trailing constraint text, e.g. `PRIMARY KEY` or `NOT NULL`.
    pub constraint: Option<&'static str>,
}

impl ColumnDef {
    pub const fn new(name: &'static str, column_type: ColumnType) -> Self {
        Self {
            name,
            column_type,
            constraint: None,
        }
    }

    pub const fn with(
        name: &'static str,
        column_type: ColumnType,
        constraint: &'static str,
    ) -> Self {
        Self {
            name,
            column_type,
            constraint: Some(constraint),
        }
    }

    fn definition(&self) -> String {
        match self.constraint {
            Some(constraint) => format!("{} {} {}", self.name, self.column_type.sql(), constraint),
            None => format!("{} {}", self.name, self.column_type.sql()),
        }
    }
}

/// Expected shape of one remote table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSchema {
    pub name: &'static str,
    pub columns: &'static [ColumnDef],
    /// Tables this one holds foreign ids into. May include itself.
    pub references: &'static [&'static str],
}

impl TableSchema {
    pub fn column_names(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.name).collect()
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn is_self_referencing(&self) -> bool {
        self.references.contains(&self.name)
    }

    /// References to other tables (self references excluded).
    pub fn dependencies(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.references.iter().copied().filter(move |r| *r != self.name)
    }

    pub fn create_statement(&self) -> String {
        let columns = self
            .columns
            .iter()
            .map(ColumnDef::definition)
            .collect::<Vec<_>>()
            .join(", ");
        format!("CREATE TABLE {} ({})", self.name, columns)
    }

    pub fn drop_statement(&self) -> String {
        format!("DROP TABLE {}", self.name)
    }

    /// The only schema introspection the store offers.
    pub fn probe_statement(&self) -> String {
        format!("SELECT * FROM {} LIMIT 1", self.name)
    }
}

/// What startup must do about the identity table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationDecision {
    NoAction,
    CreateFresh,
    DestructiveMigrate,
}

/// Per-table reconciliation state.
///
/// `Unknown -> Missing -> Created -> Verified`, or
/// `Unknown -> Present -> SchemaOk | SchemaStale`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableState {
    Unknown,
    Missing,
    Created,
    Verified,
    Present,
    SchemaOk,
    SchemaStale,
}

impl TableState {
    pub fn can_transition_to(self, next: TableState) -> bool {
        use TableState::*;
        matches!(
            (self, next),
            (Unknown, Missing)
                | (Unknown, Present)
                | (Missing, Created)
                | (Created, Verified)
                | (Present, SchemaOk)
                | (Present, SchemaStale)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TableState::Verified | TableState::SchemaOk | TableState::SchemaStale
        )
    }
}

// =============================================================================
// TESTS
// =============================================================================
