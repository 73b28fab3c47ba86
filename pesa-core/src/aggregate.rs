//! Aggregate request description
//!
//! An [`AggregateSpec`] is built per call and carries no state between
//! calls. Every aggregate gets a generated alias of the form
//! `{function_lower}_{column_or_"all"}` so that native and in-memory results
//! share the same column names.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Aggregate functions the layer knows how to request and emulate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FunctionKind {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl FunctionKind {
    pub const ALL: [FunctionKind; 5] = [
        FunctionKind::Count,
        FunctionKind::Sum,
        FunctionKind::Avg,
        FunctionKind::Min,
        FunctionKind::Max,
    ];

    pub const fn sql_name(self) -> &'static str {
        match self {
            FunctionKind::Count => "COUNT",
            FunctionKind::Sum => "SUM",
            FunctionKind::Avg => "AVG",
            FunctionKind::Min => "MIN",
            FunctionKind::Max => "MAX",
        }
    }

    pub const fn lower(self) -> &'static str {
        match self {
            FunctionKind::Count => "count",
            FunctionKind::Sum => "sum",
            FunctionKind::Avg => "avg",
            FunctionKind::Min => "min",
            FunctionKind::Max => "max",
        }
    }
}

impl fmt::Display for FunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql_name())
    }
}

impl FromStr for FunctionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FunctionKind::ALL
            .into_iter()
            .find(|kind| kind.sql_name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unsupported aggregate function: {}", s))
    }
}

/// What an aggregate ranges over: every row (`*`) or one column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregateTarget {
    All,
    Column(String),
}

impl AggregateTarget {
    pub fn column(name: impl Into<String>) -> Self {
        let name = name.into();
        if name.trim() == "*" {
            AggregateTarget::All
        } else {
            AggregateTarget::Column(name)
        }
    }

    pub fn sql(&self) -> &str {
        match self {
            AggregateTarget::All => "*",
            AggregateTarget::Column(name) => name,
        }
    }

    pub fn column_name(&self) -> Option<&str> {
        match self {
            AggregateTarget::All => None,
            AggregateTarget::Column(name) => Some(name),
        }
    }

    fn alias_part(&self) -> &str {
        match self {
            AggregateTarget::All => "all",
            AggregateTarget::Column(name) => name,
        }
    }
}

/// One `(function, column)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Aggregate {
    pub function: FunctionKind,
    pub target: AggregateTarget,
}

impl Aggregate {
    pub fn new(function: FunctionKind, target: AggregateTarget) -> Self {
        Self { function, target }
    }

    pub fn count_all() -> Self {
        Self::new(FunctionKind::Count, AggregateTarget::All)
    }

    pub fn count(column: impl Into<String>) -> Self {
        Self::new(FunctionKind::Count, AggregateTarget::column(column))
    }

    pub fn sum(column: impl Into<String>) -> Self {
        Self::new(FunctionKind::Sum, AggregateTarget::column(column))
    }

    pub fn avg(column: impl Into<String>) -> Self {
        Self::new(FunctionKind::Avg, AggregateTarget::column(column))
    }

    pub fn min(column: impl Into<String>) -> Self {
        Self::new(FunctionKind::Min, AggregateTarget::column(column))
    }

    pub fn max(column: impl Into<String>) -> Self {
        Self::new(FunctionKind::Max, AggregateTarget::column(column))
    }

    /// Result column name, e.g. `count_all` or `sum_amount`.
    pub fn alias(&self) -> String {
        format!("{}_{}", self.function.lower(), self.target.alias_part())
    }

    /// Select-list expression, e.g. `SUM(amount) as sum_amount`.
    pub fn select_expr(&self) -> String {
        format!(
            "{}({}) as {}",
            self.function.sql_name(),
            self.target.sql(),
            self.alias()
        )
    }
}

/// A full aggregation request against one table.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AggregateSpec {
    pub table: String,
    pub aggregates: Vec<Aggregate>,
    /// WHERE predicate text, without the keyword.
    pub filter: Option<String>,
    pub group_by: Option<String>,
    /// HAVING predicate text, without the keyword.
    pub having: Option<String>,
    /// ORDER BY text, without the keyword.
    pub order_by: Option<String>,
}

impl AggregateSpec {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Default::default()
        }
    }

    pub fn aggregate(mut self, aggregate: Aggregate) -> Self {
        self.aggregates.push(aggregate);
        self
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = non_empty(filter.into());
        self
    }

    pub fn group_by(mut self, column: impl Into<String>) -> Self {
        self.group_by = non_empty(column.into());
        self
    }

    pub fn having(mut self, predicate: impl Into<String>) -> Self {
        self.having = non_empty(predicate.into());
        self
    }

    pub fn order_by(mut self, order: impl Into<String>) -> Self {
        self.order_by = non_empty(order.into());
        self
    }

    pub fn functions(&self) -> Vec<FunctionKind> {
        let mut kinds = Vec::new();
        for aggregate in &self.aggregates {
            if !kinds.contains(&aggregate.function) {
                kinds.push(aggregate.function);
            }
        }
        kinds
    }

    pub fn aliases(&self) -> Vec<String> {
        self.aggregates.iter().map(Aggregate::alias).collect()
    }
}

/// Treat blank clause text as absent.
pub fn non_empty(text: String) -> Option<String> {
    if text.trim().is_empty() {
        None
    } else {
        Some(text.trim().to_string())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alias_generation() {
        assert_eq!(Aggregate::count_all().alias(), "count_all");
        assert_eq!(Aggregate::count("*").alias(), "count_all");
        assert_eq!(Aggregate::sum("amount").alias(), "sum_amount");
        assert_eq!(Aggregate::max("date").alias(), "max_date");
    }

    #[test]
    fn test_select_expr() {
        assert_eq!(Aggregate::count_all().select_expr(), "COUNT(*) as count_all");
        assert_eq!(Aggregate::avg("amount").select_expr(), "AVG(amount) as avg_amount");
    }

    #[test]
    fn test_function_kind_parse() {
        assert_eq!("sum".parse::<FunctionKind>(), Ok(FunctionKind::Sum));
        assert_eq!(" Max ".parse::<FunctionKind>(), Ok(FunctionKind::Max));
        assert!("median".parse::<FunctionKind>().is_err());
    }

    #[test]
    fn test_blank_clauses_are_absent() {
        let spec = AggregateSpec::new("transactions")
            .filter("  ")
            .group_by("")
            .having("count_all > 1");
        assert!(spec.filter.is_none());
        assert!(spec.group_by.is_none());
        assert_eq!(spec.having.as_deref(), Some("count_all > 1"));
    }

    #[test]
    fn test_functions_deduplicated_in_order() {
        let spec = AggregateSpec::new("transactions")
            .aggregate(Aggregate::sum("amount"))
            .aggregate(Aggregate::count_all())
            .aggregate(Aggregate::sum("fee"));
        assert_eq!(spec.functions(), vec![FunctionKind::Sum, FunctionKind::Count]);
    }
}
