//! Aggregation Engine
//!
//! Every request tries the native statement first. When the store rejects it
//! with a recognised unsupported-syntax text, the same result is computed in
//! memory over a plain fetch. Any other failure propagates unchanged; a real
//! fault is never turned into a zero.

use crate::ops;
use pesa_core::sql::{join_clauses, where_clause};
use pesa_core::{AggregateSpec, Feature, GatewayError, GatewayResult, Row, Value};
use pesa_store::{Attempt, Gateway, GatewayExt};
use serde::Serialize;
use std::sync::Arc;

/// Result-column names a native COUNT may come back under.
const COUNT_KEYS: &[&str] = &["count", "COUNT(*)", "count(*)"];

/// How a count was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CountMethod {
    /// Server-side COUNT.
    Native,
    /// Length of the filtered fetch.
    Fetched,
    /// Length of an unfiltered fetch after the filtered one failed. May
    /// over-count; treat as suspect.
    Unfiltered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CountOutcome {
    pub count: u64,
    pub method: CountMethod,
}

impl CountOutcome {
    pub fn is_exact(&self) -> bool {
        self.method != CountMethod::Unfiltered
    }
}

/// Native-then-fallback aggregation over a [`Gateway`].
///
/// Stateless apart from the gateway handle: nothing about the store's
/// capabilities is remembered between calls.
#[derive(Clone)]
pub struct AggregateEngine {
    gateway: Arc<dyn Gateway>,
}

impl AggregateEngine {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &Arc<dyn Gateway> {
        &self.gateway
    }

    // ========================================================================
    // COUNT
    // ========================================================================

    /// Number of rows in `table` matching `filter`.
    pub async fn count_rows(&self, table: &str, filter: Option<&str>) -> GatewayResult<u64> {
        self.count_rows_detailed(table, filter)
            .await
            .map(|outcome| outcome.count)
    }

    /// Like [`count_rows`](Self::count_rows), also reporting which tier
    /// produced the number.
    pub async fn count_rows_detailed(
        &self,
        table: &str,
        filter: Option<&str>,
    ) -> GatewayResult<CountOutcome> {
        let where_sql = where_clause(filter);
        let native = join_clauses([
            "SELECT COUNT(*) as count FROM",
            table,
            where_sql.as_str(),
        ]);

        let message = match self.gateway.attempt(&native, &[Feature::Count]).await? {
            Attempt::Rows(rows) => {
                let count = read_count(&rows)?;
                tracing::debug!(table = %table, count, "Native COUNT succeeded");
                return Ok(CountOutcome {
                    count,
                    method: CountMethod::Native,
                });
            }
            Attempt::Unsupported { message, .. } => message,
        };

        tracing::warn!(
            table = %table,
            error = %message,
            "COUNT unsupported by remote store; counting fetched rows"
        );

        let fetch = join_clauses(["SELECT * FROM", table, where_sql.as_str()]);
        let fetch_error = match self.gateway.query(&fetch).await {
            Ok(rows) => {
                return Ok(CountOutcome {
                    count: rows.len() as u64,
                    method: CountMethod::Fetched,
                })
            }
            // Without a filter the retry below would be the same statement.
            Err(e) if where_sql.is_empty() => return Err(e),
            Err(e) => e,
        };

        tracing::warn!(
            table = %table,
            filter = %where_sql,
            error = %fetch_error,
            "Filtered fetch failed; returning UNFILTERED row count, result may over-count"
        );
        let rows = self.gateway.query(&format!("SELECT * FROM {}", table)).await?;
        Ok(CountOutcome {
            count: rows.len() as u64,
            method: CountMethod::Unfiltered,
        })
    }

    // ========================================================================
    // SUM / AVG
    // ========================================================================

    /// Sum of `column` over matching rows; `0.0` when nothing matches.
    pub async fn sum_over(
        &self,
        table: &str,
        column: &str,
        filter: Option<&str>,
    ) -> GatewayResult<f64> {
        let where_sql = where_clause(filter);
        let native = join_clauses([
            format!("SELECT SUM({}) as total FROM", column).as_str(),
            table,
            where_sql.as_str(),
        ]);
        let fallback_key = format!("SUM({})", column);

        match self.gateway.attempt(&native, &[Feature::Sum]).await? {
            Attempt::Rows(rows) => {
                let total = read_scalar(&rows, &["total", fallback_key.as_str()])?;
                tracing::debug!(table = %table, column = %column, "Native SUM succeeded");
                Ok(total.unwrap_or(0.0))
            }
            Attempt::Unsupported { message, .. } => {
                tracing::warn!(
                    table = %table,
                    column = %column,
                    error = %message,
                    "SUM unsupported by remote store; summing in memory"
                );
                let values = self.fetch_column(table, column, &where_sql).await?;
                Ok(values.iter().sum())
            }
        }
    }

    /// Mean of `column` over matching rows. `None` means no non-null values,
    /// which is different from an average of zero.
    pub async fn avg_over(
        &self,
        table: &str,
        column: &str,
        filter: Option<&str>,
    ) -> GatewayResult<Option<f64>> {
        let where_sql = where_clause(filter);
        let native = join_clauses([
            format!("SELECT AVG({}) as average FROM", column).as_str(),
            table,
            where_sql.as_str(),
        ]);
        let fallback_key = format!("AVG({})", column);

        match self.gateway.attempt(&native, &[Feature::Avg]).await? {
            Attempt::Rows(rows) => {
                tracing::debug!(table = %table, column = %column, "Native AVG succeeded");
                read_scalar(&rows, &["average", fallback_key.as_str()])
            }
            Attempt::Unsupported { message, .. } => {
                tracing::warn!(
                    table = %table,
                    column = %column,
                    error = %message,
                    "AVG unsupported by remote store; averaging in memory"
                );
                let values = self.fetch_column(table, column, &where_sql).await?;
                if values.is_empty() {
                    return Ok(None);
                }
                Ok(Some(values.iter().sum::<f64>() / values.len() as f64))
            }
        }
    }

    /// Non-null numeric values of one column.
    async fn fetch_column(
        &self,
        table: &str,
        column: &str,
        where_sql: &str,
    ) -> GatewayResult<Vec<f64>> {
        let sql = join_clauses([format!("SELECT {} FROM", column).as_str(), table, where_sql]);
        let rows = self.gateway.query(&sql).await?;
        let values: Vec<&Value> = rows
            .iter()
            .map(|row| row.get_or_null(column))
            .filter(|value| !value.is_null())
            .collect();
        ops::numeric(&values, column)
    }

    // ========================================================================
    // MULTI-AGGREGATE
    // ========================================================================

    /// Native statement text for a request.
    pub fn native_statement(spec: &AggregateSpec) -> String {
        let mut select_list: Vec<String> = Vec::new();
        if let Some(group_by) = &spec.group_by {
            select_list.push(group_by.clone());
        }
        select_list.extend(spec.aggregates.iter().map(|a| a.select_expr()));

        let clauses = [
            format!("SELECT {}", select_list.join(", ")),
            format!("FROM {}", spec.table),
            where_clause(spec.filter.as_deref()),
            spec.group_by
                .as_ref()
                .map(|g| format!("GROUP BY {}", g))
                .unwrap_or_default(),
            spec.having
                .as_ref()
                .map(|h| format!("HAVING {}", h))
                .unwrap_or_default(),
            spec.order_by
                .as_ref()
                .map(|o| format!("ORDER BY {}", o))
                .unwrap_or_default(),
        ];
        join_clauses(clauses.iter().map(String::as_str))
    }

    /// Fetch statement used when the native form is unsupported.
    pub fn fallback_statement(spec: &AggregateSpec) -> String {
        let columns = ops::needed_columns(spec);
        let select_list = if columns.is_empty() {
            "*".to_string()
        } else {
            columns.join(", ")
        };
        let where_sql = where_clause(spec.filter.as_deref());
        join_clauses([
            format!("SELECT {} FROM {}", select_list, spec.table).as_str(),
            where_sql.as_str(),
        ])
    }

    /// Features whose absence should send `spec` down the in-memory path.
    /// Only the requested functions; a clause-level failure re-raises.
    fn candidate_features(spec: &AggregateSpec) -> Vec<Feature> {
        spec.functions().into_iter().map(Feature::from).collect()
    }

    /// Run a multi-aggregate request. Result rows carry the group column (when
    /// grouping) followed by one `{function}_{column|all}` alias per aggregate.
    pub async fn aggregate(&self, spec: &AggregateSpec) -> GatewayResult<Vec<Row>> {
        if spec.aggregates.is_empty() && spec.group_by.is_none() {
            return ops::aggregate_rows(spec, Vec::new());
        }

        let native = Self::native_statement(spec);
        let features = Self::candidate_features(spec);

        match self.gateway.attempt(&native, &features).await? {
            Attempt::Rows(rows) => {
                tracing::debug!(table = %spec.table, rows = rows.len(), "Native aggregation succeeded");
                Ok(rows)
            }
            Attempt::Unsupported { feature, message } => {
                tracing::warn!(
                    table = %spec.table,
                    feature = %feature,
                    error = %message,
                    "Aggregation unsupported by remote store; computing in memory, may be slow for large tables"
                );
                let rows = self.gateway.query(&Self::fallback_statement(spec)).await?;
                let results = ops::aggregate_rows(spec, rows)?;
                tracing::info!(
                    table = %spec.table,
                    groups = results.len(),
                    "Memory-based aggregation complete"
                );
                Ok(results)
            }
        }
    }
}

impl std::fmt::Debug for AggregateEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregateEngine").finish_non_exhaustive()
    }
}

/// Read a native COUNT reply.
fn read_count(rows: &[Row]) -> GatewayResult<u64> {
    let row = rows
        .first()
        .ok_or_else(|| GatewayError::invalid_response("COUNT returned no rows"))?;

    let value = COUNT_KEYS
        .iter()
        .filter_map(|key| row.get(key))
        .find(|value| value.as_i64().is_some())
        .or_else(|| row.first_numeric())
        .ok_or_else(|| {
            GatewayError::invalid_response(format!("COUNT reply has no numeric field: {:?}", row))
        })?;

    match value.as_i64() {
        Some(count) if count >= 0 => Ok(count as u64),
        _ => Err(GatewayError::invalid_response(format!(
            "COUNT reply is not a non-negative integer: {}",
            value
        ))),
    }
}

/// Read a single-value native aggregate reply. `None` for no rows or null.
fn read_scalar(rows: &[Row], keys: &[&str]) -> GatewayResult<Option<f64>> {
    let Some(row) = rows.first() else {
        return Ok(None);
    };
    let value = keys
        .iter()
        .find_map(|key| row.get(key))
        .or_else(|| row.first_numeric());

    match value {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value.as_f64().map(Some).ok_or_else(|| {
            GatewayError::invalid_response(format!("aggregate reply is not numeric: {}", value))
        }),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pesa_core::Aggregate;

    #[test]
    fn test_native_statement_shape() {
        let spec = AggregateSpec::new("transactions")
            .aggregate(Aggregate::count_all())
            .aggregate(Aggregate::sum("amount"))
            .filter("type = 'expense'")
            .group_by("category_id")
            .having("count_all > 2")
            .order_by("sum_amount DESC");
        assert_eq!(
            AggregateEngine::native_statement(&spec),
            "SELECT category_id, COUNT(*) as count_all, SUM(amount) as sum_amount \
             FROM transactions WHERE type = 'expense' GROUP BY category_id \
             HAVING count_all > 2 ORDER BY sum_amount DESC"
        );
    }

    #[test]
    fn test_fallback_statement_fetches_needed_columns() {
        let spec = AggregateSpec::new("transactions")
            .aggregate(Aggregate::count_all())
            .aggregate(Aggregate::sum("amount"))
            .group_by("category_id");
        assert_eq!(
            AggregateEngine::fallback_statement(&spec),
            "SELECT amount, category_id FROM transactions"
        );
        let count_only = AggregateSpec::new("users")
            .aggregate(Aggregate::count_all())
            .filter("email = 'a@b.test'");
        assert_eq!(
            AggregateEngine::fallback_statement(&count_only),
            "SELECT * FROM users WHERE email = 'a@b.test'"
        );
    }

    #[test]
    fn test_candidate_features_are_requested_functions() {
        let spec = AggregateSpec::new("t")
            .aggregate(Aggregate::avg("amount"))
            .group_by("type")
            .having("avg_amount > 1");
        assert_eq!(AggregateEngine::candidate_features(&spec), vec![Feature::Avg]);
    }

    #[test]
    fn test_read_count_keys() {
        assert_eq!(read_count(&[Row::new().with("count", 7i64)]), Ok(7));
        assert_eq!(read_count(&[Row::new().with("COUNT(*)", 4i64)]), Ok(4));
        assert_eq!(read_count(&[Row::new().with("n", "x").with("c", 2.0)]), Ok(2));
        assert!(matches!(
            read_count(&[]),
            Err(GatewayError::InvalidResponse { .. })
        ));
        assert!(matches!(
            read_count(&[Row::new().with("count", "many")]),
            Err(GatewayError::InvalidResponse { .. })
        ));
    }

    #[test]
    fn test_read_scalar_null_and_missing() {
        assert_eq!(read_scalar(&[], &["total"]), Ok(None));
        assert_eq!(
            read_scalar(&[Row::new().with("total", Value::Null)], &["total"]),
            Ok(None)
        );
        assert_eq!(
            read_scalar(&[Row::new().with("SUM(amount)", 12.5)], &["total", "SUM(amount)"]),
            Ok(Some(12.5))
        );
    }
}
