//! In-memory relational operators
//!
//! Partition, aggregate, filter and sort fetched rows the way the store
//! would have server-side. Output columns use the same generated aliases as
//! the native statement, so callers cannot tell which path produced a row.

use crate::having::HavingFilter;
use pesa_core::{
    Aggregate, AggregateSpec, AggregateTarget, FunctionKind, GatewayError, GatewayResult, GroupKey,
    Row, Value,
};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Columns the fallback fetch must return, in first-appearance order.
/// Empty means every column (`*`).
pub fn needed_columns(spec: &AggregateSpec) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    let targets = spec
        .aggregates
        .iter()
        .filter_map(|aggregate| aggregate.target.column_name());
    for column in targets.chain(spec.group_by.as_deref()) {
        if !columns.iter().any(|c| c == column) {
            columns.push(column.to_string());
        }
    }
    columns
}

/// Partition rows by exact equality of `column`, keeping first-appearance
/// order. Null values share one bucket.
pub fn partition(rows: Vec<Row>, column: &str) -> Vec<(Value, Vec<Row>)> {
    let mut order: Vec<GroupKey> = Vec::new();
    let mut buckets: HashMap<GroupKey, Vec<Row>> = HashMap::new();
    for row in rows {
        let key = GroupKey(row.get_or_null(column).clone());
        if !buckets.contains_key(&key) {
            order.push(key.clone());
        }
        buckets.entry(key).or_default().push(row);
    }
    order
        .into_iter()
        .filter_map(|key| buckets.remove(&key).map(|rows| (key.0, rows)))
        .collect()
}

/// Compute one aggregate over a group. Nulls are skipped.
pub fn compute(aggregate: &Aggregate, rows: &[Row]) -> GatewayResult<Value> {
    let column = match &aggregate.target {
        AggregateTarget::All => {
            return match aggregate.function {
                FunctionKind::Count => Ok(Value::Int(rows.len() as i64)),
                other => Err(GatewayError::invalid_response(format!(
                    "{}(*) cannot be computed",
                    other
                ))),
            }
        }
        AggregateTarget::Column(column) => column.as_str(),
    };

    let values: Vec<&Value> = rows
        .iter()
        .map(|row| row.get_or_null(column))
        .filter(|value| !value.is_null())
        .collect();

    match aggregate.function {
        FunctionKind::Count => Ok(Value::Int(values.len() as i64)),
        FunctionKind::Sum => {
            if values.is_empty() {
                return Ok(Value::Null);
            }
            numeric(&values, column).map(|nums| Value::Float(nums.iter().sum()))
        }
        FunctionKind::Avg => {
            if values.is_empty() {
                return Ok(Value::Null);
            }
            let nums = numeric(&values, column)?;
            Ok(Value::Float(nums.iter().sum::<f64>() / nums.len() as f64))
        }
        FunctionKind::Min => Ok(extreme(values, Ordering::Less)),
        FunctionKind::Max => Ok(extreme(values, Ordering::Greater)),
    }
}

/// Numeric view of every value, or `InvalidResponse` naming the first
/// value without one.
pub fn numeric(values: &[&Value], column: &str) -> GatewayResult<Vec<f64>> {
    values
        .iter()
        .map(|value| {
            value.as_f64().ok_or_else(|| {
                GatewayError::invalid_response(format!(
                    "column '{}' holds non-numeric {} value {}",
                    column,
                    value.type_name(),
                    value
                ))
            })
        })
        .collect()
}

fn extreme(values: Vec<&Value>, wanted: Ordering) -> Value {
    values
        .into_iter()
        .reduce(|best, value| {
            if value.compare(best) == wanted {
                value
            } else {
                best
            }
        })
        .cloned()
        .unwrap_or(Value::Null)
}

/// Sort by the first token of `order_by`; descending when the text
/// contains "desc" in any case. Missing and null values sort as 0. Stable.
pub fn sort_rows(rows: &mut [Row], order_by: &str) {
    let Some(column) = order_by.split_whitespace().next() else {
        return;
    };
    let descending = order_by.to_lowercase().contains("desc");
    let zero = Value::Int(0);
    rows.sort_by(|a, b| {
        let left = sort_value(a, column, &zero);
        let right = sort_value(b, column, &zero);
        let ordering = left.compare(right);
        if descending {
            ordering.reverse()
        } else {
            ordering
        }
    });
}

fn sort_value<'a>(row: &'a Row, column: &str, zero: &'a Value) -> &'a Value {
    match row.get(column) {
        None | Some(Value::Null) => zero,
        Some(value) => value,
    }
}

/// Evaluate a whole aggregation request over fetched rows.
///
/// Ungrouped requests always yield exactly one row, even over no input.
/// HAVING only applies to grouped requests.
pub fn aggregate_rows(spec: &AggregateSpec, rows: Vec<Row>) -> GatewayResult<Vec<Row>> {
    let Some(group_by) = spec.group_by.as_deref() else {
        let mut result = Row::new();
        for aggregate in &spec.aggregates {
            result.insert(aggregate.alias(), compute(aggregate, &rows)?);
        }
        return Ok(vec![result]);
    };

    let having = spec.having.as_deref().map(HavingFilter::parse);
    let mut results = Vec::new();
    for (key, group) in partition(rows, group_by) {
        let mut result = Row::new().with(group_by, key);
        for aggregate in &spec.aggregates {
            result.insert(aggregate.alias(), compute(aggregate, &group)?);
        }
        if having.as_ref().map_or(true, |filter| filter.matches(&result)) {
            results.push(result);
        }
    }

    if let Some(order_by) = spec.order_by.as_deref() {
        sort_rows(&mut results, order_by);
    }
    Ok(results)
}

// =============================================================================
// TESTS
// =============================================================================


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// One group per distinct value; each group's count is its size.
        #[test]
        fn prop_groups_match_distinct_values(keys in prop::collection::vec(prop::option::of(0i64..5), 0..40)) {
            let rows: Vec<Row> = keys.iter().map(|k| Row::new().with("bucket", *k)).collect();
            let spec = AggregateSpec::new("t")
                .aggregate(Aggregate::count_all())
                .group_by("bucket");
            let out = aggregate_rows(&spec, rows).unwrap();

            let mut distinct: Vec<Option<i64>> = Vec::new();
            for k in &keys {
                if !distinct.contains(k) {
                    distinct.push(*k);
                }
            }
            prop_assert_eq!(out.len(), distinct.len());
            for (row, key) in out.iter().zip(&distinct) {
                let expected = keys.iter().filter(|k| *k == key).count() as i64;
                prop_assert_eq!(row.get("count_all"), Some(&Value::Int(expected)));
            }
        }
    }
}
