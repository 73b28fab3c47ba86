//! In-memory remote store
//!
//! A [`Gateway`] that keeps tables in process memory and answers with the
//! same failure texts the remote store uses. Each relational capability can
//! be switched off to mimic older store builds, failures can be injected by
//! statement substring, and CREATE can be told to report success without
//! persisting, which the real store has been observed to do.

mod parser;

use crate::gateway::Gateway;
use async_trait::async_trait;
use parser::{
    parse, syntax_error, Condition, HavingCondition, HavingOperand, Select, SelectItem, Statement,
};
use pesa_core::{CapabilityMap, FunctionKind, GatewayError, GatewayResult, GroupKey, Row, Value};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, Default)]
struct Table {
    columns: Vec<String>,
    rows: Vec<Row>,
}

#[derive(Debug, Clone)]
struct FailureRule {
    needle: String,
    error: GatewayError,
}

#[derive(Debug)]
struct StoreState {
    tables: HashMap<String, Table>,
    capabilities: CapabilityMap,
    failures: Vec<FailureRule>,
    phantom_creates: HashSet<String>,
    statements: Vec<String>,
}

impl Default for StoreState {
    fn default() -> Self {
        Self {
            tables: HashMap::new(),
            capabilities: CapabilityMap::all_supported(),
            failures: Vec::new(),
            phantom_creates: HashSet::new(),
            statements: Vec::new(),
        }
    }
}

/// In-memory store for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<StoreState>>,
}

fn table_missing(table: &str) -> GatewayError {
    GatewayError::rejected(format!("Table '{}' does not exist", table))
}

fn column_missing(column: &str, table: &str) -> GatewayError {
    GatewayError::rejected(format!("Column '{}' not found in table '{}'", column, table))
}

fn function_unsupported(function: FunctionKind) -> GatewayError {
    GatewayError::rejected(format!(
        "Parse error: Expected identifier near '{}'",
        function.sql_name()
    ))
}

impl InMemoryStore {
    /// Create a store with every capability enabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that only accepts the given capabilities.
    pub fn with_capabilities(capabilities: CapabilityMap) -> Self {
        let store = Self::default();
        if let Ok(mut state) = store.state.write() {
            state.capabilities = capabilities;
        }
        store
    }

    /// A store that rejects every aggregate, GROUP BY and HAVING.
    pub fn legacy() -> Self {
        Self::with_capabilities(CapabilityMap::default())
    }

    fn read(&self) -> GatewayResult<std::sync::RwLockReadGuard<'_, StoreState>> {
        self.state.read().map_err(|_| GatewayError::LockPoisoned)
    }

    fn write(&self) -> GatewayResult<std::sync::RwLockWriteGuard<'_, StoreState>> {
        self.state.write().map_err(|_| GatewayError::LockPoisoned)
    }

    pub fn capabilities(&self) -> GatewayResult<CapabilityMap> {
        Ok(self.read()?.capabilities)
    }

    pub fn set_capabilities(&self, capabilities: CapabilityMap) -> GatewayResult<()> {
        self.write()?.capabilities = capabilities;
        Ok(())
    }

    /// Fail every statement containing `needle` with `error`.
    pub fn fail_on(&self, needle: impl Into<String>, error: GatewayError) -> GatewayResult<()> {
        self.write()?.failures.push(FailureRule {
            needle: needle.into(),
            error,
        });
        Ok(())
    }

    pub fn clear_failures(&self) -> GatewayResult<()> {
        self.write()?.failures.clear();
        Ok(())
    }

    /// Acknowledge CREATE TABLE for `table` without persisting it.
    pub fn drop_creates_for(&self, table: impl Into<String>) -> GatewayResult<()> {
        self.write()?.phantom_creates.insert(table.into());
        Ok(())
    }

    /// Create a table directly, bypassing statement handling.
    pub fn create_table(&self, table: &str, columns: &[&str]) -> GatewayResult<()> {
        self.write()?.tables.insert(
            table.to_string(),
            Table {
                columns: columns.iter().map(|c| c.to_string()).collect(),
                rows: Vec::new(),
            },
        );
        Ok(())
    }

    /// Insert a row directly. Unknown columns are rejected, absent ones are null.
    pub fn insert_row(&self, table: &str, row: Row) -> GatewayResult<()> {
        let mut state = self.write()?;
        let target = state.tables.get_mut(table).ok_or_else(|| table_missing(table))?;
        let columns: Vec<String> = row.column_names().map(str::to_string).collect();
        let values: Vec<Value> = row.into_iter().map(|(_, value)| value).collect();
        insert_values(table, target, &columns, values)
    }

    pub fn rows(&self, table: &str) -> GatewayResult<Vec<Row>> {
        let state = self.read()?;
        state
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .ok_or_else(|| table_missing(table))
    }

    pub fn columns(&self, table: &str) -> GatewayResult<Option<Vec<String>>> {
        Ok(self.read()?.tables.get(table).map(|t| t.columns.clone()))
    }

    pub fn has_table(&self, table: &str) -> GatewayResult<bool> {
        Ok(self.read()?.tables.contains_key(table))
    }

    pub fn table_names(&self) -> GatewayResult<Vec<String>> {
        let mut names: Vec<String> = self.read()?.tables.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    /// Every statement received, in order, including failed ones.
    pub fn statements(&self) -> GatewayResult<Vec<String>> {
        Ok(self.read()?.statements.clone())
    }

    pub fn clear_statements(&self) -> GatewayResult<()> {
        self.write()?.statements.clear();
        Ok(())
    }

    fn run(&self, sql: &str) -> GatewayResult<Vec<Row>> {
        let mut state = self.write()?;
        state.statements.push(sql.to_string());

        if let Some(rule) = state.failures.iter().find(|rule| sql.contains(&rule.needle)) {
            return Err(rule.error.clone());
        }

        match parse(sql)? {
            Statement::Create {
                table,
                columns,
                if_not_exists,
            } => {
                if state.tables.contains_key(&table) {
                    if if_not_exists {
                        return Ok(Vec::new());
                    }
                    return Err(GatewayError::rejected(format!(
                        "Table '{}' already exists",
                        table
                    )));
                }
                if !state.phantom_creates.contains(&table) {
                    state.tables.insert(
                        table,
                        Table {
                            columns,
                            rows: Vec::new(),
                        },
                    );
                }
                Ok(Vec::new())
            }
            Statement::Drop { table, if_exists } => {
                if state.tables.remove(&table).is_none() && !if_exists {
                    return Err(table_missing(&table));
                }
                Ok(Vec::new())
            }
            Statement::Insert {
                table,
                columns,
                rows,
            } => {
                let target = state
                    .tables
                    .get_mut(&table)
                    .ok_or_else(|| table_missing(&table))?;
                for values in rows {
                    insert_values(&table, target, &columns, values)?;
                }
                Ok(Vec::new())
            }
            Statement::Update {
                table,
                assignments,
                filter,
            } => {
                let target = state
                    .tables
                    .get_mut(&table)
                    .ok_or_else(|| table_missing(&table))?;
                check_columns(&table, &target.columns, assignments.iter().map(|(c, _)| c.as_str()))?;
                check_columns(&table, &target.columns, filter.iter().map(Condition::column))?;
                for row in target.rows.iter_mut().filter(|row| matches_all(row, &filter)) {
                    for (column, value) in &assignments {
                        row.insert(column.clone(), value.clone());
                    }
                }
                Ok(Vec::new())
            }
            Statement::Delete { table, filter } => {
                let target = state
                    .tables
                    .get_mut(&table)
                    .ok_or_else(|| table_missing(&table))?;
                check_columns(&table, &target.columns, filter.iter().map(Condition::column))?;
                target.rows.retain(|row| !matches_all(row, &filter));
                Ok(Vec::new())
            }
            Statement::Select(select) => {
                check_capabilities(&select, &state.capabilities)?;
                let table = state
                    .tables
                    .get(&select.table)
                    .ok_or_else(|| table_missing(&select.table))?;
                run_select(&select, table)
            }
        }
    }
}

#[async_trait]
impl Gateway for InMemoryStore {
    async fn query(&self, sql: &str) -> GatewayResult<Vec<Row>> {
        self.run(sql)
    }

    async fn execute(&self, sql: &str) -> GatewayResult<()> {
        self.run(sql).map(|_| ())
    }
}

// ============================================================================
// STATEMENT EXECUTION
// ============================================================================

fn check_columns<'a>(
    table: &str,
    known: &[String],
    columns: impl IntoIterator<Item = &'a str>,
) -> GatewayResult<()> {
    for column in columns {
        if !known.iter().any(|k| k == column) {
            return Err(column_missing(column, table));
        }
    }
    Ok(())
}

fn insert_values(
    table: &str,
    target: &mut Table,
    columns: &[String],
    values: Vec<Value>,
) -> GatewayResult<()> {
    check_columns(table, &target.columns, columns.iter().map(String::as_str))?;

    let row: Row = target
        .columns
        .iter()
        .map(|column| {
            let value = columns
                .iter()
                .position(|c| c == column)
                .and_then(|i| values.get(i).cloned())
                .unwrap_or(Value::Null);
            (column.clone(), value)
        })
        .collect();

    if let Some(id) = row.get("id").filter(|id| !id.is_null()) {
        if target.rows.iter().any(|existing| existing.get("id") == Some(id)) {
            return Err(GatewayError::rejected(format!(
                "Duplicate primary key {} in table '{}'",
                id, table
            )));
        }
    }

    target.rows.push(row);
    Ok(())
}

fn check_capabilities(select: &Select, capabilities: &CapabilityMap) -> GatewayResult<()> {
    for function in select.functions() {
        let supported = match function {
            FunctionKind::Count => capabilities.count,
            FunctionKind::Sum => capabilities.sum,
            FunctionKind::Avg => capabilities.avg,
            FunctionKind::Min => capabilities.min,
            FunctionKind::Max => capabilities.max,
        };
        if !supported {
            return Err(function_unsupported(function));
        }
    }
    if select.group_by.is_some() && !capabilities.group_by {
        return Err(clause_unsupported(select, "GROUP BY"));
    }
    if !select.having.is_empty() && !capabilities.having {
        return Err(clause_unsupported(select, "HAVING"));
    }
    Ok(())
}

/// Builds without a clause stop at the first aggregate of the select list.
fn clause_unsupported(select: &Select, clause: &str) -> GatewayError {
    match select.functions().first() {
        Some(function) => function_unsupported(*function),
        None => syntax_error(format!("unexpected token near '{}'", clause)),
    }
}

fn matches_condition(row: &Row, condition: &Condition) -> bool {
    match condition {
        Condition::IsNull { column, negated } => row.get_or_null(column).is_null() != *negated,
        Condition::Compare { column, op, value } => {
            let actual = row.get_or_null(column);
            if actual.is_null() || value.is_null() {
                return false;
            }
            op.holds(actual.compare(value))
        }
    }
}

fn matches_all(row: &Row, conditions: &[Condition]) -> bool {
    conditions.iter().all(|c| matches_condition(row, c))
}

fn run_select(select: &Select, table: &Table) -> GatewayResult<Vec<Row>> {
    let mut referenced: Vec<&str> = select.filter.iter().map(Condition::column).collect();
    referenced.extend(select.group_by.as_deref());
    for item in &select.items {
        match item {
            SelectItem::Column { name, .. } => referenced.push(name),
            SelectItem::Aggregate {
                argument: Some(argument),
                ..
            } => referenced.push(argument),
            _ => {}
        }
    }
    check_columns(&select.table, &table.columns, referenced)?;

    let filtered: Vec<&Row> = table
        .rows
        .iter()
        .filter(|row| matches_all(row, &select.filter))
        .collect();

    let mut output = if select.is_aggregate() {
        aggregate_rows(select, &filtered)?
    } else {
        filtered
            .iter()
            .map(|row| project(&select.items, row))
            .collect()
    };

    if let Some((column, descending)) = &select.order_by {
        output.sort_by(|a, b| {
            let ordering = a.get_or_null(column).compare(b.get_or_null(column));
            if *descending {
                ordering.reverse()
            } else {
                ordering
            }
        });
    }

    if let Some(limit) = select.limit {
        output.truncate(limit);
    }

    Ok(output)
}

fn project(items: &[SelectItem], row: &Row) -> Row {
    let mut projected = Row::new();
    for item in items {
        match item {
            SelectItem::Star => {
                for (column, value) in row.iter() {
                    projected.insert(column, value.clone());
                }
            }
            SelectItem::Column { name, .. } => {
                projected.insert(item.output_name(), row.get_or_null(name).clone());
            }
            SelectItem::Aggregate { .. } => {}
        }
    }
    projected
}

fn aggregate_rows(select: &Select, rows: &[&Row]) -> GatewayResult<Vec<Row>> {
    let groups: Vec<Vec<&Row>> = match &select.group_by {
        None => vec![rows.to_vec()],
        Some(column) => {
            let mut order: Vec<GroupKey> = Vec::new();
            let mut buckets: HashMap<GroupKey, Vec<&Row>> = HashMap::new();
            for &row in rows {
                let key = GroupKey(row.get_or_null(column).clone());
                if !buckets.contains_key(&key) {
                    order.push(key.clone());
                }
                buckets.entry(key).or_default().push(row);
            }
            order
                .into_iter()
                .filter_map(|key| buckets.remove(&key))
                .collect()
        }
    };

    let mut output = Vec::with_capacity(groups.len());
    for group in groups {
        let mut row = Row::new();
        for item in &select.items {
            match item {
                SelectItem::Star => {
                    if let Some(first) = group.first() {
                        for (column, value) in first.iter() {
                            row.insert(column, value.clone());
                        }
                    }
                }
                SelectItem::Column { name, .. } => {
                    let value = group
                        .first()
                        .map(|first| first.get_or_null(name).clone())
                        .unwrap_or(Value::Null);
                    row.insert(item.output_name(), value);
                }
                SelectItem::Aggregate {
                    function, argument, ..
                } => {
                    row.insert(
                        item.output_name(),
                        compute(*function, argument.as_deref(), &group)?,
                    );
                }
            }
        }

        let mut keep = true;
        for condition in &select.having {
            if !having_holds(condition, &row, &group)? {
                keep = false;
                break;
            }
        }
        if keep {
            output.push(row);
        }
    }
    Ok(output)
}

fn having_holds(having: &HavingCondition, row: &Row, group: &[&Row]) -> GatewayResult<bool> {
    let actual = match &having.operand {
        HavingOperand::Aggregate { function, argument } => {
            compute(*function, argument.as_deref(), group)?
        }
        HavingOperand::Name(name) => row.get_or_null(name).clone(),
    };
    Ok(match actual.as_f64() {
        Some(actual) => actual
            .partial_cmp(&having.value)
            .map_or(false, |ordering| having.op.holds(ordering)),
        None => false,
    })
}

fn compute(function: FunctionKind, argument: Option<&str>, group: &[&Row]) -> GatewayResult<Value> {
    let column = match (function, argument) {
        (FunctionKind::Count, None) => return Ok(Value::Int(group.len() as i64)),
        (_, None) => {
            return Err(syntax_error(format!(
                "{}(*) is not valid",
                function.sql_name()
            )))
        }
        (_, Some(column)) => column,
    };

    let values: Vec<&Value> = group
        .iter()
        .map(|row| row.get_or_null(column))
        .filter(|value| !value.is_null())
        .collect();

    match function {
        FunctionKind::Count => Ok(Value::Int(values.len() as i64)),
        FunctionKind::Min | FunctionKind::Max => {
            let picked = values.into_iter().reduce(|best, value| {
                let ordering = value.compare(best);
                let better = if function == FunctionKind::Min {
                    ordering == Ordering::Less
                } else {
                    ordering == Ordering::Greater
                };
                if better {
                    value
                } else {
                    best
                }
            });
            Ok(picked.cloned().unwrap_or(Value::Null))
        }
        FunctionKind::Sum | FunctionKind::Avg => {
            if values.is_empty() {
                return Ok(Value::Null);
            }
            let all_int = values.iter().all(|v| matches!(v, Value::Int(_)));
            // Text without a numeric reading contributes zero.
            let total: f64 = values.iter().map(|v| v.as_f64().unwrap_or(0.0)).sum();
            if function == FunctionKind::Avg {
                Ok(Value::Float(total / values.len() as f64))
            } else if all_int {
                Ok(Value::Int(values.iter().filter_map(|v| v.as_i64()).sum()))
            } else {
                Ok(Value::Float(total))
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    fn store_with_amounts(amounts: &[i64]) -> InMemoryStore {
        let store = InMemoryStore::new();
        store.create_table("budgets", &["id", "amount"]).unwrap();
        for (i, amount) in amounts.iter().enumerate() {
            store
                .insert_row(
                    "budgets",
                    Row::new().with("id", format!("b{}", i)).with("amount", *amount),
                )
                .unwrap();
        }
        store
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// Native COUNT agrees with counting the filtered fetch.
        #[test]
        fn prop_count_matches_filtered_fetch(
            amounts in prop::collection::vec(-500i64..500, 0..30),
            threshold in -500i64..500,
        ) {
            let store = store_with_amounts(&amounts);
            let filter = format!("WHERE amount > {}", threshold);

            let counted = store
                .run(&format!("SELECT COUNT(*) as count FROM budgets {}", filter))
                .unwrap();
            let fetched = store.run(&format!("SELECT * FROM budgets {}", filter)).unwrap();
            let expected = amounts.iter().filter(|a| **a > threshold).count() as i64;

            prop_assert_eq!(counted[0].get("count"), Some(&Value::Int(expected)));
            prop_assert_eq!(fetched.len() as i64, expected);
        }
    }
}
