//! Pesa Test Utilities
//!
//! Shared test infrastructure for the workspace:
//! - [`ScriptedGateway`]: answers statements from substring rules
//! - Proptest generators for values, rows and amounts
//! - Fixtures for common table contents

// Re-export the in-memory store from its source crate
pub use pesa_store::InMemoryStore;

// Re-export core types for convenience
pub use pesa_core::{
    Aggregate, AggregateSpec, CapabilityMap, Feature, GatewayError, GatewayResult, Row, Value,
};

use async_trait::async_trait;
use pesa_store::Gateway;
use std::sync::Mutex;

// ============================================================================
// SCRIPTED GATEWAY
// ============================================================================

#[derive(Debug, Clone)]
struct Rule {
    needle: String,
    reply: GatewayResult<Vec<Row>>,
}

/// Gateway that answers each statement with the reply of the first rule
/// whose substring it contains, or with no rows when nothing matches.
/// Every statement is recorded.
#[derive(Debug, Default)]
pub struct ScriptedGateway {
    rules: Vec<Rule>,
    statements: Mutex<Vec<String>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer statements containing `needle` with `rows`.
    pub fn on(mut self, needle: impl Into<String>, rows: Vec<Row>) -> Self {
        self.rules.push(Rule {
            needle: needle.into(),
            reply: Ok(rows),
        });
        self
    }

    /// Fail statements containing `needle` with `error`.
    pub fn fail(mut self, needle: impl Into<String>, error: GatewayError) -> Self {
        self.rules.push(Rule {
            needle: needle.into(),
            reply: Err(error),
        });
        self
    }

    /// Statements received so far, in order.
    pub fn statements(&self) -> Vec<String> {
        self.statements
            .lock()
            .map(|s| s.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    fn reply(&self, sql: &str) -> GatewayResult<Vec<Row>> {
        self.statements
            .lock()
            .map_err(|_| GatewayError::LockPoisoned)?
            .push(sql.to_string());
        self.rules
            .iter()
            .find(|rule| sql.contains(&rule.needle))
            .map(|rule| rule.reply.clone())
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

#[async_trait]
impl Gateway for ScriptedGateway {
    async fn query(&self, sql: &str) -> GatewayResult<Vec<Row>> {
        self.reply(sql)
    }

    async fn execute(&self, sql: &str) -> GatewayResult<()> {
        self.reply(sql).map(|_| ())
    }
}

/// The store's rejection text for an aggregate it cannot parse.
pub fn unsupported(function: &str) -> GatewayError {
    GatewayError::rejected(format!(
        "Parse error: Expected identifier near '{}'",
        function.to_uppercase()
    ))
}

// ============================================================================
// GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for values and rows.

    use super::*;
    use proptest::prelude::*;

    /// Any scalar value the store can return. Floats are finite.
    pub fn arb_value() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            (-1_000_000i64..1_000_000).prop_map(Value::Int),
            (-1.0e6f64..1.0e6).prop_map(Value::Float),
            "[a-zA-Z0-9 _-]{0,16}".prop_map(Value::Text),
        ]
    }

    /// A transaction amount in shillings, possibly null.
    pub fn arb_amount() -> impl Strategy<Value = Option<f64>> {
        prop::option::weighted(0.9, (0u32..500_000).prop_map(|cents| cents as f64 / 100.0))
    }

    /// One of a small set of category ids, possibly null, so that groups
    /// collide often.
    pub fn arb_category() -> impl Strategy<Value = Option<String>> {
        prop::option::weighted(
            0.8,
            prop::sample::select(vec!["cat-food", "cat-transport", "cat-bills", "cat-other"])
                .prop_map(str::to_string),
        )
    }

    /// Transaction rows with unique ids.
    pub fn arb_transactions(max: usize) -> impl Strategy<Value = Vec<Row>> {
        prop::collection::vec((arb_category(), arb_amount(), any::<bool>()), 0..max).prop_map(
            |specs| {
                specs
                    .into_iter()
                    .enumerate()
                    .map(|(i, (category, amount, expense))| {
                        fixtures::transaction(
                            &format!("txn-{}", i),
                            if expense { "expense" } else { "income" },
                            amount,
                            category.as_deref(),
                        )
                    })
                    .collect()
            },
        )
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built rows and stores for common testing scenarios.

    use super::*;

    /// Columns of the transactions table used by aggregation tests.
    pub const TRANSACTION_COLUMNS: &[&str] = &["id", "user_id", "type", "amount", "category_id"];

    pub fn transaction(id: &str, kind: &str, amount: Option<f64>, category: Option<&str>) -> Row {
        Row::new()
            .with("id", id)
            .with("user_id", "user-1")
            .with("type", kind)
            .with("amount", amount)
            .with("category_id", category)
    }

    /// Four expenses over two categories and one uncategorised income.
    pub fn sample_transactions() -> Vec<Row> {
        vec![
            transaction("t1", "expense", Some(100.0), Some("cat-food")),
            transaction("t2", "expense", Some(250.0), Some("cat-food")),
            transaction("t3", "expense", Some(40.0), Some("cat-transport")),
            transaction("t4", "expense", None, Some("cat-food")),
            transaction("t5", "income", Some(5000.0), None),
        ]
    }

    /// A store holding `rows` in a `transactions` table.
    pub fn store_with_transactions(store: &InMemoryStore, rows: Vec<Row>) -> GatewayResult<()> {
        store.create_table("transactions", TRANSACTION_COLUMNS)?;
        for row in rows {
            store.insert_row("transactions", row)?;
        }
        Ok(())
    }

    /// Capability map with the listed features switched off.
    pub fn capabilities_without(features: &[Feature]) -> CapabilityMap {
        let mut capabilities = CapabilityMap::all_supported();
        for feature in features {
            capabilities.set(*feature, false);
        }
        capabilities
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_gateway_first_match_wins() {
        let gateway = ScriptedGateway::new()
            .fail("COUNT(*)", unsupported("count"))
            .on("FROM users", vec![Row::new().with("id", "u1")]);

        let err = gateway.query("SELECT COUNT(*) FROM users").await.unwrap_err();
        assert_eq!(err, unsupported("COUNT"));
        assert_eq!(gateway.query("SELECT * FROM users").await.unwrap().len(), 1);
        assert!(gateway.query("SELECT * FROM budgets").await.unwrap().is_empty());
        assert_eq!(gateway.statements().len(), 3);
    }

    #[test]
    fn test_capabilities_without() {
        let capabilities = fixtures::capabilities_without(&[Feature::Count, Feature::Having]);
        assert!(!capabilities.count);
        assert!(!capabilities.having);
        assert!(capabilities.sum);
    }
}
