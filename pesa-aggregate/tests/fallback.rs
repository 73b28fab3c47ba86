//! Native and fallback aggregation against scripted and in-memory stores.

use pesa_aggregate::{AggregateEngine, CapabilityProbe, CountMethod};
use pesa_core::{Aggregate, AggregateSpec, CapabilityMap, Feature, GatewayError, Row, Value};
use pesa_store::{Gateway, InMemoryStore};
use pesa_test_utils::fixtures::{capabilities_without, sample_transactions, store_with_transactions};
use pesa_test_utils::{unsupported, ScriptedGateway};
use std::sync::Arc;

fn store(capabilities: CapabilityMap) -> InMemoryStore {
    let store = InMemoryStore::with_capabilities(capabilities);
    store_with_transactions(&store, sample_transactions()).unwrap();
    store
}

fn engine_over(store: &InMemoryStore) -> AggregateEngine {
    AggregateEngine::new(Arc::new(store.clone()))
}

// ============================================================================
// COUNT
// ============================================================================

#[tokio::test]
async fn native_count_is_returned_as_is() {
    let gateway = Arc::new(
        ScriptedGateway::new().on("COUNT(*)", vec![Row::new().with("count", 42i64)]),
    );
    let engine = AggregateEngine::new(gateway.clone());

    let outcome = engine
        .count_rows_detailed("transactions", Some("type = 'expense'"))
        .await
        .unwrap();
    assert_eq!(outcome.count, 42);
    assert_eq!(outcome.method, CountMethod::Native);
    assert_eq!(
        gateway.statements(),
        vec!["SELECT COUNT(*) as count FROM transactions WHERE type = 'expense'"]
    );
}

#[tokio::test]
async fn unsupported_count_counts_filtered_fetch() {
    let store = store(capabilities_without(&[Feature::Count]));
    let engine = engine_over(&store);

    let outcome = engine
        .count_rows_detailed("transactions", Some("type = 'expense'"))
        .await
        .unwrap();
    assert_eq!(outcome.count, 4);
    assert_eq!(outcome.method, CountMethod::Fetched);
    assert!(outcome.is_exact());
}

#[tokio::test]
async fn failed_filtered_fetch_falls_back_to_unfiltered_count() {
    let gateway = Arc::new(
        ScriptedGateway::new()
            .fail("COUNT(*)", unsupported("count"))
            .fail("WHERE", GatewayError::rejected("Column 'kind' not found"))
            .on(
                "SELECT * FROM transactions",
                vec![Row::new(), Row::new(), Row::new()],
            ),
    );
    let engine = AggregateEngine::new(gateway.clone());

    let outcome = engine
        .count_rows_detailed("transactions", Some("kind = 'expense'"))
        .await
        .unwrap();
    assert_eq!(outcome.count, 3);
    assert_eq!(outcome.method, CountMethod::Unfiltered);
    assert!(!outcome.is_exact());
    assert_eq!(gateway.statements().len(), 3);
}

#[tokio::test]
async fn unfiltered_tier_failure_propagates() {
    let gateway = ScriptedGateway::new()
        .fail("COUNT(*)", unsupported("count"))
        .fail("SELECT *", GatewayError::connectivity("connection reset"));
    let engine = AggregateEngine::new(Arc::new(gateway));

    let err = engine
        .count_rows("transactions", Some("type = 'expense'"))
        .await
        .unwrap_err();
    assert_eq!(err, GatewayError::connectivity("connection reset"));
}

#[tokio::test]
async fn unrelated_count_errors_propagate_unchanged() {
    let store = store(CapabilityMap::all_supported());
    let engine = engine_over(&store);

    let err = engine.count_rows("budgets", None).await.unwrap_err();
    assert_eq!(err, GatewayError::rejected("Table 'budgets' does not exist"));

    let gateway = ScriptedGateway::new().fail("COUNT", GatewayError::connectivity("timed out"));
    let engine = AggregateEngine::new(Arc::new(gateway));
    assert_eq!(
        engine.count_rows("transactions", None).await,
        Err(GatewayError::connectivity("timed out"))
    );
}

#[tokio::test]
async fn empty_native_count_reply_is_invalid() {
    let engine = AggregateEngine::new(Arc::new(ScriptedGateway::new()));
    let err = engine.count_rows("transactions", None).await.unwrap_err();
    assert!(matches!(err, GatewayError::InvalidResponse { .. }));
}

// ============================================================================
// SUM / AVG
// ============================================================================

#[tokio::test]
async fn sum_and_avg_on_empty_result() {
    for capabilities in [CapabilityMap::all_supported(), CapabilityMap::default()] {
        let store = store(capabilities);
        let engine = engine_over(&store);
        let filter = Some("type = 'refund'");

        assert_eq!(engine.sum_over("transactions", "amount", filter).await, Ok(0.0));
        assert_eq!(engine.avg_over("transactions", "amount", filter).await, Ok(None));
    }
}

#[tokio::test]
async fn sum_and_avg_agree_between_native_and_fallback() {
    let native = engine_over(&store(CapabilityMap::all_supported()));
    let fallback = engine_over(&store(CapabilityMap::default()));
    let filter = Some("type = 'expense'");

    for engine in [&native, &fallback] {
        assert_eq!(engine.sum_over("transactions", "amount", filter).await, Ok(390.0));
        assert_eq!(engine.avg_over("transactions", "amount", filter).await, Ok(Some(130.0)));
    }
}

#[tokio::test]
async fn avg_of_zero_is_not_none() {
    let store = InMemoryStore::legacy();
    store_with_transactions(
        &store,
        vec![pesa_test_utils::fixtures::transaction("z", "expense", Some(0.0), None)],
    )
    .unwrap();
    let engine = engine_over(&store);
    assert_eq!(engine.avg_over("transactions", "amount", None).await, Ok(Some(0.0)));
}

#[tokio::test]
async fn sum_fallback_fetches_only_target_column() {
    let gateway = Arc::new(
        ScriptedGateway::new()
            .fail("SUM(", unsupported("sum"))
            .on(
                "SELECT amount FROM",
                vec![
                    Row::new().with("amount", 10i64),
                    Row::new().with("amount", Value::Null),
                    Row::new().with("amount", 2.5),
                ],
            ),
    );
    let engine = AggregateEngine::new(gateway.clone());

    assert_eq!(engine.sum_over("budgets", "amount", None).await, Ok(12.5));
    assert_eq!(gateway.statements()[1], "SELECT amount FROM budgets");
}

// ============================================================================
// MULTI-AGGREGATE
// ============================================================================

fn by_category() -> AggregateSpec {
    AggregateSpec::new("transactions")
        .aggregate(Aggregate::count_all())
        .aggregate(Aggregate::sum("amount"))
        .filter("type = 'expense'")
        .group_by("category_id")
}

#[tokio::test]
async fn grouped_fallback_partitions_by_distinct_values() {
    let store = store(CapabilityMap::default());
    let engine = engine_over(&store);

    let rows = engine.aggregate(&by_category()).await.unwrap();
    assert_eq!(
        rows,
        vec![
            Row::new()
                .with("category_id", "cat-food")
                .with("count_all", 3i64)
                .with("sum_amount", 350.0),
            Row::new()
                .with("category_id", "cat-transport")
                .with("count_all", 1i64)
                .with("sum_amount", 40.0),
        ]
    );
}

#[tokio::test]
async fn having_filters_groups_in_memory() {
    let store = store(capabilities_without(&[Feature::Having]));
    let engine = engine_over(&store);

    let spec = by_category().having("count_all > 2");
    let rows = engine.aggregate(&spec).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("category_id"), Some(&Value::from("cat-food")));

    let compound = by_category().having("count_all > 2 AND sum_amount < 5");
    let rows = engine.aggregate(&compound).await.unwrap();
    assert_eq!(rows.len(), 2);
}

#[tokio::test]
async fn ordering_applies_in_memory() {
    let store = store(CapabilityMap::default());
    let engine = engine_over(&store);

    let spec = by_category().order_by("count_all ASC");
    let rows = engine.aggregate(&spec).await.unwrap();
    assert_eq!(rows[0].get("category_id"), Some(&Value::from("cat-transport")));

    let spec = by_category().order_by("count_all desc");
    let rows = engine.aggregate(&spec).await.unwrap();
    assert_eq!(rows[0].get("category_id"), Some(&Value::from("cat-food")));
}

#[tokio::test]
async fn ungrouped_aggregate_returns_one_row() {
    let store = store(CapabilityMap::default());
    let engine = engine_over(&store);

    let spec = AggregateSpec::new("transactions")
        .aggregate(Aggregate::count_all())
        .aggregate(Aggregate::max("amount"))
        .filter("type = 'refund'");
    let rows = engine.aggregate(&spec).await.unwrap();
    assert_eq!(
        rows,
        vec![Row::new()
            .with("count_all", 0i64)
            .with("max_amount", Value::Null)]
    );
}

#[tokio::test]
async fn native_aggregate_passes_rows_through() {
    let store = store(CapabilityMap::all_supported());
    let engine = engine_over(&store);

    let rows = engine.aggregate(&by_category()).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("count_all"), Some(&Value::Int(3)));
    let statements = store.statements().unwrap();
    assert_eq!(statements.len(), 1);
    assert!(statements[0].contains("GROUP BY category_id"));
}

#[tokio::test]
async fn aggregate_reraises_unrelated_errors() {
    let store = store(CapabilityMap::default());
    let engine = engine_over(&store);

    let spec = AggregateSpec::new("ledger").aggregate(Aggregate::count_all());
    let err = engine.aggregate(&spec).await.unwrap_err();
    assert_eq!(err, GatewayError::rejected("Table 'ledger' does not exist"));
}

#[tokio::test]
async fn clause_syntax_errors_are_not_capability_gaps() {
    let failure = GatewayError::rejected("Syntax error near 'transaction_group_id'");
    let gateway = Arc::new(
        ScriptedGateway::new()
            .fail("GROUP BY", failure.clone())
            .on(
                "SELECT amount, transaction_group_id FROM",
                vec![Row::new().with("transaction_group_id", "g1").with("amount", 5.0)],
            ),
    );
    let engine = AggregateEngine::new(gateway.clone());

    let spec = AggregateSpec::new("transactions")
        .aggregate(Aggregate::sum("amount"))
        .group_by("transaction_group_id");
    assert_eq!(engine.aggregate(&spec).await, Err(failure));
    assert_eq!(gateway.statements().len(), 1);
}

// ============================================================================
// PROBE
// ============================================================================

#[tokio::test]
async fn probe_reports_each_feature_independently() {
    let store = InMemoryStore::with_capabilities(capabilities_without(&[Feature::Sum, Feature::Having]));
    store
        .create_table("categories", &["id", "name", "is_default"])
        .unwrap();
    store
        .insert_row(
            "categories",
            Row::new().with("id", "cat-food").with("name", "Food").with("is_default", true),
        )
        .unwrap();

    let gateway: Arc<dyn Gateway> = Arc::new(store);
    let capabilities = CapabilityProbe::new(gateway).detect_capabilities("categories").await;

    assert!(capabilities.count);
    assert!(!capabilities.sum);
    assert!(capabilities.avg);
    assert!(capabilities.min && capabilities.max);
    assert!(capabilities.group_by);
    assert!(!capabilities.having);
}

#[tokio::test]
async fn probe_never_consulted_by_engine() {
    // Probing an unreachable store changes nothing for the engine: each call
    // decides from its own failure text.
    let store = store(capabilities_without(&[Feature::Count]));
    let probe = CapabilityProbe::new(Arc::new(store.clone()));
    let capabilities = probe.detect_capabilities("missing_table").await;
    assert_eq!(capabilities, CapabilityMap::default());

    let engine = engine_over(&store);
    assert_eq!(engine.count_rows("transactions", None).await, Ok(5));
}
