//! Capability probe
//!
//! Six independent trial statements against one representative table. The
//! resulting [`CapabilityMap`] is for startup logging and operator
//! diagnostics only; [`AggregateEngine`](crate::AggregateEngine) makes its
//! own decision on every call.

use pesa_core::{CapabilityMap, Feature};
use pesa_store::Gateway;
use std::sync::Arc;

/// Trial statements, one per probe. MIN and MAX share a statement.
pub fn probe_statements(table: &str) -> [(&'static [Feature], String); 6] {
    [
        (
            &[Feature::Count],
            format!("SELECT COUNT(*) as probe FROM {} LIMIT 1", table),
        ),
        (
            &[Feature::Sum],
            format!("SELECT SUM(id) as probe FROM {} LIMIT 1", table),
        ),
        (
            &[Feature::Avg],
            format!("SELECT AVG(id) as probe FROM {} LIMIT 1", table),
        ),
        (
            &[Feature::Min, Feature::Max],
            format!(
                "SELECT MIN(id) as probe_min, MAX(id) as probe_max FROM {} LIMIT 1",
                table
            ),
        ),
        (
            &[Feature::GroupBy],
            format!(
                "SELECT is_default, COUNT(*) FROM {} GROUP BY is_default",
                table
            ),
        ),
        (
            &[Feature::Having],
            format!(
                "SELECT is_default, COUNT(*) as cnt FROM {} GROUP BY is_default HAVING COUNT(*) > 0",
                table
            ),
        ),
    ]
}

#[derive(Clone)]
pub struct CapabilityProbe {
    gateway: Arc<dyn Gateway>,
}

impl CapabilityProbe {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self { gateway }
    }

    /// Run every probe. A failing probe marks its features unsupported and
    /// never stops the others.
    pub async fn detect_capabilities(&self, table: &str) -> CapabilityMap {
        let [count, sum, avg, min_max, group_by, having] = probe_statements(table);

        let (count_ok, sum_ok, avg_ok, min_max_ok, group_by_ok, having_ok) = tokio::join!(
            self.probe(&count.1),
            self.probe(&sum.1),
            self.probe(&avg.1),
            self.probe(&min_max.1),
            self.probe(&group_by.1),
            self.probe(&having.1),
        );

        let mut capabilities = CapabilityMap::default();
        for (features, supported) in [
            (count.0, count_ok),
            (sum.0, sum_ok),
            (avg.0, avg_ok),
            (min_max.0, min_max_ok),
            (group_by.0, group_by_ok),
            (having.0, having_ok),
        ] {
            for feature in features {
                capabilities.set(*feature, supported);
            }
        }

        let unsupported = capabilities.unsupported();
        if unsupported.is_empty() {
            tracing::info!(table = %table, "Remote store supports all probed aggregate features");
        } else {
            let names: Vec<&str> = unsupported.iter().map(|f| f.name()).collect();
            tracing::info!(
                table = %table,
                unsupported = ?names,
                "Remote store lacks some aggregate features; in-memory fallbacks will be used"
            );
        }

        capabilities
    }

    async fn probe(&self, sql: &str) -> bool {
        match self.gateway.query(sql).await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(sql = %sql, error = %e, "Capability probe failed");
                false
            }
        }
    }
}

impl std::fmt::Debug for CapabilityProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityProbe").finish_non_exhaustive()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_feature_is_probed() {
        let probed: Vec<Feature> = probe_statements("categories")
            .iter()
            .flat_map(|(features, _)| features.iter().copied())
            .collect();
        for feature in Feature::ALL {
            assert!(probed.contains(&feature), "{} not probed", feature);
        }
    }

    #[test]
    fn test_statements_target_table() {
        for (_, sql) in probe_statements("transactions") {
            assert!(sql.contains("FROM transactions"));
        }
    }
}
