//! Gateway trait
//!
//! The remote store offers two operations and nothing else: run a statement
//! and get rows back, or run a statement for its effect. No transactions,
//! no prepared statements, no introspection beyond `SELECT ... LIMIT 1`.

use async_trait::async_trait;
use pesa_core::{classify_unsupported, Feature, GatewayError, GatewayResult, Row};
use std::sync::Arc;

/// Seam to the remote SQL-like store.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Run a statement and return its decoded rows.
    async fn query(&self, sql: &str) -> GatewayResult<Vec<Row>>;

    /// Run a statement for its effect.
    async fn execute(&self, sql: &str) -> GatewayResult<()>;
}

#[async_trait]
impl<G: Gateway + ?Sized> Gateway for Arc<G> {
    async fn query(&self, sql: &str) -> GatewayResult<Vec<Row>> {
        (**self).query(sql).await
    }

    async fn execute(&self, sql: &str) -> GatewayResult<()> {
        (**self).execute(sql).await
    }
}

/// Outcome of a statement that may hit a capability gap.
#[derive(Debug, Clone, PartialEq)]
pub enum Attempt {
    Rows(Vec<Row>),
    /// The store rejected the statement with a recognised
    /// unsupported-syntax text for `feature`.
    Unsupported { feature: Feature, message: String },
}

impl Attempt {
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Attempt::Unsupported { .. })
    }
}

#[async_trait]
pub trait GatewayExt: Gateway {
    /// Run `sql`, turning a rejection that names one of `features` together
    /// with a syntax marker into [`Attempt::Unsupported`].
    ///
    /// Only [`GatewayError::Rejected`] texts are classified. Connectivity
    /// failures, timeouts and undecodable replies propagate unchanged.
    async fn attempt(&self, sql: &str, features: &[Feature]) -> GatewayResult<Attempt> {
        match self.query(sql).await {
            Ok(rows) => Ok(Attempt::Rows(rows)),
            Err(GatewayError::Rejected { message }) => {
                match classify_unsupported(&message, features) {
                    Some(feature) => Ok(Attempt::Unsupported { feature, message }),
                    None => Err(GatewayError::Rejected { message }),
                }
            }
            Err(e) => Err(e),
        }
    }
}

impl<G: Gateway + ?Sized> GatewayExt for G {}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(GatewayResult<Vec<Row>>);

    #[async_trait]
    impl Gateway for Fixed {
        async fn query(&self, _sql: &str) -> GatewayResult<Vec<Row>> {
            self.0.clone()
        }

        async fn execute(&self, _sql: &str) -> GatewayResult<()> {
            self.0.clone().map(|_| ())
        }
    }

    #[tokio::test]
    async fn test_attempt_returns_rows() {
        let gateway = Fixed(Ok(vec![Row::new().with("count", 3i64)]));
        let attempt = gateway.attempt("SELECT COUNT(*) FROM t", &[Feature::Count]).await;
        assert_eq!(
            attempt,
            Ok(Attempt::Rows(vec![Row::new().with("count", 3i64)]))
        );
    }

    #[tokio::test]
    async fn test_attempt_classifies_rejection() {
        let gateway = Fixed(Err(GatewayError::rejected(
            "Parse error: Expected identifier near 'COUNT'",
        )));
        let attempt = gateway
            .attempt("SELECT COUNT(*) FROM t", &[Feature::Count])
            .await
            .unwrap();
        assert!(matches!(
            attempt,
            Attempt::Unsupported { feature: Feature::Count, .. }
        ));
    }

    #[tokio::test]
    async fn test_attempt_never_classifies_connectivity() {
        let gateway = Fixed(Err(GatewayError::connectivity("syntax of count timed out")));
        let result = gateway.attempt("SELECT COUNT(*) FROM t", &[Feature::Count]).await;
        assert_eq!(
            result,
            Err(GatewayError::connectivity("syntax of count timed out"))
        );
    }

    #[tokio::test]
    async fn test_attempt_reraises_unrelated_rejection() {
        let gateway = Fixed(Err(GatewayError::rejected("Table 'nope' does not exist")));
        let result = gateway.attempt("SELECT COUNT(*) FROM nope", &[Feature::Count]).await;
        assert_eq!(
            result,
            Err(GatewayError::rejected("Table 'nope' does not exist"))
        );
    }

    #[tokio::test]
    async fn test_arc_dyn_gateway_delegates() {
        let gateway: Arc<dyn Gateway> = Arc::new(Fixed(Ok(Vec::new())));
        assert_eq!(gateway.query("SELECT 1").await, Ok(Vec::new()));
        assert!(gateway.attempt("SELECT 1", &[]).await.is_ok());
    }
}
