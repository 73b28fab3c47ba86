//! Pesa Backend - Composition Root
//!
//! Owns the one gateway the process talks to and hands it to the
//! aggregation engine, the capability probe and the schema reconciler.
//! [`Backend`] is the surface the rest of the application calls.

pub mod error;
pub mod telemetry;

pub use error::{BackendError, BackendResult};
pub use telemetry::{init_tracing, LogFormat, TelemetryConfig};

use pesa_aggregate::{AggregateEngine, CapabilityProbe, CountOutcome};
use pesa_core::{
    AggregateSpec, CapabilityMap, GatewayResult, ReconcileConfig, Row, StoreConfig,
};
use pesa_schema::{InitializationReport, SchemaReconciler};
use pesa_store::{Gateway, HttpGateway};
use serde::Serialize;
use std::sync::Arc;

/// What `pesad` prints once startup is done.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartupSummary {
    pub report: InitializationReport,
    pub capabilities: CapabilityMap,
}

pub struct Backend {
    gateway: Arc<dyn Gateway>,
    engine: AggregateEngine,
    probe: CapabilityProbe,
    reconciler: SchemaReconciler,
}

impl Backend {
    pub fn new(gateway: Arc<dyn Gateway>, config: ReconcileConfig) -> BackendResult<Self> {
        Ok(Self {
            engine: AggregateEngine::new(Arc::clone(&gateway)),
            probe: CapabilityProbe::new(Arc::clone(&gateway)),
            reconciler: SchemaReconciler::new(Arc::clone(&gateway), config)?,
            gateway,
        })
    }

    /// Build the HTTP gateway from `store` and wire everything to it.
    pub fn from_config(store: &StoreConfig, config: ReconcileConfig) -> BackendResult<Self> {
        let gateway = HttpGateway::new(store)?;
        tracing::info!(
            url = %store.api_url,
            database = %store.database,
            timeout_secs = store.timeout.as_secs(),
            "Remote store gateway ready"
        );
        Self::new(Arc::new(gateway), config)
    }

    pub fn gateway(&self) -> &Arc<dyn Gateway> {
        &self.gateway
    }

    pub fn reconcile_config(&self) -> &ReconcileConfig {
        self.reconciler.config()
    }

    // ========================================================================
    // AGGREGATION
    // ========================================================================

    pub async fn count_rows(&self, table: &str, filter: Option<&str>) -> GatewayResult<u64> {
        self.engine.count_rows(table, filter).await
    }

    pub async fn count_rows_detailed(
        &self,
        table: &str,
        filter: Option<&str>,
    ) -> GatewayResult<CountOutcome> {
        self.engine.count_rows_detailed(table, filter).await
    }

    pub async fn sum_over(
        &self,
        table: &str,
        column: &str,
        filter: Option<&str>,
    ) -> GatewayResult<f64> {
        self.engine.sum_over(table, column, filter).await
    }

    pub async fn avg_over(
        &self,
        table: &str,
        column: &str,
        filter: Option<&str>,
    ) -> GatewayResult<Option<f64>> {
        self.engine.avg_over(table, column, filter).await
    }

    pub async fn aggregate(&self, spec: &AggregateSpec) -> GatewayResult<Vec<Row>> {
        self.engine.aggregate(spec).await
    }

    // ========================================================================
    // SCHEMA AND DIAGNOSTICS
    // ========================================================================

    pub async fn initialize_schema(
        &self,
        seed_categories: bool,
        create_default_user: bool,
    ) -> InitializationReport {
        self.reconciler
            .initialize(seed_categories, create_default_user)
            .await
    }

    /// Probe the configured representative table. Diagnostics only.
    pub async fn detect_capabilities(&self) -> CapabilityMap {
        self.probe
            .detect_capabilities(&self.reconciler.config().probe_table)
            .await
    }

    /// Initialize with the configured switches, then probe.
    pub async fn startup(&self) -> StartupSummary {
        let config = self.reconciler.config();
        let report = self
            .initialize_schema(config.seed_categories, config.create_default_user)
            .await;
        let capabilities = self.detect_capabilities().await;
        StartupSummary {
            report,
            capabilities,
        }
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("reconciler", &self.reconciler)
            .finish_non_exhaustive()
    }
}
