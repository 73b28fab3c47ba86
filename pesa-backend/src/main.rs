//! pesad - Ledger Store Startup
//!
//! Loads configuration, reconciles the remote schema, probes the store's
//! aggregate capabilities and prints the startup summary as JSON.

use pesa_backend::{init_tracing, Backend, BackendError, BackendResult, TelemetryConfig};
use pesa_core::{ReconcileConfig, StoreConfig};

#[tokio::main]
async fn main() -> BackendResult<()> {
    init_tracing(&TelemetryConfig::from_env()?)?;

    let store_config = StoreConfig::from_env()?;
    let reconcile_config = ReconcileConfig::from_env()?;
    let backend = Backend::from_config(&store_config, reconcile_config)?;

    tracing::info!(database = %store_config.database, "Starting ledger store initialization");
    let summary = backend.startup().await;

    let rendered = serde_json::to_string_pretty(&summary).map_err(|e| BackendError::Startup {
        reason: format!("Failed to render startup summary: {}", e),
    })?;
    println!("{}", rendered);

    if !summary.report.success {
        return Err(BackendError::Startup {
            reason: summary.report.message,
        });
    }

    tracing::info!("Ledger store ready");
    Ok(())
}
