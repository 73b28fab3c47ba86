//! HTTP client for the remote store

use crate::gateway::Gateway;
use async_trait::async_trait;
use pesa_core::{GatewayError, GatewayResult, PesaResult, Row, StoreConfig};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Failure text used when the store reports failure without one.
pub const DEFAULT_FAILURE_TEXT: &str = "Database query failed";

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    sql: &'a str,
    db: &'a str,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<Vec<JsonValue>>,
    #[serde(default)]
    error: Option<String>,
}

/// Gateway over the store's `POST {api_url}/query` endpoint.
///
/// The underlying [`Client`] is built once with the configured timeout and
/// reused for every call; clone the gateway (or share it behind an `Arc`)
/// rather than building another.
#[derive(Clone)]
pub struct HttpGateway {
    client: Client,
    query_url: String,
    api_key: String,
    database: String,
}

impl HttpGateway {
    /// Fails with the [`ConfigError`](pesa_core::ConfigError) from
    /// validation, or a gateway error when the client cannot be built.
    pub fn new(config: &StoreConfig) -> PesaResult<Self> {
        config.validate()?;

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::connectivity(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            query_url: config.query_url(),
            api_key: config.api_key.clone(),
            database: config.database.clone(),
        })
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    async fn send(&self, sql: &str) -> GatewayResult<Vec<Row>> {
        tracing::debug!(sql = %sql, db = %self.database, "Sending statement to remote store");

        let response = self
            .client
            .post(&self.query_url)
            .header("X-API-Key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&QueryRequest {
                sql,
                db: &self.database,
            })
            .send()
            .await
            .map_err(|e| {
                tracing::error!(sql = %sql, error = %e, "Remote store connection error");
                GatewayError::connectivity(format!("HTTP request failed: {}", e))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            GatewayError::connectivity(format!("Failed to read response body: {}", e))
        })?;

        let parsed: QueryResponse = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(e) if status.is_server_error() => {
                return Err(GatewayError::connectivity(format!(
                    "Remote store returned {}: {}",
                    status, e
                )))
            }
            Err(e) => {
                return Err(GatewayError::invalid_response(format!(
                    "Failed to parse response ({}): {}",
                    status, e
                )))
            }
        };

        tracing::debug!(status = %status, success = parsed.success, "Remote store response");

        if !parsed.success {
            let message = parsed
                .error
                .filter(|e| !e.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_FAILURE_TEXT.to_string());
            tracing::error!(sql = %sql, error = %message, "Remote store rejected statement");
            if let Some(hint) = operator_hint(&message) {
                tracing::error!("{}", hint);
            }
            return Err(GatewayError::rejected(message));
        }

        decode_rows(parsed.data.unwrap_or_default())
    }
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn query(&self, sql: &str) -> GatewayResult<Vec<Row>> {
        self.send(sql).await
    }

    async fn execute(&self, sql: &str) -> GatewayResult<()> {
        self.send(sql).await.map(|_| ())
    }
}

impl std::fmt::Debug for HttpGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpGateway")
            .field("query_url", &self.query_url)
            .field("database", &self.database)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

/// Decode the `data` array. Every element must be a JSON object.
fn decode_rows(data: Vec<JsonValue>) -> GatewayResult<Vec<Row>> {
    data.iter()
        .enumerate()
        .map(|(index, item)| match item {
            JsonValue::Object(_) => Ok(Row::from_json(item)),
            other => Err(GatewayError::invalid_response(format!(
                "row {} is not an object: {}",
                index, other
            ))),
        })
        .collect()
}

/// Operator-facing hint for common rejection texts.
pub fn operator_hint(message: &str) -> Option<&'static str> {
    let lower = message.to_lowercase();
    if lower.contains("column") && lower.contains("not found") {
        Some("HINT: schema mismatch; verify the table columns or re-run schema initialization")
    } else if lower.contains("table")
        && (lower.contains("not found") || lower.contains("does not exist"))
    {
        Some("HINT: table missing; initialize the database schema")
    } else if lower.contains("count") && lower.contains("syntax") {
        Some("HINT: this store build lacks COUNT; aggregate fallbacks should take over")
    } else {
        None
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pesa_core::{ConfigError, PesaError, Value};
    use std::time::Duration;

    #[test]
    fn test_request_wire_shape() {
        let body = serde_json::to_value(QueryRequest {
            sql: "SELECT * FROM users LIMIT 1",
            db: "pesa",
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({"sql": "SELECT * FROM users LIMIT 1", "db": "pesa"})
        );
    }

    #[test]
    fn test_response_defaults() {
        let parsed: QueryResponse = serde_json::from_str(r#"{"success": false}"#).unwrap();
        assert!(!parsed.success);
        assert!(parsed.data.is_none());
        assert!(parsed.error.is_none());
    }

    #[test]
    fn test_decode_rows_keeps_column_order() {
        let data: Vec<JsonValue> =
            serde_json::from_str(r#"[{"name": "Food", "id": "cat-food", "is_default": true}]"#)
                .unwrap();
        let rows = decode_rows(data).unwrap();
        assert_eq!(
            rows[0].column_names().collect::<Vec<_>>(),
            vec!["name", "id", "is_default"]
        );
        assert_eq!(rows[0].get("is_default"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_decode_rows_rejects_scalars() {
        let err = decode_rows(vec![serde_json::json!(5)]).unwrap_err();
        assert!(matches!(err, GatewayError::InvalidResponse { .. }));
    }

    #[test]
    fn test_operator_hints() {
        assert!(operator_hint("Column 'email' not found in table 'users'")
            .unwrap()
            .contains("schema mismatch"));
        assert!(operator_hint("Table 'budgets' does not exist")
            .unwrap()
            .contains("initialize"));
        assert!(operator_hint("syntax error near COUNT").unwrap().contains("COUNT"));
        assert!(operator_hint("duplicate key").is_none());
    }

    #[test]
    fn test_new_validates_and_redacts() {
        let config = StoreConfig::new("https://db.example.test/", "secret", "pesa")
            .with_timeout(Duration::from_secs(5));
        let gateway = HttpGateway::new(&config).unwrap();
        assert_eq!(gateway.database(), "pesa");
        let debug = format!("{:?}", gateway);
        assert!(debug.contains("https://db.example.test/query"));
        assert!(!debug.contains("secret"));

        let missing = StoreConfig::new("", "secret", "pesa");
        assert_eq!(
            HttpGateway::new(&missing).unwrap_err(),
            PesaError::Config(ConfigError::MissingRequired {
                field: "PESADB_API_URL".to_string()
            })
        );
    }
}
