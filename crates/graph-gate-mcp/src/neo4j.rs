// crates/graph-gate-mcp/src/neo4j.rs
// ============================================================================
// Module: Neo4j Backend
// Description: neo4rs-backed implementation of the graph backend trait.
// Purpose: Run verification and tool queries with per-caller sessions.
// Dependencies: neo4rs, serde_json, tokio
// ============================================================================

//! ## Overview
//! Each call builds a fresh single-connection [`Graph`] from the caller's
//! credentials, so no session is shared between callers. Read queries run in
//! a transaction that is rolled back; write queries commit.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use graph_gate_config::BackendConfig;
use neo4rs::BoltBoolean;
use neo4rs::BoltFloat;
use neo4rs::BoltInteger;
use neo4rs::BoltList;
use neo4rs::BoltMap;
use neo4rs::BoltNull;
use neo4rs::BoltString;
use neo4rs::BoltType;
use neo4rs::ConfigBuilder;
use neo4rs::Graph;
use neo4rs::query;
use serde_json::Map;
use serde_json::Value;

use crate::backend::AccessMode;
use crate::backend::BackendCredentials;
use crate::backend::BackendError;
use crate::backend::GraphBackend;
use crate::backend::Row;

// ============================================================================
// SECTION: Backend
// ============================================================================

/// Neo4j backend reached over Bolt.
#[derive(Debug, Clone)]
pub struct Neo4jBackend {
    /// Bolt URI.
    uri: String,
    /// Target database; server default when `None`.
    database: Option<String>,
    /// Bound on opening a session.
    connect_timeout: Duration,
    /// Bound on one query including row streaming.
    query_timeout: Duration,
    /// Rows read before the stream is abandoned.
    row_limit: usize,
}

impl Neo4jBackend {
    /// Builds the backend from configuration.
    #[must_use]
    pub fn from_config(config: &BackendConfig) -> Self {
        Self {
            uri: config.uri.clone(),
            database: config.database.clone(),
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            query_timeout: Duration::from_millis(config.query_timeout_ms),
            row_limit: config.max_rows.saturating_add(1),
        }
    }

    async fn connect(&self, credentials: &BackendCredentials) -> Result<Graph, BackendError> {
        let mut builder = ConfigBuilder::default()
            .uri(self.uri.as_str())
            .user(credentials.username.as_str())
            .password(credentials.password())
            .max_connections(1);
        if let Some(database) = &self.database {
            builder = builder.db(database.as_str());
        }
        let config = builder.build().map_err(|err| BackendError::Unavailable(err.to_string()))?;
        tokio::time::timeout(self.connect_timeout, Graph::connect(config))
            .await
            .map_err(|_| BackendError::Timeout)?
            .map_err(map_neo4j_error)
    }

    async fn execute(
        &self,
        graph: &Graph,
        cypher: &str,
        params: Map<String, Value>,
        mode: AccessMode,
    ) -> Result<Vec<Row>, BackendError> {
        let mut statement = query(cypher);
        for (key, value) in &params {
            statement = statement.param(key.as_str(), json_to_bolt(value));
        }
        let mut txn = graph.start_txn().await.map_err(map_neo4j_error)?;
        let mut stream = txn.execute(statement).await.map_err(map_neo4j_error)?;
        let mut rows = Vec::new();
        while rows.len() < self.row_limit {
            let Some(row) = stream.next(txn.handle()).await.map_err(map_neo4j_error)? else {
                break;
            };
            let row: Row = row.to().map_err(|err| BackendError::Query(err.to_string()))?;
            rows.push(row);
        }
        match mode {
            AccessMode::Read => txn.rollback().await.map_err(map_neo4j_error)?,
            AccessMode::Write => txn.commit().await.map_err(map_neo4j_error)?,
        }
        Ok(rows)
    }
}

#[async_trait]
impl GraphBackend for Neo4jBackend {
    async fn verify_connectivity(&self, credentials: &BackendCredentials) -> Result<(), BackendError> {
        let graph = self.connect(credentials).await?;
        tokio::time::timeout(self.query_timeout, graph.run(query("RETURN 1")))
            .await
            .map_err(|_| BackendError::Timeout)?
            .map_err(map_neo4j_error)
    }

    async fn run_query(
        &self,
        credentials: &BackendCredentials,
        cypher: &str,
        params: Map<String, Value>,
        mode: AccessMode,
    ) -> Result<Vec<Row>, BackendError> {
        let graph = self.connect(credentials).await?;
        tokio::time::timeout(self.query_timeout, self.execute(&graph, cypher, params, mode))
            .await
            .map_err(|_| BackendError::Timeout)?
    }
}

// ============================================================================
// SECTION: Conversion
// ============================================================================

/// Converts a JSON parameter value into a Bolt value.
#[must_use]
pub fn json_to_bolt(value: &Value) -> BoltType {
    match value {
        Value::Null => BoltType::Null(BoltNull),
        Value::Bool(flag) => BoltType::Boolean(BoltBoolean::new(*flag)),
        Value::Number(number) => match number.as_i64() {
            Some(integer) => BoltType::Integer(BoltInteger::new(integer)),
            None => BoltType::Float(BoltFloat::new(number.as_f64().unwrap_or_default())),
        },
        Value::String(text) => BoltType::String(BoltString::new(text)),
        Value::Array(items) => {
            let mut list = BoltList::new();
            for item in items {
                list.push(json_to_bolt(item));
            }
            BoltType::List(list)
        }
        Value::Object(entries) => {
            let mut map = BoltMap::new();
            for (key, item) in entries {
                map.put(BoltString::new(key), json_to_bolt(item));
            }
            BoltType::Map(map)
        }
    }
}

/// Maps driver errors onto backend errors.
fn map_neo4j_error(err: neo4rs::Error) -> BackendError {
    match err {
        neo4rs::Error::AuthenticationError(message) => BackendError::Unauthorized(message),
        neo4rs::Error::IOError {
            ..
        }
        | neo4rs::Error::ConnectionError => BackendError::Unavailable(err.to_string()),
        other => {
            let message = other.to_string();
            if message.contains("Security.Unauthorized") {
                BackendError::Unauthorized(message)
            } else {
                BackendError::Query(message)
            }
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn scalars_convert_to_bolt() {
        assert_eq!(json_to_bolt(&json!(7)), BoltType::Integer(BoltInteger::new(7)));
        assert_eq!(json_to_bolt(&json!(1.5)), BoltType::Float(BoltFloat::new(1.5)));
        assert_eq!(json_to_bolt(&json!("a")), BoltType::String(BoltString::new("a")));
        assert_eq!(json_to_bolt(&json!(true)), BoltType::Boolean(BoltBoolean::new(true)));
        assert_eq!(json_to_bolt(&Value::Null), BoltType::Null(BoltNull));
    }

    #[test]
    fn nested_values_convert_to_bolt() {
        let mut ids = BoltList::new();
        ids.push(BoltType::Integer(BoltInteger::new(1)));
        ids.push(BoltType::Integer(BoltInteger::new(2)));
        let mut expected = BoltMap::new();
        expected.put(BoltString::new("ids"), BoltType::List(ids));
        expected.put(BoltString::new("name"), BoltType::String(BoltString::new("n")));
        assert_eq!(json_to_bolt(&json!({"ids": [1, 2], "name": "n"})), BoltType::Map(expected));
    }

    #[test]
    fn row_limit_reads_one_past_max_rows() {
        let backend = Neo4jBackend::from_config(&BackendConfig {
            max_rows: 10,
            ..BackendConfig::default()
        });
        assert_eq!(backend.row_limit, 11);
    }
}
