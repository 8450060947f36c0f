//! Neo4j connection management: the neo4rs-backed [`GraphStore`].

use async_trait::async_trait;
use neo4rs::{query, BoltNull, BoltType, ConfigBuilder, Graph, Query};
use serde_json::Value;

use trellis_core::config::GraphConfig;

use crate::store::{GraphStore, Record, Statement, StoreConnection, StoreError, WorkingSession};

/// Database the connection check runs against.
const PING_DATABASE: &str = "system";

/// Thread-safe Neo4j client.
///
/// The underlying `Graph` pools Bolt connections; each `acquire` hands out
/// a handle onto that pool which is released when closed.
/// Clone is cheap (inner Arc).
#[derive(Clone)]
pub struct GraphClient {
    graph: Graph,
}

impl GraphClient {
    /// Connect to Neo4j and verify the credentials with a round trip.
    ///
    /// The round trip runs on the `system` database so that a client can be
    /// built before its configured database is created.
    pub async fn connect(config: &GraphConfig) -> Result<Self, StoreError> {
        let neo_config = ConfigBuilder::default()
            .uri(&config.uri)
            .user(&config.user)
            .password(&config.password)
            .db(config.database.as_str())
            .max_connections(config.max_connections as usize)
            .fetch_size(config.fetch_size)
            .build()
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let graph = Graph::connect(neo_config).await.map_err(classify)?;
        graph
            .run_on(PING_DATABASE, query("RETURN 1"))
            .await
            .map_err(classify)?;

        tracing::info!(uri = %config.uri, database = %config.database, "Connected to Neo4j");
        Ok(Self { graph })
    }

    /// Get a reference to the underlying neo4rs Graph for direct operations.
    pub fn inner(&self) -> &Graph {
        &self.graph
    }
}

#[async_trait]
impl GraphStore for GraphClient {
    async fn acquire(&self) -> Result<Box<dyn StoreConnection>, StoreError> {
        Ok(Box::new(Neo4jConnection {
            graph: Some(self.graph.clone()),
        }))
    }
}

struct Neo4jConnection {
    graph: Option<Graph>,
}

#[async_trait]
impl StoreConnection for Neo4jConnection {
    async fn open_session(
        &mut self,
        database: &str,
    ) -> Result<Box<dyn WorkingSession>, StoreError> {
        let graph = self
            .graph
            .clone()
            .ok_or_else(|| StoreError::Connection("connection already closed".to_string()))?;
        tracing::trace!(database, "Opened working session");
        Ok(Box::new(Neo4jSession {
            graph: Some(graph),
            database: database.to_string(),
        }))
    }

    fn close(&mut self) {
        self.graph.take();
    }
}

/// A logical working session. Each `run` checks a connection out of the
/// pool, so consecutive statements may use different Bolt connections.
struct Neo4jSession {
    graph: Option<Graph>,
    database: String,
}

#[async_trait]
impl WorkingSession for Neo4jSession {
    async fn run(&mut self, statement: Statement) -> Result<Vec<Record>, StoreError> {
        let graph = self
            .graph
            .as_ref()
            .ok_or_else(|| StoreError::Connection("session already closed".to_string()))?;

        tracing::debug!(database = %self.database, cypher = %statement.text(), "Running statement");
        let mut stream = graph
            .execute_on(self.database.as_str(), to_query(&statement))
            .await?;

        let mut rows = Vec::new();
        while let Some(row) = stream.next().await? {
            let record: Record = row
                .to()
                .map_err(|e| StoreError::Decode(e.to_string()))?;
            rows.push(record);
        }
        Ok(rows)
    }

    fn close(&mut self) {
        if self.graph.take().is_some() {
            tracing::trace!(database = %self.database, "Closed working session");
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────

/// Separate rejected credentials from other connection failures.
fn classify(e: neo4rs::Error) -> StoreError {
    match e {
        neo4rs::Error::AuthenticationError(message) => StoreError::Unauthorized(message),
        other => StoreError::Connection(other.to_string()),
    }
}

fn to_query(statement: &Statement) -> Query {
    statement
        .params()
        .iter()
        .fold(query(statement.text()), |q, (key, value)| {
            q.param(key, to_bolt(value))
        })
}

fn to_bolt(value: &Value) -> BoltType {
    match value {
        Value::Null => BoltType::Null(BoltNull),
        Value::Bool(b) => (*b).into(),
        Value::Number(n) => match n.as_i64() {
            Some(i) => i.into(),
            None => n.as_f64().unwrap_or_default().into(),
        },
        Value::String(s) => s.clone().into(),
        Value::Array(items) if items.iter().all(Value::is_string) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect::<Vec<_>>()
            .into(),
        // Nested maps and mixed lists are stored as JSON text.
        other => other.to_string().into(),
    }
}
