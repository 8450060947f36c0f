//! Store connection contract and per-call session scoping.
//!
//! Repositories never hold a connection between calls. Each operation
//! acquires a connection, opens a working session on a named database,
//! runs its statements, and drops a [`SessionScope`] which closes both.

use async_trait::async_trait;
use serde_json::Value;

use trellis_core::{DataError, ErrorKind, PropertyMap};

/// One row returned by the store, keyed by column name.
pub type Record = serde_json::Map<String, Value>;

/// Errors raised by a store backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Neo4j connection error: {0}")]
    Connection(String),

    #[error("Neo4j rejected credentials: {0}")]
    Unauthorized(String),

    #[error("Neo4j query error: {0}")]
    Query(#[from] neo4rs::Error),

    #[error("Statement rejected: {0}")]
    Rejected(String),

    #[error("Failed to decode row: {0}")]
    Decode(String),
}

/// A Cypher statement plus its named parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    text: String,
    params: serde_json::Map<String, Value>,
}

impl Statement {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            params: serde_json::Map::new(),
        }
    }

    /// Bind a named parameter (`$key` in the statement text).
    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn params_from(mut self, params: impl IntoIterator<Item = (String, Value)>) -> Self {
        self.params.extend(params);
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn params(&self) -> &serde_json::Map<String, Value> {
        &self.params
    }
}

/// Entry point of a store backend.
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn acquire(&self) -> Result<Box<dyn StoreConnection>, StoreError>;
}

/// A physical connection to the store.
#[async_trait]
pub trait StoreConnection: Send {
    async fn open_session(&mut self, database: &str)
        -> Result<Box<dyn WorkingSession>, StoreError>;

    /// Release the connection. Must be idempotent.
    fn close(&mut self);
}

/// A logical working session scoped to one database.
#[async_trait]
pub trait WorkingSession: Send {
    async fn run(&mut self, statement: Statement) -> Result<Vec<Record>, StoreError>;

    /// Release the session. Must be idempotent.
    fn close(&mut self);
}

/// An acquired connection plus an open working session, released on drop.
pub struct SessionScope {
    session: Box<dyn WorkingSession>,
    connection: Box<dyn StoreConnection>,
}

impl SessionScope {
    /// Acquire a connection and open a session on `database`.
    ///
    /// If opening the session fails, the connection is closed before the
    /// error is returned.
    pub async fn open(store: &dyn GraphStore, database: &str) -> Result<Self, DataError> {
        let mut connection = store.acquire().await.map_err(connection_error)?;
        match connection.open_session(database).await {
            Ok(session) => Ok(Self {
                session,
                connection,
            }),
            Err(e) => {
                connection.close();
                Err(connection_error(e))
            }
        }
    }

    /// Borrow the working session, e.g. to thread it into a nested read.
    pub fn session(&mut self) -> &mut dyn WorkingSession {
        &mut *self.session
    }

    pub async fn run(&mut self, statement: Statement) -> Result<Vec<Record>, StoreError> {
        self.session.run(statement).await
    }
}

impl Drop for SessionScope {
    fn drop(&mut self) {
        self.session.close();
        self.connection.close();
    }
}

/// Classify a failure to acquire a connection or open a session.
fn connection_error(e: StoreError) -> DataError {
    let kind = match e {
        StoreError::Unauthorized(_) => ErrorKind::DbConnectionUnauthorized,
        _ => ErrorKind::DbConnectionFailed,
    };
    DataError::new(kind, "could not open a session on the graph store").with_source(e)
}

// ── Row Helpers ──────────────────────────────────────────────────

/// Extract the property map projected into `column`.
pub fn property_map(record: &Record, column: &str) -> Result<PropertyMap, StoreError> {
    match record.get(column) {
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(other) => Err(StoreError::Decode(format!(
            "column `{column}` is not a map: {other}"
        ))),
        None => Err(StoreError::Decode(format!("column `{column}` missing"))),
    }
}

/// Read an integer counter column from the first row, defaulting to 0.
pub fn counter(records: &[Record], column: &str) -> i64 {
    records
        .first()
        .and_then(|r| r.get(column))
        .and_then(Value::as_i64)
        .unwrap_or(0)
}
