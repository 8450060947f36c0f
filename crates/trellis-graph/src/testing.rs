//! Scripted in-memory [`GraphStore`] for unit tests.
//!
//! Responses are queued in the order statements will run. An empty queue
//! answers with zero rows. Every acquisition and release is counted so
//! tests can assert that nothing leaks.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::store::{GraphStore, Record, Statement, StoreConnection, StoreError, WorkingSession};

/// A statement the mock received, with the database it ran on.
#[derive(Debug, Clone)]
pub struct Executed {
    pub database: String,
    pub statement: Statement,
}

#[derive(Default)]
struct MockState {
    responses: VecDeque<Result<Vec<Record>, StoreError>>,
    executed: Vec<Executed>,
    acquire_failure: Option<StoreError>,
    open_session_failure: Option<StoreError>,
    connections_opened: usize,
    connections_closed: usize,
    sessions_opened: usize,
    sessions_closed: usize,
}

#[derive(Clone, Default)]
pub struct MockStore {
    state: Arc<Mutex<MockState>>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// A row holding one projected node under the `node` column.
    pub fn node_record(node: Value) -> Record {
        let mut record = Record::new();
        record.insert("node".to_string(), node);
        record
    }

    /// Build a record from a JSON object literal.
    pub fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            other => panic!("mock record must be a JSON object, got {other}"),
        }
    }

    /// Queue the rows for the next statement.
    pub fn respond(&self, records: Vec<Record>) {
        self.state().responses.push_back(Ok(records));
    }

    /// Queue a single row projecting `node`.
    pub fn respond_node(&self, node: Value) {
        self.respond(vec![Self::node_record(node)]);
    }

    /// Queue a single counter row, e.g. `{"deleted": 1}`.
    pub fn respond_count(&self, column: &str, count: i64) {
        let mut record = Record::new();
        record.insert(column.to_string(), json!(count));
        self.respond(vec![record]);
    }

    /// Make the next statement fail.
    pub fn fail_next(&self, error: StoreError) {
        self.state().responses.push_back(Err(error));
    }

    /// Make the next acquisition fail.
    pub fn fail_acquire(&self, error: StoreError) {
        self.state().acquire_failure = Some(error);
    }

    /// Make the next `open_session` fail after the connection is acquired.
    pub fn fail_open_session(&self, error: StoreError) {
        self.state().open_session_failure = Some(error);
    }

    pub fn executed(&self) -> Vec<Executed> {
        self.state().executed.clone()
    }

    /// Number of connections handed out so far.
    pub fn acquisitions(&self) -> usize {
        self.state().connections_opened
    }

    /// Panic unless every connection and session handed out was closed.
    pub fn assert_released(&self) {
        let state = self.state();
        assert_eq!(
            state.connections_opened, state.connections_closed,
            "leaked connection"
        );
        assert_eq!(state.sessions_opened, state.sessions_closed, "leaked session");
    }
}

#[async_trait]
impl GraphStore for MockStore {
    async fn acquire(&self) -> Result<Box<dyn StoreConnection>, StoreError> {
        let mut state = self.state();
        if let Some(error) = state.acquire_failure.take() {
            return Err(error);
        }
        state.connections_opened += 1;
        Ok(Box::new(MockConnection {
            store: self.clone(),
            closed: false,
        }))
    }
}

struct MockConnection {
    store: MockStore,
    closed: bool,
}

#[async_trait]
impl StoreConnection for MockConnection {
    async fn open_session(
        &mut self,
        database: &str,
    ) -> Result<Box<dyn WorkingSession>, StoreError> {
        let mut state = self.store.state();
        if let Some(error) = state.open_session_failure.take() {
            return Err(error);
        }
        state.sessions_opened += 1;
        drop(state);
        Ok(Box::new(MockSession {
            store: self.store.clone(),
            database: database.to_string(),
            closed: false,
        }))
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.store.state().connections_closed += 1;
        }
    }
}

struct MockSession {
    store: MockStore,
    database: String,
    closed: bool,
}

#[async_trait]
impl WorkingSession for MockSession {
    async fn run(&mut self, statement: Statement) -> Result<Vec<Record>, StoreError> {
        let mut state = self.store.state();
        state.executed.push(Executed {
            database: self.database.clone(),
            statement,
        });
        state.responses.pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.store.state().sessions_closed += 1;
        }
    }
}
