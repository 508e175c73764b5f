//! # Test Helpers
//!
//! An in-memory warehouse that records every statement it receives and
//! answers queries from scripted results. Used by unit and integration tests
//! so task behaviour can be checked without a live cluster.

use crate::error::WarehouseError;
use crate::warehouse::{Row, ScalarValue, Warehouse, WarehouseConnector};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Run,
    Query,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedStatement {
    /// Which `connect()` call the statement went through, starting at 1
    pub connection: usize,
    pub kind: StatementKind,
    pub sql: String,
}

#[derive(Debug, Default)]
struct RecordingState {
    statements: Vec<RecordedStatement>,
    query_results: Vec<(String, Vec<Row>)>,
    failures: Vec<(String, String)>,
    connect_failure: Option<String>,
    connections: usize,
}

/// Recording warehouse and connector in one; clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct RecordingWarehouse {
    state: Arc<Mutex<RecordingState>>,
}

impl RecordingWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `sql` (compared with whitespace collapsed) with `rows`
    pub fn with_query_result(self, sql: &str, rows: Vec<Row>) -> Self {
        self.state
            .lock()
            .query_results
            .push((normalize(sql), rows));
        self
    }

    /// Answer `sql` with a single one-column row
    pub fn with_scalar(self, sql: &str, value: impl Into<ScalarValue>) -> Self {
        self.with_query_result(sql, vec![vec![value.into()]])
    }

    /// Fail any statement containing `fragment`
    pub fn fail_on(self, fragment: &str, message: &str) -> Self {
        self.state
            .lock()
            .failures
            .push((fragment.to_string(), message.to_string()));
        self
    }

    pub fn fail_connections(self, message: &str) -> Self {
        self.state.lock().connect_failure = Some(message.to_string());
        self
    }

    pub fn recorded(&self) -> Vec<RecordedStatement> {
        self.state.lock().statements.clone()
    }

    /// Every statement text, in the order received
    pub fn statements(&self) -> Vec<String> {
        self.state
            .lock()
            .statements
            .iter()
            .map(|statement| statement.sql.clone())
            .collect()
    }

    pub fn connection_count(&self) -> usize {
        self.state.lock().connections
    }

    fn record(
        &self,
        connection: usize,
        kind: StatementKind,
        sql: &str,
    ) -> Result<(), WarehouseError> {
        let mut state = self.state.lock();
        state.statements.push(RecordedStatement {
            connection,
            kind,
            sql: sql.to_string(),
        });

        match state
            .failures
            .iter()
            .find(|(fragment, _)| sql.contains(fragment.as_str()))
        {
            Some((_, message)) => Err(WarehouseError::statement(message.clone())),
            None => Ok(()),
        }
    }

    fn scripted_rows(&self, sql: &str) -> Vec<Row> {
        let key = normalize(sql);
        self.state
            .lock()
            .query_results
            .iter()
            .find(|(scripted, _)| *scripted == key)
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default()
    }
}

fn normalize(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[async_trait]
impl WarehouseConnector for RecordingWarehouse {
    async fn connect(&self) -> Result<Box<dyn Warehouse>, WarehouseError> {
        let mut state = self.state.lock();
        if let Some(message) = &state.connect_failure {
            return Err(WarehouseError::connection(message.clone()));
        }
        state.connections += 1;

        Ok(Box::new(RecordingConnection {
            id: state.connections,
            warehouse: self.clone(),
        }))
    }
}

/// One session handed out by [`RecordingWarehouse::connect`]
pub struct RecordingConnection {
    id: usize,
    warehouse: RecordingWarehouse,
}

#[async_trait]
impl Warehouse for RecordingConnection {
    async fn run(&self, statement: &str) -> Result<(), WarehouseError> {
        self.warehouse.record(self.id, StatementKind::Run, statement)
    }

    async fn query(&self, statement: &str) -> Result<Vec<Row>, WarehouseError> {
        self.warehouse
            .record(self.id, StatementKind::Query, statement)?;
        Ok(self.warehouse.scripted_rows(statement))
    }
}
