//! Insert-select loads from staging into fact and dimension tables.

use super::{EtlTask, TaskContext, TaskOutcome};
use crate::error::{EtlError, Result};
use crate::logging::log_task_operation;
use crate::validation::validate_table_name;
use crate::warehouse::WarehouseConnector;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use tracing::{info, instrument};

/// What kind of star-schema table a load writes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadTarget {
    Fact,
    Dimension,
}

impl fmt::Display for LoadTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fact => write!(f, "fact"),
            Self::Dimension => write!(f, "dimension"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadTaskSpec {
    pub table: String,
    /// Body of the insert, typically `SELECT ... FROM staging_...`
    pub select_sql: String,
    pub truncate: bool,
}

impl LoadTaskSpec {
    pub fn new(table: impl Into<String>, select_sql: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            select_sql: select_sql.into(),
            truncate: false,
        }
    }

    pub fn with_truncate(mut self, truncate: bool) -> Self {
        self.truncate = truncate;
        self
    }

    /// `INSERT INTO <table> <select>` with any trailing `;` removed
    pub fn insert_statement(&self) -> String {
        let select = self.select_sql.trim().trim_end_matches(';').trim_end();
        format!("INSERT INTO {} {select}", self.table)
    }
}

/// Appends staged rows to a fact or dimension table, optionally truncating
/// it first. No merge semantics: every run is append or truncate+append.
pub struct LoadTask {
    name: String,
    target: LoadTarget,
    spec: LoadTaskSpec,
    connector: Arc<dyn WarehouseConnector>,
}

impl LoadTask {
    pub fn new(
        name: impl Into<String>,
        target: LoadTarget,
        spec: LoadTaskSpec,
        connector: Arc<dyn WarehouseConnector>,
    ) -> Self {
        Self {
            name: name.into(),
            target,
            spec,
            connector,
        }
    }

    pub fn fact(
        name: impl Into<String>,
        spec: LoadTaskSpec,
        connector: Arc<dyn WarehouseConnector>,
    ) -> Self {
        Self::new(name, LoadTarget::Fact, spec, connector)
    }

    pub fn dimension(
        name: impl Into<String>,
        spec: LoadTaskSpec,
        connector: Arc<dyn WarehouseConnector>,
    ) -> Self {
        Self::new(name, LoadTarget::Dimension, spec, connector)
    }

    pub fn target(&self) -> LoadTarget {
        self.target
    }

    pub fn spec(&self) -> &LoadTaskSpec {
        &self.spec
    }
}

#[async_trait]
impl EtlTask for LoadTask {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self, context), fields(task = %self.name, target = %self.target, table = %self.spec.table, run_id = %context.run_id))]
    async fn execute(&self, context: &TaskContext) -> Result<TaskOutcome> {
        let table = &self.spec.table;
        validate_table_name(table)?;
        if self.spec.select_sql.trim().is_empty() {
            return Err(EtlError::config(format!(
                "Load into {table} has an empty select statement"
            )));
        }

        let warehouse = self
            .connector
            .connect()
            .await
            .map_err(|e| EtlError::load(table, format!("connection failed: {e}")))?;

        let mut statements = 0;
        if self.spec.truncate {
            info!("Truncating {} table", self.target);
            warehouse
                .run(&format!("TRUNCATE {table}"))
                .await
                .map_err(|e| EtlError::load(table, format!("truncate failed: {e}")))?;
            statements += 1;
        }

        warehouse
            .run(&self.spec.insert_statement())
            .await
            .map_err(|e| EtlError::load(table, format!("insert failed: {e}")))?;
        statements += 1;

        log_task_operation(
            "load",
            &self.name,
            "completed",
            Some(&format!("{} table {table}", self.target)),
        );

        Ok(TaskOutcome::new(&self.name, statements).with_details(json!({
            "table": table,
            "target": self.target,
            "truncated": self.spec.truncate,
        })))
    }
}
