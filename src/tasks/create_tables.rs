//! Runs a DDL script statement by statement.

use super::{EtlTask, TaskContext, TaskOutcome};
use crate::error::{EtlError, Result};
use crate::logging::log_task_operation;
use crate::warehouse::WarehouseConnector;
use async_trait::async_trait;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Split a script on `;`, trimming each statement and dropping blank ones
pub fn split_statements(script: &str) -> Vec<&str> {
    script
        .split(';')
        .map(str::trim)
        .filter(|statement| !statement.is_empty())
        .collect()
}

/// Ensures the warehouse schema exists.
///
/// Statements run serially and the first failure is returned as
/// [`EtlError::Schema`]; statements already applied stay applied. Re-running
/// is only idempotent if the DDL itself uses `IF NOT EXISTS` guards.
pub struct TableCreationTask {
    name: String,
    script: String,
    connector: Arc<dyn WarehouseConnector>,
}

impl TableCreationTask {
    pub fn new(
        name: impl Into<String>,
        script: impl Into<String>,
        connector: Arc<dyn WarehouseConnector>,
    ) -> Self {
        Self {
            name: name.into(),
            script: script.into(),
            connector,
        }
    }

    /// Read the script from a file up front
    pub fn from_file(
        name: impl Into<String>,
        path: &Path,
        connector: Arc<dyn WarehouseConnector>,
    ) -> Result<Self> {
        let script = std::fs::read_to_string(path).map_err(|e| {
            EtlError::config(format!(
                "Failed to read DDL script '{}': {e}",
                path.display()
            ))
        })?;
        Ok(Self::new(name, script, connector))
    }

    pub fn statements(&self) -> Vec<&str> {
        split_statements(&self.script)
    }
}

#[async_trait]
impl EtlTask for TableCreationTask {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self, context), fields(task = %self.name, run_id = %context.run_id))]
    async fn execute(&self, context: &TaskContext) -> Result<TaskOutcome> {
        let statements = self.statements();
        info!(statements = statements.len(), "Creating tables");

        if statements.is_empty() {
            return Ok(TaskOutcome::new(&self.name, 0));
        }

        let warehouse = self.connector.connect().await?;

        for (index, statement) in statements.iter().enumerate() {
            debug!(statement_index = index + 1, "Running DDL statement");
            warehouse
                .run(statement)
                .await
                .map_err(|source| EtlError::Schema {
                    statement_index: index + 1,
                    statement: summarize(statement),
                    source,
                })?;
        }

        log_task_operation(
            "create_tables",
            &self.name,
            "completed",
            Some(&format!("{} statements", statements.len())),
        );

        Ok(TaskOutcome::new(&self.name, statements.len())
            .with_details(json!({ "statements": statements.len() })))
    }
}

/// First line of a statement, for error messages
fn summarize(statement: &str) -> String {
    const MAX_LEN: usize = 80;
    let first_line = statement.lines().next().unwrap_or_default().trim();
    if first_line.len() > MAX_LEN {
        let cut = (0..=MAX_LEN)
            .rev()
            .find(|&i| first_line.is_char_boundary(i))
            .unwrap_or(0);
        format!("{}...", &first_line[..cut])
    } else {
        first_line.to_string()
    }
}
