//! # ETL Tasks
//!
//! Each task type is an independent struct implementing [`EtlTask`]. A task is
//! built once from an immutable spec and executed once; it opens its own
//! warehouse connection, issues its statements strictly in order, and reports
//! the first failure to the caller without retrying or rolling back.
//!
//! - [`TableCreationTask`] - run a `;`-separated DDL script
//! - [`StageLoadTask`] - bulk-copy JSON files from S3 into a staging table
//! - [`LoadTask`] - insert-select staged rows into a fact or dimension table
//! - [`crate::quality::DataQualityTask`] - non-empty and comparator checks

pub mod create_tables;
pub mod load;
pub mod stage;
pub mod state;

pub use create_tables::{split_statements, TableCreationTask};
pub use load::{LoadTarget, LoadTask, LoadTaskSpec};
pub use stage::{PartitionSource, StageLoadTask, StageTaskSpec};
pub use state::{InvalidTransition, TaskState};

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// What the caller hands to a task when it runs.
///
/// Tasks only read `execution_date`; the rest identifies the run in logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskContext {
    pub run_id: Uuid,
    pub pipeline: String,
    pub execution_date: Option<DateTime<Utc>>,
}

impl TaskContext {
    pub fn new(pipeline: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            pipeline: pipeline.into(),
            execution_date: None,
        }
    }

    pub fn with_execution_date(mut self, execution_date: DateTime<Utc>) -> Self {
        self.execution_date = Some(execution_date);
        self
    }

    pub fn execution_day(&self) -> Option<NaiveDate> {
        self.execution_date.map(|date| date.date_naive())
    }
}

impl Default for TaskContext {
    fn default() -> Self {
        Self::new("adhoc")
    }
}

/// Summary of a successful execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub task: String,
    pub statements_executed: usize,
    #[serde(default)]
    pub details: Value,
}

impl TaskOutcome {
    pub fn new(task: impl Into<String>, statements_executed: usize) -> Self {
        Self {
            task: task.into(),
            statements_executed,
            details: Value::Null,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }
}

/// The single entry point every task exposes to the orchestrator.
#[async_trait]
pub trait EtlTask: Send + Sync {
    /// Identifier used in logs and run reports
    fn name(&self) -> &str;

    /// Run the task to completion, or return the first error encountered
    async fn execute(&self, context: &TaskContext) -> Result<TaskOutcome>;
}
