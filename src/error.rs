//! # Error Types
//!
//! Structured errors for the ETL tasks. Every task surfaces its failure to the
//! caller immediately; nothing here is retried or swallowed.

use crate::quality::Comparator;
use crate::tasks::InvalidTransition;
use crate::warehouse::ScalarValue;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EtlError {
    #[error("Schema error: statement {statement_index} failed ({statement}): {source}")]
    Schema {
        statement_index: usize,
        statement: String,
        #[source]
        source: WarehouseError,
    },

    #[error("Load error for table {table}: {message}")]
    Load { table: String, message: String },

    #[error("Data quality check failed: {0}")]
    DataQuality(#[from] QualityFailure),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Warehouse error: {0}")]
    Warehouse(#[from] WarehouseError),

    #[error("Credential error: {0}")]
    Credentials(String),

    #[error("State transition error: {0}")]
    StateTransition(#[from] InvalidTransition),
}

impl EtlError {
    pub fn load(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Load {
            table: table.into(),
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Short stable code for log records and run reports
    pub fn code(&self) -> &'static str {
        match self {
            Self::Schema { .. } => "SCHEMA_ERROR",
            Self::Load { .. } => "LOAD_ERROR",
            Self::DataQuality(_) => "DATA_QUALITY_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Warehouse(_) => "WAREHOUSE_ERROR",
            Self::Credentials(_) => "CREDENTIAL_ERROR",
            Self::StateTransition(_) => "STATE_TRANSITION_ERROR",
        }
    }
}

/// Errors raised by the warehouse connection itself.
///
/// Kept separate from empty-result conditions: a query that succeeds with no
/// rows is `Ok(vec![])`, never one of these.
#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error("Connection error: {message}")]
    Connection { message: String },

    #[error("Statement failed: {message}")]
    Statement { message: String },

    #[error("Unsupported column type '{type_name}' at position {ordinal}")]
    UnsupportedType { ordinal: usize, type_name: String },
}

impl WarehouseError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub fn statement(message: impl Into<String>) -> Self {
        Self::Statement {
            message: message.into(),
        }
    }
}

impl From<sqlx::Error> for WarehouseError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
            | sqlx::Error::Configuration(_) => Self::connection(error.to_string()),
            other => Self::statement(other.to_string()),
        }
    }
}

/// Why a data quality check did not pass.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QualityFailure {
    #[error("{table} returned no results")]
    EmptyResult { table: String },

    #[error("{table} returned an empty row")]
    EmptyRow { table: String },

    #[error("{table} contained {count} rows")]
    InsufficientRows { table: String, count: i64 },

    #[error("{table} returned a non-numeric count: {observed}")]
    NonNumericCount { table: String, observed: ScalarValue },

    #[error("check {index} ({sql}) returned no value")]
    NoValue { index: usize, sql: String },

    #[error(
        "check {index} ({sql}) expected observed {comparator} {expected}, observed {observed}"
    )]
    ComparisonFailed {
        index: usize,
        sql: String,
        observed: ScalarValue,
        expected: ScalarValue,
        comparator: Comparator,
    },

    #[error("check {index} ({sql}) cannot compare {observed} with {expected}")]
    Incomparable {
        index: usize,
        sql: String,
        observed: ScalarValue,
        expected: ScalarValue,
    },
}

pub type Result<T> = std::result::Result<T, EtlError>;
