//! # Warehouse Connections
//!
//! The seam between the ETL tasks and the analytical warehouse.
//!
//! ## Overview
//!
//! Tasks never talk to a driver directly. They ask a [`WarehouseConnector`] for a
//! connection once per execution and then issue statements through the
//! [`Warehouse`] trait:
//!
//! - `run` executes a statement and discards any result
//! - `query` returns every row as a vector of [`ScalarValue`]s
//!
//! Driver failures surface as [`WarehouseError`]; a query with no rows is an
//! empty vector, not an error.
//!
//! ## Implementations
//!
//! - [`PgWarehouse`] / [`PgConnector`] - Redshift (or any Postgres-wire
//!   warehouse) through SQLx, behind the `postgres` feature
//! - [`crate::test_helpers::RecordingWarehouse`] - in-memory, for tests

#[cfg(feature = "postgres")]
pub mod postgres;
pub mod scalar;

#[cfg(feature = "postgres")]
pub use postgres::{PgConnector, PgWarehouse};
pub use scalar::ScalarValue;

use crate::error::WarehouseError;
use async_trait::async_trait;

/// One result row, columns in select-list order.
pub type Row = Vec<ScalarValue>;

/// A live connection to the warehouse.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Execute a statement, ignoring any rows it produces
    async fn run(&self, statement: &str) -> Result<(), WarehouseError>;

    /// Execute a query and collect all rows
    async fn query(&self, statement: &str) -> Result<Vec<Row>, WarehouseError>;
}

/// Hands out warehouse connections.
///
/// Each task calls `connect` once at the start of `execute` and keeps the
/// connection for the rest of the execution, so every statement of a task
/// goes through the same session.
#[async_trait]
pub trait WarehouseConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn Warehouse>, WarehouseError>;
}
