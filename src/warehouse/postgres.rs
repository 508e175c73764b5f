//! Postgres-wire warehouse connection (Redshift) backed by SQLx.
//!
//! Statements go over the simple query protocol via `sqlx::raw_sql`, which is
//! what Redshift expects for `COPY` and multi-keyword DDL.

use super::{Row, ScalarValue, Warehouse, WarehouseConnector};
use crate::config::WarehouseConfig;
use crate::error::WarehouseError;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::postgres::{PgConnection, PgRow};
use sqlx::{Column, Connection, Executor, Row as _, TypeInfo, ValueRef};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, instrument};

/// A single dedicated warehouse session.
pub struct PgWarehouse {
    connection: Mutex<PgConnection>,
}

impl PgWarehouse {
    pub async fn connect(url: &str, connect_timeout: Duration) -> Result<Self, WarehouseError> {
        let connection = tokio::time::timeout(connect_timeout, PgConnection::connect(url))
            .await
            .map_err(|_| {
                WarehouseError::connection(format!(
                    "timed out after {}s connecting to warehouse",
                    connect_timeout.as_secs()
                ))
            })??;

        Ok(Self {
            connection: Mutex::new(connection),
        })
    }

    pub async fn health_check(&self) -> Result<bool, WarehouseError> {
        let rows = self.query("SELECT 1").await?;
        Ok(rows
            .first()
            .and_then(|row| row.first())
            .and_then(ScalarValue::as_i64)
            == Some(1))
    }

    pub async fn close(self) -> Result<(), WarehouseError> {
        self.connection.into_inner().close().await?;
        Ok(())
    }
}

#[async_trait]
impl Warehouse for PgWarehouse {
    async fn run(&self, statement: &str) -> Result<(), WarehouseError> {
        let start = Instant::now();
        let mut connection = self.connection.lock().await;
        let result = Executor::execute(&mut *connection, sqlx::raw_sql(statement)).await?;

        debug!(
            rows_affected = result.rows_affected(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Statement executed"
        );
        Ok(())
    }

    async fn query(&self, statement: &str) -> Result<Vec<Row>, WarehouseError> {
        let start = Instant::now();
        let mut connection = self.connection.lock().await;
        let rows = Executor::fetch_all(&mut *connection, sqlx::raw_sql(statement)).await?;

        debug!(
            rows = rows.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Query executed"
        );
        rows.iter().map(decode_row).collect()
    }
}

fn decode_row(row: &PgRow) -> Result<Row, WarehouseError> {
    row.columns()
        .iter()
        .map(|column| decode_column(row, column.ordinal()))
        .collect()
}

fn decode_column(row: &PgRow, ordinal: usize) -> Result<ScalarValue, WarehouseError> {
    let raw = row.try_get_raw(ordinal)?;
    if raw.is_null() {
        return Ok(ScalarValue::Null);
    }
    let type_name = raw.type_info().name().to_string();

    let value = match type_name.as_str() {
        "INT2" => ScalarValue::Integer(i64::from(row.try_get::<i16, _>(ordinal)?)),
        "INT4" => ScalarValue::Integer(i64::from(row.try_get::<i32, _>(ordinal)?)),
        "INT8" => ScalarValue::Integer(row.try_get::<i64, _>(ordinal)?),
        "FLOAT4" => ScalarValue::Float(f64::from(row.try_get::<f32, _>(ordinal)?)),
        "FLOAT8" => ScalarValue::Float(row.try_get::<f64, _>(ordinal)?),
        "BOOL" => ScalarValue::Boolean(row.try_get::<bool, _>(ordinal)?),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => {
            ScalarValue::Text(row.try_get::<String, _>(ordinal)?)
        }
        // Simple-protocol results arrive in text format
        "NUMERIC" => {
            let text = row.try_get_unchecked::<String, _>(ordinal)?;
            numeric_from_text(ordinal, &text)?
        }
        "TIMESTAMP" => ScalarValue::Timestamp(row.try_get::<NaiveDateTime, _>(ordinal)?),
        "TIMESTAMPTZ" => {
            ScalarValue::Timestamp(row.try_get::<DateTime<Utc>, _>(ordinal)?.naive_utc())
        }
        "DATE" => {
            let date = row.try_get::<NaiveDate, _>(ordinal)?;
            ScalarValue::Timestamp(date.and_time(NaiveTime::MIN))
        }
        _ => {
            return Err(WarehouseError::UnsupportedType {
                ordinal,
                type_name,
            })
        }
    };
    Ok(value)
}

/// Whole NUMERIC values become integers, everything else a float
fn numeric_from_text(ordinal: usize, text: &str) -> Result<ScalarValue, WarehouseError> {
    let text = text.trim();
    if let Ok(value) = text.parse::<i64>() {
        return Ok(ScalarValue::Integer(value));
    }
    let value = text.parse::<f64>().map_err(|_| {
        WarehouseError::statement(format!(
            "cannot read NUMERIC value '{text}' at position {ordinal}"
        ))
    })?;
    // Scale-padded whole values such as `-3.000`
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        return Ok(ScalarValue::Integer(value as i64));
    }
    Ok(ScalarValue::Float(value))
}

/// Opens a fresh [`PgWarehouse`] for every task execution.
#[derive(Debug, Clone)]
pub struct PgConnector {
    url: String,
    connect_timeout: Duration,
}

impl PgConnector {
    pub fn new(url: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            connect_timeout,
        }
    }

    pub fn from_config(config: &WarehouseConfig) -> Self {
        Self::new(
            config.url.clone(),
            Duration::from_secs(config.connect_timeout_seconds),
        )
    }
}

#[async_trait]
impl WarehouseConnector for PgConnector {
    #[instrument(skip(self))]
    async fn connect(&self) -> Result<Box<dyn Warehouse>, WarehouseError> {
        let warehouse = PgWarehouse::connect(&self.url, self.connect_timeout).await?;
        Ok(Box::new(warehouse))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_text_decoding() {
        assert_eq!(numeric_from_text(0, "42").unwrap(), ScalarValue::Integer(42));
        assert!(matches!(
            numeric_from_text(0, "12.50").unwrap(),
            ScalarValue::Float(value) if value == 12.5
        ));
        assert!(matches!(
            numeric_from_text(0, "-3.000").unwrap(),
            ScalarValue::Integer(-3)
        ));
        assert!(matches!(
            numeric_from_text(1, "abc"),
            Err(WarehouseError::Statement { .. })
        ));
    }

    #[test]
    fn test_numeric_beyond_i64_falls_back_to_float() {
        let value = numeric_from_text(0, "123456789012345678901234567890").unwrap();
        assert_eq!(value.kind(), "float");
        assert!(value > ScalarValue::Integer(i64::MAX));
    }

    // Holding the connection guard across an await must keep the future Send
    #[allow(dead_code)]
    fn statement_futures_are_send(warehouse: &PgWarehouse) {
        fn is_send<T: Send>(_: T) {}
        is_send(warehouse.run("SELECT 1"));
        is_send(warehouse.query("SELECT 1"));
    }

    #[test]
    fn test_warehouse_is_usable_across_tasks() {
        fn is_send_sync<T: Send + Sync>() {}
        is_send_sync::<PgWarehouse>();
        is_send_sync::<PgConnector>();
    }
}
