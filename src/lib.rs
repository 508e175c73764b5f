#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, Redshift in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Sparkify ETL
//!
//! Batch ETL tasks that stage JSON event and song logs from S3 into Redshift,
//! transform them into a star schema and assert data quality on the result.
//!
//! ## Overview
//!
//! Every task is a small, strictly sequential unit implementing [`EtlTask`]:
//! it opens one warehouse connection, issues one or two statements and
//! reports the first failure to its caller. Scheduling, retries and rollback
//! belong to whatever runs the tasks; [`pipeline::Pipeline`] is a minimal
//! linear runner for the canonical order.
//!
//! ## Module Organization
//!
//! - [`tasks`] - task contract, table creation, staging and fact/dimension loads
//! - [`quality`] - comparator checks and the data quality task
//! - [`warehouse`] - connection traits, scalar values and the Postgres-wire backend
//! - [`credentials`] - object store credential sources
//! - [`pipeline`] - sequential runner and the Sparkify pipeline definition
//! - [`sql`] - built-in star schema DDL and insert-select bodies
//! - [`config`] - layered configuration
//! - [`error`] - structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sparkify_etl::config::PipelineConfig;
//! use sparkify_etl::credentials::EnvCredentialSource;
//! use sparkify_etl::warehouse::PgConnector;
//! use sparkify_etl::{pipeline, TaskContext};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PipelineConfig::from_env()?;
//! let pipeline = pipeline::sparkify(
//!     &config,
//!     Arc::new(PgConnector::from_config(&config.warehouse)),
//!     Arc::new(EnvCredentialSource::new()),
//! )?;
//!
//! let report = pipeline.run(&TaskContext::new("sparkify")).await?;
//! println!("pipeline succeeded: {}", report.is_success());
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! Tests run against [`test_helpers::RecordingWarehouse`], never a live cluster:
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # Unit and integration tests
//! ```

pub mod config;
pub mod constants;
pub mod credentials;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod quality;
pub mod sql;
pub mod tasks;
pub mod test_helpers;
pub mod validation;
pub mod warehouse;

pub use config::PipelineConfig;
pub use credentials::{CredentialSource, ObjectStoreCredentials};
pub use error::{EtlError, QualityFailure, Result, WarehouseError};
pub use pipeline::{Pipeline, PipelineReport, Stage};
pub use quality::{Comparator, ComparisonCheckSpec, DataQualityTask, QualityReport};
pub use tasks::{
    EtlTask, LoadTask, StageLoadTask, TableCreationTask, TaskContext, TaskOutcome, TaskState,
};
pub use warehouse::{Row, ScalarValue, Warehouse, WarehouseConnector};
