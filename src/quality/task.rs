//! The data quality task: table non-empty checks, then comparator checks.

use super::{ComparisonCheckSpec, Comparator, QualityCheckSpec, QualityResult};
use crate::error::{EtlError, QualityFailure, Result};
use crate::logging::log_task_operation;
use crate::tasks::{EtlTask, TaskContext, TaskOutcome, TaskState};
use crate::validation::validate_table_name;
use crate::warehouse::{ScalarValue, Warehouse, WarehouseConnector};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Results gathered while the checks run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub state: TaskState,
    pub results: Vec<QualityResult>,
}

impl QualityReport {
    pub fn passed_count(&self) -> usize {
        self.results.iter().filter(|result| result.passed).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &QualityResult> {
        self.results.iter().filter(|result| !result.passed)
    }
}

/// Runs every table check, then every comparator check, stopping at the
/// first one that fails.
///
/// Comparator symbols and table names are validated before the warehouse is
/// touched, so a misconfigured check is always a [`EtlError::Config`] and
/// never a silent pass.
pub struct DataQualityTask {
    name: String,
    tables: Vec<String>,
    checks: Vec<ComparisonCheckSpec>,
    connector: Arc<dyn WarehouseConnector>,
}

impl DataQualityTask {
    pub fn new<T, C>(
        name: impl Into<String>,
        tables: T,
        checks: C,
        connector: Arc<dyn WarehouseConnector>,
    ) -> Self
    where
        T: IntoIterator,
        T::Item: Into<String>,
        C: IntoIterator<Item = ComparisonCheckSpec>,
    {
        Self {
            name: name.into(),
            tables: tables.into_iter().map(Into::into).collect(),
            checks: checks.into_iter().collect(),
            connector,
        }
    }

    /// Build from a mixed list; table checks still run before comparisons
    pub fn from_specs(
        name: impl Into<String>,
        specs: Vec<QualityCheckSpec>,
        connector: Arc<dyn WarehouseConnector>,
    ) -> Self {
        let mut tables = Vec::new();
        let mut checks = Vec::new();
        for spec in specs {
            match spec {
                QualityCheckSpec::TableNotEmpty(table) => tables.push(table),
                QualityCheckSpec::Comparison(check) => checks.push(check),
            }
        }
        Self::new(name, tables, checks, connector)
    }

    pub fn tables(&self) -> &[String] {
        &self.tables
    }

    pub fn checks(&self) -> &[ComparisonCheckSpec] {
        &self.checks
    }

    /// Run all checks and return the report, or the first failure
    pub async fn run_checks(&self) -> Result<QualityReport> {
        let mut report = QualityReport::default();
        self.run_into(&mut report).await?;
        Ok(report)
    }

    /// Run all checks, recording each result in `report` as it completes.
    ///
    /// On failure the report ends `Failed` and holds the checks that passed
    /// followed by the failing check with its reason.
    pub async fn run_into(&self, report: &mut QualityReport) -> Result<()> {
        report.state.transition_to(TaskState::Running)?;

        match self.run_phases(report).await {
            Ok(()) => {
                report.state.transition_to(TaskState::Passed)?;
                Ok(())
            }
            Err(failure) => {
                report.state.transition_to(TaskState::Failed)?;
                Err(failure)
            }
        }
    }

    async fn run_phases(&self, report: &mut QualityReport) -> Result<()> {
        let comparators = self
            .checks
            .iter()
            .map(ComparisonCheckSpec::comparator)
            .collect::<Result<Vec<Comparator>>>()?;
        for table in &self.tables {
            validate_table_name(table)?;
        }

        let warehouse = self.connector.connect().await?;

        for table in &self.tables {
            let label = QualityCheckSpec::TableNotEmpty(table.clone()).label();
            match check_table_not_empty(warehouse.as_ref(), table).await {
                Ok(count) => {
                    info!(table = %table, records = count, "Table check passed");
                    report
                        .results
                        .push(QualityResult::passed(label, count.into()));
                }
                Err(error) => {
                    report
                        .results
                        .push(QualityResult::failed(label, None, error.to_string()));
                    return Err(error);
                }
            }
        }

        for (index, (check, comparator)) in self.checks.iter().zip(comparators).enumerate() {
            let label = QualityCheckSpec::Comparison(check.clone()).label();
            match check_comparison(warehouse.as_ref(), index, check, comparator).await {
                Ok(observed) => {
                    debug!(check = index, observed = %observed, "Comparison check passed");
                    report.results.push(QualityResult::passed(label, observed));
                }
                Err(error) => {
                    let observed = match &error {
                        EtlError::DataQuality(QualityFailure::ComparisonFailed {
                            observed, ..
                        })
                        | EtlError::DataQuality(QualityFailure::Incomparable { observed, .. }) => {
                            Some(observed.clone())
                        }
                        _ => None,
                    };
                    report
                        .results
                        .push(QualityResult::failed(label, observed, error.to_string()));
                    return Err(error);
                }
            }
        }

        Ok(())
    }
}

async fn check_table_not_empty(warehouse: &dyn Warehouse, table: &str) -> Result<i64> {
    let rows = warehouse
        .query(&format!("SELECT COUNT(*) FROM {table}"))
        .await?;

    let row = rows.first().ok_or_else(|| QualityFailure::EmptyResult {
        table: table.to_string(),
    })?;
    let value = row.first().ok_or_else(|| QualityFailure::EmptyRow {
        table: table.to_string(),
    })?;
    let count = value.as_i64().ok_or_else(|| QualityFailure::NonNumericCount {
        table: table.to_string(),
        observed: value.clone(),
    })?;

    if count < 1 {
        return Err(QualityFailure::InsufficientRows {
            table: table.to_string(),
            count,
        }
        .into());
    }
    Ok(count)
}

async fn check_comparison(
    warehouse: &dyn Warehouse,
    index: usize,
    check: &ComparisonCheckSpec,
    comparator: Comparator,
) -> Result<ScalarValue> {
    let rows = warehouse.query(&check.test_sql).await?;
    let observed = rows
        .first()
        .and_then(|row| row.first())
        .cloned()
        .ok_or_else(|| QualityFailure::NoValue {
            index,
            sql: check.test_sql.clone(),
        })?;

    match comparator.evaluate(&observed, &check.expected_result) {
        Some(true) => Ok(observed),
        Some(false) => Err(QualityFailure::ComparisonFailed {
            index,
            sql: check.test_sql.clone(),
            observed,
            expected: check.expected_result.clone(),
            comparator,
        }
        .into()),
        None => Err(QualityFailure::Incomparable {
            index,
            sql: check.test_sql.clone(),
            observed,
            expected: check.expected_result.clone(),
        }
        .into()),
    }
}

#[async_trait]
impl EtlTask for DataQualityTask {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self, context), fields(task = %self.name, run_id = %context.run_id))]
    async fn execute(&self, context: &TaskContext) -> Result<TaskOutcome> {
        info!(
            tables = self.tables.len(),
            checks = self.checks.len(),
            "Running data quality checks"
        );

        let report = self.run_checks().await?;
        log_task_operation(
            "data_quality",
            &self.name,
            "passed",
            Some(&format!("{} checks passed", report.passed_count())),
        );
        Ok(TaskOutcome::new(&self.name, report.results.len()).with_details(json!({
            "state": report.state,
            "results": report.results,
        })))
    }
}
