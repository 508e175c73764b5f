use super::Comparator;
use crate::error::Result;
use crate::warehouse::ScalarValue;
use serde::{Deserialize, Serialize};

/// A query whose scalar result is compared against an expected value.
///
/// Field names follow the pipeline definition format
/// (`test_sql`, `expected_result`, `comparison`). The comparison stays a raw
/// string here and is parsed when the check is validated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonCheckSpec {
    pub test_sql: String,
    pub expected_result: ScalarValue,
    pub comparison: String,
}

impl ComparisonCheckSpec {
    pub fn new(
        test_sql: impl Into<String>,
        expected_result: impl Into<ScalarValue>,
        comparison: impl Into<String>,
    ) -> Self {
        Self {
            test_sql: test_sql.into(),
            expected_result: expected_result.into(),
            comparison: comparison.into(),
        }
    }

    pub fn comparator(&self) -> Result<Comparator> {
        self.comparison.parse()
    }
}

/// One data quality rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QualityCheckSpec {
    /// `SELECT COUNT(*) FROM <table>` must be at least 1
    TableNotEmpty(String),
    Comparison(ComparisonCheckSpec),
}

impl QualityCheckSpec {
    pub fn label(&self) -> String {
        match self {
            Self::TableNotEmpty(table) => format!("{table} is not empty"),
            Self::Comparison(check) => format!(
                "{} {} {}",
                check.test_sql, check.comparison, check.expected_result
            ),
        }
    }
}

impl From<ComparisonCheckSpec> for QualityCheckSpec {
    fn from(check: ComparisonCheckSpec) -> Self {
        Self::Comparison(check)
    }
}

/// Outcome of one check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityResult {
    pub check: String,
    pub passed: bool,
    pub observed: Option<ScalarValue>,
    pub reason: Option<String>,
}

impl QualityResult {
    pub fn passed(check: impl Into<String>, observed: ScalarValue) -> Self {
        Self {
            check: check.into(),
            passed: true,
            observed: Some(observed),
            reason: None,
        }
    }

    pub fn failed(
        check: impl Into<String>,
        observed: Option<ScalarValue>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            check: check.into(),
            passed: false,
            observed,
            reason: Some(reason.into()),
        }
    }
}
