//! Copies JSON files from S3 into a staging table with a single `COPY`.

use super::{EtlTask, TaskContext, TaskOutcome};
use crate::constants::{defaults, COPY_SQL_TEMPLATE, REDACTED, S3_SCHEME};
use crate::credentials::{CredentialSource, ObjectStoreCredentials};
use crate::error::{EtlError, Result};
use crate::logging::log_task_operation;
use crate::validation::{escape_literal, validate_table_name};
use crate::warehouse::WarehouseConnector;
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Where the year/month partition of the S3 path comes from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionSource {
    /// Copy everything under the key
    #[default]
    None,
    /// Always copy one fixed month
    Fixed(NaiveDate),
    /// Use the month of the context's execution date, if there is one
    ExecutionDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTaskSpec {
    pub table: String,
    pub bucket: String,
    /// Key prefix; may contain `{year}`, `{month}`, `{day}` or `{ds}`
    pub key: String,
    /// `auto` or the S3 path of a JSONPaths file, passed through verbatim
    pub json_path: String,
    pub region: String,
    pub credentials_id: String,
    pub partition: PartitionSource,
    pub truncate: bool,
}

impl StageTaskSpec {
    pub fn new(table: impl Into<String>, bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            bucket: bucket.into(),
            key: key.into(),
            json_path: defaults::JSON_PATH_AUTO.to_string(),
            region: defaults::REGION.to_string(),
            credentials_id: defaults::CREDENTIALS_ID.to_string(),
            partition: PartitionSource::None,
            truncate: false,
        }
    }

    pub fn with_json_path(mut self, json_path: impl Into<String>) -> Self {
        self.json_path = json_path.into();
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_credentials_id(mut self, credentials_id: impl Into<String>) -> Self {
        self.credentials_id = credentials_id.into();
        self
    }

    pub fn with_partition(mut self, partition: PartitionSource) -> Self {
        self.partition = partition;
        self
    }

    pub fn with_truncate(mut self, truncate: bool) -> Self {
        self.truncate = truncate;
        self
    }

    pub fn partition_date(&self, context: &TaskContext) -> Option<NaiveDate> {
        match self.partition {
            PartitionSource::None => None,
            PartitionSource::Fixed(date) => Some(date),
            PartitionSource::ExecutionDate => context.execution_day(),
        }
    }

    /// `s3://bucket/key`, plus `/YYYY/MM` when a partition date applies
    pub fn resolve_path(&self, context: &TaskContext) -> Result<String> {
        let date = self.partition_date(context);
        let key = render_key_template(&self.key, date)?;

        let bucket = self
            .bucket
            .strip_prefix(S3_SCHEME)
            .unwrap_or(&self.bucket)
            .trim_matches('/');
        let key = key.trim_matches('/');

        let mut path = if key.is_empty() {
            format!("{S3_SCHEME}{bucket}")
        } else {
            format!("{S3_SCHEME}{bucket}/{key}")
        };

        if let Some(date) = date {
            path = format!("{path}/{:04}/{:02}", date.year(), date.month());
        }

        Ok(path)
    }
}

/// Substitute date placeholders in an S3 key
pub fn render_key_template(key: &str, date: Option<NaiveDate>) -> Result<String> {
    if !key.contains('{') && !key.contains('}') {
        return Ok(key.to_string());
    }

    let date = date.ok_or_else(|| {
        EtlError::config(format!(
            "S3 key '{key}' uses date placeholders but no execution date is available"
        ))
    })?;

    let rendered = fill_template(
        key,
        &[
            ("year", format!("{:04}", date.year()).as_str()),
            ("month", format!("{:02}", date.month()).as_str()),
            ("day", format!("{:02}", date.day()).as_str()),
            ("ds", date.format("%Y-%m-%d").to_string().as_str()),
        ],
    )?;
    Ok(rendered)
}

/// Replace `{name}` placeholders in a single left-to-right pass, so
/// substituted values are never rescanned.
fn fill_template(template: &str, values: &[(&str, &str)]) -> Result<String> {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        output.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after.find('}').ok_or_else(|| {
            EtlError::config(format!("Unterminated placeholder in '{template}'"))
        })?;
        let name = &after[..close];
        let value = values
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| *value)
            .ok_or_else(|| {
                EtlError::config(format!("Unknown placeholder '{{{name}}}' in '{template}'"))
            })?;
        output.push_str(value);
        rest = &after[close + 1..];
    }

    if rest.contains('}') {
        return Err(EtlError::config(format!(
            "Unbalanced '}}' in '{template}'"
        )));
    }
    output.push_str(rest);
    Ok(output)
}

/// Render the fixed `COPY` statement
pub fn copy_statement(
    table: &str,
    path: &str,
    credentials: &ObjectStoreCredentials,
    region: &str,
    json_path: &str,
) -> Result<String> {
    fill_template(
        COPY_SQL_TEMPLATE,
        &[
            ("table", table),
            ("path", escape_literal(path).as_str()),
            ("access_key", escape_literal(&credentials.access_key).as_str()),
            ("secret_key", escape_literal(&credentials.secret_key).as_str()),
            ("region", escape_literal(region).as_str()),
            ("json_path", escape_literal(json_path).as_str()),
        ],
    )
}

/// Loads one staging table from S3.
///
/// Order of operations: credential resolution, optional `TRUNCATE`, one `COPY`.
/// Credentials are resolved before anything touches the table.
/// Every failure is reported as [`EtlError::Load`]; the `COPY` itself is
/// all-or-nothing on the warehouse side.
pub struct StageLoadTask {
    name: String,
    spec: StageTaskSpec,
    connector: Arc<dyn WarehouseConnector>,
    credentials: Arc<dyn CredentialSource>,
}

impl StageLoadTask {
    pub fn new(
        name: impl Into<String>,
        spec: StageTaskSpec,
        connector: Arc<dyn WarehouseConnector>,
        credentials: Arc<dyn CredentialSource>,
    ) -> Self {
        Self {
            name: name.into(),
            spec,
            connector,
            credentials,
        }
    }

    pub fn spec(&self) -> &StageTaskSpec {
        &self.spec
    }
}

#[async_trait]
impl EtlTask for StageLoadTask {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self, context), fields(task = %self.name, table = %self.spec.table, run_id = %context.run_id))]
    async fn execute(&self, context: &TaskContext) -> Result<TaskOutcome> {
        let table = &self.spec.table;
        validate_table_name(table)?;
        let path = self.spec.resolve_path(context)?;

        let credentials = self
            .credentials
            .resolve(&self.spec.credentials_id)
            .await
            .map_err(|e| EtlError::load(table, format!("credential resolution failed: {e}")))?;

        let statement = copy_statement(
            table,
            &path,
            &credentials,
            &self.spec.region,
            &self.spec.json_path,
        )?;

        let warehouse = self
            .connector
            .connect()
            .await
            .map_err(|e| EtlError::load(table, format!("connection failed: {e}")))?;

        let mut statements = 0;
        if self.spec.truncate {
            info!("Truncating staging table");
            warehouse
                .run(&format!("TRUNCATE {table}"))
                .await
                .map_err(|e| EtlError::load(table, format!("truncate failed: {e}")))?;
            statements += 1;
        }

        debug!(
            statement = %copy_statement(
                table,
                &path,
                &ObjectStoreCredentials::new(REDACTED, REDACTED),
                &self.spec.region,
                &self.spec.json_path,
            )?,
            "Issuing COPY"
        );

        warehouse
            .run(&statement)
            .await
            .map_err(|e| EtlError::load(table, format!("copy from {path} failed: {e}")))?;
        statements += 1;

        log_task_operation("stage", &self.name, "completed", Some(&path));

        Ok(TaskOutcome::new(&self.name, statements).with_details(json!({
            "table": table,
            "path": path,
            "truncated": self.spec.truncate,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::StaticCredentialSource;
    use crate::test_helpers::RecordingWarehouse;
    use chrono::{TimeZone, Utc};

    fn nov_5() -> NaiveDate {
        NaiveDate::from_ymd_opt(2018, 11, 5).unwrap()
    }

    fn stage_task(spec: StageTaskSpec, warehouse: &RecordingWarehouse) -> StageLoadTask {
        StageLoadTask::new(
            "stage_events",
            spec,
            Arc::new(warehouse.clone()),
            Arc::new(StaticCredentialSource::new(ObjectStoreCredentials::new(
                "AKIDEXAMPLE",
                "s3cr3t",
            ))),
        )
    }

    #[test]
    fn test_path_with_fixed_partition() {
        let spec = StageTaskSpec::new("staging_events", "udacity-dend", "log_data")
            .with_partition(PartitionSource::Fixed(nov_5()));
        assert_eq!(
            spec.resolve_path(&TaskContext::default()).unwrap(),
            "s3://udacity-dend/log_data/2018/11"
        );
    }

    #[test]
    fn test_path_without_date_is_unchanged() {
        let spec = StageTaskSpec::new("staging_events", "udacity-dend", "log_data");
        assert_eq!(
            spec.resolve_path(&TaskContext::default()).unwrap(),
            "s3://udacity-dend/log_data"
        );

        let from_context = spec.with_partition(PartitionSource::ExecutionDate);
        assert_eq!(
            from_context.resolve_path(&TaskContext::default()).unwrap(),
            "s3://udacity-dend/log_data"
        );
    }

    #[test]
    fn test_path_from_context_execution_date() {
        let context = TaskContext::default()
            .with_execution_date(Utc.with_ymd_and_hms(2018, 11, 5, 13, 0, 0).unwrap());
        let spec = StageTaskSpec::new("staging_events", "s3://udacity-dend/", "/log_data/")
            .with_partition(PartitionSource::ExecutionDate);
        assert_eq!(
            spec.resolve_path(&context).unwrap(),
            "s3://udacity-dend/log_data/2018/11"
        );
    }

    #[test]
    fn test_key_template_rendering() {
        assert_eq!(
            render_key_template("log_data/{year}/{month}/{ds}-events.json", Some(nov_5())).unwrap(),
            "log_data/2018/11/2018-11-05-events.json"
        );
        assert!(matches!(
            render_key_template("log_data/{year}", None),
            Err(EtlError::Config(_))
        ));
        assert!(render_key_template("log_data/{hour}", Some(nov_5())).is_err());
        assert!(render_key_template("log_data/{year", Some(nov_5())).is_err());
    }

    #[test]
    fn test_copy_statement_contains_all_clauses() {
        let statement = copy_statement(
            "staging_songs",
            "s3://udacity-dend/song_data",
            &ObjectStoreCredentials::new("AKID", "secret"),
            "us-west-2",
            "auto",
        )
        .unwrap();

        assert!(statement.starts_with("COPY staging_songs\nFROM 's3://udacity-dend/song_data'"));
        assert!(statement.contains("ACCESS_KEY_ID 'AKID'"));
        assert!(statement.contains("SECRET_ACCESS_KEY 'secret'"));
        assert!(statement.contains("REGION 'us-west-2'"));
        assert!(statement.contains("TIMEFORMAT as 'epochmillisecs'"));
        assert!(statement.contains("TRUNCATECOLUMNS BLANKSASNULL EMPTYASNULL"));
        assert!(statement.ends_with("JSON 'auto'"));
    }

    #[test]
    fn test_copy_statement_does_not_rescan_values() {
        let statement = copy_statement(
            "staging_songs",
            "s3://bucket/{secret_key}'x",
            &ObjectStoreCredentials::new("AKID", "secret"),
            "us-west-2",
            "auto",
        )
        .unwrap();
        assert!(statement.contains("FROM 's3://bucket/{secret_key}''x'"));
    }

    #[tokio::test]
    async fn test_truncate_then_copy_on_one_connection() {
        let warehouse = RecordingWarehouse::new();
        let spec = StageTaskSpec::new("staging_events", "udacity-dend", "log_data")
            .with_json_path("s3://udacity-dend/log_json_path.json")
            .with_truncate(true);

        let outcome = stage_task(spec, &warehouse)
            .execute(&TaskContext::default())
            .await
            .unwrap();

        assert_eq!(outcome.statements_executed, 2);
        let recorded = warehouse.recorded();
        assert_eq!(recorded.len(), 2);
        assert_eq!(recorded[0].sql, "TRUNCATE staging_events");
        assert!(recorded[1].sql.starts_with("COPY staging_events"));
        assert!(recorded[1].sql.contains("JSON 's3://udacity-dend/log_json_path.json'"));
        assert_eq!(recorded[0].connection, recorded[1].connection);
    }

    #[tokio::test]
    async fn test_copy_failure_is_load_error() {
        let warehouse = RecordingWarehouse::new().fail_on("COPY", "S3ServiceException");
        let error = stage_task(
            StageTaskSpec::new("staging_events", "udacity-dend", "log_data"),
            &warehouse,
        )
        .execute(&TaskContext::default())
        .await
        .unwrap_err();

        match error {
            EtlError::Load { table, message } => {
                assert_eq!(table, "staging_events");
                assert!(message.contains("S3ServiceException"));
            }
            other => panic!("expected load error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_table_issues_nothing() {
        let warehouse = RecordingWarehouse::new();
        let error = stage_task(
            StageTaskSpec::new("staging_events; DROP TABLE users", "udacity-dend", "log_data"),
            &warehouse,
        )
        .execute(&TaskContext::default())
        .await
        .unwrap_err();

        assert!(matches!(error, EtlError::Config(_)));
        assert_eq!(warehouse.connection_count(), 0);
    }

    struct RejectingCredentials;

    #[async_trait]
    impl CredentialSource for RejectingCredentials {
        async fn resolve(&self, credential_id: &str) -> Result<ObjectStoreCredentials> {
            Err(EtlError::Credentials(format!("no keys for {credential_id}")))
        }
    }

    #[tokio::test]
    async fn test_credential_failure_leaves_table_untouched() {
        let warehouse = RecordingWarehouse::new();
        let task = StageLoadTask::new(
            "stage_events",
            StageTaskSpec::new("staging_events", "udacity-dend", "log_data").with_truncate(true),
            Arc::new(warehouse.clone()),
            Arc::new(RejectingCredentials),
        );

        let error = task.execute(&TaskContext::default()).await.unwrap_err();

        match error {
            EtlError::Load { table, message } => {
                assert_eq!(table, "staging_events");
                assert!(message.contains("credential resolution failed"));
                assert!(message.contains("no keys for aws_credentials"));
            }
            other => panic!("expected load error, got {other:?}"),
        }
        assert!(warehouse.statements().is_empty());
        assert_eq!(warehouse.connection_count(), 0);
    }
}
