//! # Pipeline Runner
//!
//! Runs named stages of tasks strictly in declaration order and stops at the
//! first task that fails. This is a linear runner: tasks inside a stage do not
//! run concurrently and there is no dependency graph beyond stage order.
//!
//! [`sparkify`] assembles the canonical Sparkify pipeline from configuration.

use crate::config::PipelineConfig;
use crate::constants::{defaults, task_names};
use crate::credentials::CredentialSource;
use crate::error::Result;
use crate::logging::{log_error, log_task_operation};
use crate::quality::DataQualityTask;
use crate::sql::{self, queries};
use crate::tasks::{
    EtlTask, LoadTask, LoadTaskSpec, PartitionSource, StageLoadTask, StageTaskSpec,
    TableCreationTask, TaskContext, TaskOutcome, TaskState,
};
use crate::warehouse::WarehouseConnector;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument};

/// A named group of tasks that run one after another
pub struct Stage {
    name: String,
    tasks: Vec<Box<dyn EtlTask>>,
}

impl Stage {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tasks: Vec::new(),
        }
    }

    pub fn with_task(mut self, task: impl EtlTask + 'static) -> Self {
        self.tasks.push(Box::new(task));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn task_names(&self) -> Vec<&str> {
        self.tasks.iter().map(|task| task.name()).collect()
    }
}

/// Per-task entry in a [`PipelineReport`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub stage: String,
    pub task: String,
    pub state: TaskState,
    pub outcome: Option<TaskOutcome>,
    pub duration_ms: Option<u64>,
}

/// The task that stopped the run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineFailure {
    pub task: String,
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub pipeline: String,
    pub records: Vec<TaskRecord>,
    pub failure: Option<PipelineFailure>,
}

impl PipelineReport {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    pub fn state_of(&self, task: &str) -> Option<TaskState> {
        self.records
            .iter()
            .find(|record| record.task == task)
            .map(|record| record.state)
    }

    pub fn count_in(&self, state: TaskState) -> usize {
        self.records
            .iter()
            .filter(|record| record.state == state)
            .count()
    }
}

pub struct Pipeline {
    name: String,
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
        }
    }

    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Run every task in order until one fails.
    ///
    /// Task failures are recorded in the report rather than returned; tasks
    /// after a failure stay `Pending`. Prior tasks are never rolled back.
    #[instrument(skip(self, context), fields(pipeline = %self.name, run_id = %context.run_id))]
    pub async fn run(&self, context: &TaskContext) -> Result<PipelineReport> {
        let mut report = PipelineReport {
            pipeline: self.name.clone(),
            records: self
                .stages
                .iter()
                .flat_map(|stage| {
                    stage.tasks.iter().map(|task| TaskRecord {
                        stage: stage.name.clone(),
                        task: task.name().to_string(),
                        state: TaskState::Pending,
                        outcome: None,
                        duration_ms: None,
                    })
                })
                .collect(),
            failure: None,
        };

        info!(
            stages = self.stages.len(),
            tasks = report.records.len(),
            execution_date = ?context.execution_date,
            "Begin execution"
        );

        let tasks = self.stages.iter().flat_map(|stage| stage.tasks.iter());
        for (record, task) in report.records.iter_mut().zip(tasks) {
            record.state.transition_to(TaskState::Running)?;
            let started = Instant::now();
            let result = task.execute(context).await;
            record.duration_ms = Some(started.elapsed().as_millis() as u64);

            match result {
                Ok(outcome) => {
                    record.state.transition_to(TaskState::Passed)?;
                    record.outcome = Some(outcome);
                }
                Err(error) => {
                    record.state.transition_to(TaskState::Failed)?;
                    log_error(
                        "pipeline",
                        &record.task,
                        &error.to_string(),
                        Some(error.code()),
                    );
                    report.failure = Some(PipelineFailure {
                        task: record.task.clone(),
                        code: error.code().to_string(),
                        message: error.to_string(),
                    });
                    break;
                }
            }
        }

        let status = if report.is_success() { "succeeded" } else { "failed" };
        log_task_operation(
            "pipeline",
            &self.name,
            status,
            Some(&format!(
                "{} passed, {} pending",
                report.count_in(TaskState::Passed),
                report.count_in(TaskState::Pending)
            )),
        );
        info!(status, "Stop execution");

        Ok(report)
    }
}

/// The canonical Sparkify pipeline:
/// create tables, stage events and songs, load the songplays fact table,
/// load the four dimension tables, then run the data quality checks.
pub fn sparkify(
    config: &PipelineConfig,
    connector: Arc<dyn WarehouseConnector>,
    credentials: Arc<dyn CredentialSource>,
) -> Result<Pipeline> {
    let create_tables = match &config.schema.ddl_path {
        Some(path) => {
            TableCreationTask::from_file(task_names::CREATE_TABLES, path, connector.clone())?
        }
        None => TableCreationTask::new(
            task_names::CREATE_TABLES,
            sql::CREATE_TABLES,
            connector.clone(),
        ),
    };

    let staging = &config.staging;
    let events_partition = if staging.partition_events_by_date {
        PartitionSource::ExecutionDate
    } else {
        PartitionSource::None
    };
    let stage_spec = |table: &str, key: &str, json_path: &str, partition: PartitionSource| {
        StageTaskSpec::new(table, &staging.bucket, key)
            .with_json_path(json_path)
            .with_region(&staging.region)
            .with_credentials_id(&staging.credentials_id)
            .with_partition(partition)
            .with_truncate(staging.truncate)
    };
    let stage_events = StageLoadTask::new(
        task_names::STAGE_EVENTS,
        stage_spec(
            "staging_events",
            &staging.log_data_key,
            &staging.log_json_path,
            events_partition,
        ),
        connector.clone(),
        credentials.clone(),
    );
    let stage_songs = StageLoadTask::new(
        task_names::STAGE_SONGS,
        stage_spec(
            "staging_songs",
            &staging.song_data_key,
            defaults::JSON_PATH_AUTO,
            PartitionSource::None,
        ),
        connector.clone(),
        credentials,
    );

    let dimension = |name: &str, table: &str, select_sql: &str| {
        LoadTask::dimension(name, LoadTaskSpec::new(table, select_sql), connector.clone())
    };

    Ok(Pipeline::new("sparkify")
        .with_stage(Stage::new("schema").with_task(create_tables))
        .with_stage(
            Stage::new("staging")
                .with_task(stage_events)
                .with_task(stage_songs),
        )
        .with_stage(Stage::new("fact").with_task(LoadTask::fact(
            task_names::LOAD_SONGPLAYS,
            LoadTaskSpec::new("songplays", queries::SONGPLAY_TABLE_INSERT),
            connector.clone(),
        )))
        .with_stage(
            Stage::new("dimensions")
                .with_task(dimension(
                    task_names::LOAD_USERS,
                    "users",
                    queries::USER_TABLE_INSERT,
                ))
                .with_task(dimension(
                    task_names::LOAD_SONGS,
                    "songs",
                    queries::SONG_TABLE_INSERT,
                ))
                .with_task(dimension(
                    task_names::LOAD_ARTISTS,
                    "artists",
                    queries::ARTIST_TABLE_INSERT,
                ))
                .with_task(dimension(
                    task_names::LOAD_TIME,
                    "time",
                    queries::TIME_TABLE_INSERT,
                )),
        )
        .with_stage(Stage::new("quality").with_task(DataQualityTask::new(
            task_names::DATA_QUALITY,
            config.quality.tables.clone(),
            config.quality.checks.clone(),
            connector,
        ))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EtlError;
    use crate::test_helpers::RecordingWarehouse;
    use async_trait::async_trait;

    struct FixedTask {
        name: &'static str,
        fail: bool,
    }

    #[async_trait]
    impl EtlTask for FixedTask {
        fn name(&self) -> &str {
            self.name
        }

        async fn execute(&self, _context: &TaskContext) -> Result<TaskOutcome> {
            if self.fail {
                Err(EtlError::load(self.name, "boom"))
            } else {
                Ok(TaskOutcome::new(self.name, 1))
            }
        }
    }

    fn task(name: &'static str, fail: bool) -> FixedTask {
        FixedTask { name, fail }
    }

    #[tokio::test]
    async fn test_stops_at_first_failure() {
        let pipeline = Pipeline::new("test")
            .with_stage(Stage::new("one").with_task(task("a", false)))
            .with_stage(
                Stage::new("two")
                    .with_task(task("b", true))
                    .with_task(task("c", false)),
            );

        let report = pipeline.run(&TaskContext::default()).await.unwrap();

        assert!(!report.is_success());
        assert_eq!(report.state_of("a"), Some(TaskState::Passed));
        assert_eq!(report.state_of("b"), Some(TaskState::Failed));
        assert_eq!(report.state_of("c"), Some(TaskState::Pending));
        let failure = report.failure.unwrap();
        assert_eq!(failure.task, "b");
        assert_eq!(failure.code, "LOAD_ERROR");
    }

    #[tokio::test]
    async fn test_empty_pipeline_succeeds() {
        let report = Pipeline::new("empty")
            .run(&TaskContext::default())
            .await
            .unwrap();
        assert!(report.is_success());
        assert!(report.records.is_empty());
    }

    #[test]
    fn test_sparkify_task_order() {
        let warehouse = RecordingWarehouse::new();
        let credentials = crate::credentials::StaticCredentialSource::new(
            crate::credentials::ObjectStoreCredentials::new("AKIA", "secret"),
        );
        let pipeline = sparkify(
            &PipelineConfig::default(),
            Arc::new(warehouse),
            Arc::new(credentials),
        )
        .unwrap();

        let order: Vec<&str> = pipeline
            .stages()
            .iter()
            .flat_map(|stage| stage.task_names())
            .collect();
        assert_eq!(
            order,
            vec![
                task_names::CREATE_TABLES,
                task_names::STAGE_EVENTS,
                task_names::STAGE_SONGS,
                task_names::LOAD_SONGPLAYS,
                task_names::LOAD_USERS,
                task_names::LOAD_SONGS,
                task_names::LOAD_ARTISTS,
                task_names::LOAD_TIME,
                task_names::DATA_QUALITY,
            ]
        );
    }

    #[test]
    fn test_sparkify_missing_ddl_file_is_config_error() {
        let mut config = PipelineConfig::default();
        config.schema.ddl_path = Some("/nonexistent/create_tables.sql".into());
        let credentials = crate::credentials::StaticCredentialSource::new(
            crate::credentials::ObjectStoreCredentials::new("AKIA", "secret"),
        );

        let result = sparkify(
            &config,
            Arc::new(RecordingWarehouse::new()),
            Arc::new(credentials),
        );
        assert!(matches!(result, Err(EtlError::Config(_))));
    }

    #[derive(Clone, Default)]
    struct ErrorCounter(Arc<std::sync::atomic::AtomicUsize>);

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for ErrorCounter {
        fn on_event(
            &self,
            event: &tracing::Event<'_>,
            _ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            if *event.metadata().level() == tracing::Level::ERROR {
                self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            }
        }
    }

    #[tokio::test]
    async fn test_quality_failure_is_logged_once() {
        use tracing_subscriber::layer::SubscriberExt;

        let counter = ErrorCounter::default();
        let _guard = tracing::subscriber::set_default(
            tracing_subscriber::registry().with(counter.clone()),
        );

        let warehouse = RecordingWarehouse::new();
        let pipeline = Pipeline::new("test").with_stage(Stage::new("quality").with_task(
            DataQualityTask::new(
                task_names::DATA_QUALITY,
                ["songs"],
                Vec::new(),
                Arc::new(warehouse),
            ),
        ));

        let report = pipeline.run(&TaskContext::default()).await.unwrap();

        assert_eq!(report.failure.unwrap().code, "DATA_QUALITY_ERROR");
        assert_eq!(counter.0.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
