//! # Sparkify ETL Runner
//!
//! Loads configuration, connects to the warehouse and runs the Sparkify
//! pipeline once. Exits non-zero when any task fails.

use anyhow::Context;
use chrono::{NaiveDate, TimeZone, Utc};
use clap::Parser;
use sparkify_etl::config::{redact_url, PipelineConfig};
use sparkify_etl::credentials::EnvCredentialSource;
use sparkify_etl::logging::init_structured_logging;
use sparkify_etl::warehouse::{PgConnector, PgWarehouse};
use sparkify_etl::{pipeline, TaskContext};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "sparkify-etl")]
#[command(about = "Stage Sparkify logs from S3 and load the Redshift star schema")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// TOML configuration file; environment variables override it
    #[arg(short, long, env = "SPARKIFY_CONFIG")]
    config: Option<PathBuf>,

    /// Execution date (YYYY-MM-DD) used to pick the year/month partition
    #[arg(short, long)]
    execution_date: Option<NaiveDate>,

    /// Print the task order and check warehouse connectivity without running
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_structured_logging();

    let config = match &cli.config {
        Some(path) => PipelineConfig::load(Some(path.as_path()))
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => PipelineConfig::from_env().context("loading configuration from environment")?,
    };

    info!(
        environment = %config.environment,
        warehouse = %redact_url(&config.warehouse.url),
        "Starting Sparkify ETL"
    );

    let pipeline = pipeline::sparkify(
        &config,
        Arc::new(PgConnector::from_config(&config.warehouse)),
        Arc::new(EnvCredentialSource::new()),
    )?;

    if cli.check {
        for stage in pipeline.stages() {
            println!("{}: {}", stage.name(), stage.task_names().join(", "));
        }
        let warehouse = PgWarehouse::connect(
            &config.warehouse.url,
            Duration::from_secs(config.warehouse.connect_timeout_seconds),
        )
        .await
        .context("connecting to warehouse")?;
        let healthy = warehouse.health_check().await?;
        warehouse.close().await?;
        anyhow::ensure!(healthy, "warehouse health check returned an unexpected result");
        println!("warehouse: ok");
        return Ok(());
    }

    let mut context = TaskContext::new(pipeline.name());
    if let Some(date) = cli.execution_date {
        let midnight = date
            .and_hms_opt(0, 0, 0)
            .context("building execution timestamp")?;
        context = context.with_execution_date(Utc.from_utc_datetime(&midnight));
    }

    let report = pipeline.run(&context).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if let Some(failure) = &report.failure {
        error!(task = %failure.task, code = %failure.code, "Pipeline failed");
        process::exit(1);
    }

    info!("Pipeline completed");
    Ok(())
}
