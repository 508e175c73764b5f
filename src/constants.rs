//! # Pipeline Constants
//!
//! Statement templates, defaults and environment variable names shared across
//! the tasks.

/// Bulk-copy statement issued by the staging task.
///
/// Placeholders in order: table, path, access key, secret key, region, json path.
/// Timestamps are epoch milliseconds; blank and empty fields load as NULL and
/// overflowing values are truncated instead of rejected.
pub const COPY_SQL_TEMPLATE: &str = "COPY {table}
FROM '{path}'
ACCESS_KEY_ID '{access_key}'
SECRET_ACCESS_KEY '{secret_key}'
REGION '{region}'
TIMEFORMAT as 'epochmillisecs'
TRUNCATECOLUMNS BLANKSASNULL EMPTYASNULL
JSON '{json_path}'";

/// Scheme prefixed to the staging bucket
pub const S3_SCHEME: &str = "s3://";

/// Shown in logs in place of credentials
pub const REDACTED: &str = "***";

pub mod defaults {
    pub const WAREHOUSE_URL: &str = "postgresql://localhost:5439/sparkify";
    pub const CONNECT_TIMEOUT_SECONDS: u64 = 30;
    pub const REGION: &str = "us-west-2";
    pub const S3_BUCKET: &str = "udacity-dend";
    pub const CREDENTIALS_ID: &str = "aws_credentials";
    pub const LOG_JSON_PATH: &str = "s3://udacity-dend/log_json_path.json";
    /// Let the warehouse map JSON keys to columns by name
    pub const JSON_PATH_AUTO: &str = "auto";
}

pub mod env_vars {
    pub const CONFIG_PREFIX: &str = "SPARKIFY";
    pub const ENVIRONMENT: &str = "SPARKIFY_ENV";
    pub const DATABASE_URL: &str = "DATABASE_URL";
    pub const CONNECT_TIMEOUT: &str = "SPARKIFY_CONNECT_TIMEOUT_SECONDS";
    pub const AWS_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
    pub const AWS_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
}

/// Longest identifier segment the warehouse accepts
pub const MAX_IDENTIFIER_LENGTH: usize = 127;

pub mod task_names {
    pub const CREATE_TABLES: &str = "create_tables";
    pub const STAGE_EVENTS: &str = "stage_events";
    pub const STAGE_SONGS: &str = "stage_songs";
    pub const LOAD_SONGPLAYS: &str = "load_songplays_fact_table";
    pub const LOAD_USERS: &str = "load_user_dimension_table";
    pub const LOAD_SONGS: &str = "load_song_dimension_table";
    pub const LOAD_ARTISTS: &str = "load_artist_dimension_table";
    pub const LOAD_TIME: &str = "load_time_dimension_table";
    pub const DATA_QUALITY: &str = "run_data_quality_checks";
}
