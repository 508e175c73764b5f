//! Shared fixtures for integration tests

#![allow(dead_code)]

use proptest::prelude::*;
use sparkify_etl::credentials::{ObjectStoreCredentials, StaticCredentialSource};
use sparkify_etl::quality::Comparator;
use sparkify_etl::test_helpers::RecordingWarehouse;
use std::sync::Arc;

pub fn static_credentials() -> Arc<StaticCredentialSource> {
    Arc::new(StaticCredentialSource::new(ObjectStoreCredentials::new(
        "AKIAEXAMPLE",
        "wJalrXUtnFEMI/K7MDENG",
    )))
}

/// A warehouse whose quality queries all come back healthy
pub fn healthy_warehouse() -> RecordingWarehouse {
    let mut warehouse = RecordingWarehouse::new();
    for table in ["songplays", "artists", "songs", "time", "users"] {
        warehouse = warehouse.with_scalar(&format!("SELECT COUNT(*) FROM {table}"), 42i64);
    }
    warehouse
        .with_scalar("SELECT COUNT(*) FROM songs WHERE songid IS NULL", 0i64)
        .with_scalar("SELECT COUNT(*) FROM artists WHERE artistid IS NULL", 0i64)
}

pub mod strategies {
    use super::*;

    pub fn comparator_strategy() -> impl Strategy<Value = Comparator> {
        prop::sample::select(Comparator::ALL.to_vec())
    }

    /// Strings that are never one of the six comparator codes
    pub fn unknown_symbol_strategy() -> impl Strategy<Value = String> {
        ".{0,8}".prop_filter("must not be a known comparator", |symbol| {
            !Comparator::ALL
                .iter()
                .any(|comparator| comparator.code() == symbol.as_str())
        })
    }
}
