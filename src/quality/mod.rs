//! # Data Quality
//!
//! Post-load assertions against the star schema.
//!
//! Two phases run in order over one connection:
//!
//! 1. **Table checks** - `SELECT COUNT(*) FROM <table>` must return at least one row
//! 2. **Comparator checks** - the first column of the first row of a query is
//!    compared against an expected value with one of `eq`, `ne`, `lt`, `le`,
//!    `gt`, `ge`
//!
//! The first failing check ends the run with [`crate::EtlError::DataQuality`].

pub mod check;
pub mod comparator;
pub mod task;

pub use check::{ComparisonCheckSpec, QualityCheckSpec, QualityResult};
pub use comparator::Comparator;
pub use task::{DataQualityTask, QualityReport};
