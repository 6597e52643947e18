//! Incrementally-maintained summary tables for MySQL/MariaDB.
//!
//! Give [`SummaryDriver::generate`] a `SELECT … FROM base [WHERE …]
//! GROUP BY …` with `SUM`/`COUNT(*)` aggregates and it returns the
//! artifacts for a physical summary table: the `CREATE TABLE` DDL and
//! three `AFTER` row triggers that apply signed deltas.
//! [`SummaryDriver::apply`] installs the triggers under a short write
//! lock and backfills
//! history in concurrent PK-range chunks, after which the summary tracks
//! the query exactly.

pub mod backfill;
pub mod defaults;
pub mod driver;
pub mod error;
pub mod generator;
pub mod introspection;
pub mod models;
pub mod parsing;

pub use driver::SummaryDriver;
pub use error::{Error, Result};
pub use models::{
    Aggregate, AggregateFunc, AnalyzedQuery, Artifacts, BackfillContext, BackfillSnapshot,
    MaterializeConfig, TriggerSet,
};
