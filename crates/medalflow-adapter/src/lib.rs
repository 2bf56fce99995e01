//! Platform adapter layer: the contract between the planning core and a
//! concrete warehouse backend.
//!
//! A platform is the trio of query builder (renders operations to SQL),
//! SQL engine, and optional Spark engine, plus an optional storage client
//! for pre-DDL side effects. The [`platform::Platform`] dispatcher wires
//! them together: it selects an engine, renders, executes, and wraps the
//! outcome into an [`results::OperationResult`]. Execution errors are
//! captured, never raised past it.

pub mod ansi_builder;
pub mod engines;
pub mod platform;
pub mod query_builder;
pub mod results;
pub mod testing;

pub use ansi_builder::AnsiQueryBuilder;
pub use engines::{SparkEngine, SqlEngine, StatsConfigSource, StorageClient};
pub use platform::Platform;
pub use query_builder::QueryBuilder;
pub use results::{BatchOperationResult, JobResult, OperationResult, ResultData, SparkJobConfig};
