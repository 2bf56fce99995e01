//! Engine and side-effect contracts implemented by concrete platforms.
//!
//! The core never opens connections or submits jobs itself; it drives these
//! traits. Connection pooling, retries, and ODBC/Livy specifics are the
//! implementer's business. Telemetry maps passed in are flattened string
//! fields for log enrichment.

use std::collections::BTreeMap;

use arrow_array::RecordBatch;

use medalflow_common::constants::JobStatus;
use medalflow_error::FlowResult;

use crate::results::{JobResult, SparkJobConfig};

pub type Telemetry = BTreeMap<String, String>;
pub type Record = BTreeMap<String, serde_json::Value>;

/// Set-based SQL execution.
pub trait SqlEngine: Send + Sync {
    /// Execute a statement without fetching results.
    fn execute(&self, sql: &str, telemetry: &Telemetry) -> FlowResult<()>;

    /// Execute a query and fetch the full result as a record batch.
    fn fetch_dataframe(&self, sql: &str, telemetry: &Telemetry) -> FlowResult<RecordBatch>;

    /// Execute a query returning a single value (COUNT, MAX, ...).
    fn fetch_scalar(&self, sql: &str, telemetry: &Telemetry) -> FlowResult<serde_json::Value>;

    /// Execute a query and fetch all rows as records.
    fn fetch_all(&self, sql: &str, telemetry: &Telemetry) -> FlowResult<Vec<Record>>;

    /// Execute statements sequentially on one connection.
    fn execute_batch(&self, statements: &[String], telemetry: &Telemetry) -> FlowResult<()>;

    fn test_connection(&self) -> bool;
}

/// Distributed job execution. Jobs are fire-and-poll: `submit` returns a
/// job id, `status` is polled until terminal, `result` fetches the outcome.
pub trait SparkEngine: Send + Sync {
    fn submit(&self, config: &SparkJobConfig) -> FlowResult<String>;
    fn status(&self, job_id: &str) -> FlowResult<JobStatus>;
    fn result(&self, job_id: &str) -> FlowResult<JobResult>;
    fn cancel(&self, job_id: &str) -> FlowResult<bool>;
    fn available(&self) -> bool;
}

/// Object-store side effects needed before DDL: `CREATE TABLE` with
/// `recreate` and an external `location` deletes the backing directory
/// before the statement is issued.
pub trait StorageClient: Send + Sync {
    fn delete_path(&self, path: &str) -> FlowResult<()>;
    fn path_exists(&self, path: &str) -> FlowResult<bool>;
}

/// External source of per-table statistics columns, consulted when a
/// `CREATE_STATISTICS` operation asks for auto-discovery. Optional
/// collaborator; the default implementation resolves nothing.
pub trait StatsConfigSource: Send + Sync {
    fn stats_columns(&self, schema_name: &str, table_name: &str) -> Option<Vec<String>>;
}

/// No-op default used when no stats configuration is injected.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoStatsConfig;

impl StatsConfigSource for NoStatsConfig {
    fn stats_columns(&self, _schema_name: &str, _table_name: &str) -> Option<Vec<String>> {
        None
    }
}
