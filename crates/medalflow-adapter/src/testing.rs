//! Mock engines and collaborators.
//!
//! Shipped in the crate proper (not behind `cfg(test)`) so downstream
//! crates can drive the dispatcher without a warehouse, mirroring how the
//! planner's own tests execute plans end to end.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use arrow_array::RecordBatch;
use arrow_schema::Schema;
use chrono::Utc;

use medalflow_common::constants::JobStatus;
use medalflow_error::{ErrorCode, FlowError, FlowResult};

use crate::engines::{Record, SparkEngine, SqlEngine, StatsConfigSource, StorageClient, Telemetry};
use crate::results::{JobResult, SparkJobConfig};

/// In-memory SQL engine recording every statement it runs. Optionally
/// fails statements containing a configured fragment.
#[derive(Debug, Default)]
pub struct MockSqlEngine {
    executed: Mutex<Vec<String>>,
    fail_on: Option<String>,
    scalar: Option<serde_json::Value>,
    records: Vec<Record>,
}

impl MockSqlEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail any statement containing `fragment`.
    pub fn failing_on(mut self, fragment: &str) -> Self {
        self.fail_on = Some(fragment.to_string());
        self
    }

    pub fn with_scalar(mut self, value: serde_json::Value) -> Self {
        self.scalar = Some(value);
        self
    }

    pub fn with_records(mut self, records: Vec<Record>) -> Self {
        self.records = records;
        self
    }

    pub fn executed_statements(&self) -> Vec<String> {
        self.executed.lock().expect("mock engine lock").clone()
    }

    fn run(&self, sql: &str) -> FlowResult<()> {
        if let Some(fragment) = &self.fail_on {
            if sql.contains(fragment.as_str()) {
                return Err(FlowError::new(
                    ErrorCode::QueryExecutionError,
                    format!("mock engine failed statement containing '{fragment}'"),
                ));
            }
        }
        self.executed
            .lock()
            .expect("mock engine lock")
            .push(sql.to_string());
        Ok(())
    }
}

impl SqlEngine for MockSqlEngine {
    fn execute(&self, sql: &str, _telemetry: &Telemetry) -> FlowResult<()> {
        self.run(sql)
    }

    fn fetch_dataframe(&self, sql: &str, _telemetry: &Telemetry) -> FlowResult<RecordBatch> {
        self.run(sql)?;
        Ok(RecordBatch::new_empty(Arc::new(Schema::empty())))
    }

    fn fetch_scalar(&self, sql: &str, _telemetry: &Telemetry) -> FlowResult<serde_json::Value> {
        self.run(sql)?;
        Ok(self.scalar.clone().unwrap_or(serde_json::json!(1)))
    }

    fn fetch_all(&self, sql: &str, _telemetry: &Telemetry) -> FlowResult<Vec<Record>> {
        self.run(sql)?;
        Ok(self.records.clone())
    }

    fn execute_batch(&self, statements: &[String], telemetry: &Telemetry) -> FlowResult<()> {
        for statement in statements {
            self.execute(statement, telemetry)?;
        }
        Ok(())
    }

    fn test_connection(&self) -> bool {
        true
    }
}

/// Spark engine whose jobs complete immediately with a configured status.
#[derive(Debug)]
pub struct MockSparkEngine {
    submitted: Mutex<Vec<SparkJobConfig>>,
    next_job_id: AtomicU64,
    final_status: JobStatus,
}

impl Default for MockSparkEngine {
    fn default() -> Self {
        Self {
            submitted: Mutex::new(Vec::new()),
            next_job_id: AtomicU64::new(1),
            final_status: JobStatus::Succeeded,
        }
    }
}

impl MockSparkEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ending_with(mut self, status: JobStatus) -> Self {
        self.final_status = status;
        self
    }

    pub fn submitted_configs(&self) -> Vec<SparkJobConfig> {
        self.submitted.lock().expect("mock spark lock").clone()
    }
}

impl SparkEngine for MockSparkEngine {
    fn submit(&self, config: &SparkJobConfig) -> FlowResult<String> {
        self.submitted
            .lock()
            .expect("mock spark lock")
            .push(config.clone());
        let id = self.next_job_id.fetch_add(1, Ordering::SeqCst);
        Ok(format!("spark-job-{id}"))
    }

    fn status(&self, _job_id: &str) -> FlowResult<JobStatus> {
        Ok(self.final_status)
    }

    fn result(&self, job_id: &str) -> FlowResult<JobResult> {
        let now = Utc::now();
        let mut result = JobResult::new(job_id, self.final_status, now).finish(now);
        if self.final_status != JobStatus::Succeeded {
            result.error_message = Some(format!("mock spark job ended as {}", self.final_status));
        }
        Ok(result)
    }

    fn cancel(&self, _job_id: &str) -> FlowResult<bool> {
        Ok(true)
    }

    fn available(&self) -> bool {
        true
    }
}

/// Storage client recording deletions; optionally refuses them.
#[derive(Debug, Default)]
pub struct MockStorageClient {
    deleted: Mutex<Vec<String>>,
    fail_deletes: bool,
}

impl MockStorageClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_deletes() -> Self {
        Self {
            deleted: Mutex::new(Vec::new()),
            fail_deletes: true,
        }
    }

    pub fn deleted_paths(&self) -> Vec<String> {
        self.deleted.lock().expect("mock storage lock").clone()
    }
}

impl StorageClient for MockStorageClient {
    fn delete_path(&self, path: &str) -> FlowResult<()> {
        if self.fail_deletes {
            return Err(FlowError::new(
                ErrorCode::DataDeletionError,
                format!("mock storage refused to delete '{path}'"),
            ));
        }
        self.deleted
            .lock()
            .expect("mock storage lock")
            .push(path.to_string());
        Ok(())
    }

    fn path_exists(&self, path: &str) -> FlowResult<bool> {
        Ok(!self.deleted_paths().iter().any(|p| p == path))
    }
}

/// Stats config backed by a static map keyed on `schema.table`.
#[derive(Debug, Default)]
pub struct MockStatsConfig {
    columns: HashMap<String, Vec<String>>,
}

impl MockStatsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_columns(mut self, schema: &str, table: &str, columns: Vec<String>) -> Self {
        self.columns.insert(format!("{schema}.{table}"), columns);
        self
    }
}

impl StatsConfigSource for MockStatsConfig {
    fn stats_columns(&self, schema_name: &str, table_name: &str) -> Option<Vec<String>> {
        self.columns
            .get(&format!("{schema_name}.{table_name}"))
            .cloned()
    }
}
