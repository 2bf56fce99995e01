//! Execution result types and Spark job configuration.

use std::collections::BTreeMap;

use arrow_array::RecordBatch;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use medalflow_common::constants::{EngineType, JobStatus};
use medalflow_error::{FlowResult, validation_error};
use medalflow_schemas::operations::{Operation, QueryType};

use crate::engines::Record;

/// Data payload of a fetching operation. Shape follows the requested
/// result format. Not serialized; results travel with their worker.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultData {
    Frame(RecordBatch),
    Records(Vec<Record>),
    Scalar(serde_json::Value),
}

impl ResultData {
    /// Row count of the payload; `1`/`0` for scalar presence.
    pub fn row_count(&self) -> usize {
        match self {
            ResultData::Frame(batch) => batch.num_rows(),
            ResultData::Records(records) => records.len(),
            ResultData::Scalar(value) => usize::from(!value.is_null()),
        }
    }
}

/// Outcome of one dispatched operation. Failures are values, not errors:
/// the dispatcher never lets an execution exception escape.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationResult {
    pub success: bool,
    pub operation_type: QueryType,
    pub schema_name: String,
    pub object_name: String,
    pub duration_seconds: f64,
    pub rows_affected: Option<u64>,
    #[serde(skip)]
    pub data: Option<ResultData>,
    pub error_message: Option<String>,
    pub error_type: Option<String>,
    pub engine_used: Option<EngineType>,
    pub query_executed: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub statistics: BTreeMap<String, serde_json::Value>,
}

impl OperationResult {
    pub fn success(operation: &Operation) -> Self {
        Self {
            success: true,
            operation_type: operation.operation_type(),
            schema_name: operation.schema_name.clone(),
            object_name: operation.object_name.clone(),
            duration_seconds: 0.0,
            rows_affected: None,
            data: None,
            error_message: None,
            error_type: None,
            engine_used: None,
            query_executed: None,
            statistics: BTreeMap::new(),
        }
    }

    pub fn failure(
        operation: &Operation,
        error_message: impl Into<String>,
        error_type: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            error_message: Some(error_message.into()),
            error_type: Some(error_type.into()),
            ..Self::success(operation)
        }
    }

    pub fn full_object_name(&self) -> String {
        format!("{}.{}", self.schema_name, self.object_name)
    }
}

/// Aggregate outcome of a batch of operations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchOperationResult {
    pub total_operations: usize,
    pub successful_operations: usize,
    pub failed_operations: usize,
    pub results: Vec<OperationResult>,
    pub total_duration_seconds: f64,
    pub used_transaction: bool,
}

impl BatchOperationResult {
    /// Build from per-operation results, deriving the counters.
    pub fn from_results(results: Vec<OperationResult>, total_duration_seconds: f64) -> Self {
        let successful_operations = results.iter().filter(|r| r.success).count();
        Self {
            total_operations: results.len(),
            successful_operations,
            failed_operations: results.len() - successful_operations,
            results,
            total_duration_seconds,
            used_transaction: false,
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_operations == 0 {
            return 0.0;
        }
        (self.successful_operations as f64 / self.total_operations as f64) * 100.0
    }
}

static MEMORY_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+[kmg]$").expect("memory size pattern"));

/// Configuration for a submitted Spark job. For SQL-backed batch jobs the
/// statement rides in `sql`.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SparkJobConfig {
    pub job_name: Option<String>,
    pub sql: Option<String>,
    pub executor_size: Option<String>,
    pub executor_count: Option<u32>,
    pub driver_memory: Option<String>,
    pub executor_memory: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u8,
    pub timeout_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub spark_conf: BTreeMap<String, serde_json::Value>,
}

fn default_max_retries() -> u8 {
    3
}

impl SparkJobConfig {
    pub fn for_sql(job_name: &str, sql: &str) -> Self {
        Self {
            job_name: Some(job_name.to_string()),
            sql: Some(sql.to_string()),
            max_retries: default_max_retries(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> FlowResult<()> {
        for (field, value) in [
            ("driver_memory", &self.driver_memory),
            ("executor_memory", &self.executor_memory),
        ] {
            if let Some(memory) = value {
                if !MEMORY_PATTERN.is_match(memory) {
                    return Err(validation_error(
                        format!("{field} must match <number>[kmg], got '{memory}'"),
                        Some(field),
                        Some(memory),
                    ));
                }
            }
        }
        if self.max_retries > 10 {
            return Err(validation_error(
                "max_retries must be at most 10",
                Some("max_retries"),
                Some(&self.max_retries.to_string()),
            ));
        }
        if self.executor_count == Some(0) {
            return Err(validation_error(
                "executor_count must be greater than zero",
                Some("executor_count"),
                Some("0"),
            ));
        }
        Ok(())
    }
}

/// Result of a Spark job run.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: String,
    pub status: JobStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_seconds: Option<f64>,
    pub error_message: Option<String>,
    pub output_location: Option<String>,
    pub rows_processed: Option<u64>,
}

impl JobResult {
    pub fn new(job_id: &str, status: JobStatus, start_time: DateTime<Utc>) -> Self {
        Self {
            job_id: job_id.to_string(),
            status,
            start_time,
            end_time: None,
            duration_seconds: None,
            error_message: None,
            output_location: None,
            rows_processed: None,
        }
    }

    /// Record the end time and back-fill the duration when absent.
    pub fn finish(mut self, end_time: DateTime<Utc>) -> Self {
        self.end_time = Some(end_time);
        if self.duration_seconds.is_none() {
            let delta = end_time.signed_duration_since(self.start_time);
            self.duration_seconds = Some(delta.num_milliseconds() as f64 / 1000.0);
        }
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Succeeded
    }
}
