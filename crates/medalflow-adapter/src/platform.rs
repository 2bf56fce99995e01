//! The execution dispatcher.
//!
//! Consumes decoded operations and drives the platform adapter: selects an
//! engine per policy, renders SQL through the query builder, executes, and
//! wraps the outcome. Per-operation failures are captured into
//! [`OperationResult`] values and never raised past the dispatcher.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use medalflow_common::constants::{ComputeType, EngineType, ResultFormat};
use medalflow_error::{ErrorCode, FlowError, FlowResult};
use medalflow_schemas::decode_operation;
use medalflow_schemas::operations::{
    CreateStatistics, Operation, OperationBody, QueryType,
};

use crate::engines::{
    NoStatsConfig, SparkEngine, SqlEngine, StatsConfigSource, StorageClient, Telemetry,
};
use crate::query_builder::QueryBuilder;
use crate::results::{BatchOperationResult, OperationResult, ResultData, SparkJobConfig};

const DEFAULT_SPARK_TIMEOUT_SECS: u64 = 3600;

/// A concrete compute target: query builder + engines + optional
/// collaborators, with the dispatch logic on top.
pub struct Platform {
    compute_type: ComputeType,
    supported_engines: Vec<EngineType>,
    query_builder: Arc<dyn QueryBuilder>,
    sql_engine: Arc<dyn SqlEngine>,
    spark_engine: Option<Arc<dyn SparkEngine>>,
    storage: Option<Arc<dyn StorageClient>>,
    stats_config: Arc<dyn StatsConfigSource>,
    spark_poll_interval: Duration,
}

impl Platform {
    pub fn new(
        compute_type: ComputeType,
        query_builder: Arc<dyn QueryBuilder>,
        sql_engine: Arc<dyn SqlEngine>,
    ) -> Self {
        Self {
            compute_type,
            supported_engines: vec![EngineType::Sql],
            query_builder,
            sql_engine,
            spark_engine: None,
            storage: None,
            stats_config: Arc::new(NoStatsConfig),
            spark_poll_interval: Duration::from_millis(500),
        }
    }

    pub fn with_spark_engine(mut self, spark_engine: Arc<dyn SparkEngine>) -> Self {
        if !self.supported_engines.contains(&EngineType::Spark) {
            self.supported_engines.push(EngineType::Spark);
        }
        self.spark_engine = Some(spark_engine);
        self
    }

    pub fn with_storage_client(mut self, storage: Arc<dyn StorageClient>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_stats_config(mut self, stats_config: Arc<dyn StatsConfigSource>) -> Self {
        self.stats_config = stats_config;
        self
    }

    /// Polling cadence for Spark job status. Tests set this to zero.
    pub fn with_spark_poll_interval(mut self, interval: Duration) -> Self {
        self.spark_poll_interval = interval;
        self
    }

    pub fn name(&self) -> ComputeType {
        self.compute_type
    }

    pub fn supported_engines(&self) -> &[EngineType] {
        &self.supported_engines
    }

    /// Engine selection policy:
    /// 1. An explicit supported hint wins (unsupported hints log and fall
    ///    through to AUTO).
    /// 2. Statistics, schema DDL, and views always run on SQL.
    /// 3. MERGE and COPY prefer Spark when the platform has it.
    /// 4. Otherwise SQL, falling back to whatever the platform supports.
    pub fn select_engine(&self, operation: &Operation) -> FlowResult<EngineType> {
        if let Some(hint) = operation.engine_hint {
            if hint != EngineType::Auto {
                if self.supported_engines.contains(&hint) {
                    return Ok(hint);
                }
                warn!(
                    engine = %hint,
                    operation = %operation.qualified_name(),
                    "requested engine not available, using AUTO"
                );
            }
        }

        match operation.operation_type() {
            QueryType::CreateStatistics | QueryType::CreateSchema | QueryType::CreateOrAlterView => {
                return Ok(EngineType::Sql);
            }
            QueryType::Merge | QueryType::Copy => {
                if self.supported_engines.contains(&EngineType::Spark) {
                    return Ok(EngineType::Spark);
                }
            }
            _ => {}
        }

        if self.supported_engines.contains(&EngineType::Sql) {
            return Ok(EngineType::Sql);
        }
        self.supported_engines
            .iter()
            .find(|e| **e != EngineType::Auto)
            .copied()
            .ok_or_else(|| {
                FlowError::new(
                    ErrorCode::EngineNotAvailable,
                    format!("no engines available for platform {}", self.compute_type),
                )
            })
    }

    /// Execute a decoded operation. The result is always a value; errors
    /// along any step (side effects, rendering, execution) mark it failed.
    pub fn execute_operation(
        &self,
        operation: &Operation,
        telemetry: Option<&Telemetry>,
    ) -> OperationResult {
        let started = Instant::now();
        let mut payload: Telemetry = telemetry.cloned().unwrap_or_default();
        payload.extend(operation.telemetry_fields());
        if let Some(ctx) = &operation.context {
            for (key, value) in ctx.telemetry_base() {
                payload.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }

        let engine_type = match self.select_engine(operation) {
            Ok(engine_type) => engine_type,
            Err(e) => {
                return self.failed(operation, started, None, &e);
            }
        };

        // External side effect before DDL: recreate of a located table
        // deletes the backing storage first. A failed delete aborts.
        if let Err(e) = self.prepare_recreate_storage(operation, &payload) {
            return self.failed(operation, started, None, &e);
        }

        let query = match self.query_builder.build_query(operation) {
            Ok(query) => query,
            Err(e) => {
                // Builder validation failures are fatal for the operation;
                // nothing is executed.
                return self.failed(operation, started, None, &e);
            }
        };

        let mut result = match engine_type {
            EngineType::Spark => self.execute_with_spark(&query, operation, &payload),
            _ => self.execute_with_sql(&query, operation, &payload),
        };
        result.duration_seconds = started.elapsed().as_secs_f64();
        result.engine_used = Some(engine_type);

        if result.success {
            self.maybe_create_statistics(operation, &payload);
        }

        result
    }

    /// Decode an encoded operation payload and execute it.
    pub fn execute_encoded(
        &self,
        payload: serde_json::Value,
        telemetry: Option<&Telemetry>,
    ) -> FlowResult<OperationResult> {
        let operation = decode_operation(payload)?;
        Ok(self.execute_operation(&operation, telemetry))
    }

    /// Execute a batch of encoded operations sequentially.
    pub fn execute_batch(
        &self,
        payloads: Vec<serde_json::Value>,
        telemetry: Option<&Telemetry>,
    ) -> FlowResult<BatchOperationResult> {
        let started = Instant::now();
        let mut results = Vec::with_capacity(payloads.len());
        for payload in payloads {
            results.push(self.execute_encoded(payload, telemetry)?);
        }
        Ok(BatchOperationResult::from_results(
            results,
            started.elapsed().as_secs_f64(),
        ))
    }

    /// Convenience wrapper for running raw SQL.
    pub fn execute_sql_query(
        &self,
        sql: &str,
        return_results: bool,
        result_format: ResultFormat,
    ) -> OperationResult {
        let operation = Operation::new(
            "",
            "",
            OperationBody::ExecuteSql(medalflow_schemas::operations::ExecuteSql {
                sql: sql.to_string(),
                returns_results: return_results,
                result_format,
                limit: None,
            }),
        );
        self.execute_operation(&operation, None)
    }

    /// Probe each supported engine's connectivity.
    pub fn test_connection(&self) -> BTreeMap<String, bool> {
        let mut results = BTreeMap::new();
        if self.supported_engines.contains(&EngineType::Sql) {
            results.insert("sql".to_string(), self.sql_engine.test_connection());
        }
        if let Some(spark_engine) = &self.spark_engine {
            results.insert("spark".to_string(), spark_engine.available());
        }
        results
    }

    fn prepare_recreate_storage(
        &self,
        operation: &Operation,
        telemetry: &Telemetry,
    ) -> FlowResult<()> {
        let OperationBody::CreateTable(body) = &operation.body else {
            return Ok(());
        };
        let Some(location) = body.location.as_deref().filter(|_| body.recreate) else {
            return Ok(());
        };

        let storage = self.storage.as_ref().ok_or_else(|| {
            FlowError::new(
                ErrorCode::DataDeletionError,
                format!(
                    "cannot recreate {}: no storage client configured to delete '{location}'",
                    operation.qualified_name()
                ),
            )
        })?;
        storage.delete_path(location).map_err(|e| {
            FlowError::new(
                ErrorCode::DataDeletionError,
                format!(
                    "failed to delete storage at '{location}' before recreating {}",
                    operation.qualified_name()
                ),
            )
            .with_cause("FlowError", e.to_string())
        })?;
        info!(
            location,
            table = %operation.qualified_name(),
            request_id = telemetry.get("request_id").map(String::as_str).unwrap_or(""),
            "deleted backing storage before recreate"
        );
        Ok(())
    }

    fn execute_with_sql(
        &self,
        query: &str,
        operation: &Operation,
        telemetry: &Telemetry,
    ) -> OperationResult {
        let fetches = match &operation.body {
            OperationBody::ExecuteSql(body) if body.returns_results => Some(body.result_format),
            _ => None,
        };

        let outcome: FlowResult<(Option<ResultData>, Option<u64>)> = match fetches {
            Some(ResultFormat::DictList) => self
                .sql_engine
                .fetch_all(query, telemetry)
                .map(|records| {
                    let rows = records.len() as u64;
                    (Some(ResultData::Records(records)), Some(rows))
                }),
            Some(ResultFormat::Scalar) => self
                .sql_engine
                .fetch_scalar(query, telemetry)
                .map(|value| {
                    let rows = u64::from(!value.is_null());
                    (Some(ResultData::Scalar(value)), Some(rows))
                }),
            Some(ResultFormat::Dataframe) => self
                .sql_engine
                .fetch_dataframe(query, telemetry)
                .map(|batch| {
                    let rows = batch.num_rows() as u64;
                    (Some(ResultData::Frame(batch)), Some(rows))
                }),
            None => self.sql_engine.execute(query, telemetry).map(|()| (None, None)),
        };

        match outcome {
            Ok((data, rows_affected)) => {
                let mut result = OperationResult::success(operation);
                result.data = data;
                result.rows_affected = rows_affected;
                result.query_executed = Some(query.to_string());
                result
            }
            Err(e) => {
                let mut result =
                    OperationResult::failure(operation, e.to_string(), e.code().name());
                result.query_executed = Some(query.to_string());
                result
            }
        }
    }

    fn execute_with_spark(
        &self,
        query: &str,
        operation: &Operation,
        telemetry: &Telemetry,
    ) -> OperationResult {
        let Some(spark_engine) = self.spark_engine.as_ref() else {
            return OperationResult::failure(
                operation,
                "Spark engine not configured for this platform",
                ErrorCode::EngineNotAvailable.name(),
            );
        };

        let job_name = format!("{}_{}", operation.schema_name, operation.object_name);
        let config = SparkJobConfig::for_sql(&job_name, query);

        match self.run_spark_job(spark_engine.as_ref(), &config) {
            Ok(job_result) => {
                if job_result.is_success() {
                    let mut result = OperationResult::success(operation);
                    result.rows_affected = job_result.rows_processed;
                    result.query_executed = Some(query.to_string());
                    result
                } else {
                    let message = job_result
                        .error_message
                        .unwrap_or_else(|| format!("spark job ended as {}", job_result.status));
                    let mut result = OperationResult::failure(
                        operation,
                        message,
                        ErrorCode::ExecutionError.name(),
                    );
                    result.query_executed = Some(query.to_string());
                    result
                }
            }
            Err(e) => {
                warn!(
                    job = job_name,
                    error = %e,
                    request_id = telemetry.get("request_id").map(String::as_str).unwrap_or(""),
                    "spark job failed"
                );
                let mut result =
                    OperationResult::failure(operation, e.to_string(), e.code().name());
                result.query_executed = Some(query.to_string());
                result
            }
        }
    }

    fn run_spark_job(
        &self,
        engine: &dyn SparkEngine,
        config: &SparkJobConfig,
    ) -> FlowResult<crate::results::JobResult> {
        config.validate()?;
        let job_id = engine.submit(config)?;
        let timeout = Duration::from_secs(
            config.timeout_seconds.unwrap_or(DEFAULT_SPARK_TIMEOUT_SECS),
        );
        let started = Instant::now();

        loop {
            let status = engine.status(&job_id)?;
            if status.is_terminal() {
                return engine.result(&job_id);
            }
            if started.elapsed() > timeout {
                engine.cancel(&job_id)?;
                return Err(FlowError::new(
                    ErrorCode::TimeoutError,
                    format!("spark job {job_id} timed out after {}s", timeout.as_secs()),
                ));
            }
            std::thread::sleep(self.spark_poll_interval);
        }
    }

    /// Auto-chain a statistics companion after a successful CREATE TABLE
    /// whose metadata asks for it. Companion failures are logged only.
    fn maybe_create_statistics(&self, operation: &Operation, telemetry: &Telemetry) {
        if operation.operation_type() != QueryType::CreateTable {
            return;
        }
        let wants_stats = operation
            .metadata
            .as_ref()
            .map(|m| m.create_stats)
            .unwrap_or(false);
        if !wants_stats {
            return;
        }

        let mut stats_body = CreateStatistics {
            stats_name: Some(format!("stats_{}_auto", operation.object_name)),
            with_fullscan: true,
            auto_discover: true,
            ..CreateStatistics::default()
        };
        self.resolve_stats_columns(operation, &mut stats_body);

        let stats_op = Operation::new(
            &operation.schema_name,
            &operation.object_name,
            OperationBody::CreateStatistics(stats_body),
        );
        let mut stats_telemetry = telemetry.clone();
        stats_telemetry.extend(stats_op.telemetry_fields());

        match self.query_builder.build_query(&stats_op) {
            Ok(stats_query) => {
                match self.sql_engine.execute(&stats_query, &stats_telemetry) {
                    Ok(()) => info!(
                        table = %operation.qualified_name(),
                        "successfully created statistics"
                    ),
                    Err(e) => warn!(
                        table = %operation.qualified_name(),
                        error = %e,
                        "failed to create statistics"
                    ),
                }
            }
            Err(e) => warn!(
                table = %operation.qualified_name(),
                error = %e,
                "error creating statistics"
            ),
        }
    }

    /// Resolve the statistics column for an auto-discovery op: explicit
    /// stats columns on the parent's metadata win, then the injected stats
    /// config. Single-column targets only; extras are dropped with a log.
    fn resolve_stats_columns(&self, operation: &Operation, stats_body: &mut CreateStatistics) {
        let from_metadata = operation
            .metadata
            .as_ref()
            .and_then(|m| m.stats_columns.clone())
            .filter(|columns| !columns.is_empty());
        let resolved = from_metadata.or_else(|| {
            self.stats_config
                .stats_columns(&operation.schema_name, &operation.object_name)
        });

        if let Some(mut columns) = resolved {
            if columns.len() > 1 {
                warn!(
                    table = %operation.qualified_name(),
                    dropped = columns.len() - 1,
                    "multiple statistics columns resolved, keeping the first"
                );
                columns.truncate(1);
            }
            stats_body.columns = columns;
        }
    }

    fn failed(
        &self,
        operation: &Operation,
        started: Instant,
        query: Option<&str>,
        error: &FlowError,
    ) -> OperationResult {
        let mut result = OperationResult::failure(
            operation,
            error.to_string(),
            error.code().name(),
        );
        result.duration_seconds = started.elapsed().as_secs_f64();
        result.query_executed = query.map(str::to_string);
        result
    }
}
