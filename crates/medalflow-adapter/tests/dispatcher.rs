//! End-to-end dispatcher behavior against mock engines.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;

use medalflow_adapter::testing::{
    MockSparkEngine, MockSqlEngine, MockStatsConfig, MockStorageClient,
};
use medalflow_adapter::{AnsiQueryBuilder, Platform, ResultData};
use medalflow_common::constants::{ComputeType, EngineType, JobStatus, ResultFormat};
use medalflow_schemas::metadata::QueryMetadata;
use medalflow_schemas::operations::{
    CreateStatistics, CreateTable, Insert, Merge, Operation, OperationBody, QueryType,
};
use medalflow_schemas::{encode_operation, OperationBuilder};

fn platform_with(sql_engine: Arc<MockSqlEngine>) -> Platform {
    Platform::new(
        ComputeType::Fabric,
        Arc::new(AnsiQueryBuilder::new()),
        sql_engine,
    )
}

fn ctas(schema: &str, object: &str, select: &str) -> Operation {
    Operation::new(
        schema,
        object,
        OperationBody::CreateTable(CreateTable::from_select(select)),
    )
}

#[test]
fn successful_create_table_executes_and_wraps() {
    let engine = Arc::new(MockSqlEngine::new());
    let platform = platform_with(engine.clone());
    let operation = ctas("silver", "a", "SELECT * FROM bronze.raw_a");

    let result = platform.execute_operation(&operation, None);
    assert!(result.success, "{:?}", result.error_message);
    assert_eq!(result.operation_type, QueryType::CreateTable);
    assert_eq!(result.engine_used, Some(EngineType::Sql));
    assert_eq!(result.schema_name, "silver");
    assert!(result.query_executed.as_deref().unwrap().contains("CREATE TABLE"));
    assert_eq!(engine.executed_statements().len(), 1);
}

#[test]
fn stats_companion_follows_successful_create_table() {
    let engine = Arc::new(MockSqlEngine::new());
    let stats = MockStatsConfig::new().with_columns("silver", "p", vec!["id".to_string()]);
    let platform = platform_with(engine.clone()).with_stats_config(Arc::new(stats));

    let operation = ctas("silver", "p", "SELECT * FROM bronze.p").with_metadata(
        QueryMetadata::new(QueryType::CreateTable, "silver", "p").with_create_stats(true),
    );

    let result = platform.execute_operation(&operation, None);
    assert!(result.success);

    let statements = engine.executed_statements();
    assert_eq!(statements.len(), 2);
    assert!(statements[1].contains("CREATE STATISTICS [stats_p_auto]"));
    assert!(statements[1].contains("WITH FULLSCAN"));
}

#[test]
fn stats_companion_prefers_metadata_columns() {
    let engine = Arc::new(MockSqlEngine::new());
    let platform = platform_with(engine.clone());

    let metadata = QueryMetadata::new(QueryType::CreateTable, "silver", "p")
        .with_create_stats(true)
        .with_stats_columns(vec!["customer_id".to_string(), "order_id".to_string()]);
    let operation = ctas("silver", "p", "SELECT * FROM bronze.p").with_metadata(metadata);

    let result = platform.execute_operation(&operation, None);
    assert!(result.success);
    let statements = engine.executed_statements();
    // Extra columns are dropped; single-column statistics only.
    assert!(statements[1].contains("([customer_id])"), "{}", statements[1]);
}

#[test]
fn stats_companion_failure_leaves_primary_successful() {
    let engine = Arc::new(MockSqlEngine::new().failing_on("CREATE STATISTICS"));
    let stats = MockStatsConfig::new().with_columns("silver", "p", vec!["id".to_string()]);
    let platform = platform_with(engine.clone()).with_stats_config(Arc::new(stats));

    let operation = ctas("silver", "p", "SELECT * FROM bronze.p").with_metadata(
        QueryMetadata::new(QueryType::CreateTable, "silver", "p").with_create_stats(true),
    );

    let result = platform.execute_operation(&operation, None);
    assert!(result.success, "stats failure must not fail the parent");
}

#[test]
fn no_stats_companion_when_primary_fails() {
    let engine = Arc::new(MockSqlEngine::new().failing_on("CREATE TABLE"));
    let platform = platform_with(engine.clone());

    let operation = ctas("silver", "p", "SELECT * FROM bronze.p").with_metadata(
        QueryMetadata::new(QueryType::CreateTable, "silver", "p").with_create_stats(true),
    );

    let result = platform.execute_operation(&operation, None);
    assert!(!result.success);
    assert!(engine.executed_statements().is_empty());
}

#[test]
fn multi_column_statistics_fail_before_execution() {
    let engine = Arc::new(MockSqlEngine::new());
    let platform = platform_with(engine.clone());

    let operation = Operation::new(
        "silver",
        "p",
        OperationBody::CreateStatistics(CreateStatistics {
            columns: vec!["a".to_string(), "b".to_string()],
            ..CreateStatistics::default()
        }),
    );

    let result = platform.execute_operation(&operation, None);
    assert!(!result.success);
    let message = result.error_message.unwrap();
    assert!(message.contains("[silver].[p]"), "{message}");
    assert!(message.contains("a, b"), "{message}");
    assert!(engine.executed_statements().is_empty(), "no SQL may be issued");
}

#[test]
fn recreate_with_location_deletes_storage_first() {
    let engine = Arc::new(MockSqlEngine::new());
    let storage = Arc::new(MockStorageClient::new());
    let platform = platform_with(engine.clone()).with_storage_client(storage.clone());

    let operation = Operation::new(
        "bronze",
        "raw_events",
        OperationBody::CreateTable(CreateTable {
            select_query: Some("SELECT * FROM dbo.events".to_string()),
            recreate: true,
            location: Some("/lake/bronze/raw_events".to_string()),
            ..CreateTable::default()
        }),
    );

    let result = platform.execute_operation(&operation, None);
    assert!(result.success);
    assert_eq!(storage.deleted_paths(), vec!["/lake/bronze/raw_events".to_string()]);
    assert_eq!(engine.executed_statements().len(), 1);
}

#[test]
fn failed_storage_delete_aborts_without_sql() {
    let engine = Arc::new(MockSqlEngine::new());
    let storage = Arc::new(MockStorageClient::failing_deletes());
    let platform = platform_with(engine.clone()).with_storage_client(storage);

    let operation = Operation::new(
        "bronze",
        "raw_events",
        OperationBody::CreateTable(CreateTable {
            select_query: Some("SELECT * FROM dbo.events".to_string()),
            recreate: true,
            location: Some("/lake/bronze/raw_events".to_string()),
            ..CreateTable::default()
        }),
    );

    let result = platform.execute_operation(&operation, None);
    assert!(!result.success);
    assert_eq!(result.error_type.as_deref(), Some("DATA_DELETION_ERROR"));
    assert!(engine.executed_statements().is_empty());
}

#[test]
fn engine_selection_policy() {
    let sql_only = platform_with(Arc::new(MockSqlEngine::new()));
    let with_spark = platform_with(Arc::new(MockSqlEngine::new()))
        .with_spark_engine(Arc::new(MockSparkEngine::new()));

    let merge = Operation::new(
        "silver",
        "dim",
        OperationBody::Merge(Merge {
            source_query: "SELECT 1".to_string(),
            merge_condition: "t.id = s.id".to_string(),
            when_not_matched_by_source_delete: true,
            ..Merge::default()
        }),
    );
    // MERGE prefers spark when available, otherwise sql.
    assert_eq!(with_spark.select_engine(&merge).unwrap(), EngineType::Spark);
    assert_eq!(sql_only.select_engine(&merge).unwrap(), EngineType::Sql);

    // Statistics pin to sql even on spark-capable platforms.
    let stats = Operation::new(
        "silver",
        "t",
        OperationBody::CreateStatistics(CreateStatistics {
            columns: vec!["a".to_string()],
            ..CreateStatistics::default()
        }),
    );
    assert_eq!(with_spark.select_engine(&stats).unwrap(), EngineType::Sql);

    // A supported hint wins; an unsupported one falls back to policy.
    let hinted = merge.clone().with_engine_hint(EngineType::Sql);
    assert_eq!(with_spark.select_engine(&hinted).unwrap(), EngineType::Sql);
    let hinted = merge.clone().with_engine_hint(EngineType::Spark);
    assert_eq!(sql_only.select_engine(&hinted).unwrap(), EngineType::Sql);
}

#[test]
fn merge_runs_on_spark_and_wraps_job_outcome() {
    let spark = Arc::new(MockSparkEngine::new());
    let platform = platform_with(Arc::new(MockSqlEngine::new()))
        .with_spark_engine(spark.clone())
        .with_spark_poll_interval(Duration::ZERO);

    let merge = Operation::new(
        "silver",
        "dim_customer",
        OperationBody::Merge(Merge {
            source_query: "SELECT * FROM staging.c".to_string(),
            merge_condition: "t.id = s.id".to_string(),
            when_not_matched_by_source_delete: true,
            ..Merge::default()
        }),
    );

    let result = platform.execute_operation(&merge, None);
    assert!(result.success, "{:?}", result.error_message);
    assert_eq!(result.engine_used, Some(EngineType::Spark));

    let configs = spark.submitted_configs();
    assert_eq!(configs.len(), 1);
    assert_eq!(configs[0].job_name.as_deref(), Some("silver_dim_customer"));
    assert!(configs[0].sql.as_deref().unwrap().starts_with("MERGE INTO"));
}

#[test]
fn failed_spark_job_is_captured() {
    let spark = Arc::new(MockSparkEngine::new().ending_with(JobStatus::Failed));
    let platform = platform_with(Arc::new(MockSqlEngine::new()))
        .with_spark_engine(spark)
        .with_spark_poll_interval(Duration::ZERO);

    let merge = Operation::new(
        "silver",
        "dim",
        OperationBody::Merge(Merge {
            source_query: "SELECT 1".to_string(),
            merge_condition: "t.id = s.id".to_string(),
            when_not_matched_by_source_delete: true,
            ..Merge::default()
        }),
    );

    let result = platform.execute_operation(&merge, None);
    assert!(!result.success);
    assert!(result.error_message.unwrap().contains("failed"));
}

#[test]
fn execute_sql_result_formats() {
    let mut record = BTreeMap::new();
    record.insert("id".to_string(), serde_json::json!(7));
    let engine = Arc::new(
        MockSqlEngine::new()
            .with_scalar(serde_json::json!(42))
            .with_records(vec![record]),
    );
    let platform = platform_with(engine);

    let result = platform.execute_sql_query("SELECT COUNT(*) FROM t", true, ResultFormat::Scalar);
    assert!(result.success);
    assert_eq!(result.rows_affected, Some(1));
    assert_eq!(result.data, Some(ResultData::Scalar(serde_json::json!(42))));

    let result = platform.execute_sql_query("SELECT * FROM t", true, ResultFormat::DictList);
    assert_eq!(result.rows_affected, Some(1));
    match result.data {
        Some(ResultData::Records(records)) => assert_eq!(records[0]["id"], serde_json::json!(7)),
        other => panic!("expected records, got {other:?}"),
    }

    let result = platform.execute_sql_query("SELECT * FROM t", true, ResultFormat::Dataframe);
    assert!(matches!(result.data, Some(ResultData::Frame(_))));

    // Fire-and-forget statements carry no data.
    let result = platform.execute_sql_query("DELETE FROM t", false, ResultFormat::Dataframe);
    assert!(result.success);
    assert!(result.data.is_none());
}

#[test]
fn forbidden_sql_never_reaches_the_engine() {
    let engine = Arc::new(MockSqlEngine::new());
    let platform = platform_with(engine.clone());

    let result =
        platform.execute_sql_query("EXEC xp_cmdshell 'dir'", false, ResultFormat::Dataframe);
    assert!(!result.success);
    assert!(engine.executed_statements().is_empty());
}

#[test]
fn encoded_operations_execute_after_decode() {
    let engine = Arc::new(MockSqlEngine::new());
    let platform = platform_with(engine.clone());

    let operation = Operation::new(
        "silver",
        "b",
        OperationBody::Insert(Insert::from_source("SELECT * FROM silver.a")),
    );
    let payload = encode_operation(&operation).unwrap();

    let result = platform.execute_encoded(payload, None).unwrap();
    assert!(result.success);
    assert_eq!(result.operation_type, QueryType::Insert);
    assert_eq!(engine.executed_statements().len(), 1);
}

#[test]
fn batch_execution_aggregates_results() {
    let engine = Arc::new(MockSqlEngine::new().failing_on("silver.bad"));
    let platform = platform_with(engine);

    let good = OperationBuilder::from_discovered_sql(
        &QueryMetadata::new(QueryType::Insert, "silver", "good"),
        "SELECT * FROM bronze.x",
        None,
        BTreeMap::new(),
    )
    .unwrap();
    let bad = OperationBuilder::from_discovered_sql(
        &QueryMetadata::new(QueryType::Insert, "silver", "bad"),
        "SELECT * FROM silver.bad",
        None,
        BTreeMap::new(),
    )
    .unwrap();

    let batch = platform
        .execute_batch(
            vec![
                encode_operation(&good).unwrap(),
                encode_operation(&bad).unwrap(),
            ],
            None,
        )
        .unwrap();
    assert_eq!(batch.total_operations, 2);
    assert_eq!(batch.successful_operations, 1);
    assert_eq!(batch.failed_operations, 1);
}
