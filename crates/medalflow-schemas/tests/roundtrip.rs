//! Encode/decode identity across every operation variant.

use std::collections::BTreeMap;

use pretty_assertions::assert_eq;

use medalflow_common::constants::{EngineType, ResultFormat};
use medalflow_schemas::operations::{
    ColumnDefinition, Copy, CreateOrAlterView, CreateSchema, CreateStatistics, CreateTable,
    Delete, DropBehavior, DropSchema, DropTable, DropView, ExecuteSql, Insert, InsertMode, Merge,
    Operation, OperationBody, QueryType, Select, Update,
};
use medalflow_schemas::{QueryMetadata, decode_operation, encode_operation};

fn assignments() -> BTreeMap<String, serde_json::Value> {
    let mut map = BTreeMap::new();
    map.insert("status".to_string(), serde_json::json!("active"));
    map.insert("updated_at".to_string(), serde_json::json!("GETDATE()"));
    map
}

fn every_variant() -> Vec<Operation> {
    vec![
        Operation::new(
            "gold",
            "sales",
            OperationBody::Select(Select {
                columns: Some(vec!["region".to_string(), "total".to_string()]),
                distinct: true,
                where_clause: Some("year = 2024".to_string()),
                group_by: Some(vec!["region".to_string()]),
                having_clause: Some("SUM(total) > 0".to_string()),
                order_by: Some(vec!["region".to_string()]),
                limit: Some(100),
                offset: Some(10),
                ..Select::default()
            }),
        ),
        Operation::new(
            "silver",
            "orders",
            OperationBody::Insert(Insert {
                source_query: Some("SELECT * FROM bronze.orders".to_string()),
                mode: InsertMode::Overwrite,
                columns: Some(vec!["id".to_string(), "total".to_string()]),
                ..Insert::default()
            }),
        )
        .with_engine_hint(EngineType::Spark),
        Operation::new(
            "silver",
            "customers",
            OperationBody::Update(Update {
                set_columns: assignments(),
                where_clause: Some("is_active = 0".to_string()),
                from_clause: None,
            }),
        ),
        Operation::new(
            "silver",
            "old_rows",
            OperationBody::Delete(Delete {
                where_clause: Some("load_date < '2020-01-01'".to_string()),
            }),
        ),
        Operation::new(
            "silver",
            "dim_customer",
            OperationBody::Merge(Merge {
                source_query: "SELECT * FROM staging.customers".to_string(),
                merge_condition: "target.id = source.id".to_string(),
                when_matched_update: Some(assignments()),
                when_not_matched_by_source_delete: true,
                ..Merge::default()
            }),
        ),
        Operation::new(
            "bronze",
            "raw_events",
            OperationBody::CreateTable(CreateTable {
                select_query: Some("SELECT * FROM dbo.events".to_string()),
                recreate: true,
                location: Some("/lake/bronze/raw_events".to_string()),
                file_format: Some("parquet".to_string()),
                ..CreateTable::default()
            }),
        )
        .with_metadata(
            QueryMetadata::new(QueryType::CreateTable, "bronze", "raw_events")
                .with_create_stats(true),
        ),
        Operation::new(
            "bronze",
            "typed_events",
            OperationBody::CreateTable(CreateTable {
                columns: Some(vec![
                    ColumnDefinition::new("id", "BIGINT"),
                    ColumnDefinition {
                        nullable: false,
                        primary_key: true,
                        ..ColumnDefinition::new("event_key", "VARCHAR(64)")
                    },
                ]),
                ..CreateTable::default()
            }),
        ),
        Operation::new(
            "silver",
            "scratch",
            OperationBody::DropTable(DropTable { if_exists: true }),
        ),
        Operation::new(
            "staging",
            "staging",
            OperationBody::CreateSchema(CreateSchema {
                if_not_exists: true,
                authorization: Some("etl_owner".to_string()),
            }),
        ),
        Operation::new(
            "staging",
            "staging",
            OperationBody::DropSchema(DropSchema {
                if_exists: true,
                behavior: Some(DropBehavior::Restrict),
            }),
        ),
        Operation::new(
            "gold",
            "v_sales",
            OperationBody::CreateOrAlterView(CreateOrAlterView {
                select_query: "SELECT * FROM silver.sales".to_string(),
                columns: Some(vec!["region".to_string(), "total".to_string()]),
                with_schemabinding: true,
            }),
        ),
        Operation::new(
            "gold",
            "v_sales",
            OperationBody::DropView(DropView { if_exists: true }),
        ),
        Operation::new(
            "silver",
            "orders",
            OperationBody::CreateStatistics(CreateStatistics {
                columns: vec!["customer_id".to_string()],
                stats_name: Some("stat_orders_customer_id".to_string()),
                sample_percent: Some(20),
                ..CreateStatistics::default()
            }),
        ),
        Operation::new(
            "bronze",
            "imports",
            OperationBody::Copy(Copy {
                source_path: "/lake/incoming/imports".to_string(),
                file_format: Some("csv".to_string()),
                ..Copy::default()
            }),
        ),
        Operation::new(
            "",
            "",
            OperationBody::ExecuteSql(ExecuteSql {
                sql: "SELECT COUNT(*) FROM silver.orders".to_string(),
                returns_results: true,
                result_format: ResultFormat::Scalar,
                limit: Some(1),
            }),
        )
        .with_logging_context([("method", "row_count_check")]),
    ]
}

#[test]
fn every_variant_round_trips() {
    let operations = every_variant();
    // One operation per variant of the sum type.
    let kinds: std::collections::BTreeSet<String> = operations
        .iter()
        .map(|op| op.operation_type().to_string())
        .collect();
    assert_eq!(kinds.len(), 14);

    for operation in operations {
        let encoded = encode_operation(&operation).unwrap();
        assert_eq!(
            encoded["operation_type"],
            operation.operation_type().to_string(),
            "tag mismatch for {:?}",
            operation.operation_type()
        );
        let decoded = decode_operation(encoded).unwrap();
        assert_eq!(decoded, operation);
    }
}

#[test]
fn defaults_are_elided_and_restored() {
    let operation = Operation::new(
        "silver",
        "t",
        OperationBody::Delete(Delete { where_clause: None }),
    );
    let encoded = encode_operation(&operation).unwrap();
    // Absent options are absent, not null.
    assert!(encoded.get("where_clause").is_none());
    assert!(encoded.get("engine_hint").is_none());
    assert!(encoded.get("metadata").is_none());
    let decoded = decode_operation(encoded).unwrap();
    assert_eq!(decoded, operation);
}
