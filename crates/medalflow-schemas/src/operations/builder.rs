//! Operation construction and the wire codec.
//!
//! The encoded form is a flat JSON object: `operation_type` tag, common
//! attributes, variant fields, and (when the operation was attached to a
//! stage during plan emission) the staging keys `_cte_stage`,
//! `_cte_position`, and `_cte_request_context`. Nulls are omitted.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::warn;

use medalflow_common::constants::EngineType;
use medalflow_common::observability::ExecutionRequestContext;
use medalflow_error::{FlowResult, validation_error};

use crate::metadata::QueryMetadata;
use crate::operations::{ExecuteSql, Operation, OperationBody, QueryType};

pub const STAGE_KEY: &str = "_cte_stage";
pub const POSITION_KEY: &str = "_cte_position";
pub const REQUEST_CONTEXT_KEY: &str = "_cte_request_context";

/// Central factory for operations, mirroring the wire codec: every
/// constructed operation passes the same validation as a decoded one.
pub struct OperationBuilder;

impl OperationBuilder {
    /// Build an operation of the given type from variant-specific `fields`.
    pub fn create_operation(
        query_type: QueryType,
        schema_name: &str,
        object_name: &str,
        engine_hint: Option<EngineType>,
        logging_context: BTreeMap<String, String>,
        metadata: Option<QueryMetadata>,
        fields: serde_json::Map<String, Value>,
    ) -> FlowResult<Operation> {
        let mut map = fields;
        map.insert(
            "operation_type".to_string(),
            serde_json::to_value(query_type).expect("query type tag"),
        );
        map.insert("schema_name".to_string(), Value::from(schema_name));
        map.insert("object_name".to_string(), Value::from(object_name));
        if let Some(hint) = engine_hint {
            map.insert(
                "engine_hint".to_string(),
                serde_json::to_value(hint).expect("engine hint tag"),
            );
        }
        if !logging_context.is_empty() {
            map.insert(
                "logging_context".to_string(),
                serde_json::to_value(logging_context).expect("logging context map"),
            );
        }
        if let Some(metadata) = metadata {
            let value = serde_json::to_value(metadata).map_err(|e| {
                validation_error("invalid query metadata", Some("metadata"), None).caused_by(&e)
            })?;
            map.insert("metadata".to_string(), value);
        }
        decode_operation(Value::Object(map))
    }

    /// Package a discovered SQL string with its declared metadata into an
    /// operation. The SQL lands in the field the operation type expects.
    pub fn from_discovered_sql(
        metadata: &QueryMetadata,
        sql: &str,
        engine_hint: Option<EngineType>,
        logging_context: BTreeMap<String, String>,
    ) -> FlowResult<Operation> {
        let query_type = metadata.query_type.ok_or_else(|| {
            validation_error(
                "query metadata is missing an operation type",
                Some("type"),
                None,
            )
        })?;

        let mut fields = serde_json::Map::new();
        match query_type {
            QueryType::CreateTable | QueryType::CreateOrAlterView => {
                fields.insert("select_query".to_string(), Value::from(sql));
            }
            QueryType::Insert | QueryType::Merge => {
                fields.insert("source_query".to_string(), Value::from(sql));
            }
            QueryType::ExecuteSql => {
                fields.insert("sql".to_string(), Value::from(sql));
            }
            _ => {}
        }

        Self::create_operation(
            query_type,
            &metadata.schema_name,
            &metadata.table_name,
            engine_hint.or(metadata.preferred_engine),
            logging_context,
            Some(metadata.clone()),
            fields,
        )
    }
}

/// Encode an operation to its wire form. Staging keys are injected by the
/// plan during emission, not here.
pub fn encode_operation(operation: &Operation) -> FlowResult<Value> {
    serde_json::to_value(operation).map_err(|e| {
        validation_error("failed to encode operation", Some("operation"), None).caused_by(&e)
    })
}

/// Decode an operation from its wire form.
///
/// Staging keys are consumed and, when a request context rode along, the
/// context is re-attached with the stage/position recorded as attributes.
/// Unknown operation types fall back to an empty `EXECUTE_SQL` with a
/// logged warning.
pub fn decode_operation(value: Value) -> FlowResult<Operation> {
    let Value::Object(mut map) = value else {
        return Err(validation_error(
            "operation payload must be a JSON object",
            None,
            None,
        ));
    };

    let stage = map.remove(STAGE_KEY).and_then(|v| v.as_u64());
    let position = map.remove(POSITION_KEY).and_then(|v| v.as_u64());
    let context_value = map.remove(REQUEST_CONTEXT_KEY);

    let type_tag = map
        .get("operation_type")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| {
            validation_error(
                "operation_type is required in operation payload",
                Some("operation_type"),
                None,
            )
        })?;

    let known_type =
        serde_json::from_value::<QueryType>(Value::String(type_tag.clone())).is_ok();

    let mut operation: Operation = if known_type {
        serde_json::from_value(Value::Object(map)).map_err(|e| {
            validation_error(
                format!("invalid operation data for {type_tag}"),
                Some("operation_type"),
                Some(&type_tag),
            )
            .caused_by(&e)
        })?
    } else {
        warn!(
            operation_type = %type_tag,
            "no operation registered for type, falling back to EXECUTE_SQL"
        );
        fallback_execute_sql(&map)
    };

    operation.validate()?;

    if let Some(context_value) = context_value {
        let mut ctx: ExecutionRequestContext =
            serde_json::from_value(context_value).map_err(|e| {
                validation_error(
                    "invalid request context on operation payload",
                    Some(REQUEST_CONTEXT_KEY),
                    None,
                )
                .caused_by(&e)
            })?;
        if let Some(stage) = stage {
            ctx.set_attribute("stage", stage.to_string());
        }
        if let Some(position) = position {
            ctx.set_attribute("position", position.to_string());
        }
        operation.attach_context(ctx);
    } else if let Some(stage) = stage {
        operation
            .logging_context
            .entry("stage".to_string())
            .or_insert_with(|| stage.to_string());
    }

    Ok(operation)
}

fn fallback_execute_sql(map: &serde_json::Map<String, Value>) -> Operation {
    let schema_name = map
        .get("schema_name")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let object_name = map
        .get("object_name")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let mut operation = Operation::new(
        schema_name,
        object_name,
        OperationBody::ExecuteSql(ExecuteSql::default()),
    );
    operation.engine_hint = map
        .get("engine_hint")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok());
    operation.logging_context = map
        .get("logging_context")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default();
    operation.metadata = map
        .get("metadata")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok());
    operation
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use crate::operations::{CreateTable, Insert};

    fn insert_op() -> Operation {
        Operation::new(
            "silver",
            "customers",
            OperationBody::Insert(Insert::from_source("SELECT * FROM bronze.raw_customers")),
        )
        .with_engine_hint(EngineType::Sql)
        .with_logging_context([("method", "load_customers")])
    }

    #[test]
    fn encode_emits_tag_and_elides_nulls() {
        let encoded = encode_operation(&insert_op()).unwrap();
        assert_eq!(encoded["operation_type"], "INSERT");
        assert_eq!(encoded["schema_name"], "silver");
        assert_eq!(encoded["mode"], "append");
        assert_eq!(encoded["engine_hint"], "sql");
        assert!(encoded.get("values").is_none());
        assert!(encoded.get("columns").is_none());
        assert!(encoded.get("context").is_none());
    }

    #[test]
    fn decode_round_trips_semantically() {
        let original = insert_op();
        let decoded = decode_operation(encode_operation(&original).unwrap()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn decode_consumes_staging_keys_and_reattaches_context() {
        let ctx = ExecutionRequestContext::generate().with_user_id("svc-etl");
        let mut encoded = encode_operation(&insert_op()).unwrap();
        let obj = encoded.as_object_mut().unwrap();
        obj.insert(STAGE_KEY.into(), json!(2));
        obj.insert(POSITION_KEY.into(), json!(0));
        obj.insert(
            REQUEST_CONTEXT_KEY.into(),
            serde_json::to_value(&ctx).unwrap(),
        );

        let decoded = decode_operation(encoded).unwrap();
        let attached = decoded.context.expect("context reattached");
        assert_eq!(attached.request_id, ctx.request_id);
        assert_eq!(attached.attributes["stage"], "2");
        assert_eq!(attached.attributes["position"], "0");
        // Operation logging context folded into the attribute bag.
        assert_eq!(attached.attributes["method"], "load_customers");
    }

    #[test]
    fn decode_without_context_records_stage_in_logging_context() {
        let mut encoded = encode_operation(&insert_op()).unwrap();
        encoded
            .as_object_mut()
            .unwrap()
            .insert(STAGE_KEY.into(), json!(3));
        let decoded = decode_operation(encoded).unwrap();
        assert_eq!(decoded.logging_context["stage"], "3");
        assert!(decoded.context.is_none());
    }

    #[test]
    fn unknown_type_falls_back_to_execute_sql() {
        let payload = json!({
            "operation_type": "VACUUM",
            "schema_name": "silver",
            "object_name": "customers",
            "logging_context": {"method": "compact"},
        });
        let decoded = decode_operation(payload).unwrap();
        assert_eq!(decoded.operation_type(), QueryType::ExecuteSql);
        assert_eq!(decoded.schema_name, "silver");
        assert_eq!(decoded.logging_context["method"], "compact");
        match decoded.body {
            OperationBody::ExecuteSql(body) => assert_eq!(body.sql, ""),
            other => panic!("expected ExecuteSql fallback, got {other:?}"),
        }
    }

    #[test]
    fn missing_operation_type_is_rejected() {
        let err = decode_operation(json!({"schema_name": "s", "object_name": "o"})).unwrap_err();
        assert_eq!(err.details()["field"], "operation_type");
    }

    #[test]
    fn invalid_variant_payload_is_rejected() {
        // Insert with both sources violates the exactly-one contract.
        let payload = json!({
            "operation_type": "INSERT",
            "schema_name": "silver",
            "object_name": "customers",
            "source_query": "SELECT 1",
            "values": [{"id": 1}],
        });
        assert!(decode_operation(payload).is_err());
    }

    #[test]
    fn factory_builds_validated_operations() {
        let mut fields = serde_json::Map::new();
        fields.insert(
            "select_query".to_string(),
            Value::from("SELECT * FROM bronze.raw"),
        );
        fields.insert("recreate".to_string(), Value::from(true));
        let op = OperationBuilder::create_operation(
            QueryType::CreateTable,
            "silver",
            "conformed",
            None,
            BTreeMap::new(),
            Some(QueryMetadata::new(QueryType::CreateTable, "silver", "conformed")),
            fields,
        )
        .unwrap();
        match &op.body {
            OperationBody::CreateTable(CreateTable {
                select_query,
                recreate,
                ..
            }) => {
                assert_eq!(select_query.as_deref(), Some("SELECT * FROM bronze.raw"));
                assert!(*recreate);
            }
            other => panic!("expected CreateTable, got {other:?}"),
        }
    }

    #[test]
    fn discovered_sql_lands_in_the_right_field() {
        let meta = QueryMetadata::new(QueryType::Insert, "silver", "orders");
        let op = OperationBuilder::from_discovered_sql(
            &meta,
            "SELECT * FROM bronze.orders",
            None,
            BTreeMap::new(),
        )
        .unwrap();
        match &op.body {
            OperationBody::Insert(insert) => {
                assert_eq!(insert.source_query.as_deref(), Some("SELECT * FROM bronze.orders"));
            }
            other => panic!("expected Insert, got {other:?}"),
        }

        let meta = QueryMetadata::new(QueryType::ExecuteSql, "", "");
        let op = OperationBuilder::from_discovered_sql(
            &meta,
            "TRUNCATE TABLE silver.scratch",
            None,
            BTreeMap::new(),
        )
        .unwrap();
        match &op.body {
            OperationBody::ExecuteSql(body) => {
                assert_eq!(body.sql, "TRUNCATE TABLE silver.scratch");
            }
            other => panic!("expected ExecuteSql, got {other:?}"),
        }
    }
}
