//! Bronze layer: raw ingestion from a source lake database.
//!
//! For every discovered source table the sequencer emits a recreate CTAS
//! into the bronze schema, selecting everything from the source (minus
//! soft-deleted rows for non-metadata tables) and asking the dispatcher
//! for a statistics companion.

use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use medalflow_adapter::QueryBuilder;
use medalflow_common::constants::Layer;
use medalflow_error::FlowResult;
use medalflow_schemas::operations::{
    CreateTable, Operation, OperationBody, QueryType, Select,
};
use medalflow_schemas::{QueryMetadata, TableInfo};

use super::Sequencer;

const BRONZE_SCHEMA: &str = "bronze";
const SOFT_DELETE_FILTER: &str = "IsDelete IS NULL";

/// Probe over the landing-zone lake database. Implementations list the
/// source tables of one schema; the optional filter restricts the listing
/// to the requested table names.
pub trait LakeDatabase: Send + Sync {
    fn tables(&self, table_names: Option<&[String]>) -> FlowResult<Vec<TableInfo>>;
}

pub struct BronzeSequencer {
    source_schema: String,
    lake_db: Arc<dyn LakeDatabase>,
    query_builder: Arc<dyn QueryBuilder>,
    requested_table_names: Option<Vec<String>>,
}

impl BronzeSequencer {
    pub fn new(
        source_schema: &str,
        lake_db: Arc<dyn LakeDatabase>,
        query_builder: Arc<dyn QueryBuilder>,
    ) -> Self {
        Self {
            source_schema: source_schema.to_string(),
            lake_db,
            query_builder,
            requested_table_names: None,
        }
    }

    /// Restrict ingestion to a comma-separated list of table names.
    pub fn with_table_names(mut self, table_names: &str) -> Self {
        self.requested_table_names = parse_table_names(table_names);
        self
    }

    fn create_table_op(&self, table: &TableInfo) -> FlowResult<Operation> {
        let select_sql = self
            .query_builder
            .build_query(&self.select_operation(table))?;

        let body = CreateTable {
            select_query: Some(select_sql),
            recreate: true,
            ..CreateTable::default()
        };
        let metadata = QueryMetadata::new(QueryType::CreateTable, BRONZE_SCHEMA, &table.table_name)
            .with_create_stats(true);

        let mut operation = Operation::new(
            BRONZE_SCHEMA,
            &table.table_name,
            OperationBody::CreateTable(body),
        )
        .with_metadata(metadata)
        .with_logging_context([
            ("table", table.full_table_name.as_str()),
            ("layer", "bronze"),
        ]);
        operation.validate()?;
        Ok(operation)
    }

    /// Full select over the source table. Metadata tables keep their
    /// soft-deleted rows; everything else filters them out.
    fn select_operation(&self, table: &TableInfo) -> Operation {
        let where_clause = if table.table_name.ends_with("Metadata") {
            None
        } else {
            Some(SOFT_DELETE_FILTER.to_string())
        };
        Operation::new(
            &self.source_schema,
            &table.table_name,
            OperationBody::Select(Select {
                where_clause,
                ..Select::default()
            }),
        )
    }
}

fn parse_table_names(table_names: &str) -> Option<Vec<String>> {
    let names: Vec<String> = table_names
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect();
    if names.is_empty() { None } else { Some(names) }
}

impl Sequencer for BronzeSequencer {
    fn name(&self) -> String {
        "BronzeSequencer".to_string()
    }

    fn layer(&self) -> Layer {
        Layer::Bronze
    }

    fn class_metadata(&self) -> serde_json::Map<String, Value> {
        let mut metadata = serde_json::Map::new();
        metadata.insert(
            "source_schema".to_string(),
            Value::String(self.source_schema.clone()),
        );
        metadata.insert("layer".to_string(), Value::String("bronze".to_string()));
        metadata
    }

    fn queries(&self) -> FlowResult<Vec<Operation>> {
        let tables = self
            .lake_db
            .tables(self.requested_table_names.as_deref())?;
        info!(
            table_count = tables.len(),
            source_schema = %self.source_schema,
            requested = self.requested_table_names.is_some(),
            "processing tables for bronze layer"
        );

        let mut operations = Vec::with_capacity(tables.len());
        for table in &tables {
            operations.push(self.create_table_op(table)?);
        }
        Ok(operations)
    }
}
