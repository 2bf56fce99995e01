//! Planner-facing metadata: per-query hints, dependency facts, and the
//! class-level metadata bags attached by layer sequencers.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use medalflow_common::constants::{EngineType, ExecutionMode};

use crate::operations::QueryType;

/// Hints attached to a single declared query.
///
/// `order`, `execution_type`, and `depends_on` are legacy fields: they are
/// accepted on the wire and carried through serialization for older tooling
/// that may still read them, but planning derives all ordering from SQL
/// dependency analysis and never consults them.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QueryMetadata {
    #[serde(rename = "type")]
    pub query_type: Option<QueryType>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub table_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub schema_name: String,
    pub preferred_engine: Option<EngineType>,
    pub unique_idx: Option<Vec<String>>,
    pub filter: Option<String>,
    #[serde(default)]
    pub create_stats: bool,
    pub stats_columns: Option<Vec<String>>,
    pub operation_id: Option<String>,
    // Legacy ordering hints, accepted and ignored.
    pub order: Option<f64>,
    pub execution_type: Option<ExecutionMode>,
    pub depends_on: Option<Vec<String>>,
}

impl QueryMetadata {
    pub fn new(query_type: QueryType, schema_name: &str, table_name: &str) -> Self {
        Self {
            query_type: Some(query_type),
            table_name: table_name.to_string(),
            schema_name: schema_name.to_string(),
            ..Self::default()
        }
    }

    pub fn with_create_stats(mut self, create_stats: bool) -> Self {
        self.create_stats = create_stats;
        self
    }

    pub fn with_preferred_engine(mut self, engine: EngineType) -> Self {
        self.preferred_engine = Some(engine);
        self
    }

    pub fn with_stats_columns(mut self, columns: Vec<String>) -> Self {
        self.stats_columns = Some(columns);
        self
    }
}

/// Tables a SQL statement reads and the table it writes, as reported by the
/// dependency analyzer. Qualified-name matching downstream is
/// case-insensitive on identifier components.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SqlDependencies {
    pub reads_from: BTreeSet<String>,
    pub writes_to: Option<String>,
}

impl SqlDependencies {
    pub fn new<I: IntoIterator<Item = String>>(reads_from: I, writes_to: Option<String>) -> Self {
        Self {
            reads_from: reads_from.into_iter().collect(),
            writes_to,
        }
    }
}

/// A source table discovered by the landing-zone probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    pub table_name: String,
    pub schema_name: String,
    pub full_table_name: String,
}

impl TableInfo {
    pub fn new(schema_name: &str, table_name: &str) -> Self {
        Self {
            table_name: table_name.to_string(),
            schema_name: schema_name.to_string(),
            full_table_name: format!("{schema_name}.{table_name}"),
        }
    }
}

impl fmt::Display for TableInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_table_name)
    }
}

/// Class-level metadata for silver transformation sequencers.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SilverMetadata {
    pub sp_name: String,
    pub group_file_name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_engine")]
    pub preferred_engine: EngineType,
    pub model_name: Option<String>,
    #[serde(default)]
    pub disable_key_reshuffling: bool,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub take_snapshot: bool,
}

impl SilverMetadata {
    pub fn new(sp_name: &str, group_file_name: &str) -> Self {
        // Model name falls back to the group directory, stripped of the
        // conventional `group_` prefix.
        let model_name = group_file_name
            .split('/')
            .next()
            .map(|part| part.replace("group_", ""));
        Self {
            sp_name: sp_name.to_string(),
            group_file_name: group_file_name.to_string(),
            description: None,
            tags: Vec::new(),
            preferred_engine: default_engine(),
            model_name,
            disable_key_reshuffling: false,
            disabled: false,
            take_snapshot: false,
        }
    }
}

fn default_engine() -> EngineType {
    EngineType::Sql
}

/// Class-level metadata for gold view sequencers.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoldMetadata {
    pub schema_name: String,
    #[serde(default = "default_gold_layer")]
    pub layer: String,
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl GoldMetadata {
    pub fn new(schema_name: &str) -> Self {
        Self {
            schema_name: schema_name.to_string(),
            layer: default_gold_layer(),
            description: None,
            tags: Vec::new(),
        }
    }
}

fn default_gold_layer() -> String {
    "gold".to_string()
}

/// Class-level metadata for snapshot sequencers. `retention_days = -1`
/// means indefinite retention.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub schema_name: String,
    #[serde(default = "default_retention_days")]
    pub retention_days: i32,
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_frequency")]
    pub frequency: String,
}

impl SnapshotMetadata {
    pub fn new(schema_name: &str) -> Self {
        Self {
            schema_name: schema_name.to_string(),
            retention_days: default_retention_days(),
            description: None,
            tags: Vec::new(),
            frequency: default_frequency(),
        }
    }
}

fn default_retention_days() -> i32 {
    90
}

fn default_frequency() -> String {
    "daily".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn legacy_hints_round_trip_but_default_off() {
        let json = serde_json::json!({
            "type": "INSERT",
            "table_name": "DimProduct",
            "schema_name": "silver",
            "order": 2.0,
            "execution_type": "parallel",
            "depends_on": ["extract_products"],
            "create_stats": true,
        });
        let meta: QueryMetadata = serde_json::from_value(json).unwrap();
        assert_eq!(meta.query_type, Some(QueryType::Insert));
        assert_eq!(meta.order, Some(2.0));
        assert_eq!(meta.execution_type, Some(ExecutionMode::Parallel));
        assert!(meta.create_stats);

        let fresh = QueryMetadata::new(QueryType::Insert, "silver", "DimProduct");
        assert_eq!(fresh.order, None);
        assert_eq!(fresh.depends_on, None);
    }

    #[test]
    fn metadata_elides_absent_fields() {
        let meta = QueryMetadata::new(QueryType::CreateTable, "bronze", "customers");
        let value = serde_json::to_value(&meta).unwrap();
        assert!(value.get("order").is_none());
        assert!(value.get("unique_idx").is_none());
        assert_eq!(value["type"], "CREATE_TABLE");
    }

    #[test]
    fn silver_model_name_derived_from_group_file() {
        let meta = SilverMetadata::new("Load_Customer_Dim", "group_customer/dimensions.json");
        assert_eq!(meta.model_name.as_deref(), Some("customer"));
        assert_eq!(meta.preferred_engine, EngineType::Sql);
    }

    #[test]
    fn table_info_displays_qualified_name() {
        let info = TableInfo::new("dbo", "orders");
        assert_eq!(info.to_string(), "dbo.orders");
    }
}
