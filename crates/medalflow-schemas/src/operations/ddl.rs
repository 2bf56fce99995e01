//! DDL operations: table and schema lifecycle.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use medalflow_error::{FlowResult, validation_error};

/// A column in a CREATE TABLE definition.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    pub data_type: String,
    #[serde(default = "default_true")]
    pub nullable: bool,
    pub default_value: Option<serde_json::Value>,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub unique: bool,
    pub check_constraint: Option<String>,
}

impl ColumnDefinition {
    pub fn new(name: &str, data_type: &str) -> Self {
        Self {
            name: name.to_string(),
            data_type: data_type.to_string(),
            nullable: true,
            default_value: None,
            primary_key: false,
            unique: false,
            check_constraint: None,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Create a table, either as CTAS (`select_query`) or from a column list.
///
/// `recreate` with a `location` makes the dispatcher delete the backing
/// storage before issuing DDL; a failed delete aborts the operation.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CreateTable {
    pub select_query: Option<String>,
    pub columns: Option<Vec<ColumnDefinition>>,
    pub location: Option<String>,
    #[serde(default)]
    pub recreate: bool,
    pub file_format: Option<String>,
    pub partitions: Option<Vec<String>>,
    pub cluster_by: Option<Vec<String>>,
    pub properties: Option<BTreeMap<String, String>>,
}

impl CreateTable {
    pub fn from_select(select_query: &str) -> Self {
        Self {
            select_query: Some(select_query.to_string()),
            ..Self::default()
        }
    }

    pub(crate) fn validate(&self, target: &str) -> FlowResult<()> {
        if self.select_query.is_none() && self.columns.is_none() {
            return Err(validation_error(
                format!("CreateTable for {target} requires either select_query or columns"),
                Some("select_query"),
                None,
            ));
        }
        if let Some(columns) = &self.columns {
            if columns.is_empty() {
                return Err(validation_error(
                    format!("CreateTable for {target} has an empty column list"),
                    Some("columns"),
                    None,
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DropTable {
    #[serde(default)]
    pub if_exists: bool,
}

#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CreateSchema {
    #[serde(default)]
    pub if_not_exists: bool,
    pub authorization: Option<String>,
}

/// Behavior when dropping a schema that still contains objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DropBehavior {
    Cascade,
    Restrict,
}

#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DropSchema {
    #[serde(default)]
    pub if_exists: bool,
    pub behavior: Option<DropBehavior>,
}
