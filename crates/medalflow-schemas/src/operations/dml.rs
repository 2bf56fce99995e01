//! DML operations: SELECT, INSERT, UPDATE, DELETE, MERGE.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use medalflow_error::{FlowResult, validation_error};

#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Select {
    /// `None` renders as `SELECT *`.
    pub columns: Option<Vec<String>>,
    #[serde(default)]
    pub distinct: bool,
    pub where_clause: Option<String>,
    pub join_clause: Option<String>,
    pub group_by: Option<Vec<String>>,
    pub having_clause: Option<String>,
    pub order_by: Option<Vec<String>>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl Select {
    pub(crate) fn validate(&self, target: &str) -> FlowResult<()> {
        if self.having_clause.is_some() && self.group_by.is_none() {
            return Err(validation_error(
                format!("Select on {target}: having_clause requires group_by"),
                Some("having_clause"),
                None,
            ));
        }
        if self.limit == Some(0) {
            return Err(validation_error(
                format!("Select on {target}: limit must be greater than zero"),
                Some("limit"),
                Some("0"),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsertMode {
    Append,
    Overwrite,
}

impl Default for InsertMode {
    fn default() -> Self {
        InsertMode::Append
    }
}

#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Insert {
    /// `INSERT INTO ... SELECT` source. Mutually exclusive with `values`.
    pub source_query: Option<String>,
    /// Direct rows. Mutually exclusive with `source_query`.
    pub values: Option<Vec<BTreeMap<String, serde_json::Value>>>,
    #[serde(default)]
    pub mode: InsertMode,
    pub columns: Option<Vec<String>>,
}

impl Insert {
    pub fn from_source(source_query: &str) -> Self {
        Self {
            source_query: Some(source_query.to_string()),
            ..Self::default()
        }
    }

    pub(crate) fn validate(&self, target: &str) -> FlowResult<()> {
        if self.source_query.is_some() == self.values.is_some() {
            return Err(validation_error(
                format!(
                    "Insert into {target} requires exactly one data source: source_query or values"
                ),
                Some("source_query"),
                None,
            ));
        }
        Ok(())
    }
}

#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Update {
    /// Column to value-or-expression assignments.
    #[serde(default)]
    pub set_columns: BTreeMap<String, serde_json::Value>,
    pub where_clause: Option<String>,
    /// For UPDATE ... FROM joins.
    pub from_clause: Option<String>,
}

impl Update {
    pub(crate) fn validate(&self, target: &str) -> FlowResult<()> {
        if self.set_columns.is_empty() {
            return Err(validation_error(
                format!("Update on {target}: set_columns cannot be empty"),
                Some("set_columns"),
                None,
            ));
        }
        Ok(())
    }
}

#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Delete {
    /// `None` deletes every row.
    pub where_clause: Option<String>,
}

/// MERGE (upsert) with the five standard WHEN actions. At least one action
/// must be present.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Merge {
    #[serde(default)]
    pub source_query: String,
    #[serde(default)]
    pub merge_condition: String,
    pub when_matched_update: Option<BTreeMap<String, serde_json::Value>>,
    /// Optional extra condition for the delete branch.
    pub when_matched_delete: Option<String>,
    pub when_not_matched_insert: Option<BTreeMap<String, serde_json::Value>>,
    pub when_not_matched_by_source_update: Option<BTreeMap<String, serde_json::Value>>,
    #[serde(default)]
    pub when_not_matched_by_source_delete: bool,
}

impl Merge {
    pub(crate) fn validate(&self, target: &str) -> FlowResult<()> {
        if self.source_query.trim().is_empty() {
            return Err(validation_error(
                format!("Merge into {target}: source_query cannot be empty"),
                Some("source_query"),
                None,
            ));
        }
        if self.merge_condition.trim().is_empty() {
            return Err(validation_error(
                format!("Merge into {target}: merge_condition cannot be empty"),
                Some("merge_condition"),
                None,
            ));
        }
        let has_action = self.when_matched_update.is_some()
            || self.when_matched_delete.is_some()
            || self.when_not_matched_insert.is_some()
            || self.when_not_matched_by_source_update.is_some()
            || self.when_not_matched_by_source_delete;
        if !has_action {
            return Err(validation_error(
                format!("Merge into {target} requires at least one action to be specified"),
                Some("when_matched_update"),
                None,
            ));
        }
        Ok(())
    }
}
