//! Bulk copy and raw SQL pass-through operations.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use medalflow_common::constants::ResultFormat;
use medalflow_error::{FlowResult, validation_error};

/// Bulk-load files from a storage location into the target table.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Copy {
    #[serde(default)]
    pub source_path: String,
    pub file_format: Option<String>,
    pub columns: Option<Vec<String>>,
    pub options: Option<BTreeMap<String, String>>,
}

impl Copy {
    pub(crate) fn validate(&self, target: &str) -> FlowResult<()> {
        if self.source_path.trim().is_empty() {
            return Err(validation_error(
                format!("Copy into {target}: source_path cannot be empty"),
                Some("source_path"),
                None,
            ));
        }
        Ok(())
    }
}

/// Raw SQL pass-through. The query builder screens the statement against
/// the platform deny-list before it reaches an engine.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteSql {
    #[serde(default)]
    pub sql: String,
    #[serde(default)]
    pub returns_results: bool,
    #[serde(default)]
    pub result_format: ResultFormat,
    pub limit: Option<u64>,
}

impl Default for ExecuteSql {
    fn default() -> Self {
        Self {
            sql: String::new(),
            returns_results: false,
            result_format: ResultFormat::Dataframe,
            limit: None,
        }
    }
}

impl ExecuteSql {
    pub fn new(sql: &str) -> Self {
        Self {
            sql: sql.to_string(),
            ..Self::default()
        }
    }
}
