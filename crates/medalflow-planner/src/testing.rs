//! Test collaborators for planner consumers.

use medalflow_error::FlowResult;
use medalflow_schemas::TableInfo;

use crate::sequencers::LakeDatabase;

/// Lake database probe backed by a fixed table listing.
#[derive(Debug, Default)]
pub struct StaticLakeDatabase {
    tables: Vec<TableInfo>,
}

impl StaticLakeDatabase {
    pub fn new(tables: Vec<TableInfo>) -> Self {
        Self { tables }
    }
}

impl LakeDatabase for StaticLakeDatabase {
    fn tables(&self, table_names: Option<&[String]>) -> FlowResult<Vec<TableInfo>> {
        let tables = match table_names {
            Some(requested) => self
                .tables
                .iter()
                .filter(|t| requested.contains(&t.table_name))
                .cloned()
                .collect(),
            None => self.tables.clone(),
        };
        Ok(tables)
    }
}
