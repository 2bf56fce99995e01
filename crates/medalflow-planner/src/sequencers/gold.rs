//! Gold layer: analytics-ready view and table derivations, with optional
//! filtering by target object name.

use serde_json::Value;
use tracing::warn;

use medalflow_common::constants::Layer;
use medalflow_error::FlowResult;
use medalflow_schemas::GoldMetadata;
use medalflow_schemas::operations::Operation;

use super::{Sequencer, TransformationRegistry, operations_from_discovered};

pub struct GoldSequencer {
    name: String,
    metadata: GoldMetadata,
    registry: TransformationRegistry,
    /// `None` processes every declared object; an empty list processes
    /// nothing.
    selected_tables: Option<Vec<String>>,
}

impl GoldSequencer {
    pub fn new(name: &str, metadata: GoldMetadata) -> Self {
        Self {
            name: name.to_string(),
            metadata,
            registry: TransformationRegistry::new(),
            selected_tables: None,
        }
    }

    pub fn with_selected_tables<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selected_tables = Some(tables.into_iter().map(|t| t.into()).collect());
        self
    }

    pub fn registry_mut(&mut self) -> &mut TransformationRegistry {
        &mut self.registry
    }
}

impl Sequencer for GoldSequencer {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn layer(&self) -> Layer {
        Layer::Gold
    }

    fn class_metadata(&self) -> serde_json::Map<String, Value> {
        match serde_json::to_value(&self.metadata) {
            Ok(Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        }
    }

    fn queries(&self) -> FlowResult<Vec<Operation>> {
        let mut discovered = self.registry.discover(&self.name)?;

        if let Some(selected) = &self.selected_tables {
            discovered.retain(|query| selected.contains(&query.metadata.table_name));
            if discovered.is_empty() {
                warn!(
                    sequencer = %self.name,
                    selected = ?selected,
                    "no methods found for selected tables"
                );
            }
        }

        operations_from_discovered(discovered, &self.name, Layer::Gold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    use medalflow_schemas::QueryMetadata;
    use medalflow_schemas::operations::QueryType;

    fn sequencer() -> GoldSequencer {
        let mut seq = GoldSequencer::new("SalesViews", GoldMetadata::new("gold"));
        seq.registry_mut().register(
            "sales_summary_view",
            QueryMetadata::new(QueryType::CreateOrAlterView, "gold", "v_sales_summary"),
            || Ok(Some("SELECT region, SUM(total) AS total FROM silver.sales GROUP BY region".to_string())),
        );
        seq.registry_mut().register(
            "customer_view",
            QueryMetadata::new(QueryType::CreateOrAlterView, "gold", "v_customers"),
            || Ok(Some("SELECT * FROM silver.customer".to_string())),
        );
        seq
    }

    #[test]
    fn no_selection_emits_all_objects() {
        let ops = sequencer().queries().unwrap();
        assert_eq!(ops.len(), 2);
    }

    #[test]
    fn selection_filters_by_target_object() {
        let ops = sequencer()
            .with_selected_tables(["v_customers"])
            .queries()
            .unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].object_name, "v_customers");
    }

    #[test]
    fn empty_selection_emits_nothing() {
        let ops = sequencer()
            .with_selected_tables(Vec::<String>::new())
            .queries()
            .unwrap();
        assert!(ops.is_empty());
    }
}
