//! Snapshot layer: point-in-time captures.

use serde_json::Value;

use medalflow_common::constants::Layer;
use medalflow_error::FlowResult;
use medalflow_schemas::SnapshotMetadata;
use medalflow_schemas::operations::Operation;

use super::{Sequencer, TransformationRegistry, operations_from_discovered};

pub struct SnapshotSequencer {
    name: String,
    metadata: SnapshotMetadata,
    registry: TransformationRegistry,
}

impl SnapshotSequencer {
    pub fn new(name: &str, metadata: SnapshotMetadata) -> Self {
        Self {
            name: name.to_string(),
            metadata,
            registry: TransformationRegistry::new(),
        }
    }

    pub fn registry_mut(&mut self) -> &mut TransformationRegistry {
        &mut self.registry
    }
}

impl Sequencer for SnapshotSequencer {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn layer(&self) -> Layer {
        Layer::Snapshot
    }

    fn class_metadata(&self) -> serde_json::Map<String, Value> {
        match serde_json::to_value(&self.metadata) {
            Ok(Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        }
    }

    fn queries(&self) -> FlowResult<Vec<Operation>> {
        let discovered = self.registry.discover(&self.name)?;
        operations_from_discovered(discovered, &self.name, Layer::Snapshot)
    }
}
