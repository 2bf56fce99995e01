//! Silver layer: user-authored transformation sequencers.

use serde_json::Value;
use tracing::info;

use medalflow_common::constants::Layer;
use medalflow_error::{FlowResult, validation_error};
use medalflow_schemas::SilverMetadata;
use medalflow_schemas::operations::Operation;

use super::{Sequencer, TransformationRegistry, operations_from_discovered};

/// A silver transformation: a named registry of query producers plus the
/// class-level metadata bag. Users construct one per transformation class
/// and register their methods into it.
pub struct SilverTransformationSequencer {
    name: String,
    metadata: SilverMetadata,
    registry: TransformationRegistry,
}

impl SilverTransformationSequencer {
    pub fn new(name: &str, metadata: SilverMetadata) -> Self {
        Self {
            name: name.to_string(),
            metadata,
            registry: TransformationRegistry::new(),
        }
    }

    pub fn registry_mut(&mut self) -> &mut TransformationRegistry {
        &mut self.registry
    }

    pub fn metadata(&self) -> &SilverMetadata {
        &self.metadata
    }
}

impl Sequencer for SilverTransformationSequencer {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn layer(&self) -> Layer {
        Layer::Silver
    }

    fn class_metadata(&self) -> serde_json::Map<String, Value> {
        match serde_json::to_value(&self.metadata) {
            Ok(Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        }
    }

    fn queries(&self) -> FlowResult<Vec<Operation>> {
        if self.metadata.disabled {
            info!(sequencer = %self.name, "transformation disabled, emitting no operations");
            return Ok(Vec::new());
        }
        if self.registry.is_empty() {
            return Err(validation_error(
                format!("silver sequencer {} has no registered queries", self.name),
                Some("registry"),
                None,
            ));
        }
        let discovered = self.registry.discover(&self.name)?;
        operations_from_discovered(discovered, &self.name, Layer::Silver)
    }
}
