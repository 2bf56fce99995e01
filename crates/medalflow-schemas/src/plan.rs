//! Execution plan types: stages of parallel operations plus the dependency
//! graph they were derived from.
//!
//! Plans are values. Once emitted by the orchestrator they are not mutated;
//! attaching a request context before serialization is the one exception,
//! mirroring the operation lifecycle.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use medalflow_common::observability::ExecutionRequestContext;
use medalflow_error::{FlowResult, validation_error};

use crate::operations::Operation;
use crate::operations::builder::{
    POSITION_KEY, REQUEST_CONTEXT_KEY, STAGE_KEY, encode_operation,
};

/// Free-form lineage payload carried on a plan.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LineageInfo {
    #[serde(default)]
    pub lineage_data: serde_json::Map<String, Value>,
}

/// A set of mutually independent operations. Everything in one stage may be
/// dispatched in parallel; stages run sequentially in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStage {
    /// 1-based stage number.
    pub stage: u32,
    pub operations: Vec<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<ExecutionRequestContext>,
}

impl ExecutionStage {
    pub fn new(stage: u32, operations: Vec<Operation>) -> Self {
        Self {
            stage,
            operations,
            context: None,
        }
    }

    /// Attach a context to the stage and every contained operation.
    pub fn attach_context(&mut self, ctx: &ExecutionRequestContext) {
        self.context = Some(ctx.clone());
        for operation in &mut self.operations {
            operation.attach_context(ctx.clone());
        }
    }
}

/// The planner's output: staged operations plus the dependency graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub sequencer_name: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, Value>,
    pub lineage: Option<LineageInfo>,
    pub total_queries: usize,
    pub stages: Vec<ExecutionStage>,
    /// Node id to its direct dependencies only; never transitive.
    #[serde(default)]
    pub dependency_graph: IndexMap<String, Vec<String>>,
    pub context: Option<ExecutionRequestContext>,
}

impl ExecutionPlan {
    /// All operations grouped by stage, for in-process execution.
    pub fn all_operations(&self) -> Vec<Vec<&Operation>> {
        self.stages
            .iter()
            .map(|stage| stage.operations.iter().collect())
            .collect()
    }

    /// All operations grouped by stage as encoded payloads suitable for a
    /// worker's queue. Each payload carries its stage number, position
    /// within the stage, and the operation's request context.
    pub fn all_operations_serialized(&self) -> FlowResult<Vec<Vec<Value>>> {
        let mut groups = Vec::with_capacity(self.stages.len());
        for stage in &self.stages {
            let mut group = Vec::with_capacity(stage.operations.len());
            for (position, operation) in stage.operations.iter().enumerate() {
                let mut encoded = encode_operation(operation)?;
                let map = encoded
                    .as_object_mut()
                    .expect("encoded operation is an object");
                map.insert(STAGE_KEY.to_string(), Value::from(stage.stage));
                map.insert(POSITION_KEY.to_string(), Value::from(position));
                if let Some(ctx) = &operation.context {
                    let ctx_value = serde_json::to_value(ctx).map_err(|e| {
                        validation_error(
                            "failed to encode request context",
                            Some(REQUEST_CONTEXT_KEY),
                            None,
                        )
                        .caused_by(&e)
                    })?;
                    map.insert(REQUEST_CONTEXT_KEY.to_string(), ctx_value);
                }
                group.push(encoded);
            }
            groups.push(group);
        }
        Ok(groups)
    }

    /// Attach a context to the whole plan hierarchy.
    pub fn attach_context(&mut self, ctx: &ExecutionRequestContext) {
        self.context = Some(ctx.clone());
        for stage in &mut self.stages {
            stage.attach_context(ctx);
        }
    }

    /// Structural consistency check: stage counts must add up to
    /// `total_queries` and every operation must name its target.
    pub fn validate(&self) -> FlowResult<()> {
        if self.sequencer_name.is_empty() {
            return Err(validation_error(
                "execution plan missing sequencer_name",
                Some("sequencer_name"),
                None,
            ));
        }
        let actual: usize = self.stages.iter().map(|s| s.operations.len()).sum();
        if actual != self.total_queries {
            return Err(validation_error(
                format!(
                    "query count mismatch: expected {}, found {actual}",
                    self.total_queries
                ),
                Some("total_queries"),
                Some(&actual.to_string()),
            ));
        }
        Ok(())
    }
}
