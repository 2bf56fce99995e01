//! Builds the operation dependency DAG from analyzed SQL dependencies.
//!
//! Nodes are operations (stable ids derived from their target and position),
//! edges are read-after-write: an operation depends on the operation that
//! produces a table it reads. Matching on qualified table names is
//! case-insensitive.

use std::collections::HashMap;

use tracing::{debug, warn};

use medalflow_dag::DependencyDag;
use medalflow_error::{FlowResult, circular_dependency};
use medalflow_schemas::operations::Operation;
use medalflow_schemas::{ExecutionStage, SqlDependencies};

pub struct OperationDagBuilder<'a> {
    operations: &'a [Operation],
    dependencies: &'a [SqlDependencies],
    node_ids: Vec<String>,
    /// Lowercased output table to the id of the node producing it.
    table_to_operation: HashMap<String, String>,
}

impl<'a> OperationDagBuilder<'a> {
    /// `dependencies[i]` must describe `operations[i]`.
    pub fn new(operations: &'a [Operation], dependencies: &'a [SqlDependencies]) -> Self {
        debug_assert_eq!(operations.len(), dependencies.len());
        let node_ids = operations
            .iter()
            .enumerate()
            .map(|(index, op)| {
                if op.object_name.is_empty() {
                    format!("operation_{index}")
                } else {
                    format!("{}.{}_{index}", op.schema_name, op.object_name)
                }
            })
            .collect();
        Self {
            operations,
            dependencies,
            node_ids,
            table_to_operation: HashMap::new(),
        }
    }

    pub fn node_ids(&self) -> &[String] {
        &self.node_ids
    }

    /// Build the DAG: map output tables to their producers, then add an
    /// edge for every read that hits a produced table.
    pub fn build_dag(&mut self) -> DependencyDag {
        debug!(operation_count = self.operations.len(), "building operation DAG");
        self.map_targets_to_producers();

        let mut dag = DependencyDag::new();
        for (index, deps) in self.dependencies.iter().enumerate() {
            let node_id = &self.node_ids[index];
            dag.add_node(node_id.clone());
            for source_table in &deps.reads_from {
                let Some(producer) = self.table_to_operation.get(&source_table.to_lowercase())
                else {
                    continue;
                };
                // Self-edges are dropped: an operation reading its own
                // output table is not a dependency.
                if producer != node_id {
                    debug!(
                        operation = %node_id,
                        depends_on = %producer,
                        table = %source_table,
                        "dependency detected"
                    );
                    dag.add_edge(node_id.clone(), producer.clone());
                }
            }
        }
        dag
    }

    fn map_targets_to_producers(&mut self) {
        for (index, deps) in self.dependencies.iter().enumerate() {
            let Some(writes_to) = &deps.writes_to else {
                continue;
            };
            let key = writes_to.to_lowercase();
            let node_id = self.node_ids[index].clone();
            // Multiple writers to one target are allowed (drop-then-create
            // patterns); the last writer wins in the index.
            if let Some(previous) = self.table_to_operation.insert(key, node_id.clone()) {
                warn!(
                    table = %writes_to,
                    previous = %previous,
                    current = %node_id,
                    "multiple operations write to the same target, last writer wins"
                );
            }
        }
    }

    /// Fail on cyclic graphs.
    pub fn validate_dag(&self, dag: &DependencyDag) -> FlowResult<()> {
        if dag.has_cycles() {
            return Err(circular_dependency(
                "Circular dependency detected in operations DAG. Please check your operations \
                 for circular table dependencies.",
            ));
        }
        debug!(node_count = dag.len(), "DAG validated");
        Ok(())
    }

    /// Partition the DAG into 1-based execution stages, carrying the
    /// operations in discovery order within each stage.
    pub fn create_execution_stages(&self, dag: &DependencyDag) -> FlowResult<Vec<ExecutionStage>> {
        let node_stages = dag.execution_stages()?;
        let index_of: HashMap<&str, usize> = self
            .node_ids
            .iter()
            .enumerate()
            .map(|(index, id)| (id.as_str(), index))
            .collect();

        let mut stages = Vec::with_capacity(node_stages.len());
        for (stage_number, node_ids) in node_stages.iter().enumerate() {
            let mut operations = Vec::with_capacity(node_ids.len());
            for node_id in node_ids {
                let Some(index) = index_of.get(node_id.as_str()) else {
                    warn!(node = %node_id, "no operation mapped for DAG node");
                    continue;
                };
                operations.push(self.operations[*index].clone());
            }
            if !operations.is_empty() {
                debug!(
                    stage = stage_number + 1,
                    operation_count = operations.len(),
                    "stage created"
                );
                stages.push(ExecutionStage::new(stage_number as u32 + 1, operations));
            }
        }
        Ok(stages)
    }
}
