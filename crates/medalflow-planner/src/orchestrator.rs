//! Composes analysis, DAG construction, and stage partitioning into a
//! serializable execution plan.

use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use medalflow_adapter::QueryBuilder;
use medalflow_error::{FlowResult, validation_error};
use medalflow_schemas::ExecutionPlan;
use medalflow_schemas::operations::Operation;

use crate::analyzer::SqlDependencyAnalyzer;
use crate::dag_builder::OperationDagBuilder;
use crate::sequencers::Sequencer;

pub struct ExecutionPlanOrchestrator {
    analyzer: SqlDependencyAnalyzer,
    query_builder: Arc<dyn QueryBuilder>,
    tolerant_analysis: bool,
}

impl ExecutionPlanOrchestrator {
    pub fn new(dialect: &str, query_builder: Arc<dyn QueryBuilder>) -> Self {
        Self {
            analyzer: SqlDependencyAnalyzer::new(dialect),
            query_builder,
            tolerant_analysis: false,
        }
    }

    /// Degrade unanalyzable operations to a minimal dependency record
    /// instead of failing plan creation. Off by default: silent
    /// degradation of dependency inference must be an explicit choice.
    pub fn with_tolerant_analysis(mut self, tolerant: bool) -> Self {
        self.tolerant_analysis = tolerant;
        self
    }

    /// Create an execution plan from a list of operations.
    pub fn create_execution_plan(
        &self,
        operations: Vec<Operation>,
        metadata: Option<serde_json::Map<String, Value>>,
        sequencer_name: Option<&str>,
    ) -> FlowResult<ExecutionPlan> {
        if operations.is_empty() {
            return Err(validation_error(
                "cannot create execution plan from empty operations list",
                Some("operations"),
                None,
            ));
        }

        let sequencer_name = sequencer_name.unwrap_or("ExecutionPlanOrchestrator");
        info!(
            operation_count = operations.len(),
            sequencer = sequencer_name,
            "creating execution plan"
        );

        let dependencies = self.analyzer.analyze_operations(
            &operations,
            self.query_builder.as_ref(),
            self.tolerant_analysis,
        )?;

        let mut dag_builder = OperationDagBuilder::new(&operations, &dependencies);
        let dag = dag_builder.build_dag();
        dag_builder.validate_dag(&dag)?;
        let stages = dag_builder.create_execution_stages(&dag)?;

        let plan = ExecutionPlan {
            sequencer_name: sequencer_name.to_string(),
            metadata: metadata.unwrap_or_default(),
            lineage: None,
            total_queries: operations.len(),
            stages,
            dependency_graph: dag.adjacency_list(),
            context: None,
        };
        info!(
            sequencer = sequencer_name,
            num_stages = plan.stages.len(),
            total_queries = plan.total_queries,
            "execution plan created"
        );
        Ok(plan)
    }

    /// Create a combined plan across several sequencers. Per-sequencer
    /// class metadata is recorded under `sequencer_metadata`; a sequencer
    /// whose discovery fails is skipped with a warning.
    pub fn create_plan_from_sequencers(
        &self,
        sequencers: &[&dyn Sequencer],
    ) -> FlowResult<ExecutionPlan> {
        if sequencers.is_empty() {
            return Err(validation_error(
                "cannot create plan from empty sequencer list",
                Some("sequencers"),
                None,
            ));
        }

        let mut operations = Vec::new();
        let mut sequencer_metadata = serde_json::Map::new();
        let mut names = Vec::new();

        for sequencer in sequencers {
            let name = sequencer.name();
            match sequencer.queries() {
                Ok(discovered) => {
                    operations.extend(discovered);
                    sequencer_metadata
                        .insert(name.clone(), Value::Object(sequencer.class_metadata()));
                }
                Err(e) => {
                    warn!(sequencer = %name, error = %e, "sequencer discovery failed, skipping");
                    continue;
                }
            }
            names.push(Value::String(name));
        }

        info!(
            sequencer_count = sequencers.len(),
            operation_count = operations.len(),
            "creating combined plan from sequencers"
        );

        let mut metadata = serde_json::Map::new();
        metadata.insert(
            "sequencer_metadata".to_string(),
            Value::Object(sequencer_metadata),
        );
        metadata.insert("sequencers".to_string(), Value::Array(names));

        self.create_execution_plan(operations, Some(metadata), None)
    }

    /// Single-sequencer convenience wrapper, used by the per-layer entry
    /// points.
    pub fn create_plan_for_sequencer(&self, sequencer: &dyn Sequencer) -> FlowResult<ExecutionPlan> {
        self.create_plan_from_sequencers(&[sequencer])
    }

    pub fn create_plan_for_bronze_layer(
        &self,
        sequencer: &crate::sequencers::BronzeSequencer,
    ) -> FlowResult<ExecutionPlan> {
        self.create_plan_for_sequencer(sequencer)
    }

    /// Silver runs combine several transformation sequencers into one plan.
    pub fn create_plan_for_silver_layer(
        &self,
        sequencers: &[crate::sequencers::SilverTransformationSequencer],
    ) -> FlowResult<ExecutionPlan> {
        let refs: Vec<&dyn Sequencer> = sequencers.iter().map(|s| s as &dyn Sequencer).collect();
        self.create_plan_from_sequencers(&refs)
    }

    pub fn create_plan_for_gold_layer(
        &self,
        sequencer: &crate::sequencers::GoldSequencer,
    ) -> FlowResult<ExecutionPlan> {
        self.create_plan_for_sequencer(sequencer)
    }

    pub fn create_plan_for_snapshot_layer(
        &self,
        sequencer: &crate::sequencers::SnapshotSequencer,
    ) -> FlowResult<ExecutionPlan> {
        self.create_plan_for_sequencer(sequencer)
    }
}
