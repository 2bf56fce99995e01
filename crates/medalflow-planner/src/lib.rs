//! The execution-plan compiler.
//!
//! Takes the operations a sequencer declares, infers read/write table
//! dependencies from their SQL, builds a DAG keyed by output tables, and
//! partitions it into stages of mutually independent operations wrapped in
//! a serializable [`medalflow_schemas::ExecutionPlan`].
//!
//! Everything here is a pure, single-threaded computation over in-memory
//! values: discovery never executes SQL and never touches the network.

pub mod analyzer;
pub mod dag_builder;
pub mod orchestrator;
pub mod sequencers;
pub mod testing;

pub use analyzer::SqlDependencyAnalyzer;
pub use dag_builder::OperationDagBuilder;
pub use orchestrator::ExecutionPlanOrchestrator;
pub use sequencers::{
    BronzeSequencer, GoldSequencer, LakeDatabase, Sequencer, SilverTransformationSequencer,
    SnapshotSequencer, TransformationRegistry,
};
