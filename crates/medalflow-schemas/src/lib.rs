//! Schema types for the medalflow planning core.
//!
//! Operations are pure data: they describe WHAT to do against the warehouse,
//! not HOW. Query builders turn them into SQL, the dispatcher executes them,
//! and the plan types here carry them from the planner to a runner through a
//! JSON round trip.

pub mod ident;
pub mod metadata;
pub mod operations;
pub mod plan;

pub use ident::validate_identifier;
pub use metadata::{
    GoldMetadata, QueryMetadata, SilverMetadata, SnapshotMetadata, SqlDependencies, TableInfo,
};
pub use operations::builder::{OperationBuilder, decode_operation, encode_operation};
pub use operations::{Operation, OperationBody, QueryType};
pub use plan::{ExecutionPlan, ExecutionStage, LineageInfo};
