//! Shared building blocks for the medalflow workspace: constant enums,
//! cancellation, the execution request context, and tracing setup.

pub mod cancellation;
pub mod constants;
pub mod observability;
pub mod tracing;

pub use cancellation::{CancellationToken, never_cancels};
pub use constants::{
    ComputeEnvironment, ComputeType, EngineType, ExecutionMode, JobStatus, Layer, ResultFormat,
};
pub use observability::ExecutionRequestContext;
