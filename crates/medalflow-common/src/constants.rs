//! Constant enumerations shared across planning and dispatch.

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Medallion layer a sequencer belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Layer {
    Bronze,
    Silver,
    Gold,
    Snapshot,
}

/// Compute platform type. Extensible; these are the two shipped targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ComputeType {
    Synapse,
    Fabric,
}

/// Operational context used to route connection-string selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ComputeEnvironment {
    Etl,
    Consumption,
}

/// Engine preference for an operation. `Auto` delegates the choice to the
/// dispatcher's selection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EngineType {
    Sql,
    Spark,
    Auto,
}

/// Lifecycle states of a submitted Spark job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
    Timeout,
}

impl JobStatus {
    /// Terminal states: no further transitions happen.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Pending | JobStatus::Running)
    }
}

/// Shape of the data returned by an `EXECUTE_SQL` operation that fetches
/// results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ResultFormat {
    Dataframe,
    DictList,
    Scalar,
}

impl Default for ResultFormat {
    fn default() -> Self {
        ResultFormat::Dataframe
    }
}

/// Legacy execution-mode hint. Accepted on query metadata for backward
/// compatibility and ignored: ordering is derived from SQL dependencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ExecutionMode {
    Sequential,
    Parallel,
}

impl Default for ExecutionMode {
    fn default() -> Self {
        ExecutionMode::Sequential
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn engine_type_wire_form_is_lowercase() {
        assert_eq!(serde_json::to_string(&EngineType::Spark).unwrap(), "\"spark\"");
        assert_eq!(
            serde_json::from_str::<EngineType>("\"auto\"").unwrap(),
            EngineType::Auto
        );
        assert_eq!(EngineType::from_str("sql").unwrap(), EngineType::Sql);
    }

    #[test]
    fn result_format_uses_snake_case() {
        assert_eq!(
            serde_json::to_string(&ResultFormat::DictList).unwrap(),
            "\"dict_list\""
        );
    }

    #[test]
    fn job_status_terminality() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Succeeded.is_terminal());
        assert!(JobStatus::Timeout.is_terminal());
    }
}
