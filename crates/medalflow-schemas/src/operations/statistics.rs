//! Table statistics operations.

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use medalflow_error::{FlowResult, validation_error};

/// Create single-column statistics on a table.
///
/// The column-count constraint (exactly one) is enforced by the query
/// builder's shared pre-dispatch validation, not here: with `auto_discover`
/// set, the column may legitimately be absent until an external stats
/// config resolves it.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CreateStatistics {
    #[serde(default)]
    pub columns: Vec<String>,
    /// Derived as `stat_{object}_{column}` when absent.
    pub stats_name: Option<String>,
    pub sample_percent: Option<u8>,
    #[serde(default)]
    pub with_fullscan: bool,
    /// Resolve the column from the external stats config when no columns
    /// were supplied.
    #[serde(default)]
    pub auto_discover: bool,
}

impl CreateStatistics {
    pub(crate) fn validate(&self, target: &str) -> FlowResult<()> {
        if self.with_fullscan && self.sample_percent.is_some() {
            return Err(validation_error(
                format!(
                    "CreateStatistics on {target}: sample_percent and with_fullscan are mutually \
                     exclusive"
                ),
                Some("sample_percent"),
                None,
            ));
        }
        if let Some(percent) = self.sample_percent {
            if percent == 0 || percent > 100 {
                return Err(validation_error(
                    format!("CreateStatistics on {target}: sample_percent must be in 1..=100"),
                    Some("sample_percent"),
                    Some(&percent.to_string()),
                ));
            }
        }
        Ok(())
    }
}
