//! View operations.

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use medalflow_error::{FlowResult, validation_error};

#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CreateOrAlterView {
    #[serde(default)]
    pub select_query: String,
    pub columns: Option<Vec<String>>,
    #[serde(default)]
    pub with_schemabinding: bool,
}

impl CreateOrAlterView {
    pub fn from_select(select_query: &str) -> Self {
        Self {
            select_query: select_query.to_string(),
            ..Self::default()
        }
    }

    pub(crate) fn validate(&self, target: &str) -> FlowResult<()> {
        if self.select_query.trim().is_empty() {
            return Err(validation_error(
                format!("CreateOrAlterView {target}: select_query cannot be empty"),
                Some("select_query"),
                None,
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DropView {
    #[serde(default)]
    pub if_exists: bool,
}
