//! Observability context propagated across an execution request.
//!
//! The context is created at the ingress point, attached to operations
//! during plan emission, serialized alongside them, and re-attached when a
//! worker decodes an operation. Engines receive the flattened telemetry map
//! rather than the context itself.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cancellation::CancellationToken;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExecutionRequestContext {
    pub request_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    /// Cached flattened telemetry map. Derived state; not serialized.
    #[serde(skip)]
    telemetry_base: BTreeMap<String, String>,
    /// Cooperative cancellation handle. Propagated, never acted on here.
    #[serde(skip)]
    cancellation: CancellationToken,
}

impl ExecutionRequestContext {
    /// Generate a fresh context with a random request id.
    pub fn generate() -> Self {
        let mut ctx = Self {
            request_id: Uuid::new_v4(),
            ..Self::default()
        };
        ctx.refresh_telemetry();
        ctx
    }

    pub fn with_request_id(request_id: Uuid) -> Self {
        let mut ctx = Self {
            request_id,
            ..Self::default()
        };
        ctx.refresh_telemetry();
        ctx
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self.refresh_telemetry();
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self.refresh_telemetry();
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self.refresh_telemetry();
        self
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(key.into(), value.into());
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Flatten the context into string telemetry fields. Attribute keys are
    /// prefixed with `ctx.`.
    pub fn to_telemetry_dict(&self) -> BTreeMap<String, String> {
        let mut payload = BTreeMap::new();
        payload.insert("request_id".to_string(), self.request_id.to_string());
        if let Some(user_id) = &self.user_id {
            payload.insert("user_id".to_string(), user_id.clone());
        }
        if let Some(correlation_id) = &self.correlation_id {
            payload.insert("correlation_id".to_string(), correlation_id.clone());
        }
        for (key, value) in &self.attributes {
            payload.insert(format!("ctx.{key}"), value.clone());
        }
        payload
    }

    /// Recompute the cached telemetry base after attribute mutation.
    pub fn refresh_telemetry(&mut self) {
        self.telemetry_base = self.to_telemetry_dict();
    }

    pub fn telemetry_base(&self) -> &BTreeMap<String, String> {
        &self.telemetry_base
    }

    /// Merge the context telemetry with additional key/value pairs.
    pub fn merge_telemetry<I, K, V>(&self, extra: I) -> BTreeMap<String, String>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut payload = if self.telemetry_base.is_empty() {
            self.to_telemetry_dict()
        } else {
            self.telemetry_base.clone()
        };
        payload.extend(extra.into_iter().map(|(k, v)| (k.into(), v.into())));
        payload
    }
}

impl PartialEq for ExecutionRequestContext {
    fn eq(&self, other: &Self) -> bool {
        // Derived caches and the cancellation handle do not participate in
        // value equality.
        self.request_id == other.request_id
            && self.user_id == other.user_id
            && self.correlation_id == other.correlation_id
            && self.attributes == other.attributes
    }
}
