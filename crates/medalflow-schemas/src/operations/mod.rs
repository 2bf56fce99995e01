//! The operation model: a tagged union over every SQL-level action the
//! planner can schedule.
//!
//! Construction goes through [`builder::OperationBuilder`] (typed factory)
//! or [`builder::decode_operation`] (wire payloads); both validate. After
//! discovery an operation is immutable in content; attaching the request
//! context is the only sanctioned mutation.

pub mod builder;
pub mod copy;
pub mod ddl;
pub mod dml;
pub mod statistics;
pub mod views;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum_macros::Display;

use medalflow_common::constants::EngineType;
use medalflow_common::observability::ExecutionRequestContext;
use medalflow_error::FlowResult;

use crate::ident::validate_identifier;
use crate::metadata::QueryMetadata;

pub use copy::{Copy, ExecuteSql};
pub use ddl::{ColumnDefinition, CreateSchema, CreateTable, DropBehavior, DropSchema, DropTable};
pub use dml::{Delete, Insert, InsertMode, Merge, Select, Update};
pub use statistics::CreateStatistics;
pub use views::{CreateOrAlterView, DropView};

/// Discriminator over the operation variants. The serialized form is the
/// wire tag (`CREATE_TABLE`, `EXECUTE_SQL`, ...).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryType {
    Select,
    Insert,
    Update,
    Delete,
    Merge,
    CreateTable,
    DropTable,
    CreateSchema,
    DropSchema,
    CreateOrAlterView,
    DropView,
    CreateStatistics,
    Copy,
    ExecuteSql,
}

impl QueryType {
    /// Operation types that produce or mutate a target table. Used for the
    /// analyzer's best-effort write fallback.
    pub fn writes_to_target(&self) -> bool {
        matches!(
            self,
            QueryType::CreateTable
                | QueryType::Insert
                | QueryType::Update
                | QueryType::Merge
                | QueryType::Delete
        )
    }
}

/// Variant-specific payload, tagged on the wire by `operation_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationBody {
    Select(Select),
    Insert(Insert),
    Update(Update),
    Delete(Delete),
    Merge(Merge),
    CreateTable(CreateTable),
    DropTable(DropTable),
    CreateSchema(CreateSchema),
    DropSchema(DropSchema),
    CreateOrAlterView(CreateOrAlterView),
    DropView(DropView),
    CreateStatistics(CreateStatistics),
    Copy(Copy),
    ExecuteSql(ExecuteSql),
}

impl OperationBody {
    pub fn query_type(&self) -> QueryType {
        match self {
            OperationBody::Select(_) => QueryType::Select,
            OperationBody::Insert(_) => QueryType::Insert,
            OperationBody::Update(_) => QueryType::Update,
            OperationBody::Delete(_) => QueryType::Delete,
            OperationBody::Merge(_) => QueryType::Merge,
            OperationBody::CreateTable(_) => QueryType::CreateTable,
            OperationBody::DropTable(_) => QueryType::DropTable,
            OperationBody::CreateSchema(_) => QueryType::CreateSchema,
            OperationBody::DropSchema(_) => QueryType::DropSchema,
            OperationBody::CreateOrAlterView(_) => QueryType::CreateOrAlterView,
            OperationBody::DropView(_) => QueryType::DropView,
            OperationBody::CreateStatistics(_) => QueryType::CreateStatistics,
            OperationBody::Copy(_) => QueryType::Copy,
            OperationBody::ExecuteSql(_) => QueryType::ExecuteSql,
        }
    }
}

/// One declarative database operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    #[serde(default)]
    pub schema_name: String,
    #[serde(default)]
    pub object_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine_hint: Option<EngineType>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub logging_context: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<QueryMetadata>,
    /// Request context. Attached after planning; travels on the wire as the
    /// `_cte_request_context` staging key, not as a regular field.
    #[serde(skip)]
    pub context: Option<ExecutionRequestContext>,
    #[serde(flatten)]
    pub body: OperationBody,
}

impl Operation {
    pub fn new(schema_name: &str, object_name: &str, body: OperationBody) -> Self {
        Self {
            schema_name: schema_name.to_string(),
            object_name: object_name.to_string(),
            engine_hint: None,
            logging_context: BTreeMap::new(),
            metadata: None,
            context: None,
            body,
        }
    }

    pub fn with_engine_hint(mut self, hint: EngineType) -> Self {
        self.engine_hint = Some(hint);
        self
    }

    pub fn with_metadata(mut self, metadata: QueryMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_logging_context<I, K, V>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.logging_context
            .extend(entries.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn operation_type(&self) -> QueryType {
        self.body.query_type()
    }

    /// Stable discriminator; alias of [`Operation::operation_type`].
    pub fn kind(&self) -> QueryType {
        self.operation_type()
    }

    /// `schema.object` without quoting or prefixing. Prefix policy is the
    /// query builder's concern.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema_name, self.object_name)
    }

    /// Validate identifiers and the variant-specific field contract.
    ///
    /// `EXECUTE_SQL` is the one variant allowed to omit schema/object: raw
    /// statements have no single target object.
    pub fn validate(&self) -> FlowResult<()> {
        let raw_sql = matches!(self.body, OperationBody::ExecuteSql(_));
        if !(raw_sql && self.schema_name.is_empty()) {
            validate_identifier(&self.schema_name, "schema_name")?;
        }
        if !(raw_sql && self.object_name.is_empty()) {
            validate_identifier(&self.object_name, "object_name")?;
        }

        let target = self.qualified_name();
        match &self.body {
            OperationBody::Select(op) => op.validate(&target),
            OperationBody::Insert(op) => op.validate(&target),
            OperationBody::Update(op) => op.validate(&target),
            OperationBody::Delete(_) => Ok(()),
            OperationBody::Merge(op) => op.validate(&target),
            OperationBody::CreateTable(op) => op.validate(&target),
            OperationBody::DropTable(_) => Ok(()),
            OperationBody::CreateSchema(_) => Ok(()),
            OperationBody::DropSchema(_) => Ok(()),
            OperationBody::CreateOrAlterView(op) => op.validate(&target),
            OperationBody::DropView(_) => Ok(()),
            OperationBody::CreateStatistics(op) => op.validate(&target),
            OperationBody::Copy(op) => op.validate(&target),
            OperationBody::ExecuteSql(_) => Ok(()),
        }
    }

    /// Flattened string fields describing this operation for log enrichment.
    pub fn telemetry_fields(&self) -> BTreeMap<String, String> {
        let mut payload = BTreeMap::new();
        payload.insert("operation.type".to_string(), self.operation_type().to_string());
        payload.insert("operation.schema".to_string(), self.schema_name.clone());
        payload.insert("operation.object".to_string(), self.object_name.clone());
        if let Some(hint) = self.engine_hint {
            payload.insert("operation.engine_hint".to_string(), hint.to_string());
        }
        if let Some(operation_id) = self
            .metadata
            .as_ref()
            .and_then(|m| m.operation_id.as_ref())
        {
            payload.insert("operation.id".to_string(), operation_id.clone());
        }
        for (key, value) in &self.logging_context {
            payload.insert(format!("operation.ctx.{key}"), value.clone());
        }
        payload
    }

    /// Attach the request context, folding the operation's logging context
    /// and engine hint into the context's attribute bag.
    pub fn attach_context(&mut self, mut ctx: ExecutionRequestContext) {
        for (key, value) in &self.logging_context {
            ctx.set_attribute(key.clone(), value.clone());
        }
        if let Some(hint) = self.engine_hint {
            ctx.set_attribute("engine_hint", hint.to_string());
        }
        ctx.refresh_telemetry();
        self.context = Some(ctx);
    }
}
