//! The platform-agnostic query builder contract.
//!
//! Builders render operations to SQL; they never execute anything. The
//! provided [`QueryBuilder::build_query`] entry point runs the universal
//! pre-dispatch validations before forwarding to the per-variant method,
//! so every concrete builder inherits the same safety gates:
//!
//! - `CREATE_STATISTICS` must carry exactly one column (both shipped
//!   targets only support single-column statistics);
//! - `EXECUTE_SQL` statements are screened against a deny-list of
//!   dangerous procedures, extended with bulk-load patterns on platforms
//!   whose engines cannot bulk-load.

use once_cell::sync::Lazy;
use regex::Regex;

use medalflow_error::{ErrorCode, FlowError, FlowResult, validation_error};
use medalflow_schemas::operations::{
    ColumnDefinition, Copy, CreateOrAlterView, CreateSchema, CreateStatistics, CreateTable,
    Delete, DropSchema, DropTable, DropView, ExecuteSql, Insert, Merge, Operation, OperationBody,
    Select, Update,
};
use medalflow_schemas::validate_identifier;

static FORBIDDEN_SQL_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"XP_CMDSHELL",
        r"SP_CONFIGURE",
        r"SP_ADDEXTENDEDPROC",
        r"SP_EXECUTE_EXTERNAL_SCRIPT",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("forbidden sql pattern"))
    .collect()
});

static BULK_LOAD_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [r"OPENROWSET.*BULK", r"OPENDATASOURCE"]
        .iter()
        .map(|p| Regex::new(p).expect("bulk load pattern"))
        .collect()
});

static EXPRESSION_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\bGETDATE\b",
        r"\bNOW\b",
        r"\bCURRENT_TIMESTAMP\b",
        r"\bCAST\b",
        r"\bCONVERT\b",
        r"\bCASE\b",
        r"\bCOALESCE\b",
        r"\bISNULL\b",
        r"\bNULLIF\b",
        r"[+\-*/(]",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("expression pattern"))
    .collect()
});

/// Whether a string value in a SET clause is a SQL expression rather than
/// a literal.
pub fn is_expression(value: &str) -> bool {
    let upper = value.to_uppercase();
    EXPRESSION_PATTERNS.iter().any(|p| p.is_match(&upper))
}

pub trait QueryBuilder: Send + Sync {
    /// Per-instance table prefix applied to object names outside the
    /// skip-prefix schemas.
    fn table_prefix(&self) -> &str {
        ""
    }

    /// Schemas (lowercase) whose objects are rendered without the prefix.
    fn skip_prefix_schemas(&self) -> &[String] {
        &[]
    }

    /// Platforms whose engines cannot bulk-load must also reject
    /// `OPENROWSET ... BULK` / `OPENDATASOURCE` in raw SQL.
    fn supports_bulk_load(&self) -> bool {
        true
    }

    fn build_create_table(&self, op: &Operation, body: &CreateTable) -> FlowResult<String>;
    fn build_drop_table(&self, op: &Operation, body: &DropTable) -> FlowResult<String>;
    fn build_insert(&self, op: &Operation, body: &Insert) -> FlowResult<String>;
    fn build_update(&self, op: &Operation, body: &Update) -> FlowResult<String>;
    fn build_delete(&self, op: &Operation, body: &Delete) -> FlowResult<String>;
    fn build_merge(&self, op: &Operation, body: &Merge) -> FlowResult<String>;
    fn build_copy(&self, op: &Operation, body: &Copy) -> FlowResult<String>;
    fn build_create_or_alter_view(
        &self,
        op: &Operation,
        body: &CreateOrAlterView,
    ) -> FlowResult<String>;
    fn build_drop_view(&self, op: &Operation, body: &DropView) -> FlowResult<String>;
    fn build_create_statistics(
        &self,
        op: &Operation,
        body: &CreateStatistics,
    ) -> FlowResult<String>;
    fn build_create_schema(&self, op: &Operation, body: &CreateSchema) -> FlowResult<String>;
    fn build_drop_schema(&self, op: &Operation, body: &DropSchema) -> FlowResult<String>;
    fn build_select(&self, op: &Operation, body: &Select) -> FlowResult<String>;
    fn build_execute_sql(&self, op: &Operation, body: &ExecuteSql) -> FlowResult<String>;

    /// Render an operation to SQL, running the universal validations first.
    fn build_query(&self, op: &Operation) -> FlowResult<String> {
        match &op.body {
            OperationBody::CreateStatistics(body) => {
                self.validate_create_statistics(op, body)?;
                self.build_create_statistics(op, body)
            }
            OperationBody::ExecuteSql(body) => {
                self.validate_execute_sql(body)?;
                self.build_execute_sql(op, body)
            }
            OperationBody::Select(body) => self.build_select(op, body),
            OperationBody::Insert(body) => self.build_insert(op, body),
            OperationBody::Update(body) => self.build_update(op, body),
            OperationBody::Delete(body) => self.build_delete(op, body),
            OperationBody::Merge(body) => self.build_merge(op, body),
            OperationBody::CreateTable(body) => self.build_create_table(op, body),
            OperationBody::DropTable(body) => self.build_drop_table(op, body),
            OperationBody::CreateSchema(body) => self.build_create_schema(op, body),
            OperationBody::DropSchema(body) => self.build_drop_schema(op, body),
            OperationBody::CreateOrAlterView(body) => self.build_create_or_alter_view(op, body),
            OperationBody::DropView(body) => self.build_drop_view(op, body),
            OperationBody::Copy(body) => self.build_copy(op, body),
        }
    }

    /// Single-column statistics gate, shared by every builder.
    fn validate_create_statistics(
        &self,
        op: &Operation,
        body: &CreateStatistics,
    ) -> FlowResult<()> {
        let full_name = self.fully_qualified_name(&op.schema_name, &op.object_name)?;
        if body.columns.is_empty() {
            return Err(validation_error(
                format!(
                    "Cannot create statistics on {full_name}: No columns specified. \
                     Statistics operations require exactly one column."
                ),
                Some("columns"),
                None,
            ));
        }
        if body.columns.len() > 1 {
            return Err(validation_error(
                format!(
                    "Cannot create statistics on {full_name}: Multiple columns specified ({}). \
                     Both Synapse and Fabric only support single-column statistics. \
                     Create separate statistics for each column.",
                    body.columns.join(", ")
                ),
                Some("columns"),
                Some(&body.columns.join(", ")),
            ));
        }
        Ok(())
    }

    /// Deny-list screening for raw SQL pass-through.
    fn validate_execute_sql(&self, body: &ExecuteSql) -> FlowResult<()> {
        let sql = body.sql.trim();
        if sql.is_empty() {
            return Err(validation_error(
                "ExecuteSql requires a non-empty statement",
                Some("sql"),
                None,
            ));
        }
        let upper = sql.to_uppercase();
        for pattern in FORBIDDEN_SQL_PATTERNS.iter() {
            if pattern.is_match(&upper) {
                return Err(forbidden_sql(pattern.as_str()));
            }
        }
        if !self.supports_bulk_load() {
            for pattern in BULK_LOAD_PATTERNS.iter() {
                if pattern.is_match(&upper) {
                    return Err(forbidden_sql(pattern.as_str()));
                }
            }
        }
        Ok(())
    }

    /// Quote an identifier for safe SQL usage. Default quoting is square
    /// brackets; platforms override for double quotes or backticks.
    fn quote_identifier(&self, identifier: &str, identifier_type: &str) -> FlowResult<String> {
        let stripped: String = identifier
            .trim()
            .chars()
            .filter(|c| *c != '[' && *c != ']')
            .collect();
        validate_identifier(&stripped, identifier_type)?;
        Ok(format!("[{stripped}]"))
    }

    /// Quote a string literal, doubling embedded quotes.
    fn quote_string(&self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    /// Fully qualified object name with the prefix policy applied: schemas
    /// in the skip list render un-prefixed, everything else gets the
    /// per-instance table prefix on the object component.
    fn fully_qualified_name(&self, schema: &str, object_name: &str) -> FlowResult<String> {
        let quoted_schema = self.quote_identifier(schema, "schema")?;
        let skip = self
            .skip_prefix_schemas()
            .iter()
            .any(|s| s == &schema.to_lowercase());
        let quoted_object = if skip {
            self.quote_identifier(object_name, "object")?
        } else {
            self.quote_identifier(
                &format!("{}{}", self.table_prefix(), object_name),
                "object",
            )?
        };
        Ok(format!("{quoted_schema}.{quoted_object}"))
    }

    fn format_column_list(&self, columns: &[String]) -> FlowResult<String> {
        let mut quoted = Vec::with_capacity(columns.len());
        for column in columns {
            quoted.push(self.quote_identifier(column, "column")?);
        }
        Ok(quoted.join(", "))
    }

    fn format_value(&self, value: &serde_json::Value) -> String {
        match value {
            serde_json::Value::Null => "NULL".to_string(),
            serde_json::Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            serde_json::Value::String(s) => self.quote_string(s),
            other => other.to_string(),
        }
    }

    fn format_value_list(&self, values: &[serde_json::Value]) -> String {
        values
            .iter()
            .map(|v| self.format_value(v))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// `col1 = val1, col2 = expr2` for UPDATE and MERGE SET clauses.
    /// String values that look like expressions are emitted verbatim.
    fn format_set_clause(
        &self,
        columns: &std::collections::BTreeMap<String, serde_json::Value>,
    ) -> FlowResult<String> {
        let mut assignments = Vec::with_capacity(columns.len());
        for (column, value) in columns {
            let quoted = self.quote_identifier(column, "column")?;
            let rendered = match value {
                serde_json::Value::String(s) if is_expression(s) => s.clone(),
                other => self.format_value(other),
            };
            assignments.push(format!("{quoted} = {rendered}"));
        }
        Ok(assignments.join(", "))
    }

    fn format_column_definitions(&self, columns: &[ColumnDefinition]) -> FlowResult<String> {
        let mut definitions = Vec::with_capacity(columns.len());
        for col in columns {
            let mut definition = format!(
                "{} {}",
                self.quote_identifier(&col.name, "column")?,
                col.data_type
            );
            if !col.nullable {
                definition.push_str(" NOT NULL");
            }
            if let Some(default) = &col.default_value {
                definition.push_str(&format!(" DEFAULT {}", self.format_value(default)));
            }
            if col.primary_key {
                definition.push_str(" PRIMARY KEY");
            } else if col.unique {
                definition.push_str(" UNIQUE");
            }
            if let Some(check) = &col.check_constraint {
                definition.push_str(&format!(" CHECK ({check})"));
            }
            definitions.push(definition);
        }
        Ok(definitions.join(", "))
    }

    /// `SELECT * FROM schema.object` with the prefix policy applied.
    fn build_select_all(&self, schema: &str, object_name: &str) -> FlowResult<String> {
        let full_name = self.fully_qualified_name(schema, object_name)?;
        Ok(format!("SELECT * FROM {full_name}"))
    }
}

fn forbidden_sql(pattern: &str) -> FlowError {
    FlowError::new(
        ErrorCode::ValidationError,
        format!("Potentially dangerous SQL pattern detected: {pattern}"),
    )
    .with_detail("pattern", pattern)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expression_detection() {
        assert!(is_expression("GETDATE()"));
        assert!(is_expression("price * 1.1"));
        assert!(is_expression("COALESCE(a, b)"));
        assert!(!is_expression("plain value"));
    }
}
