//! Generic ANSI-flavored query builder.
//!
//! This is the platform-neutral renderer the dependency analyzer uses to
//! materialize SQL bodies, and the builder the test matrix runs against.
//! Platform builders (external tables, `TOP`, `USING DELTA`, ...) live
//! outside the core and override the same trait.

use std::fmt::Write as _;

use medalflow_error::FlowResult;
use medalflow_schemas::operations::{
    Copy, CreateOrAlterView, CreateSchema, CreateStatistics, CreateTable, Delete, DropBehavior,
    DropSchema, DropTable, DropView, ExecuteSql, Insert, InsertMode, Merge, Operation, Select,
    Update,
};

use crate::query_builder::QueryBuilder;

#[derive(Debug, Clone, Default)]
pub struct AnsiQueryBuilder {
    table_prefix: String,
    skip_prefix_schemas: Vec<String>,
}

impl AnsiQueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefix applied to object names outside the skip-prefix schemas,
    /// e.g. `sap_` for tables sourced from SAP.
    pub fn with_table_prefix(mut self, prefix: &str) -> Self {
        self.table_prefix = prefix.to_string();
        self
    }

    pub fn with_skip_prefix_schemas<I, S>(mut self, schemas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skip_prefix_schemas = schemas.into_iter().map(|s| s.into().to_lowercase()).collect();
        self
    }
}

impl QueryBuilder for AnsiQueryBuilder {
    fn table_prefix(&self) -> &str {
        &self.table_prefix
    }

    fn skip_prefix_schemas(&self) -> &[String] {
        &self.skip_prefix_schemas
    }

    fn build_create_table(&self, op: &Operation, body: &CreateTable) -> FlowResult<String> {
        let full_name = self.fully_qualified_name(&op.schema_name, &op.object_name)?;
        let mut sql = String::new();
        if body.recreate {
            writeln!(sql, "DROP TABLE IF EXISTS {full_name};").expect("write to string");
        }
        if let Some(select_query) = &body.select_query {
            write!(sql, "CREATE TABLE {full_name} AS\n{select_query}").expect("write to string");
        } else {
            let columns = body.columns.as_deref().unwrap_or_default();
            let definitions = self.format_column_definitions(columns)?;
            write!(sql, "CREATE TABLE {full_name} ({definitions})").expect("write to string");
        }
        if let Some(partitions) = &body.partitions {
            let list = self.format_column_list(partitions)?;
            write!(sql, "\nPARTITIONED BY ({list})").expect("write to string");
        }
        Ok(sql)
    }

    fn build_drop_table(&self, op: &Operation, body: &DropTable) -> FlowResult<String> {
        let full_name = self.fully_qualified_name(&op.schema_name, &op.object_name)?;
        if body.if_exists {
            Ok(format!("DROP TABLE IF EXISTS {full_name}"))
        } else {
            Ok(format!("DROP TABLE {full_name}"))
        }
    }

    fn build_insert(&self, op: &Operation, body: &Insert) -> FlowResult<String> {
        let full_name = self.fully_qualified_name(&op.schema_name, &op.object_name)?;
        let mut sql = String::new();
        if body.mode == InsertMode::Overwrite {
            writeln!(sql, "DELETE FROM {full_name};").expect("write to string");
        }
        let column_list = match &body.columns {
            Some(columns) => format!(" ({})", self.format_column_list(columns)?),
            None => String::new(),
        };
        if let Some(source_query) = &body.source_query {
            write!(sql, "INSERT INTO {full_name}{column_list}\n{source_query}")
                .expect("write to string");
        } else if let Some(rows) = &body.values {
            // Column order is taken from the first row; every row must
            // supply the same keys.
            let columns: Vec<String> = rows
                .first()
                .map(|row| row.keys().cloned().collect())
                .unwrap_or_default();
            let column_list = self.format_column_list(&columns)?;
            let mut tuples = Vec::with_capacity(rows.len());
            for row in rows {
                let values: Vec<serde_json::Value> = columns
                    .iter()
                    .map(|c| row.get(c).cloned().unwrap_or(serde_json::Value::Null))
                    .collect();
                tuples.push(format!("({})", self.format_value_list(&values)));
            }
            write!(
                sql,
                "INSERT INTO {full_name} ({column_list}) VALUES {}",
                tuples.join(", ")
            )
            .expect("write to string");
        }
        Ok(sql)
    }

    fn build_update(&self, op: &Operation, body: &Update) -> FlowResult<String> {
        let full_name = self.fully_qualified_name(&op.schema_name, &op.object_name)?;
        let set_clause = self.format_set_clause(&body.set_columns)?;
        let mut sql = format!("UPDATE {full_name} SET {set_clause}");
        if let Some(from_clause) = &body.from_clause {
            write!(sql, " FROM {from_clause}").expect("write to string");
        }
        if let Some(where_clause) = &body.where_clause {
            write!(sql, " WHERE {where_clause}").expect("write to string");
        }
        Ok(sql)
    }

    fn build_delete(&self, op: &Operation, body: &Delete) -> FlowResult<String> {
        let full_name = self.fully_qualified_name(&op.schema_name, &op.object_name)?;
        match &body.where_clause {
            Some(where_clause) => Ok(format!("DELETE FROM {full_name} WHERE {where_clause}")),
            None => Ok(format!("DELETE FROM {full_name}")),
        }
    }

    fn build_merge(&self, op: &Operation, body: &Merge) -> FlowResult<String> {
        let full_name = self.fully_qualified_name(&op.schema_name, &op.object_name)?;
        let mut sql = format!(
            "MERGE INTO {full_name} AS target\nUSING ({}) AS source\nON {}",
            body.source_query, body.merge_condition
        );
        if let Some(update) = &body.when_matched_update {
            let set_clause = self.format_set_clause(update)?;
            write!(sql, "\nWHEN MATCHED THEN UPDATE SET {set_clause}").expect("write to string");
        }
        if let Some(condition) = &body.when_matched_delete {
            write!(sql, "\nWHEN MATCHED AND {condition} THEN DELETE").expect("write to string");
        }
        if let Some(insert) = &body.when_not_matched_insert {
            let columns: Vec<String> = insert.keys().cloned().collect();
            let column_list = self.format_column_list(&columns)?;
            let values: Vec<serde_json::Value> = insert.values().cloned().collect();
            let value_list = self.format_value_list(&values);
            write!(
                sql,
                "\nWHEN NOT MATCHED THEN INSERT ({column_list}) VALUES ({value_list})"
            )
            .expect("write to string");
        }
        if let Some(update) = &body.when_not_matched_by_source_update {
            let set_clause = self.format_set_clause(update)?;
            write!(
                sql,
                "\nWHEN NOT MATCHED BY SOURCE THEN UPDATE SET {set_clause}"
            )
            .expect("write to string");
        }
        if body.when_not_matched_by_source_delete {
            sql.push_str("\nWHEN NOT MATCHED BY SOURCE THEN DELETE");
        }
        sql.push(';');
        Ok(sql)
    }

    fn build_copy(&self, op: &Operation, body: &Copy) -> FlowResult<String> {
        let full_name = self.fully_qualified_name(&op.schema_name, &op.object_name)?;
        let column_list = match &body.columns {
            Some(columns) => format!(" ({})", self.format_column_list(columns)?),
            None => String::new(),
        };
        let mut sql = format!(
            "COPY INTO {full_name}{column_list} FROM {}",
            self.quote_string(&body.source_path)
        );
        let mut options: Vec<String> = Vec::new();
        if let Some(file_format) = &body.file_format {
            options.push(format!("FILE_FORMAT = {}", self.quote_string(file_format)));
        }
        if let Some(extra) = &body.options {
            for (key, value) in extra {
                options.push(format!("{key} = {}", self.quote_string(value)));
            }
        }
        if !options.is_empty() {
            write!(sql, " WITH ({})", options.join(", ")).expect("write to string");
        }
        Ok(sql)
    }

    fn build_create_or_alter_view(
        &self,
        op: &Operation,
        body: &CreateOrAlterView,
    ) -> FlowResult<String> {
        let full_name = self.fully_qualified_name(&op.schema_name, &op.object_name)?;
        let columns = match &body.columns {
            Some(columns) => format!(" ({})", self.format_column_list(columns)?),
            None => String::new(),
        };
        let with_clause = if body.with_schemabinding {
            " WITH SCHEMABINDING"
        } else {
            ""
        };
        Ok(format!(
            "CREATE OR ALTER VIEW {full_name}{columns}{with_clause} AS\n{}",
            body.select_query
        ))
    }

    fn build_drop_view(&self, op: &Operation, body: &DropView) -> FlowResult<String> {
        let full_name = self.fully_qualified_name(&op.schema_name, &op.object_name)?;
        if body.if_exists {
            Ok(format!("DROP VIEW IF EXISTS {full_name}"))
        } else {
            Ok(format!("DROP VIEW {full_name}"))
        }
    }

    fn build_create_statistics(
        &self,
        op: &Operation,
        body: &CreateStatistics,
    ) -> FlowResult<String> {
        let full_name = self.fully_qualified_name(&op.schema_name, &op.object_name)?;
        // Pre-dispatch validation guarantees exactly one column here.
        let column_name = &body.columns[0];
        let stats_name = match &body.stats_name {
            Some(name) => self.quote_identifier(name, "statistics")?,
            None => self.quote_identifier(
                &format!("stat_{}_{column_name}", op.object_name),
                "statistics",
            )?,
        };
        let column = self.quote_identifier(column_name, "column")?;
        let with_clause = if body.with_fullscan {
            " WITH FULLSCAN".to_string()
        } else if let Some(percent) = body.sample_percent {
            format!(" WITH SAMPLE {percent} PERCENT")
        } else {
            String::new()
        };
        Ok(format!(
            "CREATE STATISTICS {stats_name} ON {full_name} ({column}){with_clause}"
        ))
    }

    fn build_create_schema(&self, op: &Operation, body: &CreateSchema) -> FlowResult<String> {
        let schema = self.quote_identifier(&op.schema_name, "schema")?;
        let auth_clause = match &body.authorization {
            Some(owner) => format!(" AUTHORIZATION {}", self.quote_identifier(owner, "owner")?),
            None => String::new(),
        };
        if body.if_not_exists {
            Ok(format!("CREATE SCHEMA IF NOT EXISTS {schema}{auth_clause}"))
        } else {
            Ok(format!("CREATE SCHEMA {schema}{auth_clause}"))
        }
    }

    fn build_drop_schema(&self, op: &Operation, body: &DropSchema) -> FlowResult<String> {
        let schema = self.quote_identifier(&op.schema_name, "schema")?;
        let mut sql = if body.if_exists {
            format!("DROP SCHEMA IF EXISTS {schema}")
        } else {
            format!("DROP SCHEMA {schema}")
        };
        match body.behavior {
            Some(DropBehavior::Cascade) => sql.push_str(" CASCADE"),
            Some(DropBehavior::Restrict) => sql.push_str(" RESTRICT"),
            None => {}
        }
        Ok(sql)
    }

    fn build_select(&self, op: &Operation, body: &Select) -> FlowResult<String> {
        let full_name = self.fully_qualified_name(&op.schema_name, &op.object_name)?;
        let select_clause = if body.distinct {
            "SELECT DISTINCT"
        } else {
            "SELECT"
        };
        let columns = match &body.columns {
            Some(columns) if !columns.is_empty() && columns.as_slice() != ["*".to_string()] => {
                self.format_column_list(columns)?
            }
            _ => "*".to_string(),
        };

        let mut sql = format!("{select_clause} {columns} FROM {full_name}");
        if let Some(join_clause) = &body.join_clause {
            write!(sql, " {join_clause}").expect("write to string");
        }
        if let Some(where_clause) = &body.where_clause {
            write!(sql, " WHERE {where_clause}").expect("write to string");
        }
        if let Some(group_by) = &body.group_by {
            let group_columns = self.format_column_list(group_by)?;
            write!(sql, " GROUP BY {group_columns}").expect("write to string");
            if let Some(having_clause) = &body.having_clause {
                write!(sql, " HAVING {having_clause}").expect("write to string");
            }
        }
        if let Some(order_by) = &body.order_by {
            write!(sql, " ORDER BY {}", order_by.join(", ")).expect("write to string");
        }
        if let Some(limit) = body.limit {
            write!(sql, " LIMIT {limit}").expect("write to string");
        }
        if let Some(offset) = body.offset {
            write!(sql, " OFFSET {offset}").expect("write to string");
        }
        Ok(sql)
    }

    fn build_execute_sql(&self, _op: &Operation, body: &ExecuteSql) -> FlowResult<String> {
        Ok(body.sql.trim().to_string())
    }
}
