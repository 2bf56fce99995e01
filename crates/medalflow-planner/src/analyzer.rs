//! SQL dependency analysis.
//!
//! Parses a statement into an AST and reports which tables it reads and
//! which table it writes. CTE names are locally scoped aliases, not real
//! tables, so they are excluded from the read set, and they win over real
//! tables of the same name.

use std::collections::BTreeSet;
use std::ops::ControlFlow;

use sqlparser::ast::{
    FromTable, ObjectName, Query, SetExpr, Statement, TableFactor, Visit, Visitor,
};
use sqlparser::dialect::{Dialect, GenericDialect, MsSqlDialect, dialect_from_str};
use sqlparser::parser::Parser;
use tracing::{debug, warn};

use medalflow_adapter::QueryBuilder;
use medalflow_error::{ErrorCode, FlowError, FlowResult};
use medalflow_schemas::SqlDependencies;
use medalflow_schemas::operations::Operation;

/// Failure modes of single-statement analysis. Converted into a
/// [`FlowError`] at the orchestrator boundary.
#[derive(Debug, thiserror::Error)]
pub enum AnalyzeError {
    #[error("SQL query must be a non-empty string")]
    EmptySql,
    #[error("failed to parse SQL: {0}")]
    Parse(#[from] sqlparser::parser::ParserError),
    #[error("SQL contained no statements")]
    NoStatements,
}

impl From<AnalyzeError> for FlowError {
    fn from(err: AnalyzeError) -> Self {
        FlowError::new(ErrorCode::TransformationError, "SQL dependency analysis failed")
            .caused_by(&err)
    }
}

/// Collects every table reference and every CTE alias in one walk.
/// Filtering happens after the walk: a CTE defined anywhere in the
/// statement shadows same-named tables everywhere in it.
#[derive(Default)]
struct RelationCollector {
    relations: Vec<String>,
    cte_aliases: BTreeSet<String>,
}

impl Visitor for RelationCollector {
    type Break = ();

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<()> {
        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                self.cte_aliases.insert(cte.alias.name.value.to_lowercase());
            }
        }
        ControlFlow::Continue(())
    }

    fn pre_visit_relation(&mut self, relation: &ObjectName) -> ControlFlow<()> {
        self.relations.push(render_object_name(relation));
        ControlFlow::Continue(())
    }
}

fn render_object_name(name: &ObjectName) -> String {
    name.0
        .iter()
        .map(|ident| ident.value.clone())
        .collect::<Vec<_>>()
        .join(".")
}

fn table_factor_name(factor: &TableFactor) -> Option<String> {
    match factor {
        TableFactor::Table { name, .. } => Some(render_object_name(name)),
        _ => None,
    }
}

/// Final name component, lowercased, for CTE matching.
fn final_component(qualified: &str) -> String {
    qualified
        .rsplit('.')
        .next()
        .unwrap_or(qualified)
        .to_lowercase()
}

pub struct SqlDependencyAnalyzer {
    dialect: Box<dyn Dialect>,
}

impl SqlDependencyAnalyzer {
    /// Create an analyzer for a dialect tag ("tsql", "generic",
    /// "snowflake", ...). Unknown tags fall back to the generic dialect.
    pub fn new(dialect: &str) -> Self {
        let dialect: Box<dyn Dialect> = match dialect.to_lowercase().as_str() {
            "tsql" | "mssql" => Box::new(MsSqlDialect {}),
            other => dialect_from_str(other).unwrap_or_else(|| Box::new(GenericDialect {})),
        };
        Self { dialect }
    }

    /// Extract source and target tables from a SQL body.
    ///
    /// Builders may emit small scripts (a drop preceding a recreate, a
    /// delete preceding an overwrite insert), so every statement is
    /// analyzed: reads are the union across statements, the write target
    /// is the last DML target, and tables the script itself writes or
    /// drops never count as reads.
    pub fn extract_dependencies(&self, sql: &str) -> Result<SqlDependencies, AnalyzeError> {
        if sql.trim().is_empty() {
            return Err(AnalyzeError::EmptySql);
        }

        let statements = Parser::parse_sql(self.dialect.as_ref(), sql)?;
        if statements.is_empty() {
            return Err(AnalyzeError::NoStatements);
        }

        let mut collector = RelationCollector::default();
        let mut own_targets: BTreeSet<String> = BTreeSet::new();
        let mut writes_to = None;
        for statement in &statements {
            let _ = statement.visit(&mut collector);
            if let Statement::Drop { names, .. } = statement {
                own_targets.extend(names.iter().map(|n| render_object_name(n).to_lowercase()));
            }
            if let Some(target) = Self::target_table(statement) {
                own_targets.insert(target.to_lowercase());
                writes_to = Some(target);
            }
        }

        let mut reads_from = BTreeSet::new();
        for relation in collector.relations {
            if collector.cte_aliases.contains(&final_component(&relation)) {
                continue;
            }
            if own_targets.contains(&relation.to_lowercase()) {
                continue;
            }
            reads_from.insert(relation);
        }

        Ok(SqlDependencies {
            reads_from,
            writes_to,
        })
    }

    /// Target table of a DML root statement, or `None` for plain queries.
    fn target_table(statement: &Statement) -> Option<String> {
        match statement {
            Statement::Insert(insert) => Some(render_object_name(&insert.table_name)),
            Statement::Update { table, .. } => table_factor_name(&table.relation),
            Statement::Merge { table, .. } => table_factor_name(table),
            Statement::Delete(delete) => {
                if let Some(name) = delete.tables.first() {
                    return Some(render_object_name(name));
                }
                let tables = match &delete.from {
                    FromTable::WithFromKeyword(tables) => tables,
                    FromTable::WithoutKeyword(tables) => tables,
                };
                tables
                    .first()
                    .and_then(|table| table_factor_name(&table.relation))
            }
            Statement::CreateTable(create) => Some(render_object_name(&create.name)),
            // A statement-level WITH wrapping DML parses as a query whose
            // body is the inner statement.
            Statement::Query(query) => match query.body.as_ref() {
                SetExpr::Insert(inner) | SetExpr::Update(inner) => Self::target_table(inner),
                _ => None,
            },
            _ => None,
        }
    }

    /// Analyze a batch of operations, materializing each operation's SQL
    /// body through the query builder first.
    ///
    /// In tolerant mode a failing operation degrades to a minimal record
    /// (no reads, best-effort write target) instead of failing the batch.
    pub fn analyze_operations(
        &self,
        operations: &[Operation],
        query_builder: &dyn QueryBuilder,
        tolerant: bool,
    ) -> FlowResult<Vec<SqlDependencies>> {
        let mut results = Vec::with_capacity(operations.len());
        for operation in operations {
            let analyzed = query_builder
                .build_query(operation)
                .map_err(|e| AnalysisFailure::Build(e))
                .and_then(|sql| {
                    self.extract_dependencies(&sql)
                        .map_err(AnalysisFailure::Analyze)
                });

            match analyzed {
                Ok(deps) => {
                    debug!(
                        operation = %operation.qualified_name(),
                        operation_type = %operation.operation_type(),
                        sources = deps.reads_from.len(),
                        target = deps.writes_to.as_deref().unwrap_or(""),
                        "operation analyzed"
                    );
                    results.push(deps);
                }
                Err(failure) if tolerant => {
                    warn!(
                        operation = %operation.qualified_name(),
                        error = %failure,
                        "dependency analysis failed, using minimal fallback"
                    );
                    let writes_to = operation
                        .operation_type()
                        .writes_to_target()
                        .then(|| operation.qualified_name());
                    results.push(SqlDependencies {
                        reads_from: BTreeSet::new(),
                        writes_to,
                    });
                }
                Err(AnalysisFailure::Build(e)) => return Err(e),
                Err(AnalysisFailure::Analyze(e)) => {
                    return Err(FlowError::from(e).with_detail(
                        "operation",
                        operation.qualified_name(),
                    ));
                }
            }
        }
        Ok(results)
    }
}

#[derive(Debug, thiserror::Error)]
enum AnalysisFailure {
    #[error("{0}")]
    Build(FlowError),
    #[error("{0}")]
    Analyze(AnalyzeError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn analyzer() -> SqlDependencyAnalyzer {
        SqlDependencyAnalyzer::new("tsql")
    }

    fn reads(deps: &SqlDependencies) -> Vec<&str> {
        deps.reads_from.iter().map(String::as_str).collect()
    }

    #[test]
    fn insert_select_reports_reads_and_write() {
        let deps = analyzer()
            .extract_dependencies(
                "INSERT INTO silver.customers SELECT * FROM bronze.raw_customers",
            )
            .unwrap();
        assert_eq!(reads(&deps), ["bronze.raw_customers"]);
        assert_eq!(deps.writes_to.as_deref(), Some("silver.customers"));
    }

    #[test]
    fn cte_names_are_not_dependencies() {
        let deps = analyzer()
            .extract_dependencies(
                "WITH t AS (SELECT * FROM bronze.src) \
                 INSERT INTO silver.out SELECT * FROM t",
            )
            .unwrap();
        assert_eq!(reads(&deps), ["bronze.src"]);
        assert_eq!(deps.writes_to.as_deref(), Some("silver.out"));
    }

    #[test]
    fn cte_shadows_real_table_of_same_name() {
        let deps = analyzer()
            .extract_dependencies(
                "WITH orders AS (SELECT * FROM bronze.orders) \
                 SELECT * FROM orders JOIN dim.products p ON orders.product_id = p.id",
            )
            .unwrap();
        assert_eq!(reads(&deps), ["bronze.orders", "dim.products"]);
        assert_eq!(deps.writes_to, None);
    }

    #[test]
    fn chained_ctes_are_all_excluded() {
        let sql = indoc::indoc! {"
            WITH recent AS (
                SELECT * FROM staging.temp WHERE load_date > '2024-01-01'
            ),
            ranked AS (
                SELECT r.*, ROW_NUMBER() OVER (ORDER BY r.load_date) AS rn
                FROM recent r
            )
            INSERT INTO silver.fact_sales
            SELECT * FROM ranked JOIN dim.products p ON ranked.product_id = p.id
        "};
        let deps = analyzer().extract_dependencies(sql).unwrap();
        assert_eq!(reads(&deps), ["dim.products", "staging.temp"]);
        assert_eq!(deps.writes_to.as_deref(), Some("silver.fact_sales"));
    }

    #[test]
    fn repeated_tables_collapse() {
        let deps = analyzer()
            .extract_dependencies(
                "SELECT a.x FROM silver.t a JOIN silver.t b ON a.id = b.id \
                 WHERE a.id IN (SELECT id FROM silver.t)",
            )
            .unwrap();
        assert_eq!(reads(&deps), ["silver.t"]);
    }

    #[test]
    fn unqualified_names_stay_bare() {
        let deps = analyzer()
            .extract_dependencies("SELECT * FROM staging_orders")
            .unwrap();
        assert_eq!(reads(&deps), ["staging_orders"]);
    }

    #[test]
    fn update_merge_delete_targets() {
        let deps = analyzer()
            .extract_dependencies("UPDATE silver.dim SET x = 1 WHERE id > 5")
            .unwrap();
        assert_eq!(deps.writes_to.as_deref(), Some("silver.dim"));

        let deps = analyzer()
            .extract_dependencies(
                "MERGE INTO silver.dim AS t USING (SELECT * FROM staging.src) AS s \
                 ON t.id = s.id WHEN MATCHED THEN UPDATE SET t.x = s.x",
            )
            .unwrap();
        assert_eq!(deps.writes_to.as_deref(), Some("silver.dim"));
        assert_eq!(reads(&deps), ["staging.src"]);

        let deps = analyzer()
            .extract_dependencies("DELETE FROM silver.old_rows WHERE load_date < '2020-01-01'")
            .unwrap();
        assert_eq!(deps.writes_to.as_deref(), Some("silver.old_rows"));
    }

    #[test]
    fn ctas_reports_write() {
        let deps = analyzer()
            .extract_dependencies("CREATE TABLE silver.a AS SELECT * FROM bronze.raw_a")
            .unwrap();
        assert_eq!(deps.writes_to.as_deref(), Some("silver.a"));
        assert_eq!(reads(&deps), ["bronze.raw_a"]);
    }

    #[test]
    fn recreate_scripts_keep_the_final_target() {
        let deps = analyzer()
            .extract_dependencies(
                "DROP TABLE IF EXISTS bronze.customers;\n\
                 CREATE TABLE bronze.customers AS\n\
                 SELECT * FROM dbo.customers WHERE IsDelete IS NULL",
            )
            .unwrap();
        assert_eq!(reads(&deps), ["dbo.customers"]);
        assert_eq!(deps.writes_to.as_deref(), Some("bronze.customers"));
    }

    #[test]
    fn overwrite_scripts_do_not_read_their_own_target() {
        let deps = analyzer()
            .extract_dependencies(
                "DELETE FROM silver.orders;\nINSERT INTO silver.orders SELECT * FROM bronze.orders",
            )
            .unwrap();
        assert_eq!(reads(&deps), ["bronze.orders"]);
        assert_eq!(deps.writes_to.as_deref(), Some("silver.orders"));
    }

    #[test]
    fn plain_select_writes_nothing() {
        let deps = analyzer()
            .extract_dependencies("SELECT * FROM gold.sales")
            .unwrap();
        assert_eq!(deps.writes_to, None);
    }

    #[test]
    fn empty_and_invalid_sql_are_rejected() {
        assert!(matches!(
            analyzer().extract_dependencies("   "),
            Err(AnalyzeError::EmptySql)
        ));
        assert!(matches!(
            analyzer().extract_dependencies("SELEKT * FORM t"),
            Err(AnalyzeError::Parse(_))
        ));
    }
}
