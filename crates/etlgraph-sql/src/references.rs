//! Referenced-table extraction from view SQL
//!
//! Offline counterpart of the warehouse dry-run: parses the view body and
//! reports the tables it reads without touching the warehouse. Names are
//! resolved the way BigQuery resolves them inside a view: `t` is looked up in
//! the view's dataset, `d.t` in the view's project.

use etlgraph_core::TableRef;
use sqlparser::ast::{ObjectName, Query, Statement, Visit, Visitor};
use sqlparser::dialect::{BigQueryDialect, Dialect};
use sqlparser::parser::Parser;
use std::collections::HashSet;
use std::ops::ControlFlow;

/// Errors from analyzing a view body
#[derive(Debug, thiserror::Error)]
pub enum SqlAnalysisError {
    #[error("Empty SQL query")]
    EmptyQuery,

    #[error("SQL parsing failed: {0}")]
    ParseError(String),
}

impl From<sqlparser::parser::ParserError> for SqlAnalysisError {
    fn from(err: sqlparser::parser::ParserError) -> Self {
        SqlAnalysisError::ParseError(err.to_string())
    }
}

/// Tables read by one query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqlReferences {
    /// Resolved tables, in order of first appearance, without duplicates
    pub tables: Vec<TableRef>,

    /// Relation names that could not be mapped to a table triple
    pub unresolved: Vec<String>,
}

/// Extracts referenced tables from SQL text
pub struct ReferenceExtractor {
    dialect: Box<dyn Dialect + Send + Sync>,
}

impl ReferenceExtractor {
    /// Extractor using the BigQuery dialect
    pub fn bigquery() -> Self {
        Self {
            dialect: Box::new(BigQueryDialect {}),
        }
    }

    /// Report the tables `sql` reads
    ///
    /// `project` and `dataset` are the defaults used for one- and two-part
    /// names, normally the view's own project and dataset.
    pub fn extract(&self, sql: &str, project: &str, dataset: &str) -> Result<SqlReferences, SqlAnalysisError> {
        let sql = sql.trim();
        if sql.is_empty() {
            return Err(SqlAnalysisError::EmptyQuery);
        }

        let statements = Parser::parse_sql(&*self.dialect, sql)?;
        if statements.is_empty() {
            return Err(SqlAnalysisError::EmptyQuery);
        }

        Ok(collect(&statements, project, dataset))
    }
}

impl Default for ReferenceExtractor {
    fn default() -> Self {
        Self::bigquery()
    }
}

fn collect(statements: &[Statement], project: &str, dataset: &str) -> SqlReferences {
    let mut collector = RelationCollector::default();
    for statement in statements {
        let _ = statement.visit(&mut collector);
    }

    let mut references = SqlReferences::default();
    let mut seen = HashSet::new();

    for parts in collector.relations {
        let table = match parts.as_slice() {
            [name] if collector.ctes.contains(&name.to_lowercase()) => continue,
            [table] => TableRef::new(project, dataset, table.as_str()),
            [d, t] => TableRef::new(project, d.as_str(), t.as_str()),
            [p, d, t] => TableRef::new(p.as_str(), d.as_str(), t.as_str()),
            _ => {
                let name = parts.join(".");
                tracing::debug!(relation = %name, "unresolvable relation name");
                references.unresolved.push(name);
                continue;
            }
        };

        if seen.insert(table.clone()) {
            references.tables.push(table);
        }
    }

    references
}

/// Gathers CTE names and relation names in one walk of the AST
///
/// CTE names are collected query-wide; a CTE shadowing a real table of the
/// same unqualified name anywhere in the statement hides that table.
#[derive(Default)]
struct RelationCollector {
    ctes: HashSet<String>,
    relations: Vec<Vec<String>>,
}

impl Visitor for RelationCollector {
    type Break = ();

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<Self::Break> {
        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                self.ctes.insert(cte.alias.name.value.to_lowercase());
            }
        }
        ControlFlow::Continue(())
    }

    fn pre_visit_relation(&mut self, relation: &ObjectName) -> ControlFlow<Self::Break> {
        // A backtick-quoted `project.dataset.table` arrives as one identifier
        let parts: Vec<String> = relation
            .0
            .iter()
            .flat_map(|ident| ident.value.split('.').map(str::to_string).collect::<Vec<_>>())
            .filter(|part| !part.is_empty())
            .collect();

        if !parts.is_empty() {
            self.relations.push(parts);
        }
        ControlFlow::Continue(())
    }
}
