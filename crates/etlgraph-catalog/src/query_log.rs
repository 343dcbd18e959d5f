//! Query-log edge extraction
//!
//! Runs a fixed lineage query over the project's job history and stores each
//! (destination, referenced) pair as a [`QueryEdgeRecord`]. Names arrive
//! already qualified; they are stored verbatim and validated at aggregation.

use crate::adapter::{CatalogAdapter, CrawlError, QueryRow};
use etlgraph_core::{ListingStore, QueryEdgeRecord};
use serde::Serialize;
use std::path::PathBuf;

/// Query-log artifact written to a project directory
pub const QUERY_EDGELIST_FILE: &str = "shared_prod_edgelist.ndjson";

/// Lineage query over INFORMATION_SCHEMA.JOBS_BY_PROJECT
pub const SHARED_PROD_EDGELIST_SQL: &str = include_str!("../resources/shared_prod_edgelist.sql");

const DESTINATION_COLUMN: &str = "destination_table";
const REFERENCED_COLUMN: &str = "referenced_table";

/// Outcome of one extraction
#[derive(Debug, Clone, Serialize)]
pub struct QueryLogSummary {
    pub output: PathBuf,
    pub rows: usize,
    pub edges: usize,

    /// Rows lacking either column
    pub skipped: usize,
}

/// Extracts query-log edges for one project into the listing store
pub struct QueryLogExtractor<'a> {
    catalog: &'a dyn CatalogAdapter,
    store: &'a ListingStore,
    sql: &'a str,
}

impl<'a> QueryLogExtractor<'a> {
    pub fn new(catalog: &'a dyn CatalogAdapter, store: &'a ListingStore) -> Self {
        Self {
            catalog,
            store,
            sql: SHARED_PROD_EDGELIST_SQL,
        }
    }

    /// Use a different lineage query; it must return the same two columns
    pub fn with_sql(mut self, sql: &'a str) -> Self {
        self.sql = sql;
        self
    }

    /// Run the lineage query billed to `project` and write its edges
    pub async fn extract(&self, project: &str) -> Result<QueryLogSummary, CrawlError> {
        tracing::info!(project, catalog = self.catalog.name(), "running query-log lineage query");
        let rows = self.catalog.run_query(project, self.sql).await?;

        let mut records = Vec::with_capacity(rows.len());
        let mut skipped = 0usize;

        for (index, row) in rows.iter().enumerate() {
            match edge_from_row(row) {
                Some(record) => records.push(record),
                None => {
                    skipped += 1;
                    tracing::warn!(project, row = index + 1, "skipping query-log row without both tables");
                }
            }
        }

        let relative = PathBuf::from(project).join(QUERY_EDGELIST_FILE);
        let output = self.store.write_records(&relative, &records)?;
        tracing::info!(path = %output.display(), edges = records.len(), skipped, "wrote query-log edges");

        Ok(QueryLogSummary {
            output,
            rows: rows.len(),
            edges: records.len(),
            skipped,
        })
    }
}

fn edge_from_row(row: &QueryRow) -> Option<QueryEdgeRecord> {
    let column = |name: &str| {
        row.get(name)
            .and_then(|value| value.as_deref())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };

    Some(QueryEdgeRecord::new(column(DESTINATION_COLUMN)?, column(REFERENCED_COLUMN)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(destination: Option<&str>, referenced: Option<&str>) -> QueryRow {
        let mut row = QueryRow::new();
        row.insert(DESTINATION_COLUMN.to_string(), destination.map(str::to_string));
        row.insert(REFERENCED_COLUMN.to_string(), referenced.map(str::to_string));
        row
    }

    #[test]
    fn rows_need_both_columns() {
        assert_eq!(
            edge_from_row(&row(Some("p.d.a"), Some("p.d.b"))),
            Some(QueryEdgeRecord::new("p.d.a", "p.d.b"))
        );
        assert_eq!(edge_from_row(&row(None, Some("p.d.b"))), None);
        assert_eq!(edge_from_row(&row(Some("p.d.a"), Some("  "))), None);
        assert_eq!(edge_from_row(&QueryRow::new()), None);
    }

    #[test]
    fn embedded_query_returns_expected_columns() {
        assert!(SHARED_PROD_EDGELIST_SQL.contains("JOBS_BY_PROJECT"));
        assert!(SHARED_PROD_EDGELIST_SQL.contains("AS destination_table"));
        assert!(SHARED_PROD_EDGELIST_SQL.contains("AS referenced_table"));
    }
}
