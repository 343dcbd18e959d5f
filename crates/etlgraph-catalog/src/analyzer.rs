//! Offline query analyzer backed by the SQL parser

use crate::adapter::{CatalogError, QueryAnalyzer};
use etlgraph_core::TableRef;
use etlgraph_sql::ReferenceExtractor;

/// Reports view references by parsing the view body locally
///
/// Cheaper than a dry run but blind to what the warehouse would expand, such
/// as wildcard tables and nested views, which stay as single references.
#[derive(Default)]
pub struct SqlParserAnalyzer {
    extractor: ReferenceExtractor,
}

#[async_trait::async_trait]
impl QueryAnalyzer for SqlParserAnalyzer {
    fn name(&self) -> &'static str {
        "SQL parser"
    }

    async fn referenced_tables(&self, view: &TableRef, sql: &str) -> Result<Vec<TableRef>, CatalogError> {
        let references = self.extractor
            .extract(sql, &view.project_id, &view.dataset_id)
            .map_err(|e| CatalogError::AnalysisError {
                view: format!("{}.{}.{}", view.project_id, view.dataset_id, view.table_id),
                message: e.to_string(),
            })?;

        if !references.unresolved.is_empty() {
            tracing::debug!(
                view = %view.table_id,
                unresolved = ?references.unresolved,
                "dropped relations that are not table names"
            );
        }

        Ok(references.tables)
    }
}
