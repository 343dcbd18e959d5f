//! Catalog adapter and query analyzer traits

use etlgraph_core::{DatasetListingRecord, LineageError, TableListingRecord, TableRef};
use std::collections::HashMap;

/// One result row, keyed by column name
pub type QueryRow = HashMap<String, Option<String>>;

/// Errors that can occur when talking to the catalog
#[derive(Debug, Clone, thiserror::Error)]
pub enum CatalogError {
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Query failed: {0}")]
    QueryError(String),

    #[error("Query analysis failed for {view}: {message}")]
    AnalysisError { view: String, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl CatalogError {
    /// Whether retrying the same call may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::NetworkError(_) | Self::RateLimited(_) | Self::ServiceUnavailable(_)
        )
    }

    /// Classify an error message returned by the warehouse service
    pub fn from_service_message(context: &str, message: String) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("not found") {
            Self::TableNotFound(format!("{context}: {message}"))
        } else if lower.contains("access denied") || lower.contains("permission") {
            Self::PermissionDenied(format!("{context}: {message}"))
        } else if lower.contains("rate limit") || lower.contains("quota exceeded") {
            Self::RateLimited(format!("{context}: {message}"))
        } else if lower.contains("backend error") || lower.contains("503") || lower.contains("unavailable") {
            Self::ServiceUnavailable(format!("{context}: {message}"))
        } else if lower.contains("connection") || lower.contains("timed out") {
            Self::NetworkError(format!("{context}: {message}"))
        } else {
            Self::QueryError(format!("{context}: {message}"))
        }
    }
}

/// Failures of a crawl or extraction stage as a whole
#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Store(#[from] LineageError),
}

/// Read access to a warehouse catalog
#[async_trait::async_trait]
pub trait CatalogAdapter: Send + Sync {
    /// Get the adapter name (e.g., "BigQuery")
    fn name(&self) -> &'static str;

    /// List the datasets of a project
    async fn list_datasets(&self, project: &str) -> Result<Vec<DatasetListingRecord>, CatalogError>;

    /// List the tables and views of a dataset
    async fn list_tables(&self, project: &str, dataset: &str) -> Result<Vec<TableListingRecord>, CatalogError>;

    /// Fetch the SQL body defining a view
    async fn fetch_view_query(&self, view: &TableRef) -> Result<String, CatalogError>;

    /// Run a query billed to `project` and return its rows
    async fn run_query(&self, project: &str, sql: &str) -> Result<Vec<QueryRow>, CatalogError>;

    /// Test the connection to the warehouse
    async fn test_connection(&self) -> Result<(), CatalogError>;
}

/// Reports the tables a query reads, without executing it
#[async_trait::async_trait]
pub trait QueryAnalyzer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Tables read by `sql`, the defining query of `view`
    async fn referenced_tables(&self, view: &TableRef, sql: &str) -> Result<Vec<TableRef>, CatalogError>;
}
