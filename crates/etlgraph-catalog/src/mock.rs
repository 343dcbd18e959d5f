//! Mock catalog for testing
//!
//! Serves predefined datasets, tables, view bodies, and references without
//! connecting to any warehouse. Used for:
//! - Unit testing the resolver, crawler, and query-log extraction
//! - Simulating permanent and transient failures per view
//! - Demos without real credentials
//!
//! ## Usage
//!
//! ```rust,ignore
//! use etlgraph_catalog::{MockCatalog, ViewReferenceResolver};
//! use etlgraph_core::TableRef;
//!
//! let catalog = MockCatalog::new();
//! let view = TableRef::new("p", "d", "v");
//! catalog.add_view(&view, "SELECT * FROM t", vec![TableRef::new("p", "d", "t")]).await;
//!
//! let catalog = Arc::new(catalog);
//! let resolver = ViewReferenceResolver::new(catalog.clone(), catalog);
//! ```

use crate::adapter::{CatalogAdapter, CatalogError, QueryAnalyzer, QueryRow};
use etlgraph_core::{DatasetListingRecord, TableListingRecord, TableRef, VIEW_TABLE_TYPE};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

fn fqn(table: &TableRef) -> String {
    format!("{}.{}.{}", table.project_id, table.dataset_id, table.table_id)
}

/// In-memory catalog and analyzer
///
/// Both traits are implemented on the same value, so one `Arc<MockCatalog>`
/// can be handed to the resolver as catalog and analyzer.
pub struct MockCatalog {
    /// Dataset ids by project
    datasets: Arc<RwLock<HashMap<String, Vec<String>>>>,

    /// Tables by `project.dataset`
    tables: Arc<RwLock<HashMap<String, Vec<TableListingRecord>>>>,

    /// View bodies by view FQN
    view_sql: Arc<RwLock<HashMap<String, String>>>,

    /// Analyzer answers by view FQN
    references: Arc<RwLock<HashMap<String, Vec<TableRef>>>>,

    /// Permanent errors by view FQN, `project.dataset`, or project
    errors: Arc<RwLock<HashMap<String, CatalogError>>>,

    /// Remaining transient failures by view FQN
    transient_failures: Arc<RwLock<HashMap<String, u32>>>,

    /// Rows returned from every `run_query`
    query_rows: Arc<RwLock<Vec<QueryRow>>>,

    /// SQL passed to `run_query`, in call order
    executed: Arc<RwLock<Vec<String>>>,

    /// Error returned from every `run_query`
    query_error: Arc<RwLock<Option<CatalogError>>>,

    view_fetches: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,

    fail_connection: bool,

    /// Simulated latency of every view fetch (milliseconds)
    latency_ms: u64,
}

impl MockCatalog {
    pub fn new() -> Self {
        Self {
            datasets: Arc::new(RwLock::new(HashMap::new())),
            tables: Arc::new(RwLock::new(HashMap::new())),
            view_sql: Arc::new(RwLock::new(HashMap::new())),
            references: Arc::new(RwLock::new(HashMap::new())),
            errors: Arc::new(RwLock::new(HashMap::new())),
            transient_failures: Arc::new(RwLock::new(HashMap::new())),
            query_rows: Arc::new(RwLock::new(Vec::new())),
            executed: Arc::new(RwLock::new(Vec::new())),
            query_error: Arc::new(RwLock::new(None)),
            view_fetches: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            fail_connection: false,
            latency_ms: 0,
        }
    }

    /// Configure to fail all connection tests
    pub fn with_connection_failure(mut self) -> Self {
        self.fail_connection = true;
        self
    }

    /// Delay every view fetch, to make overlapping calls observable
    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// Register a table or view; its dataset is registered as well
    pub async fn add_table(&self, record: TableListingRecord) {
        let project = record.project_id.clone();
        let dataset = record.dataset_id.clone();
        self.add_dataset(&project, &dataset).await;

        self.tables
            .write()
            .await
            .entry(format!("{project}.{dataset}"))
            .or_default()
            .push(record);
    }

    /// Register a dataset with no tables
    pub async fn add_dataset(&self, project: &str, dataset: &str) {
        let mut datasets = self.datasets.write().await;
        let entry = datasets.entry(project.to_string()).or_default();
        if !entry.iter().any(|d| d == dataset) {
            entry.push(dataset.to_string());
        }
    }

    /// Register a view with its body and the references the analyzer reports
    pub async fn add_view(&self, view: &TableRef, sql: &str, references: Vec<TableRef>) {
        self.add_table(TableListingRecord::new(
            view.project_id.as_str(),
            view.dataset_id.as_str(),
            view.table_id.as_str(),
            VIEW_TABLE_TYPE,
        ))
        .await;
        self.view_sql.write().await.insert(fqn(view), sql.to_string());
        self.references.write().await.insert(fqn(view), references);
    }

    /// Fail every fetch of this view with `error`
    pub async fn add_error_for_view(&self, view: &TableRef, error: CatalogError) {
        self.errors.write().await.insert(fqn(view), error);
    }

    /// Fail listing the datasets of this project with `error`
    pub async fn add_error_for_project(&self, project: &str, error: CatalogError) {
        self.errors.write().await.insert(project.to_string(), error);
    }

    /// Fail listing the tables of this dataset with `error`
    pub async fn add_error_for_dataset(&self, project: &str, dataset: &str, error: CatalogError) {
        self.errors.write().await.insert(format!("{project}.{dataset}"), error);
    }

    /// Fail the next `count` fetches of this view with a transient error
    pub async fn add_transient_failures(&self, view: &TableRef, count: u32) {
        self.transient_failures.write().await.insert(fqn(view), count);
    }

    /// Rows returned by `run_query`
    pub async fn set_query_rows(&self, rows: Vec<QueryRow>) {
        *self.query_rows.write().await = rows;
    }

    /// Fail every `run_query` with `error`
    pub async fn fail_queries(&self, error: CatalogError) {
        *self.query_error.write().await = Some(error);
    }

    /// Number of `fetch_view_query` calls so far, failed ones included
    pub fn view_fetches(&self) -> usize {
        self.view_fetches.load(Ordering::SeqCst)
    }

    /// Highest number of overlapping `fetch_view_query` calls observed
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// SQL passed to `run_query`, in call order
    pub async fn executed_queries(&self) -> Vec<String> {
        self.executed.read().await.clone()
    }

    async fn simulate_latency(&self) {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if self.latency_ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(self.latency_ms)).await;
        } else {
            tokio::task::yield_now().await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Default for MockCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl CatalogAdapter for MockCatalog {
    fn name(&self) -> &'static str {
        "Mock"
    }

    async fn list_datasets(&self, project: &str) -> Result<Vec<DatasetListingRecord>, CatalogError> {
        if let Some(error) = self.errors.read().await.get(project) {
            return Err(error.clone());
        }

        let datasets = self.datasets.read().await;
        Ok(datasets
            .get(project)
            .map(|ids| ids.iter().map(|id| DatasetListingRecord::new(project, id.as_str())).collect())
            .unwrap_or_default())
    }

    async fn list_tables(&self, project: &str, dataset: &str) -> Result<Vec<TableListingRecord>, CatalogError> {
        let key = format!("{project}.{dataset}");
        if let Some(error) = self.errors.read().await.get(&key) {
            return Err(error.clone());
        }

        Ok(self.tables.read().await.get(&key).cloned().unwrap_or_default())
    }

    async fn fetch_view_query(&self, view: &TableRef) -> Result<String, CatalogError> {
        self.view_fetches.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        let key = fqn(view);

        {
            let mut transient = self.transient_failures.write().await;
            if let Some(remaining) = transient.get_mut(&key) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(CatalogError::ServiceUnavailable(format!("{key}: backend error")));
                }
            }
        }

        if let Some(error) = self.errors.read().await.get(&key) {
            return Err(error.clone());
        }

        self.view_sql
            .read()
            .await
            .get(&key)
            .cloned()
            .ok_or(CatalogError::TableNotFound(key))
    }

    async fn run_query(&self, _project: &str, sql: &str) -> Result<Vec<QueryRow>, CatalogError> {
        self.executed.write().await.push(sql.to_string());
        if let Some(error) = self.query_error.read().await.as_ref() {
            return Err(error.clone());
        }
        Ok(self.query_rows.read().await.clone())
    }

    async fn test_connection(&self) -> Result<(), CatalogError> {
        if self.fail_connection {
            return Err(CatalogError::NetworkError(
                "Mock connection failure (simulated)".to_string(),
            ));
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl QueryAnalyzer for MockCatalog {
    fn name(&self) -> &'static str {
        "Mock"
    }

    async fn referenced_tables(&self, view: &TableRef, _sql: &str) -> Result<Vec<TableRef>, CatalogError> {
        Ok(self.references.read().await.get(&fqn(view)).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn serves_registered_views() {
        let catalog = MockCatalog::new();
        let view = TableRef::new("p", "d", "v");
        catalog.add_view(&view, "SELECT 1", vec![TableRef::new("p", "d", "t")]).await;

        assert_eq!(catalog.fetch_view_query(&view).await.unwrap(), "SELECT 1");
        assert_eq!(
            catalog.referenced_tables(&view, "SELECT 1").await.unwrap(),
            vec![TableRef::new("p", "d", "t")]
        );
        assert_eq!(catalog.list_datasets("p").await.unwrap(), vec![DatasetListingRecord::new("p", "d")]);
        assert_eq!(catalog.list_tables("p", "d").await.unwrap().len(), 1);
        assert_eq!(catalog.view_fetches(), 1);
    }

    #[tokio::test]
    async fn unknown_view_is_not_found() {
        let catalog = MockCatalog::new();
        let err = catalog.fetch_view_query(&TableRef::new("p", "d", "missing")).await.unwrap_err();
        assert!(matches!(err, CatalogError::TableNotFound(_)));
    }

    #[tokio::test]
    async fn transient_failures_run_out() {
        let catalog = MockCatalog::new();
        let view = TableRef::new("p", "d", "v");
        catalog.add_view(&view, "SELECT 1", vec![]).await;
        catalog.add_transient_failures(&view, 2).await;

        assert!(catalog.fetch_view_query(&view).await.unwrap_err().is_transient());
        assert!(catalog.fetch_view_query(&view).await.unwrap_err().is_transient());
        assert!(catalog.fetch_view_query(&view).await.is_ok());
    }

    #[tokio::test]
    async fn connection_failure() {
        assert!(MockCatalog::new().test_connection().await.is_ok());
        assert!(MockCatalog::new().with_connection_failure().test_connection().await.is_err());
    }
}
