//! BigQuery catalog adapter
//!
//! Lists datasets and tables through the BigQuery REST API, reads view
//! definitions from table metadata, and determines the tables a view reads
//! with a dry-run query job. A dry run validates and plans the query without
//! executing it, and its statistics carry the referenced tables.
//!
//! Required IAM permissions:
//! - bigquery.datasets.get, bigquery.tables.list, bigquery.tables.get
//! - bigquery.jobs.create (dry runs and the query-log extraction)
//! - bigquery.jobs.listAll (INFORMATION_SCHEMA.JOBS_BY_PROJECT)
//!
//! ## Authentication
//!
//! 1. Service account JSON file (explicit path)
//! 2. Application Default Credentials (ADC)
//!
//! ```rust,ignore
//! let adapter = BigQueryAdapter::with_adc("my-project").await?;
//! let adapter = BigQueryAdapter::from_service_account_file(
//!     "my-project",
//!     "/path/to/service-account.json"
//! ).await?;
//! ```

use crate::adapter::{CatalogAdapter, CatalogError, QueryAnalyzer, QueryRow};
use etlgraph_core::{DatasetListingRecord, TableListingRecord, TableRef};

#[cfg(feature = "bigquery")]
use gcp_bigquery_client::{
    model::dataset_reference::DatasetReference,
    model::get_query_results_parameters::GetQueryResultsParameters,
    model::job::Job,
    model::job_configuration::JobConfiguration,
    model::job_configuration_query::JobConfigurationQuery,
    model::query_request::QueryRequest,
    model::query_response::ResultSet,
    Client as BigQueryClient,
};

/// Server-side wait of one query or results request (milliseconds)
#[cfg_attr(not(feature = "bigquery"), allow(dead_code))]
const QUERY_WAIT_MS: i32 = 10_000;

/// Incomplete polls tolerated before a query is given up on
#[cfg_attr(not(feature = "bigquery"), allow(dead_code))]
const QUERY_POLL_LIMIT: u32 = 60;

/// What to request after one response of a query job
#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(not(feature = "bigquery"), allow(dead_code))]
enum PageStep {
    /// The job is still running; ask for the same page again
    Poll,
    /// More rows follow under this page token
    Next(String),
    Done,
}

#[cfg_attr(not(feature = "bigquery"), allow(dead_code))]
fn next_page(
    job_complete: Option<bool>,
    page_token: Option<String>,
    polls: &mut u32,
) -> Result<PageStep, CatalogError> {
    if !job_complete.unwrap_or(false) {
        *polls += 1;
        if *polls > QUERY_POLL_LIMIT {
            return Err(CatalogError::QueryError(format!(
                "query job did not complete after {} polls",
                QUERY_POLL_LIMIT
            )));
        }
        return Ok(PageStep::Poll);
    }

    Ok(match page_token {
        Some(token) if !token.is_empty() => PageStep::Next(token),
        _ => PageStep::Done,
    })
}

#[cfg(feature = "bigquery")]
fn read_rows(mut rs: ResultSet, rows: &mut Vec<QueryRow>) -> Result<(), CatalogError> {
    let columns = rs.column_names();

    while rs.next_row() {
        let mut row = QueryRow::with_capacity(columns.len());
        for column in &columns {
            let value = rs.get_string_by_name(column)
                .map_err(|e| CatalogError::InvalidResponse(format!("Failed to get {}: {}", column, e)))?;
            row.insert(column.clone(), value);
        }
        rows.push(row);
    }

    Ok(())
}

#[cfg(not(feature = "bigquery"))]
fn not_compiled() -> CatalogError {
    CatalogError::ConfigError(
        "BigQuery support not compiled. Rebuild with: cargo build --features bigquery".to_string(),
    )
}

/// BigQuery catalog adapter
pub struct BigQueryAdapter {
    /// Project that dry runs and queries are billed to
    project_id: String,

    #[cfg(feature = "bigquery")]
    client: BigQueryClient,
}

impl BigQueryAdapter {
    /// Create an adapter using Application Default Credentials (ADC)
    ///
    /// ADC detects credentials from GOOGLE_APPLICATION_CREDENTIALS, the
    /// gcloud CLI defaults, or the GCE/GKE metadata service.
    #[cfg(feature = "bigquery")]
    pub async fn with_adc(project_id: impl Into<String>) -> Result<Self, CatalogError> {
        let client = BigQueryClient::from_application_default_credentials()
            .await
            .map_err(|e| CatalogError::AuthenticationError(format!(
                "Failed to authenticate with ADC: {}. \
                 Ensure GOOGLE_APPLICATION_CREDENTIALS is set or run 'gcloud auth application-default login'",
                e
            )))?;

        Ok(Self {
            project_id: project_id.into(),
            client,
        })
    }

    #[cfg(not(feature = "bigquery"))]
    pub async fn with_adc(project_id: impl Into<String>) -> Result<Self, CatalogError> {
        let _ = project_id;
        Err(not_compiled())
    }

    /// Create an adapter using a service account key file
    #[cfg(feature = "bigquery")]
    pub async fn from_service_account_file(
        project_id: impl Into<String>,
        key_path: impl AsRef<std::path::Path>,
    ) -> Result<Self, CatalogError> {
        let key_path = key_path.as_ref().to_string_lossy().to_string();

        let client = BigQueryClient::from_service_account_key_file(&key_path)
            .await
            .map_err(|e| CatalogError::AuthenticationError(format!(
                "Failed to read service account key file '{}': {}",
                key_path, e
            )))?;

        Ok(Self {
            project_id: project_id.into(),
            client,
        })
    }

    #[cfg(not(feature = "bigquery"))]
    pub async fn from_service_account_file(
        project_id: impl Into<String>,
        _key_path: impl AsRef<std::path::Path>,
    ) -> Result<Self, CatalogError> {
        let _ = project_id;
        Err(not_compiled())
    }

    /// Create an adapter from an optional key file, falling back to ADC
    pub async fn connect(
        project_id: impl Into<String>,
        credentials: Option<&std::path::Path>,
    ) -> Result<Self, CatalogError> {
        match credentials {
            Some(path) => Self::from_service_account_file(project_id, path).await,
            None => Self::with_adc(project_id).await,
        }
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }
}

#[cfg(feature = "bigquery")]
fn service_error(context: &str, error: gcp_bigquery_client::error::BQError) -> CatalogError {
    CatalogError::from_service_message(context, error.to_string())
}

#[async_trait::async_trait]
impl CatalogAdapter for BigQueryAdapter {
    fn name(&self) -> &'static str {
        "BigQuery"
    }

    #[cfg(feature = "bigquery")]
    async fn list_datasets(&self, project: &str) -> Result<Vec<DatasetListingRecord>, CatalogError> {
        use gcp_bigquery_client::dataset::ListOptions;

        let mut datasets = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut options = ListOptions::default().all(true);
            if let Some(token) = page_token.take() {
                options = options.page_token(token);
            }

            let page = self.client
                .dataset()
                .list(project, options)
                .await
                .map_err(|e| service_error(project, e))?;

            datasets.extend(page.datasets.into_iter().map(|dataset| {
                DatasetListingRecord::new(
                    dataset.dataset_reference.project_id,
                    dataset.dataset_reference.dataset_id,
                )
            }));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        tracing::debug!(project, datasets = datasets.len(), "listed datasets");
        Ok(datasets)
    }

    #[cfg(not(feature = "bigquery"))]
    async fn list_datasets(&self, _project: &str) -> Result<Vec<DatasetListingRecord>, CatalogError> {
        Err(not_compiled())
    }

    #[cfg(feature = "bigquery")]
    async fn list_tables(&self, project: &str, dataset: &str) -> Result<Vec<TableListingRecord>, CatalogError> {
        use gcp_bigquery_client::table::ListOptions;

        let context = format!("{project}.{dataset}");
        let mut tables = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut options = ListOptions::default();
            if let Some(token) = page_token.take() {
                options = options.page_token(token);
            }

            let page = self.client
                .table()
                .list(project, dataset, options)
                .await
                .map_err(|e| service_error(&context, e))?;

            tables.extend(page.tables.unwrap_or_default().into_iter().map(|table| {
                TableListingRecord::new(
                    table.table_reference.project_id,
                    table.table_reference.dataset_id,
                    table.table_reference.table_id,
                    table.r#type.unwrap_or_default(),
                )
            }));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        tracing::debug!(dataset = %context, tables = tables.len(), "listed tables");
        Ok(tables)
    }

    #[cfg(not(feature = "bigquery"))]
    async fn list_tables(&self, _project: &str, _dataset: &str) -> Result<Vec<TableListingRecord>, CatalogError> {
        Err(not_compiled())
    }

    #[cfg(feature = "bigquery")]
    async fn fetch_view_query(&self, view: &TableRef) -> Result<String, CatalogError> {
        let context = format!("{}.{}.{}", view.project_id, view.dataset_id, view.table_id);

        let table = self.client
            .table()
            .get(&view.project_id, &view.dataset_id, &view.table_id, None)
            .await
            .map_err(|e| service_error(&context, e))?;

        table
            .view
            .map(|definition| definition.query)
            .filter(|query| !query.trim().is_empty())
            .ok_or_else(|| CatalogError::InvalidResponse(format!("{context} has no view definition")))
    }

    #[cfg(not(feature = "bigquery"))]
    async fn fetch_view_query(&self, _view: &TableRef) -> Result<String, CatalogError> {
        Err(not_compiled())
    }

    #[cfg(feature = "bigquery")]
    async fn run_query(&self, project: &str, sql: &str) -> Result<Vec<QueryRow>, CatalogError> {
        let mut request = QueryRequest::new(sql.to_string());
        request.timeout_ms = Some(QUERY_WAIT_MS);

        let response = self.client
            .job()
            .query(project, request)
            .await
            .map_err(|e| service_error(project, e))?;

        let mut rows = Vec::new();
        let mut polls = 0u32;
        let job = response.job_reference.clone();
        let complete = response.job_complete.unwrap_or(false);
        let mut step = next_page(response.job_complete, response.page_token.clone(), &mut polls)?;
        if complete {
            read_rows(ResultSet::new_from_query_response(response), &mut rows)?;
        }

        if step == PageStep::Done {
            return Ok(rows);
        }

        let (job_id, location) = match job {
            Some(reference) => match reference.job_id {
                Some(job_id) => (job_id, reference.location),
                None => return Err(CatalogError::InvalidResponse(format!("query in {project} returned no job id"))),
            },
            None => return Err(CatalogError::InvalidResponse(format!("query in {project} returned no job reference"))),
        };

        let mut page_token: Option<String> = None;
        loop {
            match step {
                PageStep::Done => break,
                PageStep::Next(token) => page_token = Some(token),
                PageStep::Poll => tracing::debug!(project, job = %job_id, polls, "waiting for query job"),
            }

            let parameters = GetQueryResultsParameters {
                page_token: page_token.clone(),
                location: location.clone(),
                timeout_ms: Some(QUERY_WAIT_MS),
                ..Default::default()
            };
            let page = self.client
                .job()
                .get_query_results(project, &job_id, parameters)
                .await
                .map_err(|e| service_error(project, e))?;

            let complete = page.job_complete.unwrap_or(false);
            step = next_page(page.job_complete, page.page_token.clone(), &mut polls)?;
            if complete {
                read_rows(ResultSet::new_from_get_query_results_response(page), &mut rows)?;
            }
        }

        tracing::debug!(project, job = %job_id, rows = rows.len(), "query job finished");
        Ok(rows)
    }

    #[cfg(not(feature = "bigquery"))]
    async fn run_query(&self, _project: &str, _sql: &str) -> Result<Vec<QueryRow>, CatalogError> {
        Err(not_compiled())
    }

    #[cfg(feature = "bigquery")]
    async fn test_connection(&self) -> Result<(), CatalogError> {
        self.client
            .job()
            .query(&self.project_id, QueryRequest::new("SELECT 1".to_string()))
            .await
            .map_err(|e| CatalogError::QueryError(format!("Connection test failed: {}", e)))?;

        Ok(())
    }

    #[cfg(not(feature = "bigquery"))]
    async fn test_connection(&self) -> Result<(), CatalogError> {
        Err(not_compiled())
    }
}

#[async_trait::async_trait]
impl QueryAnalyzer for BigQueryAdapter {
    fn name(&self) -> &'static str {
        "BigQuery dry run"
    }

    #[cfg(feature = "bigquery")]
    async fn referenced_tables(&self, view: &TableRef, sql: &str) -> Result<Vec<TableRef>, CatalogError> {
        let context = format!("{}.{}.{}", view.project_id, view.dataset_id, view.table_id);

        // Unqualified names inside a view resolve against the view's dataset
        let query = JobConfigurationQuery {
            query: sql.to_string(),
            use_legacy_sql: Some(false),
            default_dataset: Some(DatasetReference {
                project_id: view.project_id.clone(),
                dataset_id: view.dataset_id.clone(),
            }),
            ..Default::default()
        };

        let job = Job {
            configuration: Some(JobConfiguration {
                dry_run: Some(true),
                query: Some(query),
                ..Default::default()
            }),
            ..Default::default()
        };

        let job = self.client
            .job()
            .insert(&self.project_id, job)
            .await
            .map_err(|e| service_error(&context, e))?;

        let statistics = job
            .statistics
            .and_then(|stats| stats.query)
            .ok_or_else(|| CatalogError::InvalidResponse(format!("dry run for {context} returned no query statistics")))?;

        Ok(statistics
            .referenced_tables
            .unwrap_or_default()
            .into_iter()
            .map(|table| TableRef::new(table.project_id, table.dataset_id, table.table_id))
            .collect())
    }

    #[cfg(not(feature = "bigquery"))]
    async fn referenced_tables(&self, _view: &TableRef, _sql: &str) -> Result<Vec<TableRef>, CatalogError> {
        Err(not_compiled())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_are_followed_until_no_token() {
        let mut polls = 0;
        assert_eq!(
            next_page(Some(true), Some("page-2".to_string()), &mut polls).unwrap(),
            PageStep::Next("page-2".to_string())
        );
        assert_eq!(next_page(Some(true), None, &mut polls).unwrap(), PageStep::Done);
        assert_eq!(next_page(Some(true), Some(String::new()), &mut polls).unwrap(), PageStep::Done);
        assert_eq!(polls, 0);
    }

    #[test]
    fn incomplete_job_is_polled_then_abandoned() {
        let mut polls = 0;
        assert_eq!(next_page(Some(false), None, &mut polls).unwrap(), PageStep::Poll);
        assert_eq!(next_page(None, Some("ignored".to_string()), &mut polls).unwrap(), PageStep::Poll);

        polls = QUERY_POLL_LIMIT;
        let err = next_page(Some(false), None, &mut polls).unwrap_err();
        assert!(matches!(err, CatalogError::QueryError(_)));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    #[cfg(not(feature = "bigquery"))]
    async fn constructors_fail_without_feature() {
        let err = BigQueryAdapter::with_adc("my-project").await.err();
        assert!(matches!(err, Some(CatalogError::ConfigError(_))));

        let err = BigQueryAdapter::connect("my-project", Some(std::path::Path::new("key.json")))
            .await
            .err();
        assert!(matches!(err, Some(CatalogError::ConfigError(_))));
    }
}
