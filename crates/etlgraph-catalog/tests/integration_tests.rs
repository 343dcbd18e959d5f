//! Integration tests for crawling, view resolution, and query-log extraction
//!
//! Tests against the BigQuery adapter need real credentials and are marked
//! with `#[ignore]`.
//!
//! ## Running Tests
//!
//! ```bash
//! # Run all non-ignored tests (no credentials required)
//! cargo test -p etlgraph-catalog --test integration_tests
//!
//! # Run BigQuery integration tests
//! GOOGLE_APPLICATION_CREDENTIALS=/path/to/key.json \
//! ETLGRAPH_BIGQUERY_PROJECT=my-project \
//! ETLGRAPH_BIGQUERY_VIEW=my-project.my_dataset.my_view \
//! cargo test -p etlgraph-catalog --features bigquery --test integration_tests -- --ignored
//! ```

mod fixtures;

use etlgraph_catalog::{
    CatalogError, Crawler, MockCatalog, QueryLogExtractor, SqlParserAnalyzer, ViewReferenceResolver,
    QUERY_EDGELIST_FILE, SHARED_PROD_EDGELIST_SQL, VIEWS_REFERENCES_FILE,
};
use etlgraph_core::{
    EdgeAggregator, ListingStore, NdjsonAppender, NdjsonReader, ResolverConfig, TableListingRecord,
    TableRef, ViewReferenceRecord,
};
use fixtures::*;
use pretty_assertions::assert_eq;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

// =============================================================================
// Helper Functions
// =============================================================================

fn read_views(path: &Path) -> Vec<ViewReferenceRecord> {
    NdjsonReader::open(path).unwrap().map(|r| r.unwrap()).collect()
}

fn view_names(records: &[ViewReferenceRecord]) -> BTreeSet<String> {
    records.iter().map(|r| r.destination().unwrap().into_string()).collect()
}

/// Check if BigQuery credentials are available
fn has_bigquery_credentials() -> bool {
    std::env::var("GOOGLE_APPLICATION_CREDENTIALS").is_ok()
        || std::env::var("ETLGRAPH_BIGQUERY_PROJECT").is_ok()
}

// =============================================================================
// Crawl and resolve (no credentials required)
// =============================================================================

#[tokio::test]
async fn crawl_resolve_and_aggregate() {
    let dir = tempfile::tempdir().unwrap();
    let store = ListingStore::new(dir.path());
    let catalog = Arc::new(warehouse().await);

    let crawler = Crawler::new(catalog.as_ref(), &store, PROJECT);
    let datasets = crawler.fetch_dataset_listing().await.unwrap();
    let tables = crawler.fetch_table_listing(&datasets).await.unwrap();
    assert_eq!(tables.len(), 4);

    let summary = ViewReferenceResolver::new(catalog.clone(), catalog.clone())
        .resolve(&tables, &crawler.project_dir())
        .await
        .unwrap();
    assert_eq!(summary.views, 2);
    assert_eq!(summary.resolved, 2);
    assert_eq!(summary.references, 4);
    assert_eq!(summary.output, dir.path().join(PROJECT).join(VIEWS_REFERENCES_FILE));

    let aggregation = EdgeAggregator::new(&store).run().unwrap();
    assert_eq!(aggregation.edges.len(), 4);

    let csv = std::fs::read_to_string(dir.path().join("edges.csv")).unwrap();
    assert_eq!(
        csv,
        "Source,Target\n\
         proj.views.active_users,proj.raw.events\n\
         proj.views.active_users,proj.raw.users\n\
         proj.views.active_users,proj.views.daily_events\n\
         proj.views.daily_events,proj.raw.events\n"
    );
}

#[tokio::test]
async fn second_run_resumes_without_refetching() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = Arc::new(warehouse().await);

    ViewReferenceResolver::new(catalog.clone(), catalog.clone())
        .resolve(&listing(), dir.path())
        .await
        .unwrap();
    assert_eq!(catalog.view_fetches(), 2);

    let summary = ViewReferenceResolver::new(catalog.clone(), catalog.clone())
        .resolve(&listing(), dir.path())
        .await
        .unwrap();

    assert_eq!(summary.already_resolved, 2);
    assert_eq!(summary.resolved, 0);
    assert_eq!(catalog.view_fetches(), 2);
    assert_eq!(read_views(&summary.output).len(), 2);
}

#[tokio::test]
async fn interrupted_run_is_completed() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = Arc::new(warehouse().await);

    let mut earlier = NdjsonAppender::open(dir.path().join(VIEWS_REFERENCES_FILE), false).unwrap();
    earlier
        .append(&ViewReferenceRecord::new(&daily_events(), vec![events()]))
        .unwrap();
    drop(earlier);

    let summary = ViewReferenceResolver::new(catalog.clone(), catalog.clone())
        .resolve(&listing(), dir.path())
        .await
        .unwrap();

    assert_eq!(summary.already_resolved, 1);
    assert_eq!(summary.resolved, 1);
    assert_eq!(catalog.view_fetches(), 1);
    assert_eq!(
        view_names(&read_views(&summary.output)),
        BTreeSet::from([
            "proj.views.active_users".to_string(),
            "proj.views.daily_events".to_string(),
        ])
    );
}

#[tokio::test]
async fn fresh_run_replaces_earlier_results() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = Arc::new(warehouse().await);

    for _ in 0..2 {
        ViewReferenceResolver::new(catalog.clone(), catalog.clone())
            .fresh(true)
            .resolve(&listing(), dir.path())
            .await
            .unwrap();
    }

    assert_eq!(catalog.view_fetches(), 4);
    assert_eq!(read_views(&dir.path().join(VIEWS_REFERENCES_FILE)).len(), 2);
}

#[tokio::test]
async fn failed_views_are_omitted_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = Arc::new(warehouse().await);
    catalog.add_view(&broken_view(), "SELECT 1", vec![]).await;
    catalog
        .add_error_for_view(&broken_view(), CatalogError::PermissionDenied("proj.views.broken".to_string()))
        .await;

    let mut tables = listing();
    tables.push(TableListingRecord::new(PROJECT, "views", "broken", "VIEW"));

    let summary = ViewReferenceResolver::new(catalog.clone(), catalog.clone())
        .resolve(&tables, dir.path())
        .await
        .unwrap();

    assert_eq!(summary.resolved, 2);
    assert_eq!(summary.failed(), 1);
    assert_eq!(summary.failures[0].view, broken_view());
    assert!(!view_names(&read_views(&summary.output)).contains("proj.views.broken"));
}

#[tokio::test]
async fn failed_views_can_be_recorded_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = ListingStore::new(dir.path());
    let catalog = Arc::new(warehouse().await);
    catalog.add_view(&broken_view(), "SELECT 1", vec![]).await;
    catalog
        .add_error_for_view(&broken_view(), CatalogError::QueryError("syntax".to_string()))
        .await;

    let mut tables = listing();
    tables.push(TableListingRecord::new(PROJECT, "views", "broken", "VIEW"));

    let config = ResolverConfig {
        record_failures: true,
        ..Default::default()
    };
    let summary = ViewReferenceResolver::new(catalog.clone(), catalog.clone())
        .with_config(config)
        .resolve(&tables, dir.path())
        .await
        .unwrap();

    let records = read_views(&summary.output);
    assert_eq!(records.len(), 3);
    let broken = records
        .iter()
        .find(|r| r.view_ref() == broken_view())
        .unwrap();
    assert!(broken.referenced_tables().is_empty());
    assert!(broken.is_failure());

    // An empty reference list contributes no edges
    let aggregation = EdgeAggregator::new(&store).aggregate().unwrap();
    assert_eq!(aggregation.edges.len(), 4);
}

#[tokio::test]
async fn recorded_failures_are_retried_on_resume() {
    let dir = tempfile::tempdir().unwrap();
    let store = ListingStore::new(dir.path());
    let catalog = Arc::new(warehouse().await);
    catalog.add_transient_failures(&daily_events(), 1).await;

    let config = ResolverConfig {
        record_failures: true,
        ..Default::default()
    };

    let first = ViewReferenceResolver::new(catalog.clone(), catalog.clone())
        .with_config(config.clone())
        .resolve(&listing(), dir.path())
        .await
        .unwrap();
    assert_eq!(first.resolved, 1);
    assert_eq!(first.failed(), 1);
    assert!(first.failures[0].transient);

    let second = ViewReferenceResolver::new(catalog.clone(), catalog.clone())
        .with_config(config)
        .resolve(&listing(), dir.path())
        .await
        .unwrap();
    assert_eq!(second.already_resolved, 1);
    assert_eq!(second.resolved, 1);
    assert_eq!(second.failed(), 0);

    let records = read_views(&second.output);
    let daily: Vec<_> = records.iter().filter(|r| r.view_ref() == daily_events()).collect();
    assert_eq!(daily.len(), 2);
    assert!(daily[0].is_failure());
    assert_eq!(daily[1].referenced_tables(), &[events()]);

    let aggregation = EdgeAggregator::new(&store).aggregate().unwrap();
    assert_eq!(aggregation.edges.len(), 4);
}

#[tokio::test]
async fn fan_out_is_bounded() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = Arc::new(MockCatalog::new().with_latency(20));

    let mut tables = Vec::new();
    for i in 0..8 {
        let view = TableRef::new(PROJECT, "views", format!("v{i}"));
        catalog.add_view(&view, "SELECT 1", vec![events()]).await;
        tables.push(TableListingRecord::new(PROJECT, "views", format!("v{i}"), "VIEW"));
    }

    let config = ResolverConfig {
        concurrency: 3,
        ..Default::default()
    };
    let summary = ViewReferenceResolver::new(catalog.clone(), catalog.clone())
        .with_config(config)
        .resolve(&tables, dir.path())
        .await
        .unwrap();

    assert_eq!(summary.resolved, 8);
    assert_eq!(read_views(&summary.output).len(), 8);
    assert!(catalog.max_in_flight() <= 3);
    assert!(catalog.max_in_flight() > 1);
}

#[tokio::test]
async fn serial_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = Arc::new(warehouse_with(MockCatalog::new().with_latency(5)).await);

    ViewReferenceResolver::new(catalog.clone(), catalog.clone())
        .resolve(&listing(), dir.path())
        .await
        .unwrap();

    assert_eq!(catalog.max_in_flight(), 1);
}

#[tokio::test]
async fn sql_parser_analyzer_resolves_view_bodies() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = Arc::new(warehouse().await);

    let summary = ViewReferenceResolver::new(catalog.clone(), Arc::new(SqlParserAnalyzer::default()))
        .resolve(&listing(), dir.path())
        .await
        .unwrap();

    let records = read_views(&summary.output);
    let active = records
        .iter()
        .find(|r| r.view_ref() == active_users())
        .unwrap();

    let referenced: BTreeSet<TableRef> = active.referenced_tables().iter().cloned().collect();
    assert_eq!(
        referenced,
        BTreeSet::from([daily_events(), events(), users()])
    );
}

// =============================================================================
// Query-log extraction (no credentials required)
// =============================================================================

#[tokio::test]
async fn query_log_rows_become_edges() {
    let dir = tempfile::tempdir().unwrap();
    let store = ListingStore::new(dir.path());
    let catalog = warehouse().await;
    catalog
        .set_query_rows(vec![
            query_row(Some("proj.derived.daily"), Some("proj.raw.events")),
            query_row(Some("proj.views.daily_events"), Some("proj.raw.events")),
            query_row(Some("proj.derived.daily"), None),
        ])
        .await;

    let summary = QueryLogExtractor::new(&catalog, &store).extract(PROJECT).await.unwrap();
    assert_eq!(summary.rows, 3);
    assert_eq!(summary.edges, 2);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.output, dir.path().join(PROJECT).join(QUERY_EDGELIST_FILE));
    assert_eq!(catalog.executed_queries().await, vec![SHARED_PROD_EDGELIST_SQL.to_string()]);

    let catalog = Arc::new(catalog);
    ViewReferenceResolver::new(catalog.clone(), catalog.clone())
        .resolve(&listing(), &dir.path().join(PROJECT))
        .await
        .unwrap();

    // daily_events -> events is reported by both sources and kept once
    let aggregation = EdgeAggregator::new(&store).aggregate().unwrap();
    assert_eq!(aggregation.summary.edges_emitted, 6);
    assert_eq!(aggregation.edges.len(), 5);
}

#[tokio::test]
async fn failed_query_keeps_previous_edgelist() {
    let dir = tempfile::tempdir().unwrap();
    let store = ListingStore::new(dir.path());
    let catalog = MockCatalog::new();
    catalog
        .set_query_rows(vec![query_row(Some("proj.derived.daily"), Some("proj.raw.events"))])
        .await;

    let sql = "SELECT destination_table, referenced_table FROM lineage";
    let extractor = QueryLogExtractor::new(&catalog, &store).with_sql(sql);
    let first = extractor.extract(PROJECT).await.unwrap();
    let before = std::fs::read_to_string(&first.output).unwrap();
    assert_eq!(catalog.executed_queries().await, vec![sql.to_string()]);

    catalog
        .fail_queries(CatalogError::QueryError("query job did not complete after 60 polls".to_string()))
        .await;
    let err = extractor.extract(PROJECT).await.unwrap_err();

    assert!(err.to_string().contains("did not complete"));
    assert_eq!(std::fs::read_to_string(&first.output).unwrap(), before);
}

// =============================================================================
// BigQuery Integration Tests (Require credentials)
// =============================================================================

#[tokio::test]
#[ignore]
#[cfg(feature = "bigquery")]
async fn test_bigquery_list_datasets() {
    use etlgraph_catalog::{BigQueryAdapter, CatalogAdapter};

    if !has_bigquery_credentials() {
        eprintln!("Skipping BigQuery test: No credentials found");
        return;
    }

    let project = std::env::var("ETLGRAPH_BIGQUERY_PROJECT").expect("ETLGRAPH_BIGQUERY_PROJECT not set");
    let adapter = BigQueryAdapter::with_adc(&project).await.expect("Failed to create BigQuery adapter");

    adapter.test_connection().await.expect("Connection test failed");
    let datasets = adapter.list_datasets(&project).await.expect("Failed to list datasets");
    assert!(datasets.iter().all(|d| d.project_id == project));
}

#[tokio::test]
#[ignore]
#[cfg(feature = "bigquery")]
async fn test_bigquery_dry_run_view() {
    use etlgraph_catalog::{BigQueryAdapter, CatalogAdapter, QueryAnalyzer};

    if !has_bigquery_credentials() {
        eprintln!("Skipping BigQuery test: No credentials found");
        return;
    }

    let project = std::env::var("ETLGRAPH_BIGQUERY_PROJECT").expect("ETLGRAPH_BIGQUERY_PROJECT not set");
    let view = std::env::var("ETLGRAPH_BIGQUERY_VIEW").expect("ETLGRAPH_BIGQUERY_VIEW not set");
    let parts: Vec<&str> = view.split('.').collect();
    assert_eq!(parts.len(), 3, "ETLGRAPH_BIGQUERY_VIEW must be project.dataset.view");
    let view = TableRef::new(parts[0], parts[1], parts[2]);

    let adapter = BigQueryAdapter::with_adc(&project).await.expect("Failed to create BigQuery adapter");
    let sql = adapter.fetch_view_query(&view).await.expect("Failed to fetch view query");
    let referenced = adapter.referenced_tables(&view, &sql).await.expect("Dry run failed");

    assert!(!referenced.is_empty(), "view {} reads no tables", view.table_id);
}

#[tokio::test]
#[cfg(not(feature = "bigquery"))]
async fn test_bigquery_requires_feature() {
    use etlgraph_catalog::BigQueryAdapter;

    let _ = has_bigquery_credentials();
    let result = BigQueryAdapter::with_adc("any-project").await;
    assert!(matches!(result, Err(CatalogError::ConfigError(_))));
}
