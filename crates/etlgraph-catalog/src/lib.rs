//! Warehouse catalog access for lineage crawling
//!
//! This crate provides:
//! - Catalog adapters that list datasets and tables and fetch view bodies
//! - Query analyzers that report the tables a view reads without running it
//! - The view reference resolver that persists those references
//! - The crawler and query-log extractor that feed the listing store
//!
//! ## Features
//!
//! - `bigquery` - Google BigQuery support via `gcp-bigquery-client`
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use etlgraph_catalog::{BigQueryAdapter, ViewReferenceResolver};
//!
//! let adapter = Arc::new(BigQueryAdapter::with_adc("my-project").await?);
//! let resolver = ViewReferenceResolver::new(adapter.clone(), adapter);
//! let summary = resolver.resolve(&views, "public/data/my-project".as_ref()).await?;
//! ```

pub mod adapter;
pub mod analyzer;
pub mod bigquery;
pub mod mock;
pub mod resolver;
pub mod crawler;
pub mod query_log;

pub use adapter::{CatalogAdapter, CatalogError, CrawlError, QueryAnalyzer, QueryRow};
pub use analyzer::SqlParserAnalyzer;
pub use bigquery::BigQueryAdapter;
pub use mock::MockCatalog;
pub use resolver::{ResolveSummary, ViewFailure, ViewReferenceResolver, VIEWS_REFERENCES_FILE};
pub use crawler::{Crawler, DATASETS_LISTING_FILE, TABLES_LISTING_FILE};
pub use query_log::{QueryLogExtractor, QueryLogSummary, QUERY_EDGELIST_FILE, SHARED_PROD_EDGELIST_SQL};
