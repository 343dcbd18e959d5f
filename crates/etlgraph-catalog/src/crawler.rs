//! Catalog crawl: dataset and table listings for one project
//!
//! Listings land under `<root>/<project>/` and are written atomically, so a
//! crawl interrupted mid-way never leaves a half-written listing behind.

use crate::adapter::{CatalogAdapter, CrawlError};
use etlgraph_core::{DatasetListingRecord, ListingStore, TableListingRecord};
use std::path::PathBuf;

/// Dataset listing artifact
pub const DATASETS_LISTING_FILE: &str = "datasets_listing.ndjson";

/// Table listing artifact
pub const TABLES_LISTING_FILE: &str = "tables_listing.ndjson";

/// Crawls one project into the listing store
pub struct Crawler<'a> {
    catalog: &'a dyn CatalogAdapter,
    store: &'a ListingStore,
    project: String,
}

impl<'a> Crawler<'a> {
    pub fn new(catalog: &'a dyn CatalogAdapter, store: &'a ListingStore, project: impl Into<String>) -> Self {
        Self {
            catalog,
            store,
            project: project.into(),
        }
    }

    /// Directory this project's artifacts are written to
    pub fn project_dir(&self) -> PathBuf {
        self.store.path(&self.project)
    }

    /// List the project's datasets and write `datasets_listing.ndjson`
    pub async fn fetch_dataset_listing(&self) -> Result<Vec<DatasetListingRecord>, CrawlError> {
        let datasets = self.catalog.list_datasets(&self.project).await?;

        let path = self.store.write_records(self.relative(DATASETS_LISTING_FILE), &datasets)?;
        tracing::info!(
            project = %self.project,
            datasets = datasets.len(),
            path = %path.display(),
            "wrote dataset listing"
        );

        Ok(datasets)
    }

    /// List the tables of every dataset and write `tables_listing.ndjson`
    ///
    /// A dataset that cannot be listed is logged and left out.
    pub async fn fetch_table_listing(
        &self,
        datasets: &[DatasetListingRecord],
    ) -> Result<Vec<TableListingRecord>, CrawlError> {
        let mut tables = Vec::new();
        let mut failed = 0usize;

        for dataset in datasets {
            match self.catalog.list_tables(&dataset.project_id, &dataset.dataset_id).await {
                Ok(listed) => {
                    tracing::debug!(dataset = %dataset.dataset_id, tables = listed.len(), "listed dataset");
                    tables.extend(listed);
                }
                Err(e) => {
                    failed += 1;
                    tracing::warn!(
                        project = %dataset.project_id,
                        dataset = %dataset.dataset_id,
                        error = %e,
                        "skipping dataset that could not be listed"
                    );
                }
            }
        }

        let path = self.store.write_records(self.relative(TABLES_LISTING_FILE), &tables)?;
        tracing::info!(
            project = %self.project,
            tables = tables.len(),
            views = tables.iter().filter(|t| t.is_view()).count(),
            failed_datasets = failed,
            path = %path.display(),
            "wrote table listing"
        );

        Ok(tables)
    }

    /// Read the table listing of an earlier crawl instead of crawling again
    pub fn load_table_listing(&self) -> Result<Vec<TableListingRecord>, CrawlError> {
        let path = self.store.path(self.relative(TABLES_LISTING_FILE));
        let tables = self.store.load_records(&path)?;
        tracing::info!(path = %path.display(), tables = tables.len(), "reusing table listing");
        Ok(tables)
    }

    fn relative(&self, file: &str) -> PathBuf {
        PathBuf::from(&self.project).join(file)
    }
}
