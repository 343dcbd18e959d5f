//! View reference resolution
//!
//! For every view in a table listing, fetch the view body from the catalog,
//! ask the analyzer which tables it reads, and append one
//! [`ViewReferenceRecord`] per view to `views_references.ndjson`. Records are
//! appended as each view completes, so an interrupted run leaves a file of
//! complete lines that a later run resumes from.

use crate::adapter::{CatalogAdapter, CatalogError, QueryAnalyzer};
use etlgraph_core::{
    LineageError, NdjsonAppender, NdjsonReader, ResolverConfig, RetryPolicy, TableListingRecord,
    TableRef, ViewReferenceRecord,
};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// View-reference artifact written to a project directory
pub const VIEWS_REFERENCES_FILE: &str = "views_references.ndjson";

/// A view whose references could not be determined
#[derive(Debug, Clone, Serialize)]
pub struct ViewFailure {
    pub view: TableRef,

    /// Catalog attempts made; 0 when the resolution task itself died
    pub attempts: u32,
    pub error: String,

    /// Whether the error was still transient when attempts ran out
    pub transient: bool,
}

/// Outcome of one resolver run
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResolveSummary {
    /// File the records were appended to
    pub output: PathBuf,

    /// Listing rows that were views
    pub views: usize,

    /// Views already present from an earlier run
    pub already_resolved: usize,

    /// Views resolved and written in this run
    pub resolved: usize,

    /// References written in this run
    pub references: usize,

    pub failures: Vec<ViewFailure>,
}

impl ResolveSummary {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

/// Resolves the referenced tables of views and persists them
pub struct ViewReferenceResolver {
    catalog: Arc<dyn CatalogAdapter>,
    analyzer: Arc<dyn QueryAnalyzer>,
    config: ResolverConfig,
    fresh: bool,
}

impl ViewReferenceResolver {
    pub fn new(catalog: Arc<dyn CatalogAdapter>, analyzer: Arc<dyn QueryAnalyzer>) -> Self {
        Self {
            catalog,
            analyzer,
            config: ResolverConfig::default(),
            fresh: false,
        }
    }

    pub fn with_config(mut self, config: ResolverConfig) -> Self {
        self.config = config;
        self
    }

    /// Discard earlier results instead of resuming from them
    pub fn fresh(mut self, fresh: bool) -> Self {
        self.fresh = fresh;
        self
    }

    /// Resolve every view in `tables` into `output_dir/views_references.ndjson`
    ///
    /// Per-view failures are recorded in the summary; only failures to read
    /// or write the output file are returned as errors.
    pub async fn resolve(
        &self,
        tables: &[TableListingRecord],
        output_dir: &Path,
    ) -> Result<ResolveSummary, LineageError> {
        let output = output_dir.join(VIEWS_REFERENCES_FILE);
        let done = if self.fresh { HashSet::new() } else { already_resolved(&output) };

        let mut summary = ResolveSummary {
            output: output.clone(),
            ..Default::default()
        };

        let mut pending = Vec::new();
        for view in tables.iter().filter(|t| t.is_view()).map(TableListingRecord::table_ref) {
            summary.views += 1;
            if done.contains(&view) {
                summary.already_resolved += 1;
            } else {
                pending.push(view);
            }
        }

        let mut appender = NdjsonAppender::open(&output, self.fresh)?;

        tracing::info!(
            catalog = self.catalog.name(),
            analyzer = self.analyzer.name(),
            views = summary.views,
            pending = pending.len(),
            concurrency = self.config.concurrency,
            "resolving view references"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut tasks = JoinSet::new();
        let mut spawned = HashMap::new();

        for view in pending {
            let semaphore = Arc::clone(&semaphore);
            let catalog = Arc::clone(&self.catalog);
            let analyzer = Arc::clone(&self.analyzer);
            let retry = self.config.retry;
            let tracked = view.clone();

            let handle = tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    let error = CatalogError::ConfigError("resolver shut down".to_string());
                    return (view, 0, Err(error));
                };
                let (attempts, result) = resolve_view(catalog.as_ref(), analyzer.as_ref(), &view, retry).await;
                (view, attempts, result)
            });
            spawned.insert(handle.id(), tracked);
        }

        while let Some(joined) = tasks.join_next().await {
            let (view, attempts, result) = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    let Some(view) = spawned.remove(&e.id()) else {
                        tracing::error!(error = %e, "unknown view resolution task failed");
                        continue;
                    };
                    self.record_failure(&mut appender, &mut summary, view, 0, e.to_string(), false)?;
                    continue;
                }
            };

            match result {
                Ok(references) => {
                    tracing::debug!(
                        view = %view.table_id,
                        dataset = %view.dataset_id,
                        references = references.len(),
                        "resolved view"
                    );
                    summary.resolved += 1;
                    summary.references += references.len();
                    appender.append(&ViewReferenceRecord::new(&view, references))?;
                }
                Err(error) => {
                    let transient = error.is_transient();
                    self.record_failure(&mut appender, &mut summary, view, attempts, error.to_string(), transient)?;
                }
            }
        }

        tracing::info!(
            path = %appender.path().display(),
            resolved = summary.resolved,
            skipped = summary.already_resolved,
            failed = summary.failed(),
            "view references written"
        );

        Ok(summary)
    }

    fn record_failure(
        &self,
        appender: &mut NdjsonAppender,
        summary: &mut ResolveSummary,
        view: TableRef,
        attempts: u32,
        error: String,
        transient: bool,
    ) -> Result<(), LineageError> {
        let name = format!("{}.{}.{}", view.project_id, view.dataset_id, view.table_id);
        tracing::warn!(view = %name, attempts, error = %error, "failed to resolve view references");

        if self.config.record_failures {
            appender.append(&ViewReferenceRecord::failed(&view, error.as_str()))?;
        }
        summary.failures.push(ViewFailure {
            view,
            attempts,
            error,
            transient,
        });
        Ok(())
    }
}

/// Fetch and analyze one view, retrying transient failures per `retry`
async fn resolve_view(
    catalog: &dyn CatalogAdapter,
    analyzer: &dyn QueryAnalyzer,
    view: &TableRef,
    retry: RetryPolicy,
) -> (u32, Result<Vec<TableRef>, CatalogError>) {
    let mut attempt = 0;
    loop {
        attempt += 1;

        let result = match catalog.fetch_view_query(view).await {
            Ok(sql) => analyzer.referenced_tables(view, &sql).await,
            Err(e) => Err(e),
        };

        match result {
            Err(e) if e.is_transient() && retry.allows_retry(attempt) => {
                tracing::debug!(view = %view.table_id, attempt, error = %e, "retrying view");
                tokio::time::sleep(retry.backoff()).await;
            }
            result => return (attempt, result),
        }
    }
}

/// Views already resolved in an existing output file
///
/// Recorded failures do not count, so those views are attempted again.
fn already_resolved(path: &Path) -> HashSet<TableRef> {
    if !path.exists() {
        return HashSet::new();
    }

    let reader = match NdjsonReader::<ViewReferenceRecord>::open(path) {
        Ok(reader) => reader,
        Err(e) => {
            tracing::warn!(error = %e, "cannot resume from earlier view references");
            return HashSet::new();
        }
    };

    let mut done = HashSet::new();
    for record in reader {
        match record {
            Ok(record) if record.is_failure() => {
                tracing::debug!(view = %record.table_id, "retrying recorded failure");
            }
            Ok(record) => {
                done.insert(record.view_ref());
            }
            Err(e) => tracing::warn!(error = %e, "ignoring unreadable view reference"),
        }
    }

    if !done.is_empty() {
        tracing::info!(path = %path.display(), views = done.len(), "resuming from earlier run");
    }
    done
}
