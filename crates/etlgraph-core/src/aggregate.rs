//! Edge aggregation: merge every lineage artifact under a root into one
//! canonical, deduplicated edge set
//!
//! Two artifact families are merged:
//! - view-reference listings, whose names are qualified here
//! - query-log edgelists, whose names arrive already qualified
//!
//! Per-file and per-record problems are recorded in the [`AggregateSummary`]
//! and skipped; only root-level I/O failures abort the run.

use crate::edge::{Edge, EdgeSet};
use crate::error::{LineageError, Result};
use crate::records::{QueryEdgeRecord, ViewReferenceRecord};
use crate::report::{AggregateSummary, ArtifactFamily, SkipReason, SkippedInput};
use crate::store::{ListingStore, NdjsonReader};
use std::path::{Path, PathBuf};

/// Structured edge list written to the root
pub const EDGES_JSON: &str = "edges.json";

/// Tabular edge list written to the root
pub const EDGES_CSV: &str = "edges.csv";

/// Result of one aggregation run
#[derive(Debug, Clone, Default)]
pub struct Aggregation {
    pub edges: EdgeSet,
    pub summary: AggregateSummary,
}

impl Aggregation {
    /// Write `edges.json` and `edges.csv` to the store root
    pub fn write(&self, store: &ListingStore) -> Result<(PathBuf, PathBuf)> {
        let json = store.write_atomic(EDGES_JSON, &self.edges.to_json_pretty()?)?;
        tracing::info!(path = %json.display(), edges = self.edges.len(), "wrote {}", EDGES_JSON);

        let csv = store.write_atomic(EDGES_CSV, &self.edges.to_csv())?;
        tracing::info!(path = %csv.display(), edges = self.edges.len(), "wrote {}", EDGES_CSV);

        Ok((json, csv))
    }
}

/// Scans a listing store and builds the canonical edge set
pub struct EdgeAggregator<'a> {
    store: &'a ListingStore,
}

impl<'a> EdgeAggregator<'a> {
    pub fn new(store: &'a ListingStore) -> Self {
        Self { store }
    }

    /// Aggregate and write both output encodings
    pub fn run(&self) -> Result<Aggregation> {
        let aggregation = self.aggregate()?;
        aggregation.write(self.store)?;
        Ok(aggregation)
    }

    /// Merge all artifacts under the root into an [`Aggregation`]
    pub fn aggregate(&self) -> Result<Aggregation> {
        self.store.ensure_root()?;

        let mut edges = EdgeSet::new();
        let mut summary = AggregateSummary::default();

        for path in self.store.discover(ArtifactFamily::ViewReferences.pattern())? {
            summary.view_reference_files += 1;
            self.merge_view_references(&path, &mut edges, &mut summary);
        }

        for path in self.store.discover(ArtifactFamily::QueryEdgelist.pattern())? {
            summary.query_edgelist_files += 1;
            self.merge_query_edgelist(&path, &mut edges, &mut summary);
        }

        summary.unique_edges = edges.len();
        tracing::info!(
            edges = summary.unique_edges,
            duplicates = summary.duplicates(),
            skipped = summary.skipped.len(),
            "aggregated lineage edges"
        );

        Ok(Aggregation { edges, summary })
    }

    fn merge_view_references(&self, path: &Path, edges: &mut EdgeSet, summary: &mut AggregateSummary) {
        let family = ArtifactFamily::ViewReferences;
        let Some(mut reader) = self.open::<ViewReferenceRecord>(path, family, summary) else {
            return;
        };

        let mut views = 0usize;
        while let Some(item) = reader.next() {
            let record = match item {
                Ok(record) => record,
                Err(e) => {
                    summary.add_skip(record_skip(SkipReason::MalformedRecord, family, path, e));
                    continue;
                }
            };
            summary.records_read += 1;
            views += 1;

            let destination = match record.destination() {
                Ok(name) => name,
                Err(e) => {
                    summary.add_skip(SkippedInput {
                        reason: SkipReason::InvalidDestination,
                        family,
                        path: path.to_path_buf(),
                        line: Some(reader.line()),
                        message: e.to_string(),
                    });
                    continue;
                }
            };

            for table in record.referenced_tables() {
                match table.qualified_name() {
                    Ok(referenced) => {
                        summary.edges_emitted += 1;
                        edges.insert(Edge::new(destination.clone(), referenced));
                    }
                    Err(e) => summary.add_skip(SkippedInput {
                        reason: SkipReason::InvalidReference,
                        family,
                        path: path.to_path_buf(),
                        line: Some(reader.line()),
                        message: format!("{destination}: {e}"),
                    }),
                }
            }
        }

        tracing::info!(path = %self.relative(path).display(), views, "merged view references");
    }

    fn merge_query_edgelist(&self, path: &Path, edges: &mut EdgeSet, summary: &mut AggregateSummary) {
        let family = ArtifactFamily::QueryEdgelist;
        let Some(mut reader) = self.open::<QueryEdgeRecord>(path, family, summary) else {
            return;
        };

        let mut rows = 0usize;
        while let Some(item) = reader.next() {
            let record = match item {
                Ok(record) => record,
                Err(e) => {
                    summary.add_skip(record_skip(SkipReason::MalformedRecord, family, path, e));
                    continue;
                }
            };
            summary.records_read += 1;
            rows += 1;

            match Edge::from_query_record(&record) {
                Ok(edge) => {
                    summary.edges_emitted += 1;
                    edges.insert(edge);
                }
                Err(e) => summary.add_skip(SkippedInput {
                    reason: SkipReason::InvalidReference,
                    family,
                    path: path.to_path_buf(),
                    line: Some(reader.line()),
                    message: e.to_string(),
                }),
            }
        }

        tracing::info!(path = %self.relative(path).display(), rows, "merged query references");
    }

    fn open<T: serde::de::DeserializeOwned>(
        &self,
        path: &Path,
        family: ArtifactFamily,
        summary: &mut AggregateSummary,
    ) -> Option<NdjsonReader<T>> {
        match self.store.read_records::<T>(path) {
            Ok(reader) => Some(reader),
            Err(e) => {
                summary.add_skip(SkippedInput {
                    reason: SkipReason::UnreadableFile,
                    family,
                    path: path.to_path_buf(),
                    line: None,
                    message: e.to_string(),
                });
                None
            }
        }
    }

    fn relative<'p>(&self, path: &'p Path) -> &'p Path {
        path.strip_prefix(self.store.root()).unwrap_or(path)
    }
}

fn record_skip(reason: SkipReason, family: ArtifactFamily, path: &Path, error: LineageError) -> SkippedInput {
    let line = match &error {
        LineageError::ArtifactRead { line, .. } if *line > 0 => Some(*line),
        _ => None,
    };

    SkippedInput {
        reason,
        family,
        path: path.to_path_buf(),
        line,
        message: error.to_string(),
    }
}
