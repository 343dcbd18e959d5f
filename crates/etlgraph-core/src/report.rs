//! Aggregation summary and skipped-input records
//!
//! Skip reason codes are stable strings; they show up in logs and in the
//! optional `--report` output, so never rename them.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Artifact families the aggregator merges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactFamily {
    /// `*views_references.ndjson`
    ViewReferences,

    /// `shared_prod_edgelist.ndjson`
    QueryEdgelist,
}

impl ArtifactFamily {
    /// File-name pattern used to discover this family under a root
    pub fn pattern(&self) -> &'static str {
        match self {
            Self::ViewReferences => "*views_references.ndjson",
            Self::QueryEdgelist => "shared_prod_edgelist.ndjson",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ViewReferences => "view_references",
            Self::QueryEdgelist => "query_edgelist",
        }
    }
}

impl std::fmt::Display for ArtifactFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an input was left out of the edge set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SkipReason {
    /// The whole file could not be opened
    UnreadableFile,

    /// A line was not valid JSON or lacked a required field
    MalformedRecord,

    /// A record's own name could not be qualified
    InvalidDestination,

    /// One referenced table could not be qualified
    InvalidReference,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnreadableFile => "UNREADABLE_FILE",
            Self::MalformedRecord => "MALFORMED_RECORD",
            Self::InvalidDestination => "INVALID_DESTINATION",
            Self::InvalidReference => "INVALID_REFERENCE",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One skipped file, record, or reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedInput {
    pub reason: SkipReason,

    pub family: ArtifactFamily,

    /// File the input came from
    pub path: PathBuf,

    /// 1-indexed line, absent for file-level skips
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,

    pub message: String,
}

/// Counters collected during one aggregation run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateSummary {
    /// View-reference artifacts scanned
    pub view_reference_files: usize,

    /// Query-edgelist artifacts scanned
    pub query_edgelist_files: usize,

    /// Records decoded across both families
    pub records_read: usize,

    /// Edges produced before deduplication
    pub edges_emitted: usize,

    /// Edges left after deduplication
    pub unique_edges: usize,

    /// Everything that was skipped, in scan order
    pub skipped: Vec<SkippedInput>,
}

impl AggregateSummary {
    pub fn add_skip(&mut self, skip: SkippedInput) {
        tracing::warn!(
            reason = %skip.reason,
            family = %skip.family,
            path = %skip.path.display(),
            line = skip.line,
            "{}",
            skip.message
        );
        self.skipped.push(skip);
    }

    /// Edges dropped as duplicates
    pub fn duplicates(&self) -> usize {
        self.edges_emitted.saturating_sub(self.unique_edges)
    }

    pub fn skipped_with(&self, reason: SkipReason) -> usize {
        self.skipped.iter().filter(|s| s.reason == reason).count()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn save_to_file(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let json = self.to_json()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        std::fs::write(path, json)
    }
}
