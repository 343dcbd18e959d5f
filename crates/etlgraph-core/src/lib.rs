//! etlgraph core
//!
//! Lineage domain model and the edge aggregation pipeline.
//! The qualified-name format is the join key between artifacts produced by
//! independent runs; changing it invalidates every previously written edge set.

pub mod error;
pub mod qualify;
pub mod records;
pub mod edge;
pub mod store;
pub mod report;
pub mod aggregate;
pub mod config;

pub use error::{LineageError, Result};
pub use qualify::{qualify, QualifiedName};
pub use records::{
    DatasetListingRecord, QueryEdgeRecord, TableListingRecord, TableRef, ViewQuery,
    ViewReferenceRecord, VIEW_TABLE_TYPE,
};
pub use edge::{Edge, EdgeSet};
pub use store::{ListingStore, NdjsonAppender, NdjsonReader};
pub use report::{AggregateSummary, ArtifactFamily, SkipReason, SkippedInput};
pub use aggregate::{Aggregation, EdgeAggregator, EDGES_CSV, EDGES_JSON};
pub use config::{Config, ConfigError, CatalogConfig, ResolverConfig, RetryPolicy, AnalyzerKind};
