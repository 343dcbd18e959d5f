//! SQL analysis for view definitions
//!
//! This crate handles:
//! - Parsing view bodies with the BigQuery dialect
//! - Collecting the relations a query reads, minus its own CTEs
//! - Resolving partially qualified names against the view's project and dataset

pub mod references;

pub use references::{ReferenceExtractor, SqlAnalysisError, SqlReferences};
