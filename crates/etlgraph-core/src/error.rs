//! Error types for lineage aggregation

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while qualifying names or reading and writing listings
#[derive(Debug, Error)]
pub enum LineageError {
    /// A qualification call received an empty or unusable component
    #[error("Invalid identifier for {component}: {reason}")]
    InvalidIdentifier {
        component: &'static str,
        reason: String,
    },

    /// A line of a listing artifact could not be decoded as the expected record
    #[error("Failed to read {} line {line}: {message}", path.display())]
    ArtifactRead {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// The root directory or an output file could not be accessed
    #[error("I/O failure on {}: {source}", path.display())]
    FatalIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Record serialization failed
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// A discovery pattern could not be compiled
    #[error("Invalid discovery pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
}

impl LineageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FatalIo {
            path: path.into(),
            source,
        }
    }

    /// Whether this error should abort a whole run
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::FatalIo { .. } | Self::Serialize(_))
    }
}

/// A specialized Result type for lineage operations.
pub type Result<T> = std::result::Result<T, LineageError>;
