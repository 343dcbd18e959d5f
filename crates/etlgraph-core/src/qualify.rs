//! Canonical qualified names for warehouse tables
//!
//! Every edge endpoint is a `QualifiedName`. Names built from identical
//! `(project, dataset, table)` triples are byte-identical, which is what lets
//! view references and query-log rows from separate runs join on them.

use crate::error::{LineageError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator used by the catalog's own `project.dataset.table` syntax
pub const SEPARATOR: char = '.';

/// Characters that would corrupt the two-column CSV encoding
const FORBIDDEN: [char; 3] = [',', '\n', '\r'];

/// Opaque, immutable key identifying a table or view
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QualifiedName(String);

impl QualifiedName {
    /// Validate a string that is already qualified (e.g. a query-log row)
    ///
    /// The value is taken as-is; it is not split or re-qualified.
    pub fn parse_qualified(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        check_component("qualified name", &value)?;
        Ok(Self(value))
    }

    /// Borrow the underlying string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the underlying string
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for QualifiedName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Build the canonical name for a `(project, dataset, table)` triple
///
/// Fails with [`LineageError::InvalidIdentifier`] if any component is empty
/// or contains a character reserved by the edge list encodings.
pub fn qualify(project_id: &str, dataset_id: &str, table_id: &str) -> Result<QualifiedName> {
    check_component("projectId", project_id)?;
    check_component("datasetId", dataset_id)?;
    check_component("tableId", table_id)?;

    Ok(QualifiedName(format!(
        "{project_id}{SEPARATOR}{dataset_id}{SEPARATOR}{table_id}"
    )))
}

fn check_component(component: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(LineageError::InvalidIdentifier {
            component,
            reason: "value is empty".to_string(),
        });
    }

    if let Some(c) = value.chars().find(|c| FORBIDDEN.contains(c)) {
        return Err(LineageError::InvalidIdentifier {
            component,
            reason: format!("'{}' contains reserved character {:?}", value, c),
        });
    }

    Ok(())
}
