//! Typed record definitions for each listing artifact family
//!
//! Wire field names follow the catalog's own JSON (`projectId`, `datasetId`,
//! `tableId`, `referencedTables`), except for the query-log edgelist whose
//! columns are fixed by the lineage query (`destination_table`,
//! `referenced_table`). Unknown fields are ignored on read; a missing required
//! field fails decoding of that line only.

use crate::error::Result;
use crate::qualify::{qualify, QualifiedName};
use serde::{Deserialize, Serialize};

/// Table type reported by the catalog for views
pub const VIEW_TABLE_TYPE: &str = "VIEW";

/// Reference to a table by its three components
///
/// A missing component decodes as empty, so one incomplete entry of a
/// reference list is rejected on its own when qualified.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRef {
    /// Project ID
    #[serde(default)]
    pub project_id: String,

    /// Dataset ID
    #[serde(default)]
    pub dataset_id: String,

    /// Table ID
    #[serde(default)]
    pub table_id: String,
}

impl TableRef {
    /// Create a new table reference
    pub fn new(
        project_id: impl Into<String>,
        dataset_id: impl Into<String>,
        table_id: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            dataset_id: dataset_id.into(),
            table_id: table_id.into(),
        }
    }

    /// Canonical qualified name of this table
    pub fn qualified_name(&self) -> Result<QualifiedName> {
        qualify(&self.project_id, &self.dataset_id, &self.table_id)
    }
}

/// One dataset discovered in a project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetListingRecord {
    pub project_id: String,
    pub dataset_id: String,
}

impl DatasetListingRecord {
    pub fn new(project_id: impl Into<String>, dataset_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            dataset_id: dataset_id.into(),
        }
    }
}

/// One table or view discovered in the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableListingRecord {
    #[serde(rename = "projectId")]
    pub project_id: String,

    #[serde(rename = "datasetId")]
    pub dataset_id: String,

    #[serde(rename = "tableId")]
    pub table_id: String,

    /// `TABLE`, `VIEW`, `EXTERNAL`, `MATERIALIZED_VIEW`, ...
    #[serde(alias = "type")]
    pub table_type: String,
}

impl TableListingRecord {
    pub fn new(
        project_id: impl Into<String>,
        dataset_id: impl Into<String>,
        table_id: impl Into<String>,
        table_type: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            dataset_id: dataset_id.into(),
            table_id: table_id.into(),
            table_type: table_type.into(),
        }
    }

    /// Whether this row needs view reference resolution
    pub fn is_view(&self) -> bool {
        self.table_type == VIEW_TABLE_TYPE
    }

    pub fn table_ref(&self) -> TableRef {
        TableRef::new(&self.project_id, &self.dataset_id, &self.table_id)
    }
}

/// Query analysis section of a view reference record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewQuery {
    /// Tables the view's defining query reads from
    #[serde(default)]
    pub referenced_tables: Option<Vec<TableRef>>,
}

/// A view together with the tables its definition reads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewReferenceRecord {
    pub project_id: String,
    pub dataset_id: String,
    pub table_id: String,

    #[serde(default)]
    pub query: Option<ViewQuery>,

    /// Set when the references could not be determined
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ViewReferenceRecord {
    /// Build a record for `view` reading `referenced`
    pub fn new(view: &TableRef, referenced: Vec<TableRef>) -> Self {
        Self {
            project_id: view.project_id.clone(),
            dataset_id: view.dataset_id.clone(),
            table_id: view.table_id.clone(),
            query: Some(ViewQuery {
                referenced_tables: Some(referenced),
            }),
            error: None,
        }
    }

    /// Record a view whose references could not be determined
    pub fn failed(view: &TableRef, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(view, Vec::new())
        }
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }

    /// Referenced tables, empty when the section or key is absent
    pub fn referenced_tables(&self) -> &[TableRef] {
        self.query
            .as_ref()
            .and_then(|q| q.referenced_tables.as_deref())
            .unwrap_or_default()
    }

    /// Qualified name of the view itself
    pub fn destination(&self) -> Result<QualifiedName> {
        qualify(&self.project_id, &self.dataset_id, &self.table_id)
    }

    pub fn view_ref(&self) -> TableRef {
        TableRef::new(&self.project_id, &self.dataset_id, &self.table_id)
    }
}

/// A (destination, source) pair extracted from the warehouse query logs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryEdgeRecord {
    pub destination_table: String,
    pub referenced_table: String,
}

impl QueryEdgeRecord {
    pub fn new(destination_table: impl Into<String>, referenced_table: impl Into<String>) -> Self {
        Self {
            destination_table: destination_table.into(),
            referenced_table: referenced_table.into(),
        }
    }
}
