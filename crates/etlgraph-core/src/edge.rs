//! Lineage edges and the deduplicated edge set

use crate::error::Result;
use crate::qualify::QualifiedName;
use crate::records::QueryEdgeRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Header of the tabular encoding (graph-tool convention)
pub const CSV_HEADER: &str = "Source,Target";

/// A directed lineage edge: `destination` reads from `referenced`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub destination: QualifiedName,
    pub referenced: QualifiedName,
}

impl Edge {
    pub fn new(destination: QualifiedName, referenced: QualifiedName) -> Self {
        Self {
            destination,
            referenced,
        }
    }

    /// Edge from a query-log row; both names are taken verbatim
    pub fn from_query_record(record: &QueryEdgeRecord) -> Result<Self> {
        Ok(Self {
            destination: QualifiedName::parse_qualified(record.destination_table.as_str())?,
            referenced: QualifiedName::parse_qualified(record.referenced_table.as_str())?,
        })
    }

    pub fn is_self_reference(&self) -> bool {
        self.destination == self.referenced
    }
}

/// Deduplicated set of edges, iterated in sorted order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgeSet {
    edges: BTreeSet<Edge>,
}

impl EdgeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an edge, returning `false` if it was already present
    pub fn insert(&mut self, edge: Edge) -> bool {
        self.edges.insert(edge)
    }

    pub fn contains(&self, edge: &Edge) -> bool {
        self.edges.contains(edge)
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter()
    }

    /// Pretty-printed JSON array of `{destination, referenced}` objects
    pub fn to_json_pretty(&self) -> Result<String> {
        let edges: Vec<&Edge> = self.edges.iter().collect();
        Ok(serde_json::to_string_pretty(&edges)?)
    }

    /// Two-column CSV with `Source` = destination and `Target` = referenced
    ///
    /// Qualified names never contain commas or newlines, so no quoting is done.
    pub fn to_csv(&self) -> String {
        let mut csv = String::with_capacity(CSV_HEADER.len() + 1 + self.edges.len() * 64);
        csv.push_str(CSV_HEADER);
        csv.push('\n');

        for edge in &self.edges {
            csv.push_str(edge.destination.as_str());
            csv.push(',');
            csv.push_str(edge.referenced.as_str());
            csv.push('\n');
        }

        csv
    }
}

impl FromIterator<Edge> for EdgeSet {
    fn from_iter<I: IntoIterator<Item = Edge>>(iter: I) -> Self {
        Self {
            edges: iter.into_iter().collect(),
        }
    }
}

impl Extend<Edge> for EdgeSet {
    fn extend<I: IntoIterator<Item = Edge>>(&mut self, iter: I) {
        self.edges.extend(iter);
    }
}

impl<'a> IntoIterator for &'a EdgeSet {
    type Item = &'a Edge;
    type IntoIter = std::collections::btree_set::Iter<'a, Edge>;

    fn into_iter(self) -> Self::IntoIter {
        self.edges.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qualify::qualify;
    use pretty_assertions::assert_eq;

    fn edge(d: &str, r: &str) -> Edge {
        Edge::new(
            QualifiedName::parse_qualified(d).unwrap(),
            QualifiedName::parse_qualified(r).unwrap(),
        )
    }

    #[test]
    fn duplicate_edges_collapse() {
        let mut set = EdgeSet::new();
        assert!(set.insert(edge("p.d.v", "p.d.t")));
        assert!(!set.insert(edge("p.d.v", "p.d.t")));
        assert!(set.insert(edge("p.d.t", "p.d.v")));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn self_reference_is_kept() {
        let set: EdgeSet = vec![edge("p.d.x", "p.d.x"), edge("p.d.x", "p.d.x")].into_iter().collect();
        assert_eq!(set.len(), 1);
        assert!(set.iter().all(Edge::is_self_reference));
    }

    #[test]
    fn json_encoding() {
        let set: EdgeSet = vec![edge("p.d.v1", "p.d.t1")].into_iter().collect();
        let expected = "[\n  {\n    \"destination\": \"p.d.v1\",\n    \"referenced\": \"p.d.t1\"\n  }\n]";
        assert_eq!(set.to_json_pretty().unwrap(), expected);
    }

    #[test]
    fn csv_encoding_maps_destination_to_source() {
        let set: EdgeSet = vec![edge("p.d.v1", "p.d.t1"), edge("p.d.a", "p.d.b")].into_iter().collect();
        assert_eq!(set.to_csv(), "Source,Target\np.d.a,p.d.b\np.d.v1,p.d.t1\n");
    }

    #[test]
    fn empty_set_encodings() {
        let set = EdgeSet::new();
        assert_eq!(set.to_json_pretty().unwrap(), "[]");
        assert_eq!(set.to_csv(), "Source,Target\n");
    }

    #[test]
    fn query_record_is_not_requalified() {
        let record = QueryEdgeRecord::new("p.d.dest", "other.d.src");
        let edge = Edge::from_query_record(&record).unwrap();
        assert_eq!(edge.destination, qualify("p", "d", "dest").unwrap());
        assert_eq!(edge.referenced.as_str(), "other.d.src");

        assert!(Edge::from_query_record(&QueryEdgeRecord::new("", "p.d.t")).is_err());
    }
}
