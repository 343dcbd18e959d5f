//! Listing fixtures for aggregation tests
//!
//! Each helper returns NDJSON text shaped like the artifacts a crawl run and
//! the query-log extraction leave behind.

#![allow(dead_code)]

use etlgraph_core::{ListingStore, QueryEdgeRecord, TableRef, ViewReferenceRecord};

/// One view record in wire format
pub fn view_line(project: &str, dataset: &str, view: &str, referenced: &[(&str, &str, &str)]) -> String {
    let record = ViewReferenceRecord::new(
        &TableRef::new(project, dataset, view),
        referenced
            .iter()
            .map(|(p, d, t)| TableRef::new(*p, *d, *t))
            .collect(),
    );
    serde_json::to_string(&record).unwrap()
}

/// One query-log edge in wire format
pub fn query_line(destination: &str, referenced: &str) -> String {
    serde_json::to_string(&QueryEdgeRecord::new(destination, referenced)).unwrap()
}

/// Join lines into NDJSON file contents
pub fn ndjson(lines: &[String]) -> String {
    let mut text = lines.join("\n");
    text.push('\n');
    text
}

/// A store with a small two-project crawl plus a query-log edgelist
///
/// Unique edges:
/// - proj-a.reporting.daily_users -> proj-a.raw.events
/// - proj-a.reporting.daily_users -> proj-a.raw.users
/// - proj-b.mart.revenue -> proj-b.raw.orders
/// - proj-b.mart.revenue -> proj-a.reporting.daily_users
/// - proj-b.derived.summary -> proj-b.mart.revenue
pub fn two_project_store() -> (tempfile::TempDir, ListingStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = ListingStore::new(dir.path());

    store
        .write_atomic(
            "proj-a/views_references.ndjson",
            &ndjson(&[
                view_line(
                    "proj-a",
                    "reporting",
                    "daily_users",
                    &[("proj-a", "raw", "events"), ("proj-a", "raw", "users")],
                ),
                view_line("proj-a", "reporting", "empty_view", &[]),
            ]),
        )
        .unwrap();

    store
        .write_atomic(
            "proj-b/views_references.ndjson",
            &ndjson(&[view_line(
                "proj-b",
                "mart",
                "revenue",
                &[("proj-b", "raw", "orders"), ("proj-a", "reporting", "daily_users")],
            )]),
        )
        .unwrap();

    store
        .write_atomic(
            "proj-b/shared_prod_edgelist.ndjson",
            &ndjson(&[
                query_line("proj-b.derived.summary", "proj-b.mart.revenue"),
                query_line("proj-b.mart.revenue", "proj-b.raw.orders"),
            ]),
        )
        .unwrap();

    (dir, store)
}
