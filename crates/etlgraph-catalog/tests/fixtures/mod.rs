//! Test fixtures for catalog integration tests
//!
//! A small warehouse: one project with a raw dataset of tables and a views
//! dataset whose views read those tables and each other.

#![allow(dead_code)]

use etlgraph_catalog::{MockCatalog, QueryRow};
use etlgraph_core::{TableListingRecord, TableRef};

pub const PROJECT: &str = "proj";

pub fn events() -> TableRef {
    TableRef::new(PROJECT, "raw", "events")
}

pub fn users() -> TableRef {
    TableRef::new(PROJECT, "raw", "users")
}

pub fn daily_events() -> TableRef {
    TableRef::new(PROJECT, "views", "daily_events")
}

pub fn active_users() -> TableRef {
    TableRef::new(PROJECT, "views", "active_users")
}

pub fn broken_view() -> TableRef {
    TableRef::new(PROJECT, "views", "broken")
}

pub const DAILY_EVENTS_SQL: &str =
    "SELECT day, COUNT(*) AS n FROM `proj.raw.events` GROUP BY day";

pub const ACTIVE_USERS_SQL: &str = "WITH recent AS (SELECT user_id FROM daily_events d JOIN raw.events e ON d.day = e.day) \
     SELECT u.* FROM raw.users u JOIN recent r ON u.id = r.user_id";

/// Catalog with two tables and two resolvable views
pub async fn warehouse() -> MockCatalog {
    warehouse_with(MockCatalog::new()).await
}

pub async fn warehouse_with(catalog: MockCatalog) -> MockCatalog {
    catalog.add_table(TableListingRecord::new(PROJECT, "raw", "events", "TABLE")).await;
    catalog.add_table(TableListingRecord::new(PROJECT, "raw", "users", "TABLE")).await;
    catalog.add_view(&daily_events(), DAILY_EVENTS_SQL, vec![events()]).await;
    catalog
        .add_view(&active_users(), ACTIVE_USERS_SQL, vec![daily_events(), events(), users()])
        .await;
    catalog
}

/// Views of [`warehouse`] as table-listing rows, with the tables mixed in
pub fn listing() -> Vec<TableListingRecord> {
    vec![
        TableListingRecord::new(PROJECT, "raw", "events", "TABLE"),
        TableListingRecord::new(PROJECT, "raw", "users", "TABLE"),
        TableListingRecord::new(PROJECT, "views", "daily_events", "VIEW"),
        TableListingRecord::new(PROJECT, "views", "active_users", "VIEW"),
    ]
}

pub fn query_row(destination: Option<&str>, referenced: Option<&str>) -> QueryRow {
    let mut row = QueryRow::new();
    row.insert("destination_table".to_string(), destination.map(str::to_string));
    row.insert("referenced_table".to_string(), referenced.map(str::to_string));
    row
}
