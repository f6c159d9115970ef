// ABOUTME: ClickHouse destination accessor over the HTTP interface
// ABOUTME: Implements DestinationStore with reqwest; inserts use JSONEachRow

pub mod client;

pub use client::{parse_exception_code, ClickHouseClient};
