// ABOUTME: MySQL source accessor built on a mysql_async connection pool
// ABOUTME: Implements SourceStore with bound parameters and backtick-quoted identifiers

pub mod reader;

pub use reader::{decode_value, MySqlSource};
