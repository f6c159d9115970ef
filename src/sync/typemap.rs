// ABOUTME: Maps MySQL column types to ClickHouse column types
// ABOUTME: Per-column overrides win, decimals keep precision/scale, unknown types become String

use std::collections::HashMap;

use super::store::SourceColumnType;
use crate::config::TableMapping;

/// Destination type used for base types missing from the default table.
pub const FALLBACK_TYPE: &str = "Nullable(String)";

const DEFAULT_TYPES: &[(&str, &str)] = &[
    ("int", "Nullable(Int32)"),
    ("integer", "Nullable(Int32)"),
    ("bigint", "Nullable(Int64)"),
    ("tinyint", "Nullable(Int8)"),
    ("smallint", "Nullable(Int16)"),
    ("mediumint", "Nullable(Int32)"),
    ("int unsigned", "Nullable(UInt32)"),
    ("integer unsigned", "Nullable(UInt32)"),
    ("bigint unsigned", "Nullable(UInt64)"),
    ("tinyint unsigned", "Nullable(UInt8)"),
    ("smallint unsigned", "Nullable(UInt16)"),
    ("mediumint unsigned", "Nullable(UInt32)"),
    ("varchar", "Nullable(String)"),
    ("char", "Nullable(String)"),
    ("text", "Nullable(String)"),
    ("tinytext", "Nullable(String)"),
    ("mediumtext", "Nullable(String)"),
    ("longtext", "Nullable(String)"),
    ("enum", "Nullable(String)"),
    ("set", "Nullable(String)"),
    ("blob", "Nullable(String)"),
    ("tinyblob", "Nullable(String)"),
    ("mediumblob", "Nullable(String)"),
    ("longblob", "Nullable(String)"),
    ("binary", "Nullable(String)"),
    ("varbinary", "Nullable(String)"),
    ("datetime", "Nullable(DateTime)"),
    ("timestamp", "Nullable(DateTime)"),
    ("date", "Nullable(Date)"),
    ("time", "Nullable(String)"),
    ("year", "Nullable(UInt16)"),
    ("decimal", "Nullable(Decimal)"),
    ("float", "Nullable(Float32)"),
    ("double", "Nullable(Float64)"),
    ("json", "Nullable(String)"),
    ("bool", "Nullable(UInt8)"),
    ("boolean", "Nullable(UInt8)"),
    ("bit", "Nullable(UInt64)"),
];

/// Default base-type table, keyed by lower-case MySQL base type name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeMap {
    entries: HashMap<String, String>,
}

impl Default for TypeMap {
    fn default() -> Self {
        Self {
            entries: DEFAULT_TYPES
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

impl TypeMap {
    pub fn get(&self, base_type: &str) -> Option<&str> {
        self.entries.get(base_type).map(String::as_str)
    }

    pub fn insert(&mut self, base_type: &str, clickhouse_type: &str) {
        self.entries
            .insert(base_type.to_lowercase(), clickhouse_type.to_string());
    }
}

impl Extend<(String, String)> for TypeMap {
    fn extend<I: IntoIterator<Item = (String, String)>>(&mut self, iter: I) {
        for (k, v) in iter {
            self.entries.insert(k.to_lowercase(), v);
        }
    }
}

/// Resolve the ClickHouse type of one replicated column.
pub fn resolve(
    mapping: &TableMapping,
    column: &str,
    source_type: &SourceColumnType,
    defaults: &TypeMap,
) -> String {
    if let Some(custom) = mapping.type_mapping.get(column) {
        return custom.clone();
    }

    if source_type.data_type == "decimal" {
        if let Some((precision, scale)) = decimal_params(&source_type.column_type) {
            return format!("Decimal({},{})", precision, scale);
        }
    }

    let base = base_type(&source_type.column_type, &source_type.data_type);
    if source_type.column_type.contains("unsigned") {
        if let Some(mapped) = defaults.get(&format!("{} unsigned", base)) {
            return mapped.to_string();
        }
    }

    defaults
        .get(&base)
        .map(str::to_string)
        .unwrap_or_else(|| FALLBACK_TYPE.to_string())
}

/// Base type name with any parenthesised modifier and attributes removed.
fn base_type(column_type: &str, data_type: &str) -> String {
    let source = if column_type.is_empty() {
        data_type
    } else {
        column_type
    };
    source
        .split(['(', ' '])
        .next()
        .unwrap_or(source)
        .trim()
        .to_lowercase()
}

/// `decimal(10,2)` -> `(10, 2)`; `decimal(8)` -> `(8, 0)`.
fn decimal_params(column_type: &str) -> Option<(u32, u32)> {
    let open = column_type.find('(')?;
    let close = column_type[open..].find(')')? + open;
    let mut parts = column_type[open + 1..close].split(',');
    let precision = parts.next()?.trim().parse().ok()?;
    let scale = match parts.next() {
        Some(s) => s.trim().parse().ok()?,
        None => 0,
    };
    Some((precision, scale))
}
