// ABOUTME: Ordered row records and cell values moved from MySQL into ClickHouse
// ABOUTME: Also defines CursorValue, the persisted form of the identifying column

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// A single cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    UInt(u64),
    Float(f64),
    /// Fixed-point decimal kept as its exact textual form
    Decimal(String),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// JSON form accepted by ClickHouse's `JSONEachRow` input format.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Value::Null => Json::Null,
            Value::Int(v) => Json::from(*v),
            Value::UInt(v) => Json::from(*v),
            Value::Float(v) => serde_json::Number::from_f64(*v)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::Decimal(s) | Value::Text(s) => Json::String(s.clone()),
            Value::Bytes(b) => Json::String(String::from_utf8_lossy(b).into_owned()),
            Value::Date(d) => Json::String(d.format("%Y-%m-%d").to_string()),
            Value::DateTime(dt) => Json::String(format_datetime(dt)),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::DateTime(v)
    }
}

fn format_datetime(dt: &NaiveDateTime) -> String {
    if dt.nanosecond() == 0 {
        dt.format("%Y-%m-%d %H:%M:%S").to_string()
    } else {
        dt.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
    }
}

/// Value of the identifying column, as persisted in the sync state.
///
/// Three domains are kept apart because MySQL orders them differently:
/// integers, other numbers (DECIMAL, FLOAT, BIGINT UNSIGNED above `i64::MAX`)
/// compared by numeric value, and strings/dates compared as text. Numbers
/// order before text so a mixed state can never move a cursor backwards.
///
/// Persisted as a JSON integer, a `{"numeric": "..."}` object, or a string.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "PersistedCursor", into = "PersistedCursor")]
pub enum CursorValue {
    Int(i64),
    /// Canonical decimal text, e.g. `-12.5`
    Numeric(String),
    Text(String),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum PersistedCursor {
    Int(i64),
    Numeric { numeric: String },
    Text(String),
}

impl TryFrom<PersistedCursor> for CursorValue {
    type Error = String;

    fn try_from(value: PersistedCursor) -> Result<Self, Self::Error> {
        match value {
            PersistedCursor::Int(v) => Ok(CursorValue::Int(v)),
            PersistedCursor::Numeric { numeric } => CursorValue::numeric(&numeric)
                .ok_or_else(|| format!("invalid numeric cursor {:?}", numeric)),
            PersistedCursor::Text(s) => Ok(CursorValue::Text(s)),
        }
    }
}

impl From<CursorValue> for PersistedCursor {
    fn from(value: CursorValue) -> Self {
        match value {
            CursorValue::Int(v) => PersistedCursor::Int(v),
            CursorValue::Numeric(numeric) => PersistedCursor::Numeric { numeric },
            CursorValue::Text(s) => PersistedCursor::Text(s),
        }
    }
}

impl CursorValue {
    /// The cursor of a table where nothing has been synced yet.
    pub fn zero() -> Self {
        CursorValue::Int(0)
    }

    pub fn is_zero(&self) -> bool {
        matches!(self, CursorValue::Int(0))
    }

    /// A numeric cursor from decimal text. Integers that fit `i64` become
    /// [`CursorValue::Int`]; anything that is not a plain decimal is `None`.
    pub fn numeric(text: &str) -> Option<Self> {
        let parsed = DecimalText::parse(text)?;
        if parsed.frac.is_empty() {
            if let Ok(v) = parsed.to_string().parse::<i64>() {
                return Some(CursorValue::Int(v));
            }
        }
        Some(CursorValue::Numeric(parsed.to_string()))
    }

    /// Derive a cursor from a cell of the identifying column. NULL has no
    /// position and yields `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Int(v) => Some(CursorValue::Int(*v)),
            Value::UInt(v) => CursorValue::numeric(&v.to_string()),
            Value::Float(v) if v.is_finite() => CursorValue::numeric(&v.to_string()),
            Value::Float(_) => None,
            Value::Decimal(s) => {
                CursorValue::numeric(s).or_else(|| Some(CursorValue::Text(s.clone())))
            }
            Value::Text(s) => Some(CursorValue::Text(s.clone())),
            Value::Bytes(b) => Some(CursorValue::Text(String::from_utf8_lossy(b).into_owned())),
            Value::Date(_) | Value::DateTime(_) => match value.to_json() {
                serde_json::Value::String(s) => Some(CursorValue::Text(s)),
                _ => None,
            },
        }
    }

    fn as_decimal(&self) -> Option<DecimalText> {
        match self {
            CursorValue::Int(v) => DecimalText::parse(&v.to_string()),
            CursorValue::Numeric(s) => DecimalText::parse(s),
            CursorValue::Text(_) => None,
        }
    }
}

impl Default for CursorValue {
    fn default() -> Self {
        Self::zero()
    }
}

impl Ord for CursorValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (CursorValue::Int(a), CursorValue::Int(b)) => a.cmp(b),
            (CursorValue::Text(a), CursorValue::Text(b)) => a.cmp(b),
            (CursorValue::Text(_), _) => Ordering::Greater,
            (_, CursorValue::Text(_)) => Ordering::Less,
            (a, b) => match (a.as_decimal(), b.as_decimal()) {
                (Some(a), Some(b)) => a.cmp(&b),
                // Numeric values are validated on construction.
                _ => Ordering::Equal,
            },
        }
    }
}

impl PartialOrd for CursorValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for CursorValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for CursorValue {}

impl fmt::Display for CursorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CursorValue::Int(v) => write!(f, "{}", v),
            CursorValue::Numeric(s) | CursorValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for CursorValue {
    fn from(v: i64) -> Self {
        CursorValue::Int(v)
    }
}

/// Plain decimal text split into sign, integer digits without leading zeros
/// and fraction digits without trailing zeros. Compared exactly, without a
/// round trip through `f64`.
#[derive(Debug, PartialEq, Eq)]
struct DecimalText {
    negative: bool,
    int: String,
    frac: String,
}

impl DecimalText {
    fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let (negative, digits) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text.strip_prefix('+').unwrap_or(text)),
        };
        let (int, frac) = digits.split_once('.').unwrap_or((digits, ""));
        if int.is_empty() && frac.is_empty() {
            return None;
        }
        if !int.chars().chain(frac.chars()).all(|c| c.is_ascii_digit()) {
            return None;
        }
        let int = int.trim_start_matches('0').to_string();
        let frac = frac.trim_end_matches('0').to_string();
        let negative = negative && !(int.is_empty() && frac.is_empty());
        Some(Self {
            negative,
            int,
            frac,
        })
    }

    fn cmp_magnitude(&self, other: &Self) -> Ordering {
        self.int
            .len()
            .cmp(&other.int.len())
            .then_with(|| self.int.cmp(&other.int))
            .then_with(|| self.frac.cmp(&other.frac))
    }
}

impl Ord for DecimalText {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.negative, other.negative) {
            (false, true) => Ordering::Greater,
            (true, false) => Ordering::Less,
            (false, false) => self.cmp_magnitude(other),
            (true, true) => other.cmp_magnitude(self),
        }
    }
}

impl PartialOrd for DecimalText {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for DecimalText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negative {
            f.write_str("-")?;
        }
        f.write_str(if self.int.is_empty() { "0" } else { &self.int })?;
        if !self.frac.is_empty() {
            write!(f, ".{}", self.frac)?;
        }
        Ok(())
    }
}

/// A row whose values are aligned with an explicit, shared column list.
///
/// Values are always accessed through the column list so that appending the
/// version marker can never shift a positional lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Record {
    /// Build a record. Returns `None` when the value count does not match the
    /// column list.
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Option<Self> {
        if columns.len() != values.len() {
            return None;
        }
        Some(Self { columns, values })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|idx| &self.values[idx])
    }

    /// Iterate `(column, value)` pairs in declared order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    /// Attach the version marker, re-keying the record to the effective column
    /// list (`effective` must be this record's columns plus one trailing
    /// column).
    pub fn stamped(self, effective: &Arc<[String]>, version: &Value) -> Self {
        debug_assert_eq!(effective.len(), self.columns.len() + 1);
        debug_assert!(effective.starts_with(&self.columns));
        let mut values = self.values;
        values.push(version.clone());
        Self {
            columns: Arc::clone(effective),
            values,
        }
    }

    /// Encode as one `JSONEachRow` line, keys in declared order.
    pub fn to_json_line(&self) -> String {
        let mut line = String::from("{");
        for (idx, (column, value)) in self.iter().enumerate() {
            if idx > 0 {
                line.push(',');
            }
            line.push_str(&serde_json::Value::String(column.to_string()).to_string());
            line.push(':');
            line.push_str(&value.to_json().to_string());
        }
        line.push('}');
        line
    }
}
