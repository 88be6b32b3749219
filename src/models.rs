// ABOUTME: Shared data models for SQL Explorer
// ABOUTME: Cell values, result pages, and session descriptions handed to the UI layer

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

/// A single cell as read from the server
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Exact decimal text, kept as a string to avoid rounding
    Decimal(String),
    Text(String),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    DateTimeOffset(DateTime<FixedOffset>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) | Value::Decimal(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Decimal(v) | Value::Text(v) => f.write_str(v),
            Value::Bytes(v) => write!(f, "0x{}", hex::encode_upper(v)),
            Value::Uuid(v) => write!(f, "{}", v.hyphenated()),
            Value::Date(v) => write!(f, "{}", v.format("%Y-%m-%d")),
            Value::Time(v) => write!(f, "{}", v.format("%H:%M:%S%.f")),
            Value::DateTime(v) => write!(f, "{}", v.format("%Y-%m-%d %H:%M:%S%.f")),
            Value::DateTimeOffset(v) => write!(f, "{}", v.format("%Y-%m-%d %H:%M:%S%.f %:z")),
        }
    }
}

/// Column names plus rows as returned by one statement
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl RowSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    /// Values of the first column, skipping nulls
    pub fn first_column(&self) -> Vec<String> {
        self.rows
            .iter()
            .filter_map(|row| row.first())
            .filter(|value| !value.is_null())
            .map(|value| value.to_string())
            .collect()
    }
}

/// One window of a table's rows
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultPage {
    pub table: String,
    pub offset: u64,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultPage {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Iterate a row as (column name, value) pairs
    pub fn record(&self, index: usize) -> Option<impl Iterator<Item = (&str, &Value)>> {
        self.rows
            .get(index)
            .map(|row| self.columns.iter().map(String::as_str).zip(row.iter()))
    }

    /// Look up a single cell by row index and column name
    pub fn get(&self, index: usize, column: &str) -> Option<&Value> {
        let position = self.columns.iter().position(|c| c == column)?;
        self.rows.get(index)?.get(position)
    }
}

/// How the session authenticated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    Trusted,
    Credentialed,
}

/// Public description of an open session (no secrets)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionInfo {
    pub driver: String,
    pub server: String,
    pub database: String,
    #[serde(rename = "authMode")]
    pub auth_mode: AuthMode,
}
