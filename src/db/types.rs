//! Query result types.
//!
//! Results are transport-safe: every cell serializes to a plain JSON
//! scalar, so a result can go straight onto the wire.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Result of executing a SQL statement.
///
/// Invariant: every row holds exactly `columns.len()` cells.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueryResult {
    /// Column names, in result-set order.
    pub columns: Vec<String>,

    /// Rows of scalar cells.
    pub rows: Vec<Row>,

    /// Number of rows returned. Equals the untruncated count whenever the
    /// total is known; under truncation it equals `rows.len()`.
    pub row_count: usize,

    /// True whenever execution hit the row cap.
    #[serde(default)]
    pub truncated: bool,

    /// Time taken to execute the statement.
    #[serde(rename = "elapsed_seconds", with = "duration_secs")]
    pub elapsed: Duration,
}

impl QueryResult {
    /// Creates a result from columns and rows, untruncated.
    pub fn with_data(columns: Vec<String>, rows: Vec<Row>) -> Self {
        let row_count = rows.len();
        Self {
            columns,
            rows,
            row_count,
            truncated: false,
            elapsed: Duration::ZERO,
        }
    }

    /// Sets the execution time.
    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = elapsed;
        self
    }

    /// Returns true if the result set is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns up to `n` rows for prompt-building.
    pub fn sample_rows(&self, n: usize) -> &[Row] {
        &self.rows[..self.rows.len().min(n)]
    }
}

/// A row of scalar values.
pub type Row = Vec<Value>;

/// A single scalar value from the database.
///
/// Serializes untagged: `Null` becomes JSON null, numbers stay numbers,
/// everything temporal or high-precision arrives as a string (ISO-8601
/// timestamps, fixed-precision decimals).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Value {
    /// NULL value.
    #[default]
    Null,

    /// Boolean value.
    Bool(bool),

    /// Signed integer (up to i64).
    Int(i64),

    /// Floating point number.
    Float(f64),

    /// Text value, including stringified decimals and timestamps.
    Text(String),
}

impl Value {
    /// Returns true if this value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Display form used when embedding result samples in prompts.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Text(s) => s.clone(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_display_string())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}

/// Serde support for Duration as fractional seconds.
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Ok(Duration::from_secs_f64(secs))
    }
}
