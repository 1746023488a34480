//! Result and identifier types for the execution engine.

use crate::error::{BqflowError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A row of data from a read query.
pub type Row = Vec<Value>;

/// A single value returned by the query engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
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

    /// Text/string value.
    String(String),

    /// Binary data.
    Bytes(Vec<u8>),
}

impl Value {
    /// Returns true if this value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the value as an i64 if it is an integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the value as a string slice if it is textual.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Converts the value to a display string.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::String(s) => s.clone(),
            Value::Bytes(b) => format!("<{} bytes>", b.len()),
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

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

/// A parsed, fully-qualified table identifier:
/// `project.dataset.table`, optionally decorated with a `$YYYYMMDD`
/// partition suffix.
///
/// Identifiers that do not have exactly three dot-separated segments are
/// rejected with a clear error rather than sliced blindly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableId {
    /// Project id.
    pub project: String,
    /// Dataset name.
    pub dataset: String,
    /// Base table name, without any partition decoration.
    pub table: String,
    /// Partition suffix, when the id was decorated.
    pub partition: Option<String>,
}

impl TableId {
    /// Parses a dotted table id, splitting off a trailing `$suffix` if any.
    pub fn parse(table_id: &str) -> Result<Self> {
        let (base, partition) = match table_id.split_once('$') {
            Some((base, suffix)) if !suffix.is_empty() => (base, Some(suffix.to_string())),
            Some(_) => {
                return Err(BqflowError::config(format!(
                    "table id '{table_id}' has an empty partition suffix"
                )));
            }
            None => (table_id, None),
        };

        let segments: Vec<&str> = base.split('.').collect();
        match segments.as_slice() {
            [project, dataset, table]
                if !project.is_empty() && !dataset.is_empty() && !table.is_empty() =>
            {
                Ok(Self {
                    project: project.to_string(),
                    dataset: dataset.to_string(),
                    table: table.to_string(),
                    partition,
                })
            }
            _ => Err(BqflowError::config(format!(
                "table id '{table_id}' is not of the form 'project.dataset.table'"
            ))),
        }
    }

    /// Returns the `project.dataset` portion.
    pub fn dataset_id(&self) -> String {
        format!("{}.{}", self.project, self.dataset)
    }

    /// Returns the table name with its partition decoration, if any.
    pub fn decorated_table(&self) -> String {
        match &self.partition {
            Some(suffix) => format!("{}${}", self.table, suffix),
            None => self.table.clone(),
        }
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}",
            self.project,
            self.dataset,
            self.decorated_table()
        )
    }
}
