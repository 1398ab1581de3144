//! The record type flowing between pipeline stages.
//!
//! [`StreamData`] pairs a payload with a data-format tag. The tag is derived
//! from the payload variant itself ([`StreamData::format`]), so tag and
//! content can never disagree. Consumers declare which format(s) they
//! accept; a mismatch is a resolution-time error, never a silent coercion.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

/// A minimal column-ordered tabular payload.
///
/// Row/column manipulation is the transform step's business; the core only
/// carries the shape between stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    /// Column names, in SELECT order.
    pub columns: Vec<String>,
    /// Rows of cell values, each the same length as `columns`.
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    /// Create a table from column names and rows.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    /// Number of data rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

// ---------------------------------------------------------------------------
// DataFormat / RecordValue
// ---------------------------------------------------------------------------

/// The data-format tag of a record payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataFormat {
    /// Tabular data (query results).
    Table,
    /// An opaque in-memory byte buffer (small files).
    Bytes,
    /// A path to a file on local disk (large payloads streamed piecemeal).
    FilePath,
    /// A plain string value.
    Text,
    /// An integer value.
    Int,
    /// A list of values (e.g. recipient addresses, id lists).
    List,
    /// An arbitrary JSON value.
    Json,
}

impl std::fmt::Display for DataFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Table => "table",
            Self::Bytes => "bytes",
            Self::FilePath => "file_path",
            Self::Text => "text",
            Self::Int => "int",
            Self::List => "list",
            Self::Json => "json",
        };
        f.write_str(s)
    }
}

/// A record payload. The variant is the format tag.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordValue {
    /// Tabular data.
    Table(Table),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// Local file path.
    FilePath(String),
    /// Plain string.
    Text(String),
    /// Integer.
    Int(i64),
    /// List of JSON values.
    List(Vec<Value>),
    /// Arbitrary JSON value.
    Json(Value),
}

impl RecordValue {
    /// The format tag for this payload.
    pub fn format(&self) -> DataFormat {
        match self {
            Self::Table(_) => DataFormat::Table,
            Self::Bytes(_) => DataFormat::Bytes,
            Self::FilePath(_) => DataFormat::FilePath,
            Self::Text(_) => DataFormat::Text,
            Self::Int(_) => DataFormat::Int,
            Self::List(_) => DataFormat::List,
            Self::Json(_) => DataFormat::Json,
        }
    }
}

// ---------------------------------------------------------------------------
// StreamData
// ---------------------------------------------------------------------------

/// A standardized container for data flowing through a stream.
///
/// Carries the payload, an optional file name (used by load adapters that
/// write files or attach the record to an email), and free-form metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamData {
    /// The payload; its variant is the record's data format.
    pub value: RecordValue,
    /// File name to use when the record is materialized as a file.
    pub file_name: Option<String>,
    /// Free-form metadata attached by the producing task.
    pub metadata: BTreeMap<String, String>,
}

impl StreamData {
    /// Create a record from a payload, with no file name or metadata.
    pub fn new(value: RecordValue) -> Self {
        Self {
            value,
            file_name: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Tabular record.
    pub fn table(table: Table) -> Self {
        Self::new(RecordValue::Table(table))
    }

    /// Byte-buffer record.
    pub fn bytes(bytes: Vec<u8>) -> Self {
        Self::new(RecordValue::Bytes(bytes))
    }

    /// Plain-text record.
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(RecordValue::Text(text.into()))
    }

    /// Integer record.
    pub fn int(value: i64) -> Self {
        Self::new(RecordValue::Int(value))
    }

    /// List record.
    pub fn list(items: Vec<Value>) -> Self {
        Self::new(RecordValue::List(items))
    }

    /// JSON record.
    pub fn json(value: Value) -> Self {
        Self::new(RecordValue::Json(value))
    }

    /// Attach a file name.
    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    /// The record's data-format tag.
    pub fn format(&self) -> DataFormat {
        self.value.format()
    }

    /// The list payload, if this record is a list.
    pub fn as_list(&self) -> Option<&[Value]> {
        match &self.value {
            RecordValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// The text payload, if this record is text.
    pub fn as_text(&self) -> Option<&str> {
        match &self.value {
            RecordValue::Text(s) => Some(s),
            _ => None,
        }
    }
}
