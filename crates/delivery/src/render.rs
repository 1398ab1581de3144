//! Rendering records into file content.
//!
//! Load adapters that materialize records as files (fileshare writes, email
//! attachments) share this logic. Tabular records become minimal CSV; the
//! quoting covers commas, quotes, and newlines and nothing more — tabular
//! manipulation is the transform step's business.

use databridge_core::{RecordValue, StreamData, Table};
use serde_json::Value;

use crate::DeliveryError;

/// Render a record as file bytes.
///
/// `FilePath` records are not rendered here; their content lives on disk
/// and the caller copies it instead.
pub fn render_record(name: &str, record: &StreamData) -> Result<Vec<u8>, DeliveryError> {
    match &record.value {
        RecordValue::Bytes(bytes) => Ok(bytes.clone()),
        RecordValue::Text(text) => Ok(text.clone().into_bytes()),
        RecordValue::Table(table) => Ok(render_csv(table).into_bytes()),
        RecordValue::Int(i) => Ok(i.to_string().into_bytes()),
        RecordValue::List(items) => {
            serde_json::to_vec_pretty(items).map_err(|e| DeliveryError::Render {
                record: name.to_string(),
                detail: e.to_string(),
            })
        }
        RecordValue::Json(value) => {
            serde_json::to_vec_pretty(value).map_err(|e| DeliveryError::Render {
                record: name.to_string(),
                detail: e.to_string(),
            })
        }
        RecordValue::FilePath(path) => Err(DeliveryError::Render {
            record: name.to_string(),
            detail: format!("file-path record ('{path}') must be copied, not rendered"),
        }),
    }
}

/// The file name a record materializes under: its own `file_name` if the
/// producing task set one, otherwise its record name.
pub fn file_name_for<'a>(name: &'a str, record: &'a StreamData) -> &'a str {
    record.file_name.as_deref().unwrap_or(name)
}

fn render_csv(table: &Table) -> String {
    let mut out = String::new();
    append_row(&mut out, table.columns.iter().map(String::as_str));
    for row in &table.rows {
        let cells: Vec<String> = row.iter().map(cell_to_string).collect();
        append_row(&mut out, cells.iter().map(String::as_str));
    }
    out
}

fn append_row<'a>(out: &mut String, cells: impl Iterator<Item = &'a str>) {
    let mut first = true;
    for cell in cells {
        if !first {
            out.push(',');
        }
        first = false;
        if cell.contains(',') || cell.contains('"') || cell.contains('\n') {
            out.push('"');
            out.push_str(&cell.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(cell);
        }
    }
    out.push('\n');
}

fn cell_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
