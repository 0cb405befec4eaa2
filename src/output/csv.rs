//! CSV sink
//!
//! The first write to a file fixes its header: the union of the batch's
//! keys in first-seen order. Later appends keep that header and project
//! rows onto it, so a file never ends up with misaligned columns.

use super::{ensure_parent, RecordSink};
use crate::error::{Error, Result};
use crate::types::{JsonValue, Row};
use ::csv::{ReaderBuilder, WriterBuilder};
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::BufWriter;
use std::path::Path;
use tracing::debug;

/// Appends rows to CSV files
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvSink;

impl CsvSink {
    /// Create a CSV sink
    pub fn new() -> Self {
        Self
    }

    /// Header of an existing, non-empty file
    fn existing_header(destination: &Path) -> Result<Option<Vec<String>>> {
        let non_empty = std::fs::metadata(destination).is_ok_and(|m| m.len() > 0);
        if !non_empty {
            return Ok(None);
        }

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .from_path(destination)?;
        let header = reader.headers()?.iter().map(ToString::to_string).collect();
        Ok(Some(header))
    }
}

impl RecordSink for CsvSink {
    fn append(&self, rows: &[Row], destination: &Path) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        ensure_parent(destination)?;

        let (columns, file, write_header) = match Self::existing_header(destination)? {
            Some(columns) => {
                let file = OpenOptions::new().append(true).open(destination)?;
                (columns, file, false)
            }
            None => (union_of_keys(rows), File::create(destination)?, true),
        };

        let known: HashSet<&str> = columns.iter().map(String::as_str).collect();
        let dropped: HashSet<&str> = rows
            .iter()
            .flat_map(|row| row.keys().map(String::as_str))
            .filter(|key| !known.contains(key))
            .collect();
        if !dropped.is_empty() {
            debug!(
                destination = %destination.display(),
                columns = ?dropped,
                "dropping columns not present in the existing header"
            );
        }

        let mut writer = WriterBuilder::new()
            .has_headers(false)
            .from_writer(BufWriter::new(file));
        if write_header {
            writer.write_record(&columns)?;
        }
        for row in rows {
            writer.write_record(columns.iter().map(|column| cell_text(row.get(column))))?;
        }
        writer
            .flush()
            .map_err(|e| Error::output(format!("failed to flush {}: {e}", destination.display())))?;

        debug!(rows = rows.len(), destination = %destination.display(), "appended CSV rows");
        Ok(())
    }
}

/// Column names across `rows`, in first-seen order
fn union_of_keys(rows: &[Row]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut columns = Vec::new();
    for key in rows.iter().flat_map(Row::keys) {
        if seen.insert(key.as_str()) {
            columns.push(key.clone());
        }
    }
    columns
}

/// Text of one CSV cell: nested values as JSON, null and missing as empty
pub fn cell_text(value: Option<&JsonValue>) -> String {
    match value {
        None | Some(JsonValue::Null) => String::new(),
        Some(JsonValue::String(s)) => s.clone(),
        Some(JsonValue::Bool(b)) => b.to_string(),
        Some(JsonValue::Number(n)) => n.to_string(),
        Some(nested) => nested.to_string(),
    }
}
