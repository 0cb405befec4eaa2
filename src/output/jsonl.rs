//! JSON lines sink

use super::{ensure_parent, RecordSink};
use crate::error::{Error, Result};
use crate::types::Row;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::debug;

/// Appends one JSON object per line
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLinesSink;

impl JsonLinesSink {
    /// Create a JSON lines sink
    pub fn new() -> Self {
        Self
    }
}

impl RecordSink for JsonLinesSink {
    fn append(&self, rows: &[Row], destination: &Path) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        ensure_parent(destination)?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(destination)?;
        let mut writer = BufWriter::new(file);
        for row in rows {
            serde_json::to_writer(&mut writer, row)?;
            writer.write_all(b"\n")?;
        }
        writer
            .flush()
            .map_err(|e| Error::output(format!("failed to flush {}: {e}", destination.display())))?;

        debug!(rows = rows.len(), destination = %destination.display(), "appended JSON lines");
        Ok(())
    }
}
