//! Output module
//!
//! The persistence side of a harvest: rows are appended to a destination
//! path in batches. Sinks only append; they never rewrite or deduplicate
//! what is already there.
//!
//! # Overview
//!
//! - `RecordSink` - append rows to a destination, creating it when missing
//! - `CsvSink` - CSV with a header fixed by the first write
//! - `JsonLinesSink` - one JSON object per line
//! - `MemorySink` - keeps rows in memory, for tests and embedding

mod csv;
mod jsonl;
mod memory;

pub use self::csv::{cell_text, CsvSink};
pub use jsonl::JsonLinesSink;
pub use memory::MemorySink;

use crate::error::{Error, Result};
use crate::types::Row;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

/// Append-only destination for harvested rows
pub trait RecordSink: Send + Sync {
    /// Append `rows` to `destination`
    ///
    /// Zero rows is a no-op. The destination and its parent directories are
    /// created when missing.
    fn append(&self, rows: &[Row], destination: &Path) -> Result<()>;
}

/// On-disk format of the built-in file sinks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Comma separated values
    #[default]
    Csv,
    /// Newline delimited JSON
    Jsonl,
}

impl OutputFormat {
    /// File sink for this format
    pub fn sink(self) -> Arc<dyn RecordSink> {
        match self {
            OutputFormat::Csv => Arc::new(CsvSink::new()),
            OutputFormat::Jsonl => Arc::new(JsonLinesSink::new()),
        }
    }

    /// Conventional file extension
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Jsonl => "jsonl",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(OutputFormat::Csv),
            "jsonl" | "ndjson" | "json-lines" => Ok(OutputFormat::Jsonl),
            other => Err(Error::invalid_value(
                "format",
                format!("unknown output format '{other}' (expected csv or jsonl)"),
            )),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Create the parent directories of `destination`
pub(crate) fn ensure_parent(destination: &Path) -> Result<()> {
    match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::output(format!(
                    "failed to create directory {}: {e}",
                    parent.display()
                ))
            })
        }
        _ => Ok(()),
    }
}
