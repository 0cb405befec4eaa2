//! In-memory sink

use super::RecordSink;
use crate::error::Result;
use crate::types::Row;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Keeps appended rows per destination, plus a count of non-empty appends
#[derive(Debug, Default)]
pub struct MemorySink {
    inner: Mutex<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    rows: HashMap<PathBuf, Vec<Row>>,
    appends: usize,
}

impl MemorySink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows appended to `destination` so far
    pub fn rows(&self, destination: &Path) -> Vec<Row> {
        self.lock().rows.get(destination).cloned().unwrap_or_default()
    }

    /// Rows appended across all destinations
    pub fn total_rows(&self) -> usize {
        self.lock().rows.values().map(Vec::len).sum()
    }

    /// Number of non-empty appends
    pub fn appends(&self) -> usize {
        self.lock().appends
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RecordSink for MemorySink {
    fn append(&self, rows: &[Row], destination: &Path) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut inner = self.lock();
        inner
            .rows
            .entry(destination.to_path_buf())
            .or_default()
            .extend_from_slice(rows);
        inner.appends += 1;
        Ok(())
    }
}
