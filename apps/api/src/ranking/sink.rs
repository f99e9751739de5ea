//! Result sink: persists the ranked table. Default backend writes a CSV file.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::ranking::table::ScoreTable;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Where and how much was written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SinkReceipt {
    pub location: String,
    pub rows: usize,
}

/// Carried in `AppState` as `Arc<dyn ResultSink>`.
pub trait ResultSink: Send + Sync {
    fn persist(&self, table: &ScoreTable) -> Result<SinkReceipt, SinkError>;
}

/// Writes the table to a CSV file, replacing any previous file at that path.
pub struct CsvFileSink {
    path: PathBuf,
}

impl CsvFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ResultSink for CsvFileSink {
    /// Writes to a temp file beside the target, then renames it over the target, so
    /// readers and concurrent batches only ever see a complete table.
    fn persist(&self, table: &ScoreTable) -> Result<SinkReceipt, SinkError> {
        let dir = match self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => {
                std::fs::create_dir_all(parent)?;
                parent
            }
            None => Path::new("."),
        };

        let mut staged = tempfile::NamedTempFile::new_in(dir)?;
        write_csv(table, staged.as_file_mut())?;
        staged.as_file().sync_all()?;
        staged.persist(&self.path).map_err(|e| e.error)?;

        info!(
            "Wrote {} ranked candidates to {}",
            table.len(),
            self.path.display()
        );
        Ok(SinkReceipt {
            location: self.path.display().to_string(),
            rows: table.len(),
        })
    }
}

/// Writes one header row then one row per candidate, in the table's current order.
pub fn write_csv<W: Write>(table: &ScoreTable, writer: W) -> Result<(), SinkError> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(table.header_row())?;

    for row in table.rows() {
        let mut record = Vec::with_capacity(row.scores.len() + 2);
        record.push(row.name.clone());
        record.extend(row.scores.iter().map(u8::to_string));
        record.push(row.total.to_string());
        csv_writer.write_record(&record)?;
    }

    csv_writer.flush()?;
    Ok(())
}
