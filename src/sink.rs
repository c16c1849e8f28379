// src/sink.rs - materializes export results outside the pipeline
use crate::error::SinkError;
use crate::model::{ExportResult, Record};
use std::fs::OpenOptions;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub target: String,
    pub records_written: usize,
    pub destination: PathBuf,
}

/// Consumes an `ExportResult` and writes it somewhere. The pipeline never
/// calls this itself; the hosting layer decides when and where.
pub trait Sink {
    fn export(&self, result: &ExportResult) -> Result<ExportSummary, SinkError>;
}

/// Writes `<target>.csv` under a root directory.
pub struct CsvSink {
    root: PathBuf,
}

impl CsvSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        CsvSink { root: root.into() }
    }

    /// Requested field subset, or the union of record fields in first-seen
    /// order when none was requested.
    fn columns(result: &ExportResult) -> Vec<String> {
        if !result.fields.is_empty() {
            return result.fields.clone();
        }
        let mut columns: Vec<String> = Vec::new();
        for record in &result.records {
            for key in record.fields.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }
        columns
    }
}

impl Sink for CsvSink {
    fn export(&self, result: &ExportResult) -> Result<ExportSummary, SinkError> {
        // Target names are file stems, never paths.
        if result.target.contains(['/', '\\']) || result.target.contains("..") {
            return Err(SinkError::InvalidTarget(result.target.clone()));
        }

        let path = self.root.join(format!("{}.csv", result.target));
        let existing_len = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);

        let file = if result.append {
            OpenOptions::new().create(true).append(true).open(&path)?
        } else {
            OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&path)?
        };

        let columns = Self::columns(result);
        let mut writer = csv::WriterBuilder::new().from_writer(file);
        if !result.append || existing_len == 0 {
            writer.write_record(&columns)?;
        }
        for record in &result.records {
            writer.write_record(row_values(record, &columns))?;
        }
        writer.flush()?;

        Ok(ExportSummary {
            target: result.target.clone(),
            records_written: result.records.len(),
            destination: path,
        })
    }
}

fn row_values<'a>(record: &'a Record, columns: &'a [String]) -> Vec<&'a str> {
    columns
        .iter()
        .map(|c| record.fields.get(c).map(String::as_str).unwrap_or(""))
        .collect()
}
