// src/stages/export.rs - packages records for an external sink
use crate::error::QueryError;
use crate::model::{ExportResult, Record};
use crate::query::StageSpec;

/// Truncates to a sample and attaches export metadata. Writing anywhere is
/// the job of a downstream sink.
#[derive(Debug)]
pub struct ExportStage {
    pub target: String,
    pub fields: Vec<String>,
    pub sample_size: Option<usize>,
    pub append: bool,
}

impl ExportStage {
    pub fn build(spec: &StageSpec) -> Result<ExportStage, QueryError> {
        let target = spec
            .args
            .first()
            .cloned()
            .ok_or_else(|| QueryError::MissingParameter {
                stage: "export".to_string(),
                param: "target".to_string(),
            })?;

        let fields = spec
            .params
            .get("fields")
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let sample_size = match spec.params.get("sample") {
            Some(raw) => Some(raw.parse().map_err(|_| QueryError::InvalidArgument {
                stage: "export".to_string(),
                value: raw.clone(),
                message: "sample must be a non-negative integer".to_string(),
            })?),
            None => None,
        };

        let append = spec
            .params
            .get("append")
            .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
            .unwrap_or(false);

        Ok(ExportStage {
            target,
            fields,
            sample_size,
            append,
        })
    }

    pub fn execute(&self, mut records: Vec<Record>) -> ExportResult {
        let total_count = records.len();
        if let Some(sample) = self.sample_size {
            // First N, not a random sample.
            records.truncate(sample);
        }
        let exported_count = records.len();

        ExportResult {
            target: self.target.clone(),
            fields: self.fields.clone(),
            sample_size: self.sample_size,
            append: self.append,
            total_count,
            exported_count,
            records,
        }
    }
}
