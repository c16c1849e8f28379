// src/model.rs - shared result shapes passed between pipeline stages
use indexmap::IndexMap;
use serde::Serialize;

/// One structured log entry flowing through the pipeline. Stages treat a
/// received record as immutable and clone before rewriting.
#[derive(Debug, Clone, Serialize)]
pub struct Record {
    pub raw: String,
    /// Epoch milliseconds, if the entry carried a parseable timestamp.
    pub timestamp: Option<i64>,
    pub source: String,
    pub collection: String,
    pub score: f32,
    pub fields: IndexMap<String, String>,
}

impl Record {
    pub fn new(raw: impl Into<String>) -> Self {
        Record {
            raw: raw.into(),
            timestamp: None,
            source: String::new(),
            collection: String::new(),
            score: 0.0,
            fields: IndexMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn with_timestamp(mut self, ts_ms: i64) -> Self {
        self.timestamp = Some(ts_ms);
        self
    }
}

/// A typed table cell. Aggregations produce numbers, group-by columns keep
/// the original string values.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Str(String),
    Num(f64),
}

impl CellValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Num(n) => Some(*n),
            CellValue::Str(s) => s.trim().parse().ok(),
        }
    }
}

impl std::fmt::Display for CellValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CellValue::Str(s) => write!(f, "{}", s),
            CellValue::Num(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
        }
    }
}

/// Tabular result produced by the stats stage. Column order matters;
/// `source_hits` counts input records regardless of later row filtering.
#[derive(Debug, Clone, Serialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<IndexMap<String, CellValue>>,
    pub source_hits: usize,
}

/// One named numeric series, aligned index-for-index with its labels.
#[derive(Debug, Clone, Serialize)]
pub struct Series {
    pub name: String,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChartResult {
    pub labels: Vec<String>,
    pub series: Vec<Series>,
    /// Rendering hint only; nothing in the pipeline interprets it.
    pub chart_type: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimeChartResult {
    pub labels: Vec<String>,
    pub series: Vec<Series>,
    pub span_ms: i64,
}

/// Handoff contract to an external sink. Holds the (possibly truncated)
/// records plus metadata; performs no I/O itself.
#[derive(Debug, Clone, Serialize)]
pub struct ExportResult {
    pub target: String,
    pub fields: Vec<String>,
    pub sample_size: Option<usize>,
    pub append: bool,
    pub total_count: usize,
    pub exported_count: usize,
    pub records: Vec<Record>,
}

/// The value threaded between stages. Exactly one variant is active;
/// Chart/TimeChart/Export are terminal for aggregation purposes.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PipeResult {
    Logs(LogsResult),
    Table(Table),
    Chart(ChartResult),
    #[serde(rename = "timechart")]
    TimeChart(TimeChartResult),
    Export(ExportResult),
}

#[derive(Debug, Clone, Serialize)]
pub struct LogsResult {
    pub records: Vec<Record>,
}

impl PipeResult {
    pub fn logs(records: Vec<Record>) -> Self {
        PipeResult::Logs(LogsResult { records })
    }

    pub fn variant_name(&self) -> &'static str {
        match self {
            PipeResult::Logs(_) => "logs",
            PipeResult::Table(_) => "table",
            PipeResult::Chart(_) => "chart",
            PipeResult::TimeChart(_) => "timechart",
            PipeResult::Export(_) => "export",
        }
    }

    /// Chart, timechart and export results cannot be aggregated further.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipeResult::Chart(_) | PipeResult::TimeChart(_) | PipeResult::Export(_)
        )
    }
}
