// src/lib.rs
pub mod adapter;
pub mod config;
pub mod engine;
pub mod error;
pub mod memory;
pub mod model;
pub mod output;
pub mod query;
pub mod sink;
pub mod stages;
pub mod stream;

pub use error::*;

pub use adapter::{MatchList, ReaderCache, SourceHandle, SourceProvider, TimeRange};
pub use config::EngineConfig;
pub use engine::{SearchEngine, SearchRequest, SearchResponse, SortSpec};
pub use memory::MemoryProvider;
pub use model::{
    CellValue, ChartResult, ExportResult, PipeResult, Record, Series, Table, TimeChartResult,
};
pub use query::{parse, ParsedQuery, StageSpec};
pub use sink::{CsvSink, ExportSummary, Sink};
pub use stages::Stage;
pub use stream::{BatchedRecordIter, MergeOrder, OrderedMerge, RecordStream, SequentialMerge};
