// src/engine.rs - drives retrieval, mode selection and the stage chain
use crate::adapter::{ReaderCache, SourceProvider, TimeRange};
use crate::config::EngineConfig;
use crate::error::SearchError;
use crate::model::{PipeResult, Record};
use crate::query::{self, ParsedQuery};
use crate::stages::Stage;
use crate::stream::{
    BatchedRecordIter, MergeOrder, OrderedMerge, RecordStream, SequentialMerge,
};
use indexmap::IndexMap;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub enum SortSpec {
    #[default]
    Score,
    Field {
        name: String,
        descending: bool,
    },
}

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub sources: Vec<String>,
    pub time_range: Option<TimeRange>,
    /// Zero-based page, used only when the query has no stages.
    pub page: usize,
    pub page_size: Option<usize>,
    pub sort: SortSpec,
    pub facet_fields: Vec<String>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, sources: Vec<String>) -> Self {
        SearchRequest {
            query: query.into(),
            sources,
            time_range: None,
            page: 0,
            page_size: None,
            sort: SortSpec::Score,
            facet_fields: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub result: PipeResult,
    /// Matches across all sources before windowing or capping.
    pub total_hits: usize,
    pub facets: IndexMap<String, IndexMap<String, usize>>,
}

/// Per-field value frequencies over the examined records, merged across
/// sources by summing.
struct FacetCollector {
    counts: IndexMap<String, IndexMap<String, usize>>,
}

impl FacetCollector {
    fn new(fields: &[String]) -> Self {
        let counts = fields
            .iter()
            .map(|f| (f.clone(), IndexMap::new()))
            .collect();
        FacetCollector { counts }
    }

    fn add(&mut self, record: &Record) {
        for (field, values) in self.counts.iter_mut() {
            if let Some(value) = record.fields.get(field) {
                *values.entry(value.clone()).or_insert(0) += 1;
            }
        }
    }

    fn finish(mut self, limit: usize) -> IndexMap<String, IndexMap<String, usize>> {
        for values in self.counts.values_mut() {
            values.sort_by(|_, a, _, b| b.cmp(a));
            values.truncate(limit);
        }
        self.counts
    }
}

/// Orchestrates one query at a time: single-threaded and synchronous per
/// call, sharing only the reader cache across concurrent queries.
pub struct SearchEngine {
    readers: ReaderCache,
    config: EngineConfig,
}

impl SearchEngine {
    pub fn new(provider: Arc<dyn SourceProvider>, config: EngineConfig) -> Self {
        SearchEngine {
            readers: ReaderCache::new(provider),
            config,
        }
    }

    pub fn run(&self, request: &SearchRequest) -> Result<SearchResponse, SearchError> {
        let parsed = query::parse(&request.query);
        if parsed.stages.is_empty() {
            self.paginated(request, &parsed)
        } else {
            self.pipelined(request, &parsed)
        }
    }

    fn open_streams(
        &self,
        request: &SearchRequest,
        filter: &str,
        per_source_limit: usize,
    ) -> Result<(Vec<Box<dyn RecordStream>>, usize), SearchError> {
        let mut streams: Vec<Box<dyn RecordStream>> = Vec::new();
        let mut total_hits = 0;
        for source in &request.sources {
            let handle = self.readers.reader(source)?;
            let matches = handle.search(filter, request.time_range)?;
            total_hits += matches.len();
            streams.push(Box::new(
                BatchedRecordIter::new(handle, matches, self.config.batch_size)
                    .with_limit(per_source_limit),
            ));
        }
        Ok((streams, total_hits))
    }

    /// No stages: bounded window, sort, page slice, facets.
    fn paginated(
        &self,
        request: &SearchRequest,
        parsed: &ParsedQuery,
    ) -> Result<SearchResponse, SearchError> {
        let (streams, total_hits) =
            self.open_streams(request, &parsed.filter, self.config.max_window)?;

        // Score order can stream through the k-way merge because each
        // source is already rank-ordered; a field sort has to materialize
        // the window first.
        let window = match &request.sort {
            SortSpec::Score => OrderedMerge::new(streams, MergeOrder::ScoreDesc)
                .collect_up_to(self.config.max_window)?,
            SortSpec::Field { name, descending } => {
                let mut window =
                    SequentialMerge::new(streams).collect_up_to(self.config.max_window)?;
                let order = MergeOrder::Field {
                    name: name.clone(),
                    descending: *descending,
                };
                window.sort_by(|a, b| order.compare(a, b));
                window
            }
        };

        let mut facets = FacetCollector::new(&request.facet_fields);
        for record in &window {
            facets.add(record);
        }

        let page_size = request.page_size.unwrap_or(self.config.default_page_size);
        let page: Vec<Record> = window
            .into_iter()
            .skip(request.page.saturating_mul(page_size))
            .take(page_size)
            .collect();

        Ok(SearchResponse {
            result: PipeResult::logs(page),
            total_hits,
            facets: facets.finish(self.config.facet_limit),
        })
    }

    /// Stages present: capped retrieval, facets disabled, stage chain.
    fn pipelined(
        &self,
        request: &SearchRequest,
        parsed: &ParsedQuery,
    ) -> Result<SearchResponse, SearchError> {
        // Build every stage before touching storage so an invalid query
        // never runs a partial pipeline.
        let stages = parsed
            .stages
            .iter()
            .map(Stage::build)
            .collect::<Result<Vec<_>, _>>()?;

        let (streams, total_hits) =
            self.open_streams(request, &parsed.filter, self.config.pipeline_cap)?;
        let mut merge = SequentialMerge::new(streams);
        let mut records = Vec::new();
        while let Some(record) = merge.next_record()? {
            records.push(record);
        }

        let mut result = PipeResult::logs(records);
        for stage in &stages {
            tracing::debug!(
                stage = stage.name(),
                input = result.variant_name(),
                "running stage"
            );
            result = stage.execute(result)?;
        }

        Ok(SearchResponse {
            result,
            total_hits,
            facets: IndexMap::new(),
        })
    }
}
