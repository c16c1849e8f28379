// src/adapter.rs - retrieval contract consumed by the pipeline
use crate::error::RetrievalError;
use crate::model::Record;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Inclusive time window in epoch milliseconds; either bound may be open.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeRange {
    pub from_ms: Option<i64>,
    pub to_ms: Option<i64>,
}

impl TimeRange {
    pub fn contains(&self, ts_ms: i64) -> bool {
        if let Some(from) = self.from_ms {
            if ts_ms < from {
                return false;
            }
        }
        if let Some(to) = self.to_ms {
            if ts_ms > to {
                return false;
            }
        }
        true
    }
}

/// Ranked matches for one source: parallel doc-id/score arrays in rank
/// order. Materialization happens later, in batches.
#[derive(Debug, Clone, Default)]
pub struct MatchList {
    pub doc_ids: Vec<u64>,
    pub scores: Vec<f32>,
}

impl MatchList {
    pub fn len(&self) -> usize {
        self.doc_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_ids.is_empty()
    }
}

/// An immutable read snapshot of one source. Shared by reference across
/// concurrent queries; never mutated, only replaced.
pub trait SourceHandle: Send + Sync {
    fn search(
        &self,
        filter: &str,
        time_range: Option<TimeRange>,
    ) -> Result<MatchList, RetrievalError>;

    /// Materialize records for a slice of doc ids, in the given order.
    fn fetch(&self, doc_ids: &[u64]) -> Result<Vec<Record>, RetrievalError>;

    /// Snapshot version, compared against the provider's current generation
    /// to decide whether the handle is stale.
    fn generation(&self) -> u64;
}

/// Opens read handles and reports the current generation per source.
pub trait SourceProvider: Send + Sync {
    fn open(&self, source: &str) -> Result<Arc<dyn SourceHandle>, RetrievalError>;
    fn current_generation(&self, source: &str) -> Result<u64, RetrievalError>;
}

/// Cached per-source reader handles, keyed by source name. A handle is
/// reused while its generation matches the provider's; otherwise a fresh
/// handle is opened and swapped in. The old handle stays alive until the
/// last in-flight query drops its reference.
pub struct ReaderCache {
    provider: Arc<dyn SourceProvider>,
    readers: Mutex<HashMap<String, Arc<dyn SourceHandle>>>,
}

impl ReaderCache {
    pub fn new(provider: Arc<dyn SourceProvider>) -> Self {
        ReaderCache {
            provider,
            readers: Mutex::new(HashMap::new()),
        }
    }

    pub fn reader(&self, source: &str) -> Result<Arc<dyn SourceHandle>, RetrievalError> {
        let current = self.provider.current_generation(source)?;
        let mut readers = self.readers.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(handle) = readers.get(source) {
            if handle.generation() == current {
                return Ok(Arc::clone(handle));
            }
            tracing::debug!(source, "source changed, refreshing reader handle");
        }

        let handle = self.provider.open(source)?;
        readers.insert(source.to_string(), Arc::clone(&handle));
        Ok(handle)
    }
}
