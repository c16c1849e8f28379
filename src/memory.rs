// src/memory.rs - in-memory reference adapter for the CLI and tests.
// The real retrieval engine lives behind the same traits, outside this
// crate; scoring here is a plain term-match count, not a ranking model.
use crate::adapter::{MatchList, SourceHandle, SourceProvider, TimeRange};
use crate::error::RetrievalError;
use crate::model::Record;
use crate::query::tokenize;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

const TIMESTAMP_KEYS: &[&str] = &["timestamp", "time", "ts", "@timestamp", "datetime"];

/// One filter term: `field:value` restricts a field, anything else matches
/// raw text or any field value. Matching is case-insensitive.
enum FilterTerm {
    Field { name: String, value: String },
    Text(String),
}

impl FilterTerm {
    fn parse(token: &str) -> FilterTerm {
        match token.split_once(':') {
            Some((name, value)) if !name.is_empty() => FilterTerm::Field {
                name: name.to_string(),
                value: value.to_lowercase(),
            },
            _ => FilterTerm::Text(token.to_lowercase()),
        }
    }

    fn matches(&self, record: &Record) -> bool {
        match self {
            FilterTerm::Field { name, value } => record
                .fields
                .get(name)
                .is_some_and(|v| v.to_lowercase().contains(value)),
            FilterTerm::Text(text) => {
                record.raw.to_lowercase().contains(text)
                    || record
                        .fields
                        .values()
                        .any(|v| v.to_lowercase().contains(text))
            }
        }
    }
}

struct MemorySnapshot {
    name: String,
    generation: u64,
    records: Vec<Record>,
}

impl SourceHandle for MemorySnapshot {
    fn search(
        &self,
        filter: &str,
        time_range: Option<TimeRange>,
    ) -> Result<MatchList, RetrievalError> {
        let trimmed = filter.trim();
        let terms: Vec<FilterTerm> = if trimmed.is_empty() || trimmed == "*" {
            Vec::new()
        } else {
            tokenize(trimmed).iter().map(|t| FilterTerm::parse(t)).collect()
        };

        let mut hits: Vec<(u64, f32)> = Vec::new();
        for (doc_id, record) in self.records.iter().enumerate() {
            if let Some(range) = time_range {
                match record.timestamp {
                    Some(ts) if range.contains(ts) => {}
                    _ => continue,
                }
            }
            if terms.iter().all(|t| t.matches(record)) {
                // All terms must match; score is the term count, so the
                // match-everything filter scores a flat 1.
                hits.push((doc_id as u64, terms.len().max(1) as f32));
            }
        }
        // Stable sort keeps ingestion order among equal scores.
        hits.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

        let (doc_ids, scores) = hits.into_iter().unzip();
        Ok(MatchList { doc_ids, scores })
    }

    fn fetch(&self, doc_ids: &[u64]) -> Result<Vec<Record>, RetrievalError> {
        doc_ids
            .iter()
            .map(|id| {
                self.records
                    .get(*id as usize)
                    .cloned()
                    .ok_or_else(|| RetrievalError::MissingDocument {
                        source_name: self.name.clone(),
                        doc_id: *id,
                    })
            })
            .collect()
    }

    fn generation(&self) -> u64 {
        self.generation
    }
}

/// Holds named record sets behind the provider contract. Replacing a
/// source bumps its generation, so cached readers refresh on next use.
#[derive(Default)]
pub struct MemoryProvider {
    sources: Mutex<HashMap<String, Arc<MemorySnapshot>>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        MemoryProvider::default()
    }

    pub fn add_source(&self, name: &str, mut records: Vec<Record>) {
        for record in &mut records {
            if record.source.is_empty() {
                record.source = name.to_string();
            }
            if record.collection.is_empty() {
                record.collection = name.to_string();
            }
        }
        let mut sources = self.sources.lock().unwrap_or_else(|e| e.into_inner());
        let generation = sources.get(name).map(|s| s.generation + 1).unwrap_or(0);
        sources.insert(
            name.to_string(),
            Arc::new(MemorySnapshot {
                name: name.to_string(),
                generation,
                records,
            }),
        );
    }

    fn snapshot(&self, source: &str) -> Result<Arc<MemorySnapshot>, RetrievalError> {
        let sources = self.sources.lock().unwrap_or_else(|e| e.into_inner());
        sources
            .get(source)
            .cloned()
            .ok_or_else(|| RetrievalError::SourceUnavailable {
                source_name: source.to_string(),
                message: "no such source".to_string(),
            })
    }
}

impl SourceProvider for MemoryProvider {
    fn open(&self, source: &str) -> Result<Arc<dyn SourceHandle>, RetrievalError> {
        let handle: Arc<dyn SourceHandle> = self.snapshot(source)?;
        Ok(handle)
    }

    fn current_generation(&self, source: &str) -> Result<u64, RetrievalError> {
        Ok(self.snapshot(source)?.generation)
    }
}

/// Parse JSONL content into records for one source. Lines that are not
/// JSON objects become raw-text records with no fields.
pub fn records_from_jsonl(content: &str, source: &str) -> Vec<Record> {
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| record_from_line(line, source))
        .collect()
}

pub fn record_from_line(line: &str, source: &str) -> Record {
    let mut record = Record::new(line);
    record.source = source.to_string();
    record.collection = source.to_string();

    if let Ok(serde_json::Value::Object(object)) = serde_json::from_str(line.trim()) {
        for (key, value) in object {
            let text = match value {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            record.fields.insert(key, text);
        }
        for key in TIMESTAMP_KEYS {
            if let Some(raw) = record.fields.get(*key) {
                if let Some(ts) = guess_timestamp_ms(raw) {
                    record.timestamp = Some(ts);
                    break;
                }
            }
        }
    }
    record
}

/// Best-effort timestamp parsing: epoch numbers, then dateparser, then the
/// usual log formats assumed UTC. Returns epoch milliseconds.
pub fn guess_timestamp_ms(text: &str) -> Option<i64> {
    use chrono::{DateTime, NaiveDateTime};

    let text = text.trim();

    if let Ok(n) = text.parse::<i64>() {
        // Plausible epoch ranges: seconds up to year 2100, otherwise millis.
        if (0..4_102_444_800).contains(&n) {
            return Some(n * 1000);
        }
        if n >= 1_000_000_000_000 {
            return Some(n);
        }
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.timestamp_millis());
    }
    // Naive formats are taken as UTC before dateparser gets a chance to
    // interpret them in the local zone.
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt.and_utc().timestamp_millis());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.and_utc().timestamp_millis());
    }
    if let Ok(dt) = dateparser::parse(text) {
        return Some(dt.timestamp_millis());
    }
    None
}
