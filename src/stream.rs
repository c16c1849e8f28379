// src/stream.rs - batched per-source iteration and multi-source merging
use crate::adapter::{MatchList, SourceHandle};
use crate::error::RetrievalError;
use crate::model::Record;
use std::cmp::Ordering;
use std::collections::VecDeque;
use std::sync::Arc;

/// "Has more / take next" contract over a record sequence. Fallible because
/// advancing may materialize a fresh batch from storage. Instances belong
/// to a single query and are not shared.
pub trait RecordStream {
    fn next_record(&mut self) -> Result<Option<Record>, RetrievalError>;

    /// Drain up to `n` records into a vector.
    fn collect_up_to(&mut self, n: usize) -> Result<Vec<Record>, RetrievalError>
    where
        Self: Sized,
    {
        let mut out = Vec::new();
        while out.len() < n {
            match self.next_record()? {
                Some(record) => out.push(record),
                None => break,
            }
        }
        Ok(out)
    }
}

/// Lazily materializes one source's ranked match list in fixed-size
/// batches. At most one batch is held in memory; exhausting the match list
/// ends iteration.
pub struct BatchedRecordIter {
    handle: Arc<dyn SourceHandle>,
    matches: MatchList,
    pos: usize,
    yielded: usize,
    limit: Option<usize>,
    batch: VecDeque<Record>,
    batch_size: usize,
}

impl BatchedRecordIter {
    pub fn new(handle: Arc<dyn SourceHandle>, matches: MatchList, batch_size: usize) -> Self {
        BatchedRecordIter {
            handle,
            matches,
            pos: 0,
            yielded: 0,
            limit: None,
            batch: VecDeque::new(),
            batch_size: batch_size.max(1),
        }
    }

    /// Cap the total number of records this iterator will yield.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

impl RecordStream for BatchedRecordIter {
    fn next_record(&mut self) -> Result<Option<Record>, RetrievalError> {
        if let Some(limit) = self.limit {
            if self.yielded >= limit {
                return Ok(None);
            }
        }

        if self.batch.is_empty() {
            if self.pos >= self.matches.len() {
                return Ok(None);
            }
            let end = (self.pos + self.batch_size).min(self.matches.len());
            let mut records = self.handle.fetch(&self.matches.doc_ids[self.pos..end])?;
            for (offset, record) in records.iter_mut().enumerate() {
                record.score = self.matches.scores[self.pos + offset];
            }
            self.pos = end;
            self.batch.extend(records);
        }

        match self.batch.pop_front() {
            Some(record) => {
                self.yielded += 1;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }
}

/// Comparator for ordered multi-source merging. The merge emits the record
/// that compares `Less` first.
#[derive(Debug, Clone)]
pub enum MergeOrder {
    ScoreDesc,
    TimestampAsc,
    TimestampDesc,
    Field { name: String, descending: bool },
}

impl MergeOrder {
    pub fn compare(&self, a: &Record, b: &Record) -> Ordering {
        match self {
            MergeOrder::ScoreDesc => b
                .score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal),
            MergeOrder::TimestampAsc => a.timestamp.cmp(&b.timestamp),
            MergeOrder::TimestampDesc => b.timestamp.cmp(&a.timestamp),
            MergeOrder::Field { name, descending } => {
                let ord = a.fields.get(name).cmp(&b.fields.get(name));
                if *descending {
                    ord.reverse()
                } else {
                    ord
                }
            }
        }
    }
}

/// Sequential concatenation: drain source 1 fully, then source 2, and so
/// on. Empty sources are skipped without caller involvement.
pub struct SequentialMerge {
    sources: Vec<Box<dyn RecordStream>>,
    current: usize,
}

impl SequentialMerge {
    pub fn new(sources: Vec<Box<dyn RecordStream>>) -> Self {
        SequentialMerge {
            sources,
            current: 0,
        }
    }
}

impl RecordStream for SequentialMerge {
    fn next_record(&mut self) -> Result<Option<Record>, RetrievalError> {
        while self.current < self.sources.len() {
            if let Some(record) = self.sources[self.current].next_record()? {
                return Ok(Some(record));
            }
            self.current += 1;
        }
        Ok(None)
    }
}

/// True k-way merge: one peeked head per non-exhausted source, each step
/// emits the head that compares least under the given order. Never buffers
/// a full source. Ties break toward the earlier source, keeping the merge
/// stable.
pub struct OrderedMerge {
    heads: Vec<Option<Record>>,
    sources: Vec<Box<dyn RecordStream>>,
    order: MergeOrder,
    primed: bool,
}

impl OrderedMerge {
    pub fn new(sources: Vec<Box<dyn RecordStream>>, order: MergeOrder) -> Self {
        let heads = sources.iter().map(|_| None).collect();
        OrderedMerge {
            heads,
            sources,
            order,
            primed: false,
        }
    }

    fn prime(&mut self) -> Result<(), RetrievalError> {
        for (i, source) in self.sources.iter_mut().enumerate() {
            self.heads[i] = source.next_record()?;
        }
        self.primed = true;
        Ok(())
    }
}

impl RecordStream for OrderedMerge {
    fn next_record(&mut self) -> Result<Option<Record>, RetrievalError> {
        if !self.primed {
            self.prime()?;
        }

        let best = self
            .heads
            .iter()
            .enumerate()
            .filter_map(|(i, head)| head.as_ref().map(|record| (i, record)))
            .reduce(|current, candidate| {
                if self.order.compare(candidate.1, current.1) == Ordering::Less {
                    candidate
                } else {
                    current
                }
            })
            .map(|(i, _)| i);

        let Some(i) = best else { return Ok(None) };
        let record = self.heads[i].take();
        self.heads[i] = self.sources[i].next_record()?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Fixed record list standing in for a materialized source.
    pub(crate) struct VecStream {
        records: VecDeque<Record>,
    }

    impl VecStream {
        pub(crate) fn new(records: Vec<Record>) -> Self {
            VecStream {
                records: records.into(),
            }
        }
    }

    impl RecordStream for VecStream {
        fn next_record(&mut self) -> Result<Option<Record>, RetrievalError> {
            Ok(self.records.pop_front())
        }
    }

    fn scored(score: f32) -> Record {
        let mut record = Record::new(format!("score {}", score));
        record.score = score;
        record
    }

    #[test]
    fn sequential_merge_drains_in_order() {
        let a = VecStream::new(vec![scored(1.0), scored(2.0)]);
        let empty = VecStream::new(vec![]);
        let b = VecStream::new(vec![scored(3.0)]);
        let mut merge =
            SequentialMerge::new(vec![Box::new(a), Box::new(empty), Box::new(b)]);

        let out = merge.collect_up_to(10).unwrap();
        let scores: Vec<f32> = out.iter().map(|r| r.score).collect();
        assert_eq!(scores, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn ordered_merge_by_score_desc() {
        // Scenario: A = [10, 5], B = [8, 3], both already descending.
        let a = VecStream::new(vec![scored(10.0), scored(5.0)]);
        let b = VecStream::new(vec![scored(8.0), scored(3.0)]);
        let mut merge =
            OrderedMerge::new(vec![Box::new(a), Box::new(b)], MergeOrder::ScoreDesc);

        let out = merge.collect_up_to(10).unwrap();
        let scores: Vec<f32> = out.iter().map(|r| r.score).collect();
        assert_eq!(scores, vec![10.0, 8.0, 5.0, 3.0]);
    }

    #[test]
    fn ordered_merge_handles_empty_sources() {
        let empty1 = VecStream::new(vec![]);
        let a = VecStream::new(vec![scored(2.0), scored(1.0)]);
        let empty2 = VecStream::new(vec![]);
        let mut merge = OrderedMerge::new(
            vec![Box::new(empty1), Box::new(a), Box::new(empty2)],
            MergeOrder::ScoreDesc,
        );

        let out = merge.collect_up_to(10).unwrap();
        assert_eq!(out.len(), 2);
        assert!(merge.next_record().unwrap().is_none());
    }

    #[test]
    fn ordered_merge_by_timestamp() {
        let a = VecStream::new(vec![
            Record::new("t1").with_timestamp(1000),
            Record::new("t3").with_timestamp(3000),
        ]);
        let b = VecStream::new(vec![Record::new("t2").with_timestamp(2000)]);
        let mut merge =
            OrderedMerge::new(vec![Box::new(a), Box::new(b)], MergeOrder::TimestampAsc);

        let out = merge.collect_up_to(10).unwrap();
        let stamps: Vec<i64> = out.iter().filter_map(|r| r.timestamp).collect();
        assert_eq!(stamps, vec![1000, 2000, 3000]);
    }
}
