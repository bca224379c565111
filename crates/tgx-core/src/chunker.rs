//! Bounded window chunking of a chronological record stream.
//!
//! Records are grouped into contiguous chunks. A chunk is flushed once it is
//! "full" (it reached `count_max` members or spans at least `time_max`) and it
//! is also large enough (at least `count_min` members spanning at least
//! `time_min`). A trailing remainder that never qualifies is dropped.

use std::time::Duration;

use chrono::{DateTime, FixedOffset, TimeDelta};
use tracing::{debug, warn};

use crate::{domain::Record, errors::Error, Result};

/// Count and time bounds for chunking. All four values are independent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkConfig {
    count_min: usize,
    count_max: usize,
    time_min: TimeDelta,
    time_max: TimeDelta,
}

impl ChunkConfig {
    pub fn new(
        count_min: usize,
        count_max: usize,
        time_min: Duration,
        time_max: Duration,
    ) -> Result<Self> {
        if count_min < 1 {
            return Err(Error::InvalidArgument(
                "chunk count_min must be at least 1".to_string(),
            ));
        }
        if count_max < count_min {
            return Err(Error::InvalidArgument(format!(
                "chunk count_max ({count_max}) is below count_min ({count_min})"
            )));
        }
        if time_max < time_min {
            return Err(Error::InvalidArgument(format!(
                "chunk time_max ({}s) is below time_min ({}s)",
                time_max.as_secs(),
                time_min.as_secs()
            )));
        }

        Ok(Self {
            count_min,
            count_max,
            time_min: to_delta(time_min)?,
            time_max: to_delta(time_max)?,
        })
    }

    pub fn count_min(&self) -> usize {
        self.count_min
    }

    pub fn count_max(&self) -> usize {
        self.count_max
    }

    pub fn time_min(&self) -> TimeDelta {
        self.time_min
    }

    pub fn time_max(&self) -> TimeDelta {
        self.time_max
    }

    /// The flush rule. A negative `elapsed` (out-of-order input) never qualifies.
    pub fn should_flush(&self, count: usize, elapsed: TimeDelta) -> bool {
        if elapsed < TimeDelta::zero() {
            return false;
        }
        let full = count >= self.count_max || elapsed >= self.time_max;
        full && count >= self.count_min && elapsed >= self.time_min
    }
}

fn to_delta(d: Duration) -> Result<TimeDelta> {
    TimeDelta::from_std(d)
        .map_err(|_| Error::InvalidArgument(format!("duration out of range: {}s", d.as_secs())))
}

/// A non-empty, ordered batch of records emitted by the chunker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chunk {
    records: Vec<Record>,
}

impl Chunk {
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn count(&self) -> usize {
        self.records.len()
    }

    pub fn first(&self) -> &Record {
        &self.records[0]
    }

    pub fn last(&self) -> &Record {
        &self.records[self.records.len() - 1]
    }

    /// `last.timestamp - first.timestamp`.
    pub fn span(&self) -> TimeDelta {
        self.last().timestamp - self.first().timestamp
    }
}

/// Push-based chunk builder.
///
/// Feed records in stream order with [`ChunkAccumulator::push`]; a completed
/// chunk is returned as soon as the flush rule holds.
#[derive(Clone, Debug)]
pub struct ChunkAccumulator {
    config: ChunkConfig,
    pending: Vec<Record>,
    start_time: Option<DateTime<FixedOffset>>,
}

impl ChunkAccumulator {
    pub fn new(config: ChunkConfig) -> Self {
        Self {
            config,
            pending: Vec::new(),
            start_time: None,
        }
    }

    /// Records accumulated since the last flush.
    pub fn pending(&self) -> &[Record] {
        &self.pending
    }

    pub fn push(&mut self, record: Record) -> Option<Chunk> {
        let start = *self.start_time.get_or_insert(record.timestamp);
        let elapsed = record.timestamp - start;
        if elapsed < TimeDelta::zero() {
            warn!(
                id = record.id,
                behind_secs = -elapsed.num_seconds(),
                "record is older than the start of its chunk"
            );
        }
        self.pending.push(record);

        if !self.config.should_flush(self.pending.len(), elapsed) {
            return None;
        }

        self.start_time = None;
        let records = std::mem::take(&mut self.pending);
        debug!(
            count = records.len(),
            elapsed_secs = elapsed.num_seconds(),
            "chunk flushed"
        );
        Some(Chunk { records })
    }

    /// Consume the accumulator, returning the undersized remainder (if any).
    ///
    /// The remainder never satisfied the flush rule and is not a chunk.
    pub fn finish(self) -> Vec<Record> {
        self.pending
    }
}

/// Lazy chunking adapter over a record iterator.
pub struct Chunker<I> {
    input: I,
    acc: Option<ChunkAccumulator>,
    discarded: usize,
}

impl<I> Chunker<I>
where
    I: Iterator<Item = Record>,
{
    pub fn new(input: I, config: ChunkConfig) -> Self {
        Self {
            input,
            acc: Some(ChunkAccumulator::new(config)),
            discarded: 0,
        }
    }

    /// Number of trailing records dropped when the input ended.
    ///
    /// Only meaningful once the iterator has returned `None`.
    pub fn discarded(&self) -> usize {
        self.discarded
    }
}

impl<I> Iterator for Chunker<I>
where
    I: Iterator<Item = Record>,
{
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        let acc = self.acc.as_mut()?;
        for record in self.input.by_ref() {
            if let Some(chunk) = acc.push(record) {
                return Some(chunk);
            }
        }

        if let Some(acc) = self.acc.take() {
            let rest = acc.finish();
            self.discarded = rest.len();
            if !rest.is_empty() {
                debug!(count = rest.len(), "undersized trailing records discarded");
            }
        }
        None
    }
}

/// Chunk `input` with `config`.
pub fn chunk_records<I>(input: I, config: ChunkConfig) -> Chunker<I::IntoIter>
where
    I: IntoIterator<Item = Record>,
{
    Chunker::new(input.into_iter(), config)
}
