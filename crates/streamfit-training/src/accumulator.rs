//! Partitioning of the training stream into groups.
//!
//! The accumulator only decides group boundaries and what each group keeps
//! (literal records, a reservoir sample, or nothing when records are
//! streamed straight to an incremental model). Training happens elsewhere.

use crate::error::{StreamError, StreamResult};
use crate::reservoir::ReservoirSampler;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use streamfit_abstraction::Record;

/// Identity of a training group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum GroupKey {
    /// The single group of All mode.
    All,
    /// Batch sequence number, starting at 1.
    Batch(u64),
    /// Stratification value.
    Stratum(String),
}

impl GroupKey {
    /// Prefix used for per-group model file names.
    #[must_use]
    pub fn file_prefix(&self) -> String {
        match self {
            Self::All => String::new(),
            Self::Batch(n) => format!("{n}_"),
            Self::Stratum(value) => format!("{value}_"),
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Batch(n) => write!(f, "batch {n}"),
            Self::Stratum(value) => f.write_str(value),
        }
    }
}

/// How the stream is split into groups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Partition {
    All,
    Batch { size: usize },
    /// Groups are contiguous runs of the value at `position`.
    Stratified { field: String, position: usize },
}

/// What an open group retains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Buffering {
    Records,
    Reservoir { size: usize, seed: u64 },
    /// Records are handed back to the caller as they arrive.
    PassThrough,
}

/// A group whose boundary has been reached.
#[derive(Debug, Clone, PartialEq)]
pub struct ClosedGroup {
    pub key: GroupKey,
    /// Buffered records or the reservoir sample; empty for pass-through.
    pub records: Vec<Record>,
    /// Records admitted to the group, sampled or not.
    pub observed: usize,
}

/// Outcome of admitting one record, in the order the caller must act on it.
#[derive(Debug, Clone, PartialEq)]
pub enum GroupEvent {
    Closed(ClosedGroup),
    Opened(GroupKey),
    /// Pass-through record for the open group.
    Record { key: GroupKey, record: Record },
    /// Null stratification value; the record was dropped.
    Skipped,
    /// The stratification value belongs to a group that was already
    /// finalized. Always the last event; the record was not admitted.
    Reappeared { field: String, key: String },
}

#[derive(Debug)]
enum GroupBuffer {
    Records(Vec<Record>),
    Reservoir(ReservoirSampler<Record>),
    Counted,
}

#[derive(Debug)]
struct OpenGroup {
    key: GroupKey,
    buffer: GroupBuffer,
    observed: usize,
}

impl OpenGroup {
    fn close(self) -> ClosedGroup {
        let records = match self.buffer {
            GroupBuffer::Records(records) => records,
            GroupBuffer::Reservoir(sampler) => sampler.into_sample(),
            GroupBuffer::Counted => Vec::new(),
        };
        ClosedGroup { key: self.key, records, observed: self.observed }
    }
}

#[derive(Debug)]
pub struct GroupAccumulator {
    partition: Partition,
    buffering: Buffering,
    open: Option<OpenGroup>,
    next_batch: u64,
    finalized: HashSet<String>,
}

impl GroupAccumulator {
    #[must_use]
    pub fn new(partition: Partition, buffering: Buffering) -> Self {
        Self { partition, buffering, open: None, next_batch: 1, finalized: HashSet::new() }
    }

    /// Admits one record. When a stratification value reappears after its
    /// group was closed, the previous group is still closed first and the
    /// events end with `Reappeared`.
    pub fn admit(&mut self, record: Record) -> StreamResult<Vec<GroupEvent>> {
        let mut events = Vec::new();

        let key = match &self.partition {
            Partition::All => GroupKey::All,
            Partition::Batch { .. } => GroupKey::Batch(self.next_batch),
            Partition::Stratified { field, position } => {
                let Some(value) = record.get(*position).render(None) else {
                    tracing::warn!(field = %field, "skipping record with null stratification value");
                    return Ok(vec![GroupEvent::Skipped]);
                };
                GroupKey::Stratum(value)
            }
        };

        if self.open.as_ref().is_some_and(|g| g.key != key) {
            if let Some(previous) = self.open.take() {
                if let GroupKey::Stratum(value) = &previous.key {
                    self.finalized.insert(value.clone());
                }
                events.push(GroupEvent::Closed(previous.close()));
            }
        }

        if self.open.is_none() {
            if let (GroupKey::Stratum(value), Partition::Stratified { field, .. }) = (&key, &self.partition) {
                if self.finalized.contains(value) {
                    events.push(GroupEvent::Reappeared { field: field.clone(), key: value.clone() });
                    return Ok(events);
                }
            }
            self.open = Some(self.open_group(key.clone()));
            events.push(GroupEvent::Opened(key.clone()));
        }

        let Some(group) = self.open.as_mut() else {
            return Err(StreamError::InvalidState("no open group after admission".to_string()));
        };
        group.observed += 1;
        match &mut group.buffer {
            GroupBuffer::Records(records) => records.push(record),
            GroupBuffer::Reservoir(sampler) => sampler.offer(record),
            GroupBuffer::Counted => events.push(GroupEvent::Record { key, record }),
        }

        if let Partition::Batch { size } = self.partition {
            if group.observed >= size {
                if let Some(full) = self.open.take() {
                    events.push(GroupEvent::Closed(full.close()));
                }
                self.next_batch += 1;
            }
        }

        Ok(events)
    }

    /// End of stream: closes the open group, if any.
    pub fn finish(&mut self) -> Option<ClosedGroup> {
        let group = self.open.take()?;
        if let GroupKey::Stratum(value) = &group.key {
            self.finalized.insert(value.clone());
        }
        Some(group.close())
    }

    fn open_group(&self, key: GroupKey) -> OpenGroup {
        let buffer = match self.buffering {
            Buffering::Records => GroupBuffer::Records(Vec::new()),
            Buffering::Reservoir { size, seed } => GroupBuffer::Reservoir(ReservoirSampler::new(size, seed)),
            Buffering::PassThrough => GroupBuffer::Counted,
        };
        OpenGroup { key, buffer, observed: 0 }
    }
}
