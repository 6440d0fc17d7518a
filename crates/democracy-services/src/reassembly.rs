//! Chunk reassembly — buffers chunks by group id until every index of a
//! group has arrived, then yields the payload in index order.
//!
//! Incomplete groups are tracked in a ring of expiry buckets, one bucket
//! per poll interval. A group that receives no new chunk for `windows`
//! consecutive [`Reassembler::advance`] calls is evicted. Completed group
//! ids stay in the same ring for as long, so late duplicates of a
//! finished group are dropped instead of starting it over.

use std::collections::{BTreeMap, HashMap, VecDeque};

use bytes::Bytes;

use democracy_core::Chunk;

/// Upper bound on the indices [`Reassembler::missing`] reports.
pub const MISSING_LIMIT: usize = 1024;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ReassemblyError {
    #[error("chunk group {group_id} declares zero total")]
    ZeroTotal { group_id: String },
    #[error("chunk group {group_id}: index {index} outside total {total}")]
    IndexOutOfRange {
        group_id: String,
        index: u32,
        total: u32,
    },
    #[error("chunk group {group_id}: total {got} conflicts with recorded total {expected}")]
    TotalMismatch {
        group_id: String,
        expected: u32,
        got: u32,
    },
}

/// Running counters, logged periodically by the receive loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReassemblyStats {
    pub completed: u64,
    pub duplicates: u64,
    pub rejected: u64,
    pub evicted: u64,
}

struct GroupBuffer {
    total: u32,
    /// index -> payload. Ordered, so completion is a straight walk.
    parts: BTreeMap<u32, Bytes>,
    /// Epoch of the bucket that last saw progress on this group.
    touched: u64,
}

pub struct Reassembler {
    groups: HashMap<String, GroupBuffer>,
    /// Recently completed group id -> epoch it completed in.
    finished: HashMap<String, u64>,
    /// Oldest bucket at the front. The back bucket has epoch `epoch`.
    ring: VecDeque<Vec<String>>,
    epoch: u64,
    windows: usize,
    stats: ReassemblyStats,
}

impl Reassembler {
    /// `windows` is clamped to at least 1.
    pub fn new(windows: usize) -> Self {
        let mut ring = VecDeque::with_capacity(windows.max(1) + 1);
        ring.push_back(Vec::new());
        Self {
            groups: HashMap::new(),
            finished: HashMap::new(),
            ring,
            epoch: 0,
            windows: windows.max(1),
            stats: ReassemblyStats::default(),
        }
    }

    /// Feed one chunk. Returns the concatenated payload once every index
    /// `0..total` of the group has been seen.
    ///
    /// Duplicate indices are ignored, including chunks of a group that
    /// completed within the last `windows` intervals. A chunk whose
    /// `total` disagrees with the group's recorded total is rejected and
    /// the group is untouched.
    pub fn ingest(&mut self, chunk: Chunk) -> Result<Option<Bytes>, ReassemblyError> {
        if chunk.total == 0 {
            self.stats.rejected += 1;
            return Err(ReassemblyError::ZeroTotal {
                group_id: chunk.group_id,
            });
        }
        if chunk.index >= chunk.total {
            self.stats.rejected += 1;
            return Err(ReassemblyError::IndexOutOfRange {
                group_id: chunk.group_id,
                index: chunk.index,
                total: chunk.total,
            });
        }

        if self.finished.contains_key(&chunk.group_id) {
            self.stats.duplicates += 1;
            tracing::debug!(
                group_id = %chunk.group_id,
                index = chunk.index,
                "chunk for completed group, ignoring"
            );
            return Ok(None);
        }

        if chunk.total == 1 && !self.groups.contains_key(&chunk.group_id) {
            self.finish(chunk.group_id);
            return Ok(Some(chunk.payload));
        }

        if let Some(group) = self.groups.get(&chunk.group_id) {
            if group.total != chunk.total {
                self.stats.rejected += 1;
                return Err(ReassemblyError::TotalMismatch {
                    group_id: chunk.group_id,
                    expected: group.total,
                    got: chunk.total,
                });
            }
            if group.parts.contains_key(&chunk.index) {
                self.stats.duplicates += 1;
                tracing::debug!(
                    group_id = %chunk.group_id,
                    index = chunk.index,
                    "duplicate chunk, ignoring"
                );
                return Ok(None);
            }
        }

        let epoch = self.epoch;
        let group = self
            .groups
            .entry(chunk.group_id.clone())
            .or_insert_with(|| GroupBuffer {
                total: chunk.total,
                parts: BTreeMap::new(),
                touched: u64::MAX,
            });
        group.parts.insert(chunk.index, chunk.payload);

        if group.parts.len() == group.total as usize {
            let group = match self.groups.remove(&chunk.group_id) {
                Some(g) => g,
                None => return Ok(None),
            };
            let len = group.parts.values().map(Bytes::len).sum();
            let mut payload = Vec::with_capacity(len);
            for part in group.parts.values() {
                payload.extend_from_slice(part);
            }
            self.finish(chunk.group_id);
            return Ok(Some(Bytes::from(payload)));
        }

        if group.touched != epoch {
            group.touched = epoch;
            if let Some(bucket) = self.ring.back_mut() {
                bucket.push(chunk.group_id);
            }
        }
        Ok(None)
    }

    /// Close the current observation window. Groups untouched for
    /// `windows` windows are dropped. Returns how many were evicted.
    pub fn advance(&mut self) -> usize {
        self.epoch += 1;
        self.ring.push_back(Vec::new());

        let mut evicted = 0;
        while self.ring.len() > self.windows {
            let expired_epoch = self.epoch - (self.ring.len() as u64 - 1);
            let Some(bucket) = self.ring.pop_front() else {
                break;
            };
            for group_id in bucket {
                if self.finished.get(&group_id) == Some(&expired_epoch) {
                    self.finished.remove(&group_id);
                    continue;
                }
                let stale = self
                    .groups
                    .get(&group_id)
                    .is_some_and(|g| g.touched == expired_epoch);
                if !stale {
                    continue;
                }
                if let Some(group) = self.groups.remove(&group_id) {
                    tracing::warn!(
                        group_id = %group_id,
                        received = group.parts.len(),
                        total = group.total,
                        "evicting incomplete chunk group"
                    );
                    evicted += 1;
                }
            }
        }
        self.stats.evicted += evicted as u64;
        evicted
    }

    /// Number of incomplete groups currently buffered.
    pub fn in_flight(&self) -> usize {
        self.groups.len()
    }

    /// Indices still missing for an incomplete group, lowest first and at
    /// most [`MISSING_LIMIT`] of them.
    pub fn missing(&self, group_id: &str) -> Option<Vec<u32>> {
        self.groups.get(group_id).map(|g| {
            (0..g.total)
                .filter(|i| !g.parts.contains_key(i))
                .take(MISSING_LIMIT)
                .collect()
        })
    }

    pub fn stats(&self) -> ReassemblyStats {
        self.stats
    }

    /// Remember a completed group until its bucket rotates out.
    fn finish(&mut self, group_id: String) {
        self.stats.completed += 1;
        self.finished.insert(group_id.clone(), self.epoch);
        if let Some(bucket) = self.ring.back_mut() {
            bucket.push(group_id);
        }
    }
}
