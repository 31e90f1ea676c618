use crate::callback::{CallbackEntry, HandleId, Token};
use smallvec::SmallVec;
use std::collections::VecDeque;

/// Entries pulled out of a queue during one dispatch pass.
pub type DueEntries = SmallVec<[CallbackEntry; 8]>;

/// Pending entries of a single category, ordered by `(due_time, sequence)`.
///
/// Queues are shallow in practice, so insertion does a binary search followed
/// by an O(n) shift instead of keeping a heap.
#[derive(Default, Debug)]
pub struct CallbackQueue {
    entries: VecDeque<CallbackEntry>,
}

impl CallbackQueue {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    pub fn insert(&mut self, entry: CallbackEntry) {
        let key = entry.sort_key();
        let index = self.entries.partition_point(|e| e.sort_key() <= key);
        self.entries.insert(index, entry);
    }

    /// Removes and returns every entry due at or before `now`, earliest first.
    pub fn extract_due(&mut self, now: u64) -> DueEntries {
        let split = self.entries.partition_point(|e| e.due_time_nanos <= now);
        self.entries.drain(..split).collect()
    }

    /// Removes every entry matching both filters and returns how many went.
    pub fn remove_matching(&mut self, action: Option<HandleId>, token: Option<&Token>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| !e.matches(action, token));
        before - self.entries.len()
    }

    /// Removes the entry posted with `sequence`, if it is still queued.
    pub fn remove_sequence(&mut self, sequence: u64) -> Option<CallbackEntry> {
        let index = self.entries.iter().position(|e| e.sequence == sequence)?;
        self.entries.remove(index)
    }

    pub fn peek_earliest_due_time(&self) -> Option<u64> {
        self.entries.front().map(|e| e.due_time_nanos)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CallbackEntry> {
        self.entries.iter()
    }
}
