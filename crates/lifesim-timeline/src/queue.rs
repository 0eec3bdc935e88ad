//! Event queue - time-ordered priority structure over handles
//!
//! Entries are ordered by `(when, sequence)`. Sequences come from a
//! [`SequenceCounter`] owned by the timeline; ASAP sequences live in the
//! lower half of the `u64` range so they sort ahead of every normal entry
//! due at the same tick while staying FIFO among themselves.
//!
//! Cancelling never touches the heap. A dead entry stays in place until it
//! is popped or the queue is compacted.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use lifesim_core::{HandleId, Tick};

/// First sequence value handed to normal (non-ASAP) entries
pub const NORMAL_SEQUENCE_BASE: u64 = 1 << 63;

/// One queue slot
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueEntry {
    pub when: Tick,
    pub sequence: u64,
    pub handle: HandleId,
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.when
            .cmp(&other.when)
            .then(self.sequence.cmp(&other.sequence))
            .then(self.handle.cmp(&other.handle))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Monotonic sequence source for one timeline
#[derive(Clone, Debug, Default)]
pub struct SequenceCounter {
    normal: u64,
    asap: u64,
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next sequence for an entry queued in insertion order
    pub fn next_normal(&mut self) -> u64 {
        let seq = NORMAL_SEQUENCE_BASE | self.normal;
        self.normal += 1;
        seq
    }

    /// Next sequence for an entry that must run before normal entries
    pub fn next_asap(&mut self) -> u64 {
        let seq = self.asap;
        self.asap += 1;
        seq
    }
}

/// Binary-heap backed min-queue
#[derive(Debug, Default)]
pub struct EventQueue {
    heap: BinaryHeap<Reverse<QueueEntry>>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: QueueEntry) {
        self.heap.push(Reverse(entry));
    }

    pub fn peek_min(&self) -> Option<&QueueEntry> {
        self.heap.peek().map(|Reverse(entry)| entry)
    }

    pub fn pop_min(&mut self) -> Option<QueueEntry> {
        self.heap.pop().map(|Reverse(entry)| entry)
    }

    /// Number of entries, dead ones included
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Keep only entries matching `keep`. Returns how many were dropped.
    pub fn retain(&mut self, mut keep: impl FnMut(&QueueEntry) -> bool) -> usize {
        let before = self.heap.len();
        self.heap.retain(|Reverse(entry)| keep(entry));
        before - self.heap.len()
    }

    /// Remove every entry, returned in queue order
    pub fn drain_ordered(&mut self) -> Vec<QueueEntry> {
        let mut entries: Vec<QueueEntry> = self.heap.drain().map(|Reverse(entry)| entry).collect();
        entries.sort();
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lifesim_core::TimelineId;

    fn entry(when: u64, sequence: u64, index: u32) -> QueueEntry {
        QueueEntry {
            when: Tick::new(when),
            sequence,
            handle: HandleId::new(TimelineId(1), index, 0),
        }
    }

    #[test]
    fn test_pops_by_time_then_sequence() {
        let mut queue = EventQueue::new();
        queue.push(entry(5, 2, 0));
        queue.push(entry(3, 9, 1));
        queue.push(entry(5, 1, 2));

        assert_eq!(queue.pop_min().map(|e| e.handle.index), Some(1));
        assert_eq!(queue.pop_min().map(|e| e.handle.index), Some(2));
        assert_eq!(queue.pop_min().map(|e| e.handle.index), Some(0));
        assert!(queue.pop_min().is_none());
    }

    #[test]
    fn test_asap_sorts_before_normal_and_stays_fifo() {
        let mut seq = SequenceCounter::new();
        let normal_a = seq.next_normal();
        let asap_a = seq.next_asap();
        let normal_b = seq.next_normal();
        let asap_b = seq.next_asap();

        assert!(asap_a < normal_a);
        assert!(asap_b < normal_a);
        assert!(asap_a < asap_b);
        assert!(normal_a < normal_b);
    }

    #[test]
    fn test_retain_and_drain_keep_order() {
        let mut queue = EventQueue::new();
        for i in 0..10u32 {
            queue.push(entry(u64::from(10 - i), u64::from(i), i));
        }
        let dropped = queue.retain(|e| e.handle.index % 2 == 0);
        assert_eq!(dropped, 5);

        let order: Vec<u32> = queue.drain_ordered().iter().map(|e| e.handle.index).collect();
        assert_eq!(order, vec![8, 6, 4, 2, 0]);
        assert!(queue.is_empty());
    }
}
