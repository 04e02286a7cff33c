//! Respawn scheduling - per-controller priority queue of pending respawns.
//!
//! The design is a centralized min-heap polled by the registry tick: when a
//! unit is removed its replacement is queued with a ready tick, and each
//! tick attempts at most the earliest-ready entry per controller. Bounding
//! throughput this way keeps a mass death from turning into a spawn burst
//! one delay later.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use spawnkeep_core::types::EntryKey;

/// One queued replacement. `seq` makes ordering total and FIFO among
/// entries that share a ready tick.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct PendingRespawn {
    pub ready_tick: u64,
    pub seq: u64,
    pub key: EntryKey,
}

/// Min-heap of pending respawns ordered by ready tick.
#[derive(Debug, Default)]
pub struct RespawnQueue {
    heap: BinaryHeap<Reverse<PendingRespawn>>,
    next_seq: u64,
}

impl RespawnQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a replacement for `key`, eligible no earlier than `ready_tick`.
    pub fn schedule(&mut self, key: EntryKey, ready_tick: u64) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(PendingRespawn {
            ready_tick,
            seq,
            key,
        }));
    }

    /// Pop the earliest entry if it is ready at `now`. At most one entry
    /// is handed out per call; the registry calls this once per tick.
    pub fn pop_ready(&mut self, now: u64) -> Option<PendingRespawn> {
        match self.heap.peek() {
            Some(Reverse(pending)) if pending.ready_tick <= now => {
                self.heap.pop().map(|Reverse(p)| p)
            }
            _ => None,
        }
    }

    /// Put a blocked attempt back with a new ready tick. The original
    /// sequence number is kept so repeated backoffs stay FIFO-fair.
    pub fn requeue(&mut self, mut pending: PendingRespawn, ready_tick: u64) {
        pending.ready_tick = ready_tick;
        self.heap.push(Reverse(pending));
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Pending replacements for one entry key. Walks the heap; queues are
    /// small (bounded by controller capacity).
    pub fn count_for_key(&self, key: &EntryKey) -> usize {
        self.heap
            .iter()
            .filter(|Reverse(p)| &p.key == key)
            .count()
    }

    /// Earliest ready tick across all pending entries, for status output.
    pub fn earliest_ready(&self) -> Option<u64> {
        self.heap.peek().map(|Reverse(p)| p.ready_tick)
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(species: &str) -> EntryKey {
        EntryKey {
            species: species.into(),
            tier: 1,
            elite: false,
        }
    }

    /// Nothing is handed out before its ready tick.
    #[test]
    fn pop_ready_respects_ready_tick() {
        let mut q = RespawnQueue::new();
        q.schedule(key("zombie"), 100);
        assert_eq!(q.pop_ready(99), None);
        let popped = q.pop_ready(100).unwrap();
        assert_eq!(popped.key, key("zombie"));
        assert!(q.is_empty());
    }

    /// The earliest-ready entry wins regardless of insertion order.
    #[test]
    fn pop_ready_orders_by_ready_tick() {
        let mut q = RespawnQueue::new();
        q.schedule(key("zombie"), 200);
        q.schedule(key("skeleton"), 50);
        let first = q.pop_ready(500).unwrap();
        assert_eq!(first.key, key("skeleton"));
        let second = q.pop_ready(500).unwrap();
        assert_eq!(second.key, key("zombie"));
    }

    /// Entries sharing a ready tick come out in scheduling order.
    #[test]
    fn equal_ready_ticks_are_fifo() {
        let mut q = RespawnQueue::new();
        q.schedule(key("zombie"), 10);
        q.schedule(key("skeleton"), 10);
        assert_eq!(q.pop_ready(10).unwrap().key, key("zombie"));
        assert_eq!(q.pop_ready(10).unwrap().key, key("skeleton"));
    }

    /// One call hands out at most one entry even if several are ready.
    #[test]
    fn pop_ready_yields_one_per_call() {
        let mut q = RespawnQueue::new();
        q.schedule(key("zombie"), 1);
        q.schedule(key("zombie"), 1);
        assert!(q.pop_ready(5).is_some());
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn requeue_moves_ready_tick_back() {
        let mut q = RespawnQueue::new();
        q.schedule(key("zombie"), 10);
        let p = q.pop_ready(10).unwrap();
        q.requeue(p, 70);
        assert_eq!(q.pop_ready(69), None);
        assert!(q.pop_ready(70).is_some());
    }

    #[test]
    fn count_for_key_filters_by_identity() {
        let mut q = RespawnQueue::new();
        q.schedule(key("zombie"), 10);
        q.schedule(key("zombie"), 20);
        q.schedule(key("skeleton"), 30);
        assert_eq!(q.count_for_key(&key("zombie")), 2);
        assert_eq!(q.count_for_key(&key("skeleton")), 1);
        assert_eq!(q.len(), 3);
    }

    #[test]
    fn clear_empties_the_queue() {
        let mut q = RespawnQueue::new();
        q.schedule(key("zombie"), 10);
        q.clear();
        assert!(q.is_empty());
        assert_eq!(q.pop_ready(u64::MAX), None);
    }
}
