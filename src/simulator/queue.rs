//! In-flight queue with deterministic ordering.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::types::{Millis, NodeIndex};

/// Key for ordering in-flight nodes.
///
/// Nodes are ordered by:
/// 1. Finish time (earlier first, total order on floats)
/// 2. Graph index (deterministic ordering for simultaneous finishes)
#[derive(Debug, Clone, Copy)]
pub struct InFlightKey {
    /// Simulated time at which the node completes.
    pub finish_ms: Millis,
    /// Position of the node in the graph arena.
    pub index: NodeIndex,
}

impl InFlightKey {
    pub fn new(finish_ms: Millis, index: NodeIndex) -> Self {
        Self { finish_ms, index }
    }
}

impl PartialEq for InFlightKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for InFlightKey {}

impl Ord for InFlightKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.finish_ms.total_cmp(&other.finish_ms) {
            Ordering::Equal => {}
            ord => return ord,
        }
        self.index.cmp(&other.index)
    }
}

impl PartialOrd for InFlightKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Nodes currently running, ordered by completion.
#[derive(Debug, Default)]
pub struct InFlightQueue {
    keys: BTreeSet<InFlightKey>,
    peak: usize,
}

impl InFlightQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, finish_ms: Millis, index: NodeIndex) {
        self.keys.insert(InFlightKey::new(finish_ms, index));
        self.peak = self.peak.max(self.keys.len());
    }

    /// Earliest finish time, if anything is in flight.
    pub fn next_finish(&self) -> Option<Millis> {
        self.keys.first().map(|k| k.finish_ms)
    }

    /// Removes and returns every node finishing exactly at `time`, in graph order.
    pub fn pop_finished_at(&mut self, time: Millis) -> Vec<NodeIndex> {
        let mut finished = Vec::new();
        while let Some(key) = self.keys.first().copied() {
            if key.finish_ms.total_cmp(&time) != Ordering::Equal {
                break;
            }
            self.keys.pop_first();
            finished.push(key.index);
        }
        finished
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Largest number of nodes that were in flight at once.
    pub fn peak(&self) -> usize {
        self.peak
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_ordering() {
        assert!(InFlightKey::new(1.0, 5) < InFlightKey::new(2.0, 0));
        assert!(InFlightKey::new(1.0, 0) < InFlightKey::new(1.0, 1));
        assert_eq!(InFlightKey::new(3.5, 2), InFlightKey::new(3.5, 2));
    }

    #[test]
    fn test_pop_simultaneous_in_graph_order() {
        let mut queue = InFlightQueue::new();
        queue.push(10.0, 3);
        queue.push(5.0, 7);
        queue.push(10.0, 1);

        assert_eq!(queue.next_finish(), Some(5.0));
        assert_eq!(queue.pop_finished_at(5.0), vec![7]);
        assert_eq!(queue.pop_finished_at(10.0), vec![1, 3]);
        assert!(queue.is_empty());
        assert_eq!(queue.peak(), 3);
    }
}
