//! Bounded, pulse-keyed history.
//!
//! The pipeline keeps three ledgers (inputs, models, metrics), each a ring of
//! the most recent N pulses. Pushing beyond capacity evicts exactly the
//! oldest entry in O(1). Keys are pulse numbers and strictly increase, which
//! lets lookups binary-search.

use std::collections::VecDeque;

use rustc_hash::FxHashMap;

#[derive(Clone, Debug)]
pub struct HistoryLedger<T> {
    entries: VecDeque<(u64, T)>,
    capacity: usize,
}

impl<T> HistoryLedger<T> {
    /// Create a ledger retaining at most `capacity` pulses (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record `value` for `pulse`, evicting the oldest entry when full.
    pub fn push(&mut self, pulse: u64, value: T) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back((pulse, value));
    }

    /// Entry for an exact pulse number, if still retained.
    pub fn get(&self, pulse: u64) -> Option<&T> {
        self.entries
            .binary_search_by_key(&pulse, |(p, _)| *p)
            .ok()
            .and_then(|idx| self.entries.get(idx))
            .map(|(_, v)| v)
    }

    /// Most recent entry.
    pub fn latest(&self) -> Option<&T> {
        self.entries.back().map(|(_, v)| v)
    }

    /// Oldest retained pulse number.
    pub fn oldest_pulse(&self) -> Option<u64> {
        self.entries.front().map(|(p, _)| *p)
    }

    /// Oldest-to-newest iteration over `(pulse, value)`.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &T)> {
        self.entries.iter().map(|(p, v)| (*p, v))
    }
}

impl<T: Clone> HistoryLedger<T> {
    /// Snapshot as a pulse-keyed map, for introspection surfaces.
    pub fn to_map(&self) -> FxHashMap<u64, T> {
        self.entries.iter().map(|(p, v)| (*p, v.clone())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eviction_drops_exactly_the_oldest() {
        let mut ledger = HistoryLedger::new(3);
        for pulse in 1..=5 {
            ledger.push(pulse, pulse * 10);
        }
        assert_eq!(ledger.len(), 3);
        assert_eq!(ledger.oldest_pulse(), Some(3));
        assert_eq!(ledger.get(2), None);
        assert_eq!(ledger.get(5), Some(&50));
        assert_eq!(ledger.latest(), Some(&50));
    }

    #[test]
    fn capacity_floor_is_one() {
        let mut ledger = HistoryLedger::new(0);
        ledger.push(1, "a");
        ledger.push(2, "b");
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.latest(), Some(&"b"));
    }

    #[test]
    fn map_snapshot_holds_all_retained_pulses() {
        let mut ledger = HistoryLedger::new(2);
        ledger.push(7, 'x');
        ledger.push(8, 'y');
        let map = ledger.to_map();
        assert_eq!(map.len(), 2);
        assert_eq!(map[&8], 'y');
    }
}
