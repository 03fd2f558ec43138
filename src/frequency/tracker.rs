//! Bounded top-K index
//!
//! Keeps at most `capacity` keys with their best known estimate. Entries live
//! in a fixed arena of slots; a side map finds a key's slot, and a binary
//! min-heap over slot indices exposes the eviction threshold in O(1) with
//! O(log k) offers.
//!
//! Ordering is by estimate, then by insertion sequence: among equal
//! estimates the most recently inserted key ranks highest, and the oldest is
//! the first to be evicted.

use core::mem;

#[cfg(feature = "std")]
use std::{collections::HashMap, vec::Vec};

#[cfg(not(feature = "std"))]
extern crate alloc;
#[cfg(not(feature = "std"))]
use alloc::{collections::BTreeMap as HashMap, vec::Vec};

#[derive(Clone, Debug)]
struct Entry {
    key: Vec<u8>,
    estimate: u64,
    seq: u64,
}

/// Result of [`TopKTracker::offer`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Offer {
    /// Nothing changed
    Ignored,
    /// The key was tracked and its estimate went up
    Raised,
    /// The key took a free slot
    Inserted,
    /// The key displaced the previous minimum
    Evicted { key: Vec<u8>, estimate: u64 },
}

/// Min-ordered index of the heaviest keys seen
#[derive(Clone, Debug)]
pub struct TopKTracker {
    capacity: usize,
    slots: Vec<Entry>,
    /// Slot indices in heap order
    heap: Vec<usize>,
    /// Position of each slot in `heap`
    heap_pos: Vec<usize>,
    index: HashMap<Vec<u8>, usize>,
    next_seq: u64,
}

impl TopKTracker {
    pub fn new(capacity: usize) -> Self {
        debug_assert!(capacity > 0);
        Self {
            capacity,
            slots: Vec::new(),
            heap: Vec::new(),
            heap_pos: Vec::new(),
            index: HashMap::new(),
            next_seq: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.index.contains_key(key)
    }

    /// Stored estimate for `key`, if tracked
    pub fn get(&self, key: &[u8]) -> Option<u64> {
        self.index.get(key).map(|&slot| self.slots[slot].estimate)
    }

    /// The eviction threshold: smallest tracked estimate
    pub fn min_estimate(&self) -> Option<u64> {
        self.heap.first().map(|&slot| self.slots[slot].estimate)
    }

    /// Consider `key` with a freshly observed estimate
    ///
    /// A tracked key only ever moves up here. An untracked key gets in if
    /// there is room or if it beats the current minimum; a zero estimate
    /// never gets in.
    pub fn offer(&mut self, key: &[u8], candidate: u64) -> Offer {
        if let Some(&slot) = self.index.get(key) {
            if candidate <= self.slots[slot].estimate {
                return Offer::Ignored;
            }
            self.slots[slot].estimate = candidate;
            self.sift_down(self.heap_pos[slot]);
            return Offer::Raised;
        }

        if candidate == 0 {
            return Offer::Ignored;
        }

        if self.slots.len() < self.capacity {
            let slot = self.slots.len();
            let seq = self.bump_seq();
            self.slots.push(Entry {
                key: key.to_vec(),
                estimate: candidate,
                seq,
            });
            self.index.insert(key.to_vec(), slot);
            self.heap.push(slot);
            self.heap_pos.push(self.heap.len() - 1);
            self.sift_up(self.heap.len() - 1);
            return Offer::Inserted;
        }

        let min_slot = self.heap[0];
        if candidate <= self.slots[min_slot].estimate {
            return Offer::Ignored;
        }

        let seq = self.bump_seq();
        let old = mem::replace(
            &mut self.slots[min_slot],
            Entry {
                key: key.to_vec(),
                estimate: candidate,
                seq,
            },
        );
        self.index.remove(&old.key);
        self.index.insert(key.to_vec(), min_slot);
        self.sift_down(0);

        Offer::Evicted {
            key: old.key,
            estimate: old.estimate,
        }
    }

    /// Tracked keys, heaviest first, ties most recent first
    pub fn snapshot(&self) -> Vec<(Vec<u8>, u64)> {
        let mut entries: Vec<&Entry> = self.slots.iter().collect();
        entries.sort_by(|a, b| b.estimate.cmp(&a.estimate).then(b.seq.cmp(&a.seq)));
        entries
            .into_iter()
            .map(|e| (e.key.clone(), e.estimate))
            .collect()
    }

    /// Scale every estimate by `factor`, dropping entries that floor to 0
    ///
    /// Returns the number of entries dropped.
    pub fn decay_all(&mut self, factor: f64) -> usize {
        let before = self.slots.len();
        let entries = mem::take(&mut self.slots);
        self.index.clear();
        self.heap.clear();
        self.heap_pos.clear();

        for mut entry in entries {
            entry.estimate = crate::math::floor(entry.estimate as f64 * factor) as u64;
            if entry.estimate > 0 {
                let slot = self.slots.len();
                self.index.insert(entry.key.clone(), slot);
                self.slots.push(entry);
                self.heap.push(slot);
                self.heap_pos.push(slot);
            }
        }

        // Flooring can create ties that reorder by sequence, so re-heapify
        for pos in (0..self.heap.len() / 2).rev() {
            self.sift_down(pos);
        }

        before - self.slots.len()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.heap.clear();
        self.heap_pos.clear();
        self.index.clear();
        self.next_seq = 0;
    }

    /// Approximate heap footprint in bytes
    pub fn size_bytes(&self) -> usize {
        let keys: usize = self.slots.iter().map(|e| e.key.capacity()).sum();
        self.slots.capacity() * mem::size_of::<Entry>()
            + (self.heap.capacity() + self.heap_pos.capacity()) * mem::size_of::<usize>()
            // key bytes live twice: once in the slot, once in the index
            + 2 * keys
            + self.index.len() * mem::size_of::<(Vec<u8>, usize)>()
    }

    fn bump_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    #[inline]
    fn less(&self, a: usize, b: usize) -> bool {
        let (ea, eb) = (&self.slots[a], &self.slots[b]);
        (ea.estimate, ea.seq) < (eb.estimate, eb.seq)
    }

    fn swap(&mut self, i: usize, j: usize) {
        self.heap.swap(i, j);
        self.heap_pos[self.heap[i]] = i;
        self.heap_pos[self.heap[j]] = j;
    }

    fn sift_up(&mut self, mut pos: usize) {
        while pos > 0 {
            let parent = (pos - 1) / 2;
            if !self.less(self.heap[pos], self.heap[parent]) {
                break;
            }
            self.swap(pos, parent);
            pos = parent;
        }
    }

    fn sift_down(&mut self, mut pos: usize) {
        let len = self.heap.len();
        loop {
            let left = 2 * pos + 1;
            if left >= len {
                break;
            }
            let right = left + 1;
            let mut smallest = left;
            if right < len && self.less(self.heap[right], self.heap[left]) {
                smallest = right;
            }
            if !self.less(self.heap[smallest], self.heap[pos]) {
                break;
            }
            self.swap(pos, smallest);
            pos = smallest;
        }
    }

    #[cfg(test)]
    pub(crate) fn validate_invariants(&self) {
        assert!(self.slots.len() <= self.capacity);
        assert_eq!(self.slots.len(), self.heap.len());
        assert_eq!(self.slots.len(), self.heap_pos.len());
        assert_eq!(self.slots.len(), self.index.len());

        for (pos, &slot) in self.heap.iter().enumerate() {
            assert_eq!(self.heap_pos[slot], pos);
            if pos > 0 {
                assert!(!self.less(slot, self.heap[(pos - 1) / 2]));
            }
        }
        for (key, &slot) in &self.index {
            assert_eq!(&self.slots[slot].key, key);
            assert!(self.slots[slot].estimate > 0);
        }
    }
}
