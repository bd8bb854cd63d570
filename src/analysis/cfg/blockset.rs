//! Dense sets of blocks.
//!
//! Dominator and post-dominator sets are intersected over and over until they settle.
//! [`BlockSet`] stores one bit per arena slot so those intersections are word-wide ANDs.
//!
//! # Example
//!
//! ```rust,ignore
//! use dotlift::analysis::{BlockId, BlockSet};
//!
//! let mut set = BlockSet::new(graph.capacity());
//! set.insert(graph.entry());
//! assert!(set.contains(graph.entry()));
//! ```

use std::fmt;

use crate::analysis::cfg::BlockId;

/// A fixed-capacity set of [`BlockId`]s.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct BlockSet {
    /// The bits, stored as a vector of words.
    words: Vec<u64>,
    /// Number of addressable block slots.
    capacity: usize,
}

impl BlockSet {
    /// Creates an empty set able to hold ids below `capacity`.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            words: vec![0; capacity.div_ceil(64)],
            capacity,
        }
    }

    /// Creates a set holding every id below `capacity`.
    #[must_use]
    pub fn full(capacity: usize) -> Self {
        let mut words = vec![u64::MAX; capacity.div_ceil(64)];

        // Clear the excess bits in the last word
        if capacity % 64 != 0 {
            if let Some(last) = words.last_mut() {
                *last = (1u64 << (capacity % 64)) - 1;
            }
        }

        Self { words, capacity }
    }

    /// Creates a set from the given ids.
    #[must_use]
    pub fn from_ids(capacity: usize, ids: impl IntoIterator<Item = BlockId>) -> Self {
        let mut set = Self::new(capacity);
        for id in ids {
            set.insert(id);
        }
        set
    }

    /// Number of addressable slots.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns `true` if no block is in the set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Adds `id`. Returns `true` if it was not present.
    ///
    /// # Panics
    ///
    /// Panics if `id` is outside the capacity.
    pub fn insert(&mut self, id: BlockId) -> bool {
        assert!(id.index() < self.capacity, "block id out of bounds");
        let (word, bit) = (id.index() / 64, id.index() % 64);
        let was_set = self.words[word] & (1u64 << bit) != 0;
        self.words[word] |= 1u64 << bit;
        !was_set
    }

    /// Removes `id`.
    pub fn remove(&mut self, id: BlockId) {
        if id.index() < self.capacity {
            self.words[id.index() / 64] &= !(1u64 << (id.index() % 64));
        }
    }

    /// Returns `true` if `id` is in the set. Ids outside the capacity are never contained.
    #[must_use]
    pub fn contains(&self, id: BlockId) -> bool {
        id.index() < self.capacity && (self.words[id.index() / 64] & (1u64 << (id.index() % 64))) != 0
    }

    /// Returns the number of blocks in the set.
    #[must_use]
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Intersects with `other` in place. Returns `true` if `self` changed.
    pub fn intersect_with(&mut self, other: &Self) -> bool {
        assert_eq!(self.capacity, other.capacity, "block sets must have same capacity");
        let mut changed = false;
        for (a, b) in self.words.iter_mut().zip(other.words.iter()) {
            let old = *a;
            *a &= *b;
            changed |= old != *a;
        }
        changed
    }

    /// Unions with `other` in place. Returns `true` if `self` changed.
    pub fn union_with(&mut self, other: &Self) -> bool {
        assert_eq!(self.capacity, other.capacity, "block sets must have same capacity");
        let mut changed = false;
        for (a, b) in self.words.iter_mut().zip(other.words.iter()) {
            let old = *a;
            *a |= *b;
            changed |= old != *a;
        }
        changed
    }

    /// Returns `true` if every block of `self` is also in `other`.
    #[must_use]
    pub fn is_subset(&self, other: &Self) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .all(|(a, b)| a & !b == 0)
    }

    /// Iterates the ids in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.words.iter().enumerate().flat_map(|(word_idx, &word)| {
            (0..64)
                .filter(move |bit| word & (1u64 << bit) != 0)
                .map(move |bit| BlockId::new(word_idx * 64 + bit))
        })
    }
}

impl fmt::Debug for BlockSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}
