//! Dense bit vector over small integer keys.
//!
//! Liveness sets (keyed by register index) and points-to sets (keyed by abstract
//! object index) are both dense, bounded by a count that is known when the
//! analysis starts, and combined almost exclusively through union and
//! difference. A word-packed bit vector serves both and iterates in ascending
//! key order, which keeps every fixpoint deterministic.

/// A fixed-capacity set of `usize` keys.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct BitSet {
    words: Vec<u64>,
    len: usize,
}

impl BitSet {
    /// Creates an empty set able to hold keys `0..capacity`.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            words: vec![0; capacity.div_ceil(64)],
            len: capacity,
        }
    }

    /// Key capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.len
    }

    /// Returns `true` if no key is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Adds a key. Returns `true` if it was not present before.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.capacity()`.
    pub fn insert(&mut self, index: usize) -> bool {
        assert!(index < self.len, "index out of bounds");
        let mask = 1u64 << (index % 64);
        let word = &mut self.words[index / 64];
        let fresh = *word & mask == 0;
        *word |= mask;
        fresh
    }

    /// Removes a key. Returns `true` if it was present.
    pub fn remove(&mut self, index: usize) -> bool {
        if index >= self.len {
            return false;
        }
        let mask = 1u64 << (index % 64);
        let word = &mut self.words[index / 64];
        let present = *word & mask != 0;
        *word &= !mask;
        present
    }

    /// Returns `true` if `index` is present. Keys beyond the capacity are absent.
    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        index < self.len && self.words[index / 64] & (1u64 << (index % 64)) != 0
    }

    /// Number of keys present.
    #[must_use]
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Removes every key.
    pub fn clear(&mut self) {
        self.words.fill(0);
    }

    /// In-place union. Returns `true` if `self` grew.
    pub fn union_with(&mut self, other: &Self) -> bool {
        assert_eq!(self.len, other.len, "bit sets must have same length");
        let mut changed = false;
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            let old = *a;
            *a |= *b;
            changed |= old != *a;
        }
        changed
    }

    /// In-place difference. Returns `true` if `self` shrank.
    pub fn difference_with(&mut self, other: &Self) -> bool {
        assert_eq!(self.len, other.len, "bit sets must have same length");
        let mut changed = false;
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            let old = *a;
            *a &= !*b;
            changed |= old != *a;
        }
        changed
    }

    /// Returns `true` if the two sets share at least one key.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        self.words
            .iter()
            .zip(&other.words)
            .any(|(a, b)| a & b != 0)
    }

    /// Keys in ascending order.
    pub fn iter(&self) -> BitSetIter<'_> {
        BitSetIter {
            set: self,
            word_idx: 0,
            current: self.words.first().copied().unwrap_or(0),
        }
    }
}

impl std::fmt::Debug for BitSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Ascending iterator over the keys of a [`BitSet`].
pub struct BitSetIter<'a> {
    set: &'a BitSet,
    word_idx: usize,
    current: u64,
}

impl Iterator for BitSetIter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.current != 0 {
                let bit = self.current.trailing_zeros() as usize;
                self.current &= self.current - 1;
                return Some(self.word_idx * 64 + bit);
            }
            self.word_idx += 1;
            self.current = *self.set.words.get(self.word_idx)?;
        }
    }
}
