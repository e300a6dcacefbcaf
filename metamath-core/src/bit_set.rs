//! A compact set of small integers.
//!
//! Used by the axiom usage pass to represent the axioms an assertion depends
//! on, as indices into the list of axioms.  The first word is stored inline,
//! so that sets over the first 64 axioms don't allocate.

use std::ops::BitOrAssign;
use std::slice;

const WORD_BITS: usize = u64::BITS as usize;

/// A set of indices.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Bitset {
    head: u64,
    tail: Vec<u64>,
}

impl Bitset {
    /// Creates a new empty set.  Does not allocate.
    #[must_use]
    pub const fn new() -> Self {
        Bitset {
            head: 0,
            tail: Vec::new(),
        }
    }

    fn word_mut(&mut self, bit: usize) -> &mut u64 {
        match (bit / WORD_BITS).checked_sub(1) {
            None => &mut self.head,
            Some(word) => {
                if word >= self.tail.len() {
                    self.tail.resize(word + 1, 0);
                }
                &mut self.tail[word]
            }
        }
    }

    /// Adds an index to the set.
    pub fn insert(&mut self, bit: usize) {
        *self.word_mut(bit) |= 1 << (bit % WORD_BITS);
    }

    /// Tests the set for an index.
    #[must_use]
    pub fn contains(&self, bit: usize) -> bool {
        let word = match (bit / WORD_BITS).checked_sub(1) {
            None => self.head,
            Some(word) => self.tail.get(word).copied().unwrap_or(0),
        };
        word & (1 << (bit % WORD_BITS)) != 0
    }

    /// Returns true if no index is in the set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.head == 0 && self.tail.iter().all(|&word| word == 0)
    }

    /// Number of indices in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.head.count_ones() as usize
            + self.tail.iter().map(|w| w.count_ones() as usize).sum::<usize>()
    }

    /// Returns true if every index of this set is in `other`.
    #[must_use]
    pub fn is_subset(&self, other: &Bitset) -> bool {
        self.iter().all(|bit| other.contains(bit))
    }

    /// Returns true if the two sets share an index.
    #[must_use]
    pub fn intersects(&self, other: &Bitset) -> bool {
        self.head & other.head != 0 || self.tail.iter().zip(&other.tail).any(|(a, b)| a & b != 0)
    }

    /// Iterates over the indices in the set, in increasing order.
    #[must_use]
    pub fn iter(&self) -> BitsetIter<'_> {
        self.into_iter()
    }
}

impl BitOrAssign<&Bitset> for Bitset {
    fn bitor_assign(&mut self, rhs: &Bitset) {
        self.head |= rhs.head;
        if rhs.tail.len() > self.tail.len() {
            self.tail.resize(rhs.tail.len(), 0);
        }
        for (word, &other) in self.tail.iter_mut().zip(&rhs.tail) {
            *word |= other;
        }
    }
}

impl<'a> IntoIterator for &'a Bitset {
    type Item = usize;
    type IntoIter = BitsetIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        BitsetIter {
            bits: self.head,
            offset: 0,
            rest: self.tail.iter(),
        }
    }
}

/// Iterator over the indices of a [`Bitset`].
#[derive(Debug)]
pub struct BitsetIter<'a> {
    bits: u64,
    offset: usize,
    rest: slice::Iter<'a, u64>,
}

impl Iterator for BitsetIter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        while self.bits == 0 {
            self.bits = *self.rest.next()?;
            self.offset += WORD_BITS;
        }
        let low = self.bits.trailing_zeros() as usize;
        self.bits &= self.bits - 1;
        Some(self.offset + low)
    }
}

#[cfg(test)]
mod tests {
    use super::Bitset;

    #[test]
    fn insert_and_union() {
        let mut a = Bitset::new();
        assert!(a.is_empty());
        a.insert(3);
        a.insert(130);
        let mut b = Bitset::new();
        b.insert(64);
        b.insert(3);
        a |= &b;
        assert!(a.contains(64) && a.contains(130) && !a.contains(65));
        assert_eq!(a.iter().collect::<Vec<_>>(), vec![3, 64, 130]);
        assert_eq!(a.len(), 3);
    }
}
