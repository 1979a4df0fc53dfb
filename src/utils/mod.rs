//! Shared data structures for the analyses.

mod bitset;
pub mod graph;

pub use bitset::{BitSet, BitSetIter};
