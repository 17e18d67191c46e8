//! Merge Iterators
//!
//! Read path over many sorted tables.
//!
//! ## Responsibilities
//! - K-way merge of ascending cell streams ordered by (key asc, generation desc)
//! - Collapse runs of equal keys down to the newest version
//! - Hide tombstones and cells expired at the instant the read started
//!
//! Every stage is lazy: nothing is pulled from a source until the consumer
//! asks for the next cell.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::iter::Peekable;

use crate::table::CellIter;
use crate::value::Cell;

// =============================================================================
// K-way merge
// =============================================================================

/// Head of one source inside the merge heap
struct HeapEntry {
    cell: Cell,
    source: usize,
}

impl Ord for HeapEntry {
    // BinaryHeap is a max-heap, so the smallest cell must compare greatest
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cell
            .merge_cmp(&self.cell)
            .then_with(|| other.source.cmp(&self.source))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

/// Heap-based merge of ascending sources
///
/// Yields every cell of every source, ordered by key ascending and then by
/// generation descending, so the newest version of a key comes first.
pub struct MergeIterator {
    sources: Vec<CellIter>,
    heap: BinaryHeap<HeapEntry>,
}

impl MergeIterator {
    pub fn new(mut sources: Vec<CellIter>) -> Self {
        let mut heap = BinaryHeap::with_capacity(sources.len());
        for (source, iter) in sources.iter_mut().enumerate() {
            if let Some(cell) = iter.next() {
                heap.push(HeapEntry { cell, source });
            }
        }
        Self { sources, heap }
    }
}

impl Iterator for MergeIterator {
    type Item = Cell;

    fn next(&mut self) -> Option<Self::Item> {
        let HeapEntry { cell, source } = self.heap.pop()?;
        if let Some(next) = self.sources[source].next() {
            self.heap.push(HeapEntry { cell: next, source });
        }
        Some(cell)
    }
}

// =============================================================================
// Collapse
// =============================================================================

/// Keeps only the first (newest) cell of each run of equal keys
pub struct Collapse<I: Iterator<Item = Cell>> {
    inner: Peekable<I>,
}

impl<I: Iterator<Item = Cell>> Collapse<I> {
    pub fn new(inner: I) -> Self {
        Self {
            inner: inner.peekable(),
        }
    }
}

impl<I: Iterator<Item = Cell>> Iterator for Collapse<I> {
    type Item = Cell;

    fn next(&mut self) -> Option<Self::Item> {
        let cell = self.inner.next()?;
        while self
            .inner
            .next_if(|older| older.key == cell.key)
            .is_some()
        {}
        Some(cell)
    }
}

// =============================================================================
// Live filter
// =============================================================================

/// Drops tombstones and cells whose expiry is at or before `now`
pub struct LiveCells<I: Iterator<Item = Cell>> {
    inner: I,
    now: u64,
}

impl<I: Iterator<Item = Cell>> LiveCells<I> {
    pub fn new(inner: I, now: u64) -> Self {
        Self { inner, now }
    }
}

impl<I: Iterator<Item = Cell>> Iterator for LiveCells<I> {
    type Item = Cell;

    fn next(&mut self) -> Option<Self::Item> {
        let now = self.now;
        self.inner.by_ref().find(|cell| cell.value.is_live(now))
    }
}

/// Newest version of every key, tombstones and expired cells included
pub fn collapse(sources: Vec<CellIter>) -> Collapse<MergeIterator> {
    Collapse::new(MergeIterator::new(sources))
}

/// Newest version of every key, live cells only
pub fn live(sources: Vec<CellIter>, now: u64) -> LiveCells<Collapse<MergeIterator>> {
    LiveCells::new(collapse(sources), now)
}
