//! SSTable Iterator
//!
//! Forward cursor over an SSTable, decoding one cell per step.

use std::sync::Arc;

use crate::value::Cell;

use super::SsTable;

/// Iterator over SSTable cells in sorted key order
pub struct SsTableIter {
    table: Arc<SsTable>,
    /// Next row to decode
    index: usize,
}

impl SsTableIter {
    pub(super) fn new(table: Arc<SsTable>, index: usize) -> Self {
        Self { table, index }
    }
}

impl Iterator for SsTableIter {
    type Item = Cell;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.table.rows() {
            return None;
        }
        let cell = self.table.cell_at(self.index);
        self.index += 1;
        Some(cell)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.table.rows().saturating_sub(self.index);
        (remaining, Some(remaining))
    }
}
