//! Table traits
//!
//! Both memtables and SSTables are read through [`Table`]. Only memtables
//! implement [`MutableTable`], so writing to an SSTable does not compile.

use std::sync::Arc;

use bytes::Bytes;

use crate::value::Cell;

/// Boxed ascending stream of cells, owned by the reader
pub type CellIter = Box<dyn Iterator<Item = Cell> + Send>;

/// Read side shared by in-memory and on-disk tables
pub trait Table: Send + Sync + 'static {
    /// Generation stamped on every cell this table yields
    fn generation(&self) -> u64;

    /// Cells with key >= `from`, ascending
    ///
    /// Takes the table by `Arc` so the returned cursor can outlive the caller.
    fn iter_from(self: Arc<Self>, from: &[u8]) -> CellIter;

    /// Approximate footprint in bytes
    fn size_in_bytes(&self) -> usize;
}

/// Outcome of rewriting a key's expiry in place
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryUpdate {
    /// The live value now carries the new deadline
    Applied,
    /// The table's newest version is a tombstone or already expired
    Dead,
    /// The table holds no version of the key
    Missing,
}

/// Write side, implemented by memtables only
pub trait MutableTable: Table {
    fn upsert(&self, key: Bytes, payload: Bytes);

    fn upsert_with_expiry(&self, key: Bytes, payload: Bytes, expires_at: u64);

    /// Writes a tombstone
    fn remove(&self, key: Bytes);

    /// Rewrites the current live value with an absolute expiry, keeping its payload
    fn set_expiry(&self, key: &[u8], expires_at: u64) -> ExpiryUpdate;
}

/// Opens a cursor at `from` on each table, in the given order
pub fn cursors<T: Table>(tables: &[Arc<T>], from: &[u8]) -> Vec<CellIter> {
    tables
        .iter()
        .map(|table| Arc::clone(table).iter_from(from))
        .collect()
}
