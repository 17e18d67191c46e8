//! MemTable implementation
//!
//! Lock-free skip list keyed by raw bytes. Size is tracked by deltas against
//! the entry each write actually replaced.

use std::ops::Bound;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use crossbeam_skiplist::SkipMap;

use crate::table::{CellIter, ExpiryUpdate, MutableTable, Table};
use crate::value::{wall_clock_nanos, Cell, Value};

/// In-memory table for recent writes
///
/// ## Concurrency
/// Every operation is safe from any number of threads without external
/// locking. Iteration is weakly consistent: writes racing with a cursor may or
/// may not be observed.
pub struct MemTable {
    map: SkipMap<Bytes, Value>,
    /// Sum of key + payload lengths; signed because concurrent deltas can
    /// briefly arrive out of order
    size: AtomicI64,
    generation: u64,
}

impl MemTable {
    /// Create a new empty MemTable for the given generation
    pub fn new(generation: u64) -> Self {
        Self {
            map: SkipMap::new(),
            size: AtomicI64::new(0),
            generation,
        }
    }

    /// Newest version of `key` held by this table, tombstones included
    pub fn get(&self, key: &[u8]) -> Option<Value> {
        self.map.get(key).map(|entry| entry.value().clone())
    }

    /// Number of distinct keys (tombstones included)
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Inserts or replaces `key`, applying the size delta
    fn put(&self, key: Bytes, value: Value) {
        let key_len = key.len() as i64;
        let new_footprint = value.footprint() as i64;
        let replaced = std::cell::Cell::new(None);

        self.map.compare_insert(key, value, |previous| {
            replaced.set(Some(previous.footprint() as i64));
            true
        });

        let delta = match replaced.get() {
            Some(old_footprint) => new_footprint - old_footprint,
            None => key_len + new_footprint,
        };
        self.size.fetch_add(delta, Ordering::AcqRel);
    }

    /// Inserts `value` only if the table holds no version of `key`
    ///
    /// Returns `false`, leaving the table untouched, if any version exists,
    /// tombstones included.
    pub fn insert_if_absent(&self, key: Bytes, value: Value) -> bool {
        let footprint = (key.len() + value.footprint()) as i64;
        let existed = std::cell::Cell::new(false);

        self.map.compare_insert(key, value, |_| {
            existed.set(true);
            false
        });

        if existed.get() {
            return false;
        }
        self.size.fetch_add(footprint, Ordering::AcqRel);
        true
    }
}

impl Table for MemTable {
    fn generation(&self) -> u64 {
        self.generation
    }

    fn iter_from(self: Arc<Self>, from: &[u8]) -> CellIter {
        Box::new(MemTableIter {
            table: self,
            cursor: Some(Bound::Included(Bytes::copy_from_slice(from))),
        })
    }

    fn size_in_bytes(&self) -> usize {
        self.size.load(Ordering::Acquire).max(0) as usize
    }
}

impl MutableTable for MemTable {
    fn upsert(&self, key: Bytes, payload: Bytes) {
        self.put(key, Value::live(payload));
    }

    fn upsert_with_expiry(&self, key: Bytes, payload: Bytes, expires_at: u64) {
        self.put(key, Value::expiring(payload, expires_at));
    }

    fn remove(&self, key: Bytes) {
        self.put(key, Value::tombstone());
    }

    fn set_expiry(&self, key: &[u8], expires_at: u64) -> ExpiryUpdate {
        let (key, current) = match self.map.get(key) {
            Some(entry) => (entry.key().clone(), entry.value().clone()),
            None => return ExpiryUpdate::Missing,
        };

        match current.payload() {
            Some(payload) if current.is_live(wall_clock_nanos()) => {
                self.put(key, Value::expiring(payload.clone(), expires_at));
                ExpiryUpdate::Applied
            }
            _ => ExpiryUpdate::Dead,
        }
    }
}

impl Default for MemTable {
    fn default() -> Self {
        Self::new(0)
    }
}

/// Cursor over a MemTable
///
/// Each step re-seeks just past the last key it returned, so the cursor holds
/// no borrow of the skip list between calls.
pub struct MemTableIter {
    table: Arc<MemTable>,
    /// `None` once exhausted
    cursor: Option<Bound<Bytes>>,
}

impl Iterator for MemTableIter {
    type Item = Cell;

    fn next(&mut self) -> Option<Self::Item> {
        let bound = self.cursor.take()?;
        let entry = match &bound {
            Bound::Included(key) => self.table.map.lower_bound(Bound::Included(key.as_ref())),
            Bound::Excluded(key) => self.table.map.lower_bound(Bound::Excluded(key.as_ref())),
            Bound::Unbounded => self.table.map.front(),
        }?;

        let key = entry.key().clone();
        let value = entry.value().clone();
        drop(entry);

        self.cursor = Some(Bound::Excluded(key.clone()));
        Some(Cell::new(key, value, self.table.generation))
    }
}
