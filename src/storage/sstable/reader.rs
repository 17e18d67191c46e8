//! SSTable Reader
//!
//! Memory-maps an SSTable and decodes cells lazily from the mapped bytes.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use memmap2::Mmap;

use crate::error::{Result, RingError};
use crate::table::{CellIter, Table};
use crate::value::{Cell, Value};

use super::iterator::SsTableIter;
use super::{
    decode_expiry, decode_marker, read_i32, read_i64, FOOTER_SIZE, NO_EXPIRY, OFFSET_SIZE,
};

/// An open, immutable SSTable
///
/// The offset block is never copied: offsets and keys are read straight from
/// the map. Every cell is bounds-checked once in [`SsTable::open`], so the
/// accessors below cannot run off the end of the mapping.
pub struct SsTable {
    path: PathBuf,
    generation: u64,
    mmap: Mmap,
    rows: usize,
    /// Start of the offset block (= end of the data block)
    index_start: usize,
}

impl std::fmt::Debug for SsTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SsTable")
            .field("path", &self.path)
            .field("generation", &self.generation)
            .field("rows", &self.rows)
            .finish()
    }
}

impl SsTable {
    /// Open an SSTable for reading
    pub fn open(path: &Path, generation: u64) -> Result<Self> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len() as usize;
        if file_len < FOOTER_SIZE {
            return Err(RingError::corrupted(path, "file shorter than footer"));
        }

        // SAFETY: SSTables are written once through a temp file and renamed
        // into place; nothing writes to a published file afterwards.
        let mmap = unsafe { Mmap::map(&file)? };

        let rows = read_i32(&mmap, file_len - FOOTER_SIZE)
            .filter(|rows| *rows >= 0)
            .ok_or_else(|| RingError::corrupted(path, "negative row count"))? as usize;

        let index_start = rows
            .checked_mul(OFFSET_SIZE)
            .and_then(|index_len| (file_len - FOOTER_SIZE).checked_sub(index_len))
            .ok_or_else(|| RingError::corrupted(path, "offset block larger than file"))?;

        let table = Self {
            path: path.to_path_buf(),
            generation,
            mmap,
            rows,
            index_start,
        };
        table.validate()?;

        tracing::debug!(path = %path.display(), generation, rows, "Opened SSTable");
        Ok(table)
    }

    /// Check that every offset points at a cell lying inside the data block
    fn validate(&self) -> Result<()> {
        let data = &self.mmap[..self.index_start];
        let mut previous_end = 0usize;

        for i in 0..self.rows {
            let offset = self.raw_offset(i);
            if offset < 0 || (offset as usize) < previous_end {
                return Err(RingError::corrupted(&self.path, format!("bad offset for row {}", i)));
            }
            previous_end = cell_end(data, offset as usize).ok_or_else(|| {
                RingError::corrupted(&self.path, format!("row {} runs past the data block", i))
            })?;
        }
        Ok(())
    }

    fn raw_offset(&self, i: usize) -> i32 {
        read_i32(&self.mmap, self.index_start + i * OFFSET_SIZE).unwrap_or(-1)
    }

    fn offset(&self, i: usize) -> usize {
        self.raw_offset(i) as usize
    }

    /// Number of cells
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the file in bytes
    pub fn file_size(&self) -> usize {
        self.mmap.len()
    }

    /// Key of row `i`, borrowed from the map
    pub fn key_at(&self, i: usize) -> &[u8] {
        let offset = self.offset(i);
        let key_len = read_i32(&self.mmap, offset).unwrap_or(0) as usize;
        &self.mmap[offset + 4..offset + 4 + key_len]
    }

    /// Decode row `i`
    pub fn cell_at(&self, i: usize) -> Cell {
        let key = self.key_at(i);
        let mut pos = self.offset(i) + 4 + key.len();
        let key = Bytes::copy_from_slice(key);

        let marker = read_i64(&self.mmap, pos).unwrap_or(0);
        pos += 8;
        let (timestamp, tombstone) = decode_marker(marker);

        let value = if tombstone {
            Value::from_parts(timestamp, None, None)
        } else {
            let expires_at = read_i64(&self.mmap, pos).unwrap_or(NO_EXPIRY);
            pos += 8;
            let value_len = read_i32(&self.mmap, pos).unwrap_or(0) as usize;
            pos += 4;
            let payload = Bytes::copy_from_slice(&self.mmap[pos..pos + value_len]);
            Value::from_parts(timestamp, Some(payload), decode_expiry(expires_at))
        };

        Cell::new(key, value, self.generation)
    }

    /// Index of the leftmost row whose key is >= `from` (`rows` if none)
    pub fn find(&self, from: &[u8]) -> usize {
        let (mut left, mut right) = (0usize, self.rows);
        while left < right {
            let middle = left + (right - left) / 2;
            if self.key_at(middle) < from {
                left = middle + 1;
            } else {
                right = middle;
            }
        }
        left
    }

    /// Point lookup of the stored version, tombstones included
    pub fn get(&self, key: &[u8]) -> Option<Value> {
        let i = self.find(key);
        (i < self.rows && self.key_at(i) == key).then(|| self.cell_at(i).value)
    }
}

impl Table for SsTable {
    fn generation(&self) -> u64 {
        self.generation
    }

    fn iter_from(self: Arc<Self>, from: &[u8]) -> CellIter {
        let index = self.find(from);
        Box::new(SsTableIter::new(self, index))
    }

    fn size_in_bytes(&self) -> usize {
        self.file_size()
    }
}

/// End offset of the cell starting at `offset`, if it fits inside `data`
fn cell_end(data: &[u8], offset: usize) -> Option<usize> {
    let key_len = usize::try_from(read_i32(data, offset)?).ok()?;
    let mut pos = offset.checked_add(4)?.checked_add(key_len)?;
    let (_, tombstone) = decode_marker(read_i64(data, pos)?);
    pos += 8;

    if !tombstone {
        read_i64(data, pos)?;
        pos += 8;
        let value_len = usize::try_from(read_i32(data, pos)?).ok()?;
        pos = pos.checked_add(4)?.checked_add(value_len)?;
    }

    (pos <= data.len()).then_some(pos)
}
