//! SSTable Builder
//!
//! Streams sorted cells into a new SSTable file.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;

use crate::error::{Result, RingError};
use crate::value::Cell;

use super::{encode_expiry, encode_marker};

/// Builder for creating new SSTables from sorted cells
pub struct SsTableBuilder {
    /// Output file path
    path: PathBuf,
    /// Buffered writer for performance
    writer: BufWriter<File>,
    /// Start offset of every cell written so far
    offsets: Vec<i32>,
    /// Current write position
    position: u64,
    /// Last key written, to enforce strictly ascending order
    last_key: Option<Bytes>,
}

impl SsTableBuilder {
    /// Create a new SSTable builder, truncating any existing file at `path`
    pub fn new(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            offsets: Vec::new(),
            position: 0,
            last_key: None,
        })
    }

    /// Write every cell of `cells` to `path` and return the row count
    pub fn write<I>(cells: I, path: &Path) -> Result<usize>
    where
        I: IntoIterator<Item = Cell>,
    {
        let mut builder = Self::new(path)?;
        for cell in cells {
            builder.add(&cell)?;
        }
        builder.finish()
    }

    /// Append one cell; keys must be strictly ascending
    pub fn add(&mut self, cell: &Cell) -> Result<()> {
        if let Some(last) = &self.last_key {
            if cell.key <= *last {
                return Err(RingError::Storage(format!(
                    "SSTable {}: keys out of order",
                    self.path.display()
                )));
            }
        }

        let offset = self.checked_offset()?;
        self.offsets.push(offset);

        let value = &cell.value;
        self.put_i32(len_i32(cell.key.len())?)?;
        self.put_bytes(&cell.key)?;
        self.put_i64(encode_marker(value.timestamp(), value.is_tombstone()))?;

        if let Some(payload) = value.payload() {
            self.put_i64(encode_expiry(value.expires_at()))?;
            self.put_i32(len_i32(payload.len())?)?;
            self.put_bytes(payload)?;
        }

        self.last_key = Some(cell.key.clone());
        Ok(())
    }

    /// Number of cells added so far
    pub fn rows(&self) -> usize {
        self.offsets.len()
    }

    /// Write the offset block and footer, then fsync
    pub fn finish(mut self) -> Result<usize> {
        // Cells and offsets must stay addressable by i32
        self.checked_offset()?;

        let rows = self.offsets.len();
        let offsets = std::mem::take(&mut self.offsets);
        for offset in &offsets {
            self.put_i32(*offset)?;
        }
        self.put_i32(len_i32(rows)?)?;

        self.writer.flush()?;
        let file = self.writer.into_inner().map_err(|e| {
            RingError::Storage(format!("Failed to flush SSTable: {}", e))
        })?;
        file.sync_all()?;

        Ok(rows)
    }

    fn checked_offset(&self) -> Result<i32> {
        i32::try_from(self.position).map_err(|_| {
            RingError::Storage(format!(
                "SSTable {} exceeds the 2 GiB format limit",
                self.path.display()
            ))
        })
    }

    fn put_i32(&mut self, v: i32) -> Result<()> {
        self.put_bytes(&v.to_be_bytes())
    }

    fn put_i64(&mut self, v: i64) -> Result<()> {
        self.put_bytes(&v.to_be_bytes())
    }

    fn put_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_all(bytes)?;
        self.position += bytes.len() as u64;
        Ok(())
    }
}

fn len_i32(len: usize) -> Result<i32> {
    i32::try_from(len)
        .map_err(|_| RingError::Storage(format!("length {} does not fit the SSTable format", len)))
}
