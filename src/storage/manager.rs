//! Storage Manager
//!
//! Manages the set of SSTables on disk.
//!
//! ## Responsibilities
//! - Discover existing SSTables on startup and clean up crash leftovers
//! - Publish new SSTables from memtable flushes
//! - Install compacted tables and delete the ones they replace
//! - Hand out cheap snapshots of the current table set to readers
//!
//! ## File Naming
//! - `sstable_000042.sst`: flush output of generation 42
//! - `compact_000042.sst`: compaction output of generation 42; every table
//!   with a lower generation is superseded by it
//! - `*.tmp`: a table still being written, never opened

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{Result, RingError};
use crate::value::{Cell, Value};

use super::sstable::{SsTable, SsTableBuilder};

const FLUSH_PREFIX: &str = "sstable_";
const COMPACT_PREFIX: &str = "compact_";
const TABLE_EXTENSION: &str = "sst";
const TEMP_EXTENSION: &str = "tmp";

/// Kind of file found in the data directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TableFile {
    Flushed(u64),
    Compacted(u64),
    Temp,
}

impl TableFile {
    /// "sstable_000042.sst" → Flushed(42), "compact_000007.sst" → Compacted(7)
    fn parse(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?;
        if extension == TEMP_EXTENSION {
            return Some(TableFile::Temp);
        }
        if extension != TABLE_EXTENSION {
            return None;
        }

        let stem = path.file_stem()?.to_str()?;
        if let Some(generation) = stem.strip_prefix(FLUSH_PREFIX) {
            return generation.parse().ok().map(TableFile::Flushed);
        }
        if let Some(generation) = stem.strip_prefix(COMPACT_PREFIX) {
            return generation.parse().ok().map(TableFile::Compacted);
        }
        None
    }
}

/// File name of a published table
fn table_file_name(prefix: &str, generation: u64) -> String {
    format!("{}{:06}.{}", prefix, generation, TABLE_EXTENSION)
}

/// Manages the storage layer
///
/// ## Concurrency:
/// - `sstables`: RwLock held only long enough to clone `Arc`s or swap entries
/// - Only the flush worker adds or removes tables
/// - Readers keep their snapshot alive after a compaction removed its files
pub struct StorageManager {
    /// Directory where SSTables are stored
    data_dir: PathBuf,

    /// Open SSTables keyed by generation
    sstables: RwLock<BTreeMap<u64, Arc<SsTable>>>,
}

impl StorageManager {
    /// Open or create storage in the given directory
    ///
    /// On startup:
    /// 1. Create directory if it doesn't exist
    /// 2. Delete leftover `.tmp` files
    /// 3. Delete tables superseded by the newest compaction
    /// 4. Open every remaining table
    pub fn open(path: &Path) -> Result<Self> {
        fs::create_dir_all(path)?;

        let mut tables: Vec<(u64, PathBuf)> = Vec::new();
        let mut newest_compaction: Option<u64> = None;

        for entry in fs::read_dir(path)? {
            let file_path = entry?.path();
            if !file_path.is_file() {
                continue;
            }

            match TableFile::parse(&file_path) {
                Some(TableFile::Temp) => {
                    tracing::info!(path = %file_path.display(), "Removing unfinished table");
                    fs::remove_file(&file_path)?;
                }
                Some(TableFile::Flushed(generation)) => tables.push((generation, file_path)),
                Some(TableFile::Compacted(generation)) => {
                    newest_compaction = newest_compaction.max(Some(generation));
                    tables.push((generation, file_path));
                }
                None => {}
            }
        }

        let mut sstables = BTreeMap::new();
        for (generation, file_path) in tables {
            if newest_compaction.map_or(false, |newest| generation < newest) {
                tracing::info!(
                    path = %file_path.display(),
                    generation,
                    "Removing table superseded by compaction"
                );
                fs::remove_file(&file_path)?;
                continue;
            }
            let table = SsTable::open(&file_path, generation)?;
            sstables.insert(generation, Arc::new(table));
        }

        tracing::info!(
            path = %path.display(),
            tables = sstables.len(),
            "Storage opened"
        );

        Ok(Self {
            data_dir: path.to_path_buf(),
            sstables: RwLock::new(sstables),
        })
    }

    /// First generation not used by any table on disk
    pub fn next_generation(&self) -> u64 {
        self.sstables
            .read()
            .keys()
            .next_back()
            .map_or(1, |newest| newest + 1)
    }

    /// Current tables, newest first
    pub fn snapshot(&self) -> Vec<Arc<SsTable>> {
        self.sstables.read().values().rev().cloned().collect()
    }

    /// Newest stored version of `key`, tombstones included
    pub fn get(&self, key: &[u8]) -> Option<Value> {
        self.snapshot().iter().find_map(|table| table.get(key))
    }

    /// Write `cells` as the table of `generation` and publish it
    ///
    /// Returns `None` when there was nothing to write.
    pub fn flush<I>(&self, generation: u64, cells: I) -> Result<Option<Arc<SsTable>>>
    where
        I: IntoIterator<Item = Cell>,
    {
        let Some(table) = self.write_table(FLUSH_PREFIX, generation, cells, false)? else {
            return Ok(None);
        };

        self.sstables.write().insert(generation, Arc::clone(&table));
        tracing::info!(generation, rows = table.rows(), "Flushed memtable to SSTable");
        Ok(Some(table))
    }

    /// Write `cells` as the single table of `generation` and drop every other
    ///
    /// The caller must pass the merge of all current tables. An empty result
    /// still produces a (zero-row) file so the compaction point survives a
    /// restart.
    pub fn compact<I>(&self, generation: u64, cells: I) -> Result<Arc<SsTable>>
    where
        I: IntoIterator<Item = Cell>,
    {
        let table = self
            .write_table(COMPACT_PREFIX, generation, cells, true)?
            .ok_or_else(|| RingError::Storage("compaction produced no table".into()))?;

        let replaced = {
            let mut sstables = self.sstables.write();
            let mut fresh = BTreeMap::new();
            fresh.insert(generation, Arc::clone(&table));
            std::mem::replace(&mut *sstables, fresh)
        };

        for old in replaced.values() {
            if let Err(e) = fs::remove_file(old.path()) {
                tracing::warn!(path = %old.path().display(), error = %e, "Failed to remove compacted table");
            }
        }

        tracing::info!(
            generation,
            rows = table.rows(),
            replaced = replaced.len(),
            "Compaction finished"
        );
        Ok(table)
    }

    /// Get the number of SSTables
    pub fn sstable_count(&self) -> usize {
        self.sstables.read().len()
    }

    /// Generations of the current tables, ascending
    pub fn generations(&self) -> Vec<u64> {
        self.sstables.read().keys().copied().collect()
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Build the table in a temp file, rename it into place and open it
    fn write_table<I>(
        &self,
        prefix: &str,
        generation: u64,
        cells: I,
        keep_empty: bool,
    ) -> Result<Option<Arc<SsTable>>>
    where
        I: IntoIterator<Item = Cell>,
    {
        let final_path = self.data_dir.join(table_file_name(prefix, generation));
        let temp_path = final_path.with_extension(TEMP_EXTENSION);

        let rows = match SsTableBuilder::write(cells, &temp_path) {
            Ok(rows) => rows,
            Err(e) => {
                let _ = fs::remove_file(&temp_path);
                return Err(e);
            }
        };

        if rows == 0 && !keep_empty {
            fs::remove_file(&temp_path)?;
            return Ok(None);
        }

        fs::rename(&temp_path, &final_path)?;
        sync_dir(&self.data_dir)?;

        let table = SsTable::open(&final_path, generation)?;
        Ok(Some(Arc::new(table)))
    }
}

/// Make a rename durable
#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<()> {
    fs::File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_table_names() {
        assert_eq!(
            TableFile::parse(Path::new("sstable_000042.sst")),
            Some(TableFile::Flushed(42))
        );
        assert_eq!(
            TableFile::parse(Path::new("compact_000007.sst")),
            Some(TableFile::Compacted(7))
        );
        assert_eq!(
            TableFile::parse(Path::new("sstable_000042.tmp")),
            Some(TableFile::Temp)
        );
        assert_eq!(TableFile::parse(Path::new("notes.txt")), None);
        assert_eq!(TableFile::parse(Path::new("sstable_abc.sst")), None);
    }

    #[test]
    fn test_file_names_round_trip() {
        assert_eq!(
            TableFile::parse(Path::new(&table_file_name(FLUSH_PREFIX, 3))),
            Some(TableFile::Flushed(3))
        );
        assert_eq!(
            TableFile::parse(Path::new(&table_file_name(COMPACT_PREFIX, 12))),
            Some(TableFile::Compacted(12))
        );
    }
}
