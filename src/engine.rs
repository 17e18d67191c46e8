//! Engine Module
//!
//! The storage engine facade that coordinates all components.
//!
//! ## Responsibilities
//! - Open the data directory and resume generation numbering
//! - Route writes through the memtable pool
//! - Merge the pool with every SSTable on reads
//! - Own the flush worker and stop it on close

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::config::Config;
use crate::error::{Result, RingError};
use crate::memtable::MemTablePool;
use crate::storage::merge::{live, Collapse, LiveCells, MergeIterator};
use crate::storage::{FlushWorker, StorageManager};
use crate::table::cursors;
use crate::value::{deadline_after, wall_clock_nanos, Cell, Value};

/// The main storage engine
///
/// ## Concurrency Model
///
/// - **Writes** go to the pool's active memtable, which is lock-free; the
///   pool's RwLock is only taken exclusively to rotate tables.
/// - **Reads** never block writers: they snapshot the pool first and the
///   SSTable set second, so a table moving from one to the other between the
///   two snapshots is seen at least once.
/// - **Flushes and compactions** run on a single background worker.
pub struct Engine {
    /// Engine configuration
    config: Config,

    /// Directory for all data files (SSTables)
    storage_dir: PathBuf,

    /// Active memtable and memtables waiting for the worker
    pool: Arc<MemTablePool>,

    /// Persistent storage manager (internal RwLock on the table set)
    storage: Arc<StorageManager>,

    /// Flush worker, taken on close
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Engine {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    const SSTABLE_DIR: &'static str = "sstables";

    /// Open or create an engine with the given config
    ///
    /// On startup:
    /// 1. Open/create data directory
    /// 2. Load existing SSTables (dropping crash leftovers)
    /// 3. Resume generation numbering after the newest table
    /// 4. Start the flush worker
    pub fn open(config: Config) -> Result<Self> {
        fs::create_dir_all(&config.data_dir)?;

        let storage_dir = config.data_dir.join(Self::SSTABLE_DIR);
        let storage = Arc::new(StorageManager::open(&storage_dir)?);

        let start_generation = storage.next_generation();
        let (pool, queue) = MemTablePool::new(start_generation, config.memtable_size_limit);
        let pool = Arc::new(pool);

        let worker = FlushWorker::new(Arc::clone(&pool), Arc::clone(&storage), queue).spawn()?;

        tracing::info!(
            data_dir = %config.data_dir.display(),
            sstables = storage.sstable_count(),
            generation = start_generation,
            "Engine opened"
        );

        Ok(Self {
            config,
            storage_dir,
            pool,
            storage,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().data_dir(path).build())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Get the live value of a key
    ///
    /// Tombstoned and expired keys read as `None`.
    pub fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        let now = wall_clock_nanos();
        Ok(self
            .latest(key)?
            .filter(|value| value.is_live(now))
            .and_then(Value::into_payload))
    }

    /// Newest stored version of a key, tombstones and expired values included
    ///
    /// Search order:
    /// 1. MemTables (active, then pending newest first)
    /// 2. SSTables (newest to oldest)
    pub fn latest(&self, key: &[u8]) -> Result<Option<Value>> {
        Ok(self.pool.get(key).or_else(|| self.storage.get(key)))
    }

    /// Live entries with `from <= key < to` in ascending key order
    ///
    /// The iterator is lazy and sees a snapshot of the table set taken now;
    /// expiry is judged at the time of this call.
    pub fn range(&self, from: &[u8], to: Option<&[u8]>) -> Result<Range> {
        let now = wall_clock_nanos();
        let mut sources = vec![self.pool.iter_from(from)];
        sources.extend(cursors(&self.storage.snapshot(), from));

        Ok(Range {
            cells: live(sources, now),
            to: to.map(Bytes::copy_from_slice),
            done: false,
        })
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Insert or replace a key
    pub fn upsert(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.pool
            .upsert(Bytes::copy_from_slice(key), Bytes::copy_from_slice(value))
    }

    /// Insert or replace a key that expires `ttl` from now
    pub fn upsert_with_ttl(&self, key: &[u8], value: &[u8], ttl: Duration) -> Result<()> {
        self.pool.upsert_with_expiry(
            Bytes::copy_from_slice(key),
            Bytes::copy_from_slice(value),
            deadline_after(ttl),
        )
    }

    /// Delete a key by writing a tombstone
    pub fn remove(&self, key: &[u8]) -> Result<()> {
        self.pool.remove(Bytes::copy_from_slice(key))
    }

    /// Make the current live value of `key` expire `ttl` from now
    ///
    /// Returns `false` if the key has no live value. A write that completes
    /// before this call takes effect is never overwritten by it.
    pub fn set_expiry(&self, key: &[u8], ttl: Duration) -> Result<bool> {
        let expires_at = deadline_after(ttl);
        self.pool.set_expiry(key, expires_at, |key| self.storage.get(key))
    }

    /// Fold the memtable and every SSTable into a single table
    ///
    /// Blocks until the worker has installed the result. Tombstones and
    /// expired values are dropped for good.
    pub fn compact(&self) -> Result<()> {
        self.pool.compact()
    }

    /// Flush the memtable and stop the worker
    ///
    /// Idempotent. Reads keep working afterwards, writes fail with
    /// [`RingError::AlreadyStopped`].
    pub fn close(&self) -> Result<()> {
        let queued = self.pool.close();

        if let Some(worker) = self.worker.lock().take() {
            worker
                .join()
                .map_err(|_| RingError::Storage("flush worker panicked".to_string()))?;
            tracing::info!(data_dir = %self.config.data_dir.display(), "Engine closed");
        }

        queued.map(|_| ())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Get the storage directory path (where SSTables are stored)
    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// Get the current size of the active memtable
    pub fn memtable_size(&self) -> usize {
        self.pool.size_in_bytes()
    }

    /// Memtables waiting for the flush worker
    pub fn pending_flushes(&self) -> usize {
        self.pool.pending_count()
    }

    /// Get the number of SSTables
    pub fn sstable_count(&self) -> usize {
        self.storage.sstable_count()
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_stopped()
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "Failed to close engine cleanly");
        }
    }
}

/// Lazy iterator returned by [`Engine::range`]
pub struct Range {
    cells: LiveCells<Collapse<MergeIterator>>,
    /// Exclusive upper bound
    to: Option<Bytes>,
    done: bool,
}

impl Iterator for Range {
    type Item = (Bytes, Bytes);

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        for Cell { key, value, .. } in self.cells.by_ref() {
            if self.to.as_ref().map_or(false, |to| key >= *to) {
                break;
            }
            if let Some(payload) = value.into_payload() {
                return Some((key, payload));
            }
        }

        self.done = true;
        None
    }
}
