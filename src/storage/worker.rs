//! Flush Worker
//!
//! Background thread that turns queued memtables into SSTables.
//!
//! ## Responsibilities
//! - Drain the pool's flush queue in FIFO order (the only SSTable writer)
//! - Flush jobs: write the memtable as its own table
//! - Compaction jobs: fold the memtable and every table into one live-only table
//! - Shutdown jobs: flush, then exit
//!
//! A table is registered with the storage manager before the pool forgets it,
//! so a reader always finds the data in one place or the other.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::Receiver;

use crate::error::Result;
use crate::memtable::{FlushJob, FlushKind, MemTable, MemTablePool};
use crate::table::{cursors, Table};
use crate::value::wall_clock_nanos;

use super::merge::live;
use super::StorageManager;

/// Owns the receiving end of the flush queue
pub struct FlushWorker {
    pool: Arc<MemTablePool>,
    storage: Arc<StorageManager>,
    queue: Receiver<FlushJob>,
}

impl FlushWorker {
    pub fn new(
        pool: Arc<MemTablePool>,
        storage: Arc<StorageManager>,
        queue: Receiver<FlushJob>,
    ) -> Self {
        Self {
            pool,
            storage,
            queue,
        }
    }

    /// Start the worker on its own named thread
    pub fn spawn(self) -> Result<JoinHandle<()>> {
        let handle = thread::Builder::new()
            .name("ringkv-flush".to_string())
            .spawn(move || self.run())?;
        Ok(handle)
    }

    fn run(self) {
        tracing::debug!("Flush worker started");

        // A disconnected queue means the pool is gone: nothing left to flush
        while let Ok(job) = self.queue.recv() {
            let FlushJob {
                generation,
                table,
                kind,
                done,
            } = job;

            let result = self.process(generation, table, kind);
            if let Err(e) = &result {
                tracing::error!(generation, ?kind, error = %e, "Flush job failed, dropping memtable");
            }

            self.pool.flushed(generation);
            if let Some(done) = done {
                let _ = done.send(result);
            }

            if kind == FlushKind::Shutdown {
                break;
            }
        }

        tracing::debug!("Flush worker stopped");
    }

    fn process(&self, generation: u64, table: Arc<MemTable>, kind: FlushKind) -> Result<()> {
        match kind {
            FlushKind::Flush | FlushKind::Shutdown => {
                self.storage.flush(generation, table.iter_from(&[]))?;
            }
            FlushKind::Compact => {
                let mut sources = vec![table.iter_from(&[])];
                sources.extend(cursors(&self.storage.snapshot(), &[]));
                let cells = live(sources, wall_clock_nanos());
                self.storage.compact(generation, cells)?;
            }
        }
        Ok(())
    }
}
