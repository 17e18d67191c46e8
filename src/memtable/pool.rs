//! MemTable Pool
//!
//! Owns the mutable write path: the active memtable, the memtables waiting to
//! be flushed and the bounded queue feeding the flush worker.
//!
//! ## Concurrency
//! - Writers mutate the active table under the *read* lock, so a table is
//!   never written after it has been handed to the worker.
//! - Rotation, close, compaction requests and flush completion take the
//!   *write* lock.
//! - Enqueuing happens outside the state lock and blocks while the queue is
//!   full. A separate submit mutex is held from rotation through the send, so
//!   jobs reach the worker in generation order.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use crossbeam::channel::{bounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};

use crate::error::{Result, RingError};
use crate::storage::merge::collapse;
use crate::table::{CellIter, ExpiryUpdate, MutableTable, Table};
use crate::value::{wall_clock_nanos, Value};

use super::MemTable;

/// What the flush worker should do with a job's table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushKind {
    /// Write the table to its own SSTable
    Flush,
    /// Fold the table and every SSTable into a single new SSTable
    Compact,
    /// Flush the table, then stop the worker
    Shutdown,
}

/// A memtable handed to the flush worker
pub struct FlushJob {
    pub generation: u64,
    pub table: Arc<MemTable>,
    pub kind: FlushKind,
    /// Completion signal for callers that wait on the job
    pub done: Option<Sender<Result<()>>>,
}

struct PoolState {
    active: Arc<MemTable>,
    pending: BTreeMap<u64, Arc<MemTable>>,
    next_generation: u64,
}

impl PoolState {
    /// Moves the active table to pending and installs a fresh one
    fn rotate(&mut self, kind: FlushKind, done: Option<Sender<Result<()>>>) -> FlushJob {
        let fresh = Arc::new(MemTable::new(self.next_generation));
        self.next_generation += 1;

        let table = std::mem::replace(&mut self.active, fresh);
        self.pending.insert(table.generation(), Arc::clone(&table));

        FlushJob {
            generation: table.generation(),
            table,
            kind,
            done,
        }
    }
}

/// Active memtable + memtables pending flush
pub struct MemTablePool {
    state: RwLock<PoolState>,
    /// Held from rotation until the job is queued; never taken by the worker
    submit: Mutex<()>,
    flush_threshold: usize,
    queue: Sender<FlushJob>,
    stopped: AtomicBool,
}

impl MemTablePool {
    /// Flush jobs that may wait before writers block
    pub const QUEUE_CAPACITY: usize = 2;

    /// Create a pool whose first memtable has `start_generation`
    ///
    /// Returns the receiving end of the flush queue, meant for the worker.
    pub fn new(start_generation: u64, flush_threshold: usize) -> (Self, Receiver<FlushJob>) {
        let (tx, rx) = bounded(Self::QUEUE_CAPACITY);
        let pool = Self {
            state: RwLock::new(PoolState {
                active: Arc::new(MemTable::new(start_generation)),
                pending: BTreeMap::new(),
                next_generation: start_generation + 1,
            }),
            submit: Mutex::new(()),
            flush_threshold,
            queue: tx,
            stopped: AtomicBool::new(false),
        };
        (pool, rx)
    }

    pub fn upsert(&self, key: Bytes, payload: Bytes) -> Result<()> {
        self.write(|state| state.active.upsert(key, payload))
    }

    pub fn upsert_with_expiry(&self, key: Bytes, payload: Bytes, expires_at: u64) -> Result<()> {
        self.write(|state| state.active.upsert_with_expiry(key, payload, expires_at))
    }

    pub fn remove(&self, key: Bytes) -> Result<()> {
        self.write(|state| state.active.remove(key))
    }

    /// Makes the live value of `key` expire at `expires_at`
    ///
    /// If only older tables hold the key, `older` is asked for its stored
    /// version and that payload is copied into the active table. The copy only
    /// lands while the active table still has no version of the key, so a
    /// write that completed first is never overwritten. Returns `false` if the
    /// key has no live value.
    pub fn set_expiry<F>(&self, key: &[u8], expires_at: u64, older: F) -> Result<bool>
    where
        F: Fn(&[u8]) -> Option<Value>,
    {
        let mut applied = false;
        self.write(|state| loop {
            match state.active.set_expiry(key, expires_at) {
                ExpiryUpdate::Applied => {
                    applied = true;
                    return;
                }
                ExpiryUpdate::Dead => return,
                ExpiryUpdate::Missing => {}
            }

            let current = state
                .pending
                .values()
                .rev()
                .find_map(|table| table.get(key))
                .or_else(|| older(key));
            let payload = match current {
                Some(value) if value.is_live(wall_clock_nanos()) => value.into_payload(),
                _ => None,
            };
            let Some(payload) = payload else { return };

            let copy = Value::expiring(payload, expires_at);
            if state.active.insert_if_absent(Bytes::copy_from_slice(key), copy) {
                applied = true;
                return;
            }
            // A write landed in the meantime: judge that one instead
        })?;
        Ok(applied)
    }

    /// Applies `op` to the active table, then rotates it if it grew too big
    ///
    /// The read lock pins the active table for the whole of `op`.
    fn write<F: FnOnce(&PoolState)>(&self, op: F) -> Result<()> {
        let size = {
            let state = self.state.read();
            if self.is_stopped() {
                return Err(RingError::AlreadyStopped);
            }
            op(&state);
            state.active.size_in_bytes()
        };

        if size > self.flush_threshold {
            self.enqueue_flush()?;
        }
        Ok(())
    }

    fn enqueue_flush(&self) -> Result<()> {
        let _submit = self.submit.lock();
        let job = {
            let mut state = self.state.write();
            // Another writer may have rotated first
            if state.active.size_in_bytes() <= self.flush_threshold || self.is_stopped() {
                return Ok(());
            }
            state.rotate(FlushKind::Flush, None)
        };

        tracing::debug!(generation = job.generation, "Memtable full, queueing flush");
        self.submit(job)
    }

    fn submit(&self, job: FlushJob) -> Result<()> {
        self.queue
            .send(job)
            .map_err(|_| RingError::Storage("flush worker has exited".to_string()))
    }

    /// Newest version of `key` held by any memtable, tombstones included
    pub fn get(&self, key: &[u8]) -> Option<Value> {
        let state = self.state.read();
        state
            .active
            .get(key)
            .or_else(|| state.pending.values().rev().find_map(|table| table.get(key)))
    }

    /// Merged, collapsed view of every memtable, from `from` onwards
    ///
    /// Tombstones and expired cells are kept: they must still shadow older
    /// SSTable data.
    pub fn iter_from(&self, from: &[u8]) -> CellIter {
        let sources: Vec<CellIter> = {
            let state = self.state.read();
            let mut sources = Vec::with_capacity(state.pending.len() + 1);
            for table in state.pending.values().rev() {
                sources.push(Arc::clone(table).iter_from(from));
            }
            sources.push(Arc::clone(&state.active).iter_from(from));
            sources
        };
        Box::new(collapse(sources))
    }

    /// Called by the worker once `generation` is durable (or dropped)
    pub fn flushed(&self, generation: u64) {
        self.state.write().pending.remove(&generation);
    }

    /// Queue the active memtable for compaction and wait for the worker
    pub fn compact(&self) -> Result<()> {
        let (done_tx, done_rx) = bounded(1);
        {
            let _submit = self.submit.lock();
            let job = {
                let mut state = self.state.write();
                if self.is_stopped() {
                    return Err(RingError::AlreadyStopped);
                }
                state.rotate(FlushKind::Compact, Some(done_tx))
            };

            tracing::info!(generation = job.generation, "Queueing compaction");
            self.submit(job)?;
        }
        done_rx.recv().map_err(|_| {
            RingError::Storage("flush worker exited before compaction finished".to_string())
        })?
    }

    /// Stop accepting writes and queue the final flush
    ///
    /// Returns `false` if the pool was already closed. The caller still has
    /// to wait for the worker to drain.
    pub fn close(&self) -> Result<bool> {
        let _submit = self.submit.lock();
        let job = {
            let mut state = self.state.write();
            if self
                .stopped
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                return Ok(false);
            }
            state.rotate(FlushKind::Shutdown, None)
        };

        tracing::debug!(generation = job.generation, "Queueing shutdown flush");
        self.submit(job)?;
        Ok(true)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Size of the active memtable
    pub fn size_in_bytes(&self) -> usize {
        self.state.read().active.size_in_bytes()
    }

    /// Number of memtables handed to the worker but not yet flushed
    pub fn pending_count(&self) -> usize {
        self.state.read().pending.len()
    }

    /// Generation of the active memtable
    pub fn active_generation(&self) -> u64 {
        self.state.read().active.generation()
    }
}
