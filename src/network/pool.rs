//! Worker Pool
//!
//! Fixed set of named threads draining a shared job queue.

use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use crossbeam::channel::{unbounded, Sender};

use crate::error::{Result, RingError};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs closures on a fixed number of threads
///
/// A panicking job is logged and does not take its thread down. Dropping the
/// pool lets queued jobs finish, then joins every thread.
pub struct WorkerPool {
    name: String,
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `threads` workers named `{name}-{index}`
    pub fn new(name: &str, threads: usize) -> Result<Self> {
        if threads == 0 {
            return Err(RingError::Config(format!("{}: worker pool needs at least one thread", name)));
        }

        let (sender, receiver) = unbounded::<Job>();
        let mut workers = Vec::with_capacity(threads);

        for index in 0..threads {
            let receiver = receiver.clone();
            let handle = thread::Builder::new()
                .name(format!("{}-{}", name, index))
                .spawn(move || {
                    for job in receiver.iter() {
                        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                            tracing::error!("Worker job panicked");
                        }
                    }
                })?;
            workers.push(handle);
        }

        tracing::debug!(pool = name, threads, "Worker pool started");
        Ok(Self {
            name: name.to_string(),
            sender: Some(sender),
            workers,
        })
    }

    /// Queue a job; fails only once the pool is shutting down
    pub fn execute<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.sender
            .as_ref()
            .ok_or_else(|| RingError::Network(format!("{} pool is shut down", self.name)))?
            .send(Box::new(job))
            .map_err(|_| RingError::Network(format!("{} pool is shut down", self.name)))
    }

    pub fn threads(&self) -> usize {
        self.workers.len()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Closing the channel ends every worker loop once the queue is empty
        self.sender.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
        tracing::debug!(pool = %self.name, "Worker pool stopped");
    }
}
