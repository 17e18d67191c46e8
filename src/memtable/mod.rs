//! MemTable Module
//!
//! In-memory data structures for recent writes.
//!
//! ## Responsibilities
//! - Fast concurrent reads and writes in memory
//! - Track size for flush triggers
//! - Rotate full memtables into a bounded flush queue
//! - Ordered iteration for SSTable creation and merged reads
//!
//! ## Data Structure Choice
//! A lock-free skip list (`crossbeam-skiplist`) per generation. The pool on
//! top only locks its own generation bookkeeping, never the tables.

mod pool;
mod table;

pub use pool::{FlushJob, FlushKind, MemTablePool};
pub use table::{MemTable, MemTableIter};
