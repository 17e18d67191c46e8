//! Storage Module
//!
//! Persistent storage layer: immutable SSTables and everything that reads or
//! writes them.
//!
//! ## Responsibilities
//! - Encode and decode the SSTable file format
//! - Merge many sorted tables into one newest-version view
//! - Track the set of tables on disk and install flushes and compactions
//! - Run the background worker that drains the memtable flush queue

pub mod merge;
pub mod sstable;

mod manager;
mod worker;

pub use manager::StorageManager;
pub use worker::FlushWorker;
